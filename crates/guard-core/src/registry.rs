use std::sync::Arc;

use crate::{
    domain::{ChatId, Sender, UserId, UserRecord},
    store::ModerationStore,
    Result,
};

/// Users and chats as first observed by the bot.
pub struct Registry {
    store: Arc<dyn ModerationStore>,
    default_language: String,
    supported_languages: Vec<String>,
}

impl Registry {
    pub fn new(
        store: Arc<dyn ModerationStore>,
        default_language: String,
        supported_languages: Vec<String>,
    ) -> Self {
        Self {
            store,
            default_language,
            supported_languages,
        }
    }

    pub fn supported_languages(&self) -> &[String] {
        &self.supported_languages
    }

    pub async fn register_user(&self, sender: &Sender) -> Result<UserRecord> {
        self.store.upsert_user(sender, &self.default_language).await
    }

    /// Record the sender and, for group messages, the chat.
    pub async fn observe(
        &self,
        sender: &Sender,
        chat: Option<(ChatId, Option<&str>)>,
    ) -> Result<()> {
        self.register_user(sender).await?;
        if let Some((chat_id, title)) = chat {
            self.store.ensure_chat(chat_id, title).await?;
        }
        Ok(())
    }

    pub async fn profile(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        self.store.user(user_id).await
    }

    /// `Ok(false)` for a language we do not support.
    pub async fn set_language(&self, user_id: UserId, code: &str) -> Result<bool> {
        let code = code.trim().to_lowercase();
        if !self.supported_languages.contains(&code) {
            return Ok(false);
        }
        self.store.set_user_language(user_id, &code).await?;
        Ok(true)
    }
}
