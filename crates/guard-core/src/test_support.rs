//! Port fakes shared by the unit tests.

use std::{collections::HashSet, path::Path, sync::Arc, sync::Mutex, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    config::PolicyDefaults,
    domain::{
        BanRecord, ChatId, ChatRecord, MessageId, MessageRef, NewBan, NewViolation, NewWarning,
        Sender, UserId, UserRecord, ViolationRecord, WarningRecord,
    },
    errors::Error,
    messaging::{port::MessagingPort, types::InlineKeyboard},
    ports::ModerationPort,
    store::{ModerationStore, SqliteStore},
    subscription::SubscriptionVerifier,
    Result,
};

pub fn defaults_with(words: &[&str], max_warnings: u32) -> Arc<PolicyDefaults> {
    Arc::new(PolicyDefaults {
        banned_words: words.iter().map(|w| w.to_string()).collect(),
        max_warnings,
        ban_duration: Duration::from_secs(86_400),
    })
}

#[derive(Default)]
pub struct FakePlatform {
    global_admins: Mutex<HashSet<UserId>>,
    chat_admins: Mutex<HashSet<(ChatId, UserId)>>,
    reject: Mutex<bool>,
    bans: Mutex<Vec<(ChatId, UserId, Option<DateTime<Utc>>)>>,
}

impl FakePlatform {
    pub fn add_global_admin(&self, user: UserId) {
        self.global_admins.lock().unwrap().insert(user);
    }

    pub fn add_chat_admin(&self, chat: ChatId, user: UserId) {
        self.chat_admins.lock().unwrap().insert((chat, user));
    }

    pub fn reject_bans(&self) {
        *self.reject.lock().unwrap() = true;
    }

    pub fn bans(&self) -> Vec<(ChatId, UserId, Option<DateTime<Utc>>)> {
        self.bans.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModerationPort for FakePlatform {
    async fn is_global_admin(&self, user_id: UserId) -> Result<bool> {
        Ok(self.global_admins.lock().unwrap().contains(&user_id))
    }

    async fn is_chat_admin(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        Ok(self.chat_admins.lock().unwrap().contains(&(chat_id, user_id)))
    }

    async fn ban_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if *self.reject.lock().unwrap() {
            return Err(Error::ExternalAction("not enough rights".to_string()));
        }
        self.bans.lock().unwrap().push((chat_id, user_id, until));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    fail_deletes: Mutex<bool>,
    sends: Mutex<Vec<String>>,
    deletes: Mutex<Vec<MessageId>>,
    keyboards: Mutex<Vec<(ChatId, String, InlineKeyboard)>>,
}

impl FakeMessenger {
    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(1000 + *guard),
        }
    }

    pub fn fail_deletes(&self) {
        *self.fail_deletes.lock().unwrap() = true;
    }

    pub fn sent_html(&self) -> Vec<String> {
        self.sends.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<MessageId> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn keyboards(&self) -> Vec<(ChatId, String, InlineKeyboard)> {
        self.keyboards.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.sends.lock().unwrap().push(html.to_string());
        Ok(self.alloc(chat_id))
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        if *self.fail_deletes.lock().unwrap() {
            return Err(Error::External("message can't be deleted".to_string()));
        }
        self.deletes.lock().unwrap().push(msg.message_id);
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.keyboards
            .lock()
            .unwrap()
            .push((chat_id, html.to_string(), keyboard));
        Ok(self.alloc(chat_id))
    }

    async fn answer_callback_query(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }
}

pub enum FixedVerifier {
    Unsubscribed,
    Failing,
}

#[async_trait]
impl SubscriptionVerifier for FixedVerifier {
    async fn is_subscribed(&self, _user_id: UserId, _channels: &[String]) -> Result<bool> {
        match self {
            FixedVerifier::Unsubscribed => Ok(false),
            FixedVerifier::Failing => Err(Error::External("getChatMember failed".to_string())),
        }
    }
}

/// A store that rejects warning or ban inserts, delegating everything else.
pub struct FailingStore {
    inner: SqliteStore,
    fail_warnings: bool,
    fail_bans: bool,
}

impl FailingStore {
    pub fn bans() -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            fail_warnings: false,
            fail_bans: true,
        }
    }

    pub fn warnings() -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            fail_warnings: true,
            fail_bans: false,
        }
    }
}

#[async_trait]
impl ModerationStore for FailingStore {
    async fn upsert_user(&self, sender: &Sender, default_language: &str) -> Result<UserRecord> {
        self.inner.upsert_user(sender, default_language).await
    }

    async fn user(&self, id: UserId) -> Result<Option<UserRecord>> {
        self.inner.user(id).await
    }

    async fn set_user_language(&self, id: UserId, language: &str) -> Result<()> {
        self.inner.set_user_language(id, language).await
    }

    async fn set_user_subscribed(&self, id: UserId, subscribed: bool) -> Result<()> {
        self.inner.set_user_subscribed(id, subscribed).await
    }

    async fn ensure_chat(&self, id: ChatId, title: Option<&str>) -> Result<ChatRecord> {
        self.inner.ensure_chat(id, title).await
    }

    async fn chat_settings(&self, id: ChatId) -> Result<Option<String>> {
        self.inner.chat_settings(id).await
    }

    async fn replace_chat_settings(&self, id: ChatId, document: String) -> Result<()> {
        self.inner.replace_chat_settings(id, document).await
    }

    async fn insert_warning(&self, warning: NewWarning) -> Result<WarningRecord> {
        if self.fail_warnings {
            return Err(Error::Store("disk full".to_string()));
        }
        self.inner.insert_warning(warning).await
    }

    async fn insert_ban(&self, ban: NewBan) -> Result<BanRecord> {
        if self.fail_bans {
            return Err(Error::Store("disk full".to_string()));
        }
        self.inner.insert_ban(ban).await
    }

    async fn warnings_for(&self, user: UserId, chat: ChatId) -> Result<Vec<WarningRecord>> {
        self.inner.warnings_for(user, chat).await
    }

    async fn bans_for(&self, user: UserId, chat: ChatId) -> Result<Vec<BanRecord>> {
        self.inner.bans_for(user, chat).await
    }

    async fn insert_violation(&self, violation: NewViolation) -> Result<ViolationRecord> {
        self.inner.insert_violation(violation).await
    }

    async fn violations_for(&self, user: UserId, chat: ChatId) -> Result<Vec<ViolationRecord>> {
        self.inner.violations_for(user, chat).await
    }

    async fn backup_to(&self, dest: &Path) -> Result<()> {
        self.inner.backup_to(dest).await
    }
}
