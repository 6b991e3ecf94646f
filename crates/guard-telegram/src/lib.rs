//! Telegram adapter (teloxide).
//!
//! Implements the `guard-core` messaging and moderation ports over the Telegram
//! Bot API and hosts the update dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
    ApiError, RequestError,
};
use tokio::time::sleep;

pub mod handlers;
pub mod router;

use guard_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ButtonAction, InlineKeyboard},
    },
    ports::ModerationPort,
    Result,
};

fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat_id.0)
}

fn tg_user(user_id: UserId) -> teloxide::types::UserId {
    teloxide::types::UserId(user_id.0 as u64)
}

fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
    teloxide::types::MessageId(message_id.0)
}

async fn with_retry<T, Fut>(mut op: impl FnMut() -> Fut) -> std::result::Result<T, RequestError>
where
    Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
    Fut::IntoFuture: Send,
{
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                attempts += 1;
                sleep(d).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn external(e: RequestError) -> Error {
    Error::External(format!("telegram error: {e}"))
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .buttons
            .into_iter()
            .filter_map(|b| match b.action {
                ButtonAction::Callback(data) => {
                    Some(InlineKeyboardButton::callback(b.label, data))
                }
                ButtonAction::Url(url) => match reqwest::Url::parse(&url) {
                    Ok(url) => Some(InlineKeyboardButton::url(b.label, url)),
                    Err(e) => {
                        tracing::warn!(%url, error = %e, "dropping button with invalid url");
                        None
                    }
                },
            })
            .map(|button| vec![button])
            .collect();
        InlineKeyboardMarkup::new(rows)
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = with_retry(|| {
            self.bot
                .send_message(tg_chat(chat_id), html.to_string())
                .parse_mode(ParseMode::Html)
        })
        .await
        .map_err(external)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        let res = with_retry(|| {
            self.bot
                .delete_message(tg_chat(msg.chat_id), tg_msg_id(msg.message_id))
        })
        .await;
        match res {
            Ok(_) => Ok(()),
            // Already gone: deletion is idempotent.
            Err(RequestError::Api(ApiError::MessageToDeleteNotFound)) => Ok(()),
            Err(e) => Err(external(e)),
        }
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = Self::markup(keyboard);
        let msg = with_retry(|| {
            self.bot
                .send_message(tg_chat(chat_id), html.to_string())
                .parse_mode(ParseMode::Html)
                .reply_markup(markup.clone())
        })
        .await
        .map_err(external)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await
        .map_err(external)?;
        Ok(())
    }
}

/// Admin lookups and bans over the Bot API.
#[derive(Clone)]
pub struct TelegramModeration {
    bot: Bot,
    global_admins: Arc<Vec<i64>>,
}

impl TelegramModeration {
    pub fn new(bot: Bot, global_admins: Vec<i64>) -> Self {
        Self {
            bot,
            global_admins: Arc::new(global_admins),
        }
    }
}

#[async_trait]
impl ModerationPort for TelegramModeration {
    async fn is_global_admin(&self, user_id: UserId) -> Result<bool> {
        Ok(self.global_admins.contains(&user_id.0))
    }

    async fn is_chat_admin(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        if chat_id.0 == user_id.0 {
            // Private chat with the bot.
            return Ok(false);
        }
        let member = with_retry(|| {
            self.bot
                .get_chat_member(tg_chat(chat_id), tg_user(user_id))
        })
        .await
        .map_err(external)?;
        Ok(member.is_privileged())
    }

    async fn ban_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        with_retry(|| {
            let mut req = self.bot.ban_chat_member(tg_chat(chat_id), tg_user(user_id));
            if let Some(until) = until {
                req = req.until_date(until);
            }
            req
        })
        .await
        .map_err(|e| Error::ExternalAction(format!("telegram error: {e}")))?;
        Ok(())
    }
}
