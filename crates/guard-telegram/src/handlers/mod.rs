//! Telegram update handlers.
//!
//! Group messages go through the core `MessageGate` first; commands are only
//! handled when the gate lets the message through (admins always pass).

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, User},
};

use guard_core::domain::{ChatId, InboundMessage, MessageId, Sender, UserId};

use crate::router::AppState;

mod callback;
mod commands;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    if user.is_bot {
        return Ok(());
    }

    if !msg.chat.is_private() {
        let inbound = inbound_message(&msg, user);
        let outcome = state.gate.intercept(&inbound).await;
        if outcome.is_suppressed() {
            return Ok(());
        }
    }

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(bot, msg.clone(), state).await;
        }
    }

    Ok(())
}

pub(crate) fn sender_of(user: &User) -> Sender {
    Sender {
        id: UserId(user.id.0 as i64),
        username: user.username.clone(),
        full_name: user.full_name(),
    }
}

fn inbound_message(msg: &Message, user: &User) -> InboundMessage {
    InboundMessage {
        chat_id: ChatId(msg.chat.id.0),
        chat_title: msg.chat.title().map(str::to_string),
        message_id: MessageId(msg.id.0),
        sender: sender_of(user),
        text: msg.text().map(str::to_string),
        caption: msg.caption().map(str::to_string),
    }
}
