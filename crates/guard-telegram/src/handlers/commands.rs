use std::{sync::Arc, time::Duration};

use teloxide::prelude::*;

use guard_core::{
    domain::{ChatId, Issuer, Sender},
    duration::parse_duration,
    errors::Error,
    escalation::Outcome,
    formatting::escape_html,
    notices,
    policy::SettingsUpdate,
    sanctions::BanRequest,
};

use crate::{handlers::sender_of, router::AppState};

const HELP: &str = "<b>Commands</b>\n\
/start - register and check subscription\n\
/lang &lt;code&gt; - change your language\n\
\n<b>Admins</b> (reply to a message)\n\
/ban [duration|perm] [reason]\n\
/warn [reason]\n\
/warnings\n\
\n<b>Admins</b> (chat settings)\n\
/settings\n\
/setmax &lt;n&gt;\n\
/setbanduration &lt;duration&gt;\n\
/setwords &lt;word1,word2,...|none&gt;";

const SETWORDS_USAGE: &str =
    "Usage: /setwords &lt;word1,word2,...&gt; (or <code>none</code> to clear the list)";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct BanArgs {
    duration: Option<Duration>,
    permanent: bool,
    reason: Option<String>,
}

/// `[duration|perm] [reason...]`; without a span the expiry is left to Telegram.
fn parse_ban_args(args: &str) -> BanArgs {
    let mut parts = args.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim();

    let (duration, permanent, reason) = match first.to_lowercase().as_str() {
        "" => (None, false, ""),
        "perm" | "permanent" | "forever" => (None, true, rest),
        other => match parse_duration(other) {
            Some(d) => (Some(d), false, rest),
            None => (None, false, args.trim()),
        },
    };

    BanArgs {
        duration,
        permanent,
        reason: (!reason.is_empty()).then(|| reason.to_string()),
    }
}

/// `None` when there is nothing usable to set; clearing is spelled `none`.
fn parse_words(args: &str) -> Option<Vec<String>> {
    let args = args.trim();
    if args.eq_ignore_ascii_case("none") || args == "-" {
        return Some(Vec::new());
    }
    let words: Vec<String> = args
        .split(',')
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect();
    (!words.is_empty()).then_some(words)
}

pub async fn handle_command(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let sender = sender_of(user);
    let chat_id = ChatId(msg.chat.id.0);
    let (cmd, args) = parse_command(text);

    match cmd.as_str() {
        "start" => handle_start(&state, chat_id, &sender).await,
        "help" => reply(&state, chat_id, HELP).await,
        "lang" => handle_lang(&state, chat_id, &sender, &args).await,
        "ban" | "warn" | "warnings" | "settings" | "setmax" | "setbanduration" | "setwords" => {
            if msg.chat.is_private() {
                reply(&state, chat_id, "This command only works in groups.").await;
                return Ok(());
            }
            if !state.is_admin(chat_id, sender.id).await {
                reply(&state, chat_id, notices::ADMINS_ONLY).await;
                return Ok(());
            }
            handle_admin(&state, &msg, chat_id, &sender, &cmd, &args).await;
        }
        _ => {}
    }

    Ok(())
}

async fn handle_start(state: &AppState, chat_id: ChatId, sender: &Sender) {
    if let Err(e) = state.registry.register_user(sender).await {
        tracing::warn!(user_id = sender.id.0, error = %e, "failed to register user");
    }

    if !state.subscription.is_satisfied(sender.id).await {
        if let Err(e) = state
            .messenger
            .send_inline_keyboard(chat_id, notices::SUBSCRIPTION_LIST, state.subscription.prompt())
            .await
        {
            tracing::warn!(chat_id = chat_id.0, error = %e, "failed to send subscription prompt");
        }
        return;
    }

    reply(state, chat_id, &escape_html(&state.cfg.welcome_message)).await;
}

async fn handle_lang(state: &AppState, chat_id: ChatId, sender: &Sender, args: &str) {
    let supported = state.registry.supported_languages().join(", ");
    if args.is_empty() {
        let current = match state.registry.profile(sender.id).await {
            Ok(Some(u)) => u.language,
            _ => state.cfg.default_language.clone(),
        };
        let msg = format!(
            "Current language: <code>{}</code>\nSupported: {}",
            escape_html(&current),
            escape_html(&supported)
        );
        reply(state, chat_id, &msg).await;
        return;
    }

    if let Err(e) = state.registry.register_user(sender).await {
        tracing::warn!(user_id = sender.id.0, error = %e, "failed to register user");
    }
    let msg = match state.registry.set_language(sender.id, args).await {
        Ok(true) => format!("✅ Language set to <code>{}</code>", escape_html(args.trim())),
        Ok(false) => format!("Unsupported language. Supported: {}", escape_html(&supported)),
        Err(e) => {
            tracing::warn!(user_id = sender.id.0, error = %e, "failed to set language");
            "❌ Failed to change language".to_string()
        }
    };
    reply(state, chat_id, &msg).await;
}

async fn handle_admin(
    state: &AppState,
    msg: &Message,
    chat_id: ChatId,
    admin: &Sender,
    cmd: &str,
    args: &str,
) {
    match cmd {
        "settings" => {
            let view = state.policy.get(chat_id).await;
            reply(state, chat_id, &notices::settings(&view)).await;
        }
        "setmax" => {
            let Some(max) = args.trim().parse::<u32>().ok().filter(|n| *n >= 1) else {
                reply(state, chat_id, "Usage: /setmax &lt;n&gt; (n ≥ 1)").await;
                return;
            };
            let update = SettingsUpdate {
                max_warnings: Some(max),
                ..Default::default()
            };
            apply_settings(state, chat_id, update).await;
        }
        "setbanduration" => {
            let Some(d) = parse_duration(args) else {
                reply(state, chat_id, "Usage: /setbanduration &lt;duration&gt;, e.g. 1d12h").await;
                return;
            };
            let update = SettingsUpdate {
                ban_duration: Some(d),
                ..Default::default()
            };
            apply_settings(state, chat_id, update).await;
        }
        "setwords" => {
            let Some(words) = parse_words(args) else {
                reply(state, chat_id, SETWORDS_USAGE).await;
                return;
            };
            let update = SettingsUpdate {
                banned_words: Some(words),
                ..Default::default()
            };
            apply_settings(state, chat_id, update).await;
        }
        _ => {
            let Some(target) = msg.reply_to_message().and_then(|m| m.from()) else {
                reply(state, chat_id, "Reply to a message of the user.").await;
                return;
            };
            let target = sender_of(target);
            if state.is_admin(chat_id, target.id).await {
                reply(state, chat_id, "Admins cannot be moderated.").await;
                return;
            }
            match cmd {
                "ban" => handle_ban(state, chat_id, admin, &target, args).await,
                "warn" => handle_warn(state, chat_id, admin, &target, args).await,
                "warnings" => match state.escalation.standing(target.id, chat_id).await {
                    Ok((count, max)) => {
                        let text = notices::standing(target.id, &target.full_name, count, max);
                        reply(state, chat_id, &text).await;
                    }
                    Err(e) => {
                        tracing::warn!(chat_id = chat_id.0, error = %e, "failed to read warnings");
                        reply(state, chat_id, "❌ Failed to read warnings").await;
                    }
                },
                _ => {}
            }
        }
    }
}

async fn apply_settings(state: &AppState, chat_id: ChatId, update: SettingsUpdate) {
    match state.policy.set(chat_id, update).await {
        Ok(view) => reply(state, chat_id, &notices::settings(&view)).await,
        Err(e) => {
            tracing::warn!(chat_id = chat_id.0, error = %e, "failed to update settings");
            reply(state, chat_id, "❌ Failed to update settings").await;
        }
    }
}

async fn handle_ban(state: &AppState, chat_id: ChatId, admin: &Sender, target: &Sender, args: &str) {
    let parsed = parse_ban_args(args);
    let res = state
        .escalation
        .administer_ban(BanRequest {
            chat_id,
            user_id: target.id,
            issuer: Issuer::Admin(admin.id),
            duration: parsed.duration,
            reason: parsed.reason,
            permanent: parsed.permanent,
        })
        .await;

    let text = match res {
        Ok(ack) => notices::ban_succeeded(target.id, &target.full_name, &ack),
        // Banned on the platform even though the ledger missed it.
        Err(Error::PersistenceInconsistency { .. }) => {
            "⚠️ User banned, but the ban could not be recorded".to_string()
        }
        Err(_) => notices::BAN_FAILED.to_string(),
    };
    reply(state, chat_id, &text).await;
}

async fn handle_warn(state: &AppState, chat_id: ChatId, admin: &Sender, target: &Sender, args: &str) {
    let reason = if args.trim().is_empty() {
        "warned by an admin"
    } else {
        args.trim()
    };

    let text = match state
        .escalation
        .warn(target.id, chat_id, Issuer::Admin(admin.id), reason)
        .await
    {
        Ok(Outcome::Warned { count, max }) => notices::warning(target, reason, count, max),
        Ok(Outcome::Banned { .. }) => notices::threshold_ban(target),
        Err(Error::PersistenceInconsistency { .. }) => notices::threshold_ban(target),
        Err(Error::ExternalAction(_)) => notices::BAN_FAILED.to_string(),
        Err(e) => {
            tracing::warn!(chat_id = chat_id.0, error = %e, "manual warning failed");
            "❌ Failed to record the warning".to_string()
        }
    };
    reply(state, chat_id, &text).await;
}

async fn reply(state: &AppState, chat_id: ChatId, html: &str) {
    if let Err(e) = state.messenger.send_html(chat_id, html).await {
        tracing::warn!(chat_id = chat_id.0, error = %e, "failed to send reply");
    }
}
