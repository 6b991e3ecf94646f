//! User-visible texts (Telegram HTML).

use crate::{
    domain::{Sender, UserId},
    duration::format_duration,
    formatting::{escape_html, mention_html},
    policy::SettingsView,
    sanctions::BanAck,
};

pub const SUBSCRIPTION_REQUIRED: &str = "You must subscribe to the required channels first!";
pub const SUBSCRIPTION_LIST: &str = "Please subscribe to the following channels:";
pub const SUBSCRIPTION_CONFIRMED: &str = "✅ Subscription confirmed";
pub const SUBSCRIPTION_MISSING: &str = "❌ You are not subscribed to all required channels yet";
pub const BAN_FAILED: &str = "❌ An error occurred while trying to ban the user";
pub const ADMINS_ONLY: &str = "This command is for admins only.";

fn sender_mention(sender: &Sender) -> String {
    mention_html(sender.id, &sender.full_name)
}

pub fn warning(sender: &Sender, reason: &str, count: u32, max: u32) -> String {
    format!(
        "⚠️ Warning for {}\nReason: {}\nWarnings: {count}/{max}",
        sender_mention(sender),
        escape_html(reason)
    )
}

pub fn threshold_ban(sender: &Sender) -> String {
    format!(
        "🚨 {} was banned for exceeding the allowed number of warnings",
        sender_mention(sender)
    )
}

pub fn ban_succeeded(user_id: UserId, name: &str, ack: &BanAck) -> String {
    let span = match ack.record.duration_secs {
        _ if ack.record.permanent => " permanently".to_string(),
        Some(secs) => format!(" for {}", format_duration(std::time::Duration::from_secs(secs))),
        None => String::new(),
    };
    format!("✅ {} was banned{span}", mention_html(user_id, name))
}

pub fn standing(user_id: UserId, name: &str, count: u32, max: u32) -> String {
    format!("{} has {count}/{max} warnings", mention_html(user_id, name))
}

pub fn settings(view: &SettingsView) -> String {
    let words = if view.banned_words.is_empty() {
        "(none)".to_string()
    } else {
        escape_html(&view.banned_words.join(", "))
    };
    format!(
        "<b>Chat settings</b>\nMax warnings: {}\nBan duration: {}\nBanned words: {words}",
        view.max_warnings,
        format_duration(view.ban_duration)
    )
}
