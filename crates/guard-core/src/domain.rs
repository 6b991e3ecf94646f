use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Who issued a warning or a ban.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Issuer {
    /// Automatic moderation.
    System,
    Admin(UserId),
}

/// The sender of an inbound message, as reported by the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    pub username: Option<String>,
    pub full_name: String,
}

/// An inbound group message handed to the moderation pipeline.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub chat_title: Option<String>,
    pub message_id: MessageId,
    pub sender: Sender,
    pub text: Option<String>,
    pub caption: Option<String>,
}

impl InboundMessage {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }

    /// Body, else caption, else empty.
    pub fn content(&self) -> &str {
        self.text
            .as_deref()
            .or(self.caption.as_deref())
            .unwrap_or("")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: Option<String>,
    pub full_name: String,
    pub language: String,
    pub is_subscribed: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: ChatId,
    pub title: Option<String>,
    /// Serialized settings document (JSON object).
    pub settings: String,
    pub created_at: DateTime<Utc>,
}

/// Immutable audit record of a warning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WarningRecord {
    /// Store-wide sequence number, shared with bans.
    pub seq: u64,
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub issuer: Issuer,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Immutable audit record of a ban.
///
/// `duration_secs` is `None` for permanent bans and for bans whose expiry was
/// left to the platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BanRecord {
    pub seq: u64,
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub issuer: Issuer,
    pub duration_secs: Option<u64>,
    pub reason: Option<String>,
    pub permanent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewWarning {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub issuer: Issuer,
    pub reason: String,
}

#[derive(Clone, Debug)]
pub struct NewBan {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub issuer: Issuer,
    pub duration_secs: Option<u64>,
    pub reason: Option<String>,
    pub permanent: bool,
    pub created_at: DateTime<Utc>,
}

/// Logged rule match with the offending content, kept apart from warnings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub id: i64,
    pub user_id: UserId,
    pub chat_id: ChatId,
    /// Rule tag, e.g. `banned_word`.
    pub kind: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewViolation {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub kind: String,
    pub content: String,
}
