use chrono::{DateTime, Utc};

use crate::domain::{ChatId, UserId};

/// Core error type for the moderation engine.
///
/// Adapter crates should map their specific errors into this type so the
/// pipeline can tell a clean failure (nothing happened) from a half-applied one.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store error: {0}")]
    Store(String),

    /// The chat settings document could not be interpreted.
    #[error("malformed settings for chat {chat_id:?}: {reason}")]
    PolicyEvaluation { chat_id: ChatId, reason: String },

    /// The platform rejected a ban/delete/send (e.g. missing rights).
    #[error("platform rejected action: {0}")]
    ExternalAction(String),

    /// The platform applied a ban but the ledger has no record of it.
    #[error(
        "ban applied on platform but not recorded (chat {chat_id:?}, user {user_id:?}, at {at}): {reason}"
    )]
    PersistenceInconsistency {
        chat_id: ChatId,
        user_id: UserId,
        at: DateTime<Utc>,
        reason: String,
    },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
