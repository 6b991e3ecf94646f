use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{ChatId, UserId},
    Result,
};

/// Moderation primitives of the chat platform.
#[async_trait]
pub trait ModerationPort: Send + Sync {
    async fn is_global_admin(&self, user_id: UserId) -> Result<bool>;

    async fn is_chat_admin(&self, chat_id: ChatId, user_id: UserId) -> Result<bool>;

    /// Ban a member. `until = None` means indefinite / platform default.
    ///
    /// Rejections (missing rights, unknown user) must map to `Error::ExternalAction`.
    async fn ban_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<()>;
}
