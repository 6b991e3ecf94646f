use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    domain::UserId,
    messaging::types::{InlineButton, InlineKeyboard},
    store::ModerationStore,
    Result,
};

pub const CHECK_SUBSCRIPTION_CALLBACK: &str = "check_subscription";

/// Decides whether a user is a member of the required channels.
#[async_trait]
pub trait SubscriptionVerifier: Send + Sync {
    async fn is_subscribed(&self, user_id: UserId, channels: &[String]) -> Result<bool>;
}

/// Treats everyone as subscribed.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysSubscribed;

#[async_trait]
impl SubscriptionVerifier for AlwaysSubscribed {
    async fn is_subscribed(&self, _user_id: UserId, _channels: &[String]) -> Result<bool> {
        Ok(true)
    }
}

pub struct SubscriptionGate {
    verifier: Arc<dyn SubscriptionVerifier>,
    store: Arc<dyn ModerationStore>,
    required_channels: Vec<String>,
}

impl SubscriptionGate {
    pub fn new(
        verifier: Arc<dyn SubscriptionVerifier>,
        store: Arc<dyn ModerationStore>,
        required_channels: Vec<String>,
    ) -> Self {
        Self {
            verifier,
            store,
            required_channels,
        }
    }

    /// No required channels means nothing to satisfy. Verifier failures are
    /// logged and let the user through.
    pub async fn is_satisfied(&self, user_id: UserId) -> bool {
        if self.required_channels.is_empty() {
            return true;
        }
        match self
            .verifier
            .is_subscribed(user_id, &self.required_channels)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(user_id = user_id.0, error = %e, "subscription check failed");
                true
            }
        }
    }

    /// Re-check on explicit user request and remember the result.
    pub async fn confirm(&self, user_id: UserId) -> bool {
        let ok = self.is_satisfied(user_id).await;
        if let Err(e) = self.store.set_user_subscribed(user_id, ok).await {
            tracing::warn!(user_id = user_id.0, error = %e, "failed to store subscription flag");
        }
        ok
    }

    pub fn prompt(&self) -> InlineKeyboard {
        prompt_for(&self.required_channels)
    }
}

/// One link button per channel plus a confirmation button.
pub fn prompt_for(channels: &[String]) -> InlineKeyboard {
    let mut buttons: Vec<InlineButton> = channels
        .iter()
        .map(|c| c.trim().trim_start_matches('@'))
        .filter(|c| !c.is_empty())
        .map(|c| InlineButton::url(format!("Subscribe to @{c}"), format!("https://t.me/{c}")))
        .collect();
    buttons.push(InlineButton::callback(
        "✅ Confirm subscription",
        CHECK_SUBSCRIPTION_CALLBACK,
    ));
    InlineKeyboard::new(buttons)
}
