//! Warning → ban escalation per (user, chat).
//!
//! States: clean (no warnings in the current cycle), warned (0 < count < max),
//! banned (ends the cycle; later warnings count from zero again).

use std::sync::Arc;

use crate::{
    content::Violation,
    domain::{ChatId, Issuer, UserId},
    ledger::ViolationLedger,
    policy::ChatPolicyStore,
    sanctions::{BanAck, BanAction, BanRequest},
    Result,
};

pub const THRESHOLD_BAN_REASON: &str = "exceeded warning threshold";

#[derive(Clone, Debug)]
pub enum Outcome {
    Warned { count: u32, max: u32 },
    Banned { reason: String, ban: BanAck },
}

pub struct EscalationController {
    ledger: Arc<ViolationLedger>,
    policy: Arc<ChatPolicyStore>,
    bans: Arc<BanAction>,
}

impl EscalationController {
    pub fn new(
        ledger: Arc<ViolationLedger>,
        policy: Arc<ChatPolicyStore>,
        bans: Arc<BanAction>,
    ) -> Self {
        Self {
            ledger,
            policy,
            bans,
        }
    }

    /// Automatic escalation for a detected violation.
    ///
    /// The match is logged with its content first; a failed log entry does not
    /// stop the warning.
    pub async fn handle_violation(
        &self,
        user: UserId,
        chat: ChatId,
        violation: &Violation,
        content: &str,
    ) -> Result<Outcome> {
        if let Err(e) = self
            .ledger
            .record_violation(user, chat, violation, content)
            .await
        {
            tracing::warn!(
                chat_id = chat.0,
                user_id = user.0,
                kind = %violation.kind,
                error = %e,
                "failed to log violation"
            );
        }
        self.warn(user, chat, Issuer::System, &violation.reason)
            .await
    }

    /// Record a warning and ban when the chat's threshold is reached.
    ///
    /// The whole insert → recount → maybe-ban cycle runs under the pair lock, so
    /// two concurrent violations at `max - 1` yield exactly one ban.
    pub async fn warn(
        &self,
        user: UserId,
        chat: ChatId,
        issuer: Issuer,
        reason: &str,
    ) -> Result<Outcome> {
        let _guard = self.ledger.lock_pair(user, chat).await;

        self.ledger.record_warning(user, chat, issuer, reason).await?;
        let count = self.ledger.warning_count(user, chat).await?;
        let policy = self.policy.get(chat).await;

        if count < policy.max_warnings {
            tracing::info!(
                chat_id = chat.0,
                user_id = user.0,
                count,
                max = policy.max_warnings,
                "warning issued"
            );
            return Ok(Outcome::Warned {
                count,
                max: policy.max_warnings,
            });
        }

        let ban = self
            .bans
            .ban(BanRequest {
                chat_id: chat,
                user_id: user,
                issuer,
                duration: Some(policy.ban_duration),
                reason: Some(THRESHOLD_BAN_REASON.to_string()),
                permanent: false,
            })
            .await?;

        Ok(Outcome::Banned {
            reason: THRESHOLD_BAN_REASON.to_string(),
            ban,
        })
    }

    /// Direct administrative ban, serialized with escalation for the same pair.
    pub async fn administer_ban(&self, req: BanRequest) -> Result<BanAck> {
        let _guard = self.ledger.lock_pair(req.user_id, req.chat_id).await;
        self.bans.ban(req).await
    }

    /// Current warning count and the chat's threshold.
    pub async fn standing(&self, user: UserId, chat: ChatId) -> Result<(u32, u32)> {
        let count = self.ledger.warning_count(user, chat).await?;
        let max = self.policy.get(chat).await.max_warnings;
        Ok((count, max))
    }
}
