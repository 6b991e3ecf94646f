//! Pipeline entry point for every inbound group message.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    content::{ContentPolicyEngine, Violation},
    domain::InboundMessage,
    errors::Error,
    escalation::{EscalationController, Outcome},
    flood::FloodLimiter,
    messaging::port::MessagingPort,
    notices,
    policy::ChatPolicyStore,
    ports::ModerationPort,
    registry::Registry,
    subscription::SubscriptionGate,
};

#[derive(Clone, Debug)]
pub enum GateOutcome {
    /// Passed every check.
    Allowed,
    /// Sender is a global or chat admin; nothing was evaluated.
    AdminExempt,
    /// Deleted; the subscription prompt was sent.
    SubscriptionRequired,
    /// Deleted; `escalation` is `None` when the escalation path failed.
    Violation {
        violation: Violation,
        escalation: Option<Outcome>,
    },
}

impl GateOutcome {
    pub fn is_suppressed(&self) -> bool {
        matches!(
            self,
            GateOutcome::SubscriptionRequired | GateOutcome::Violation { .. }
        )
    }
}

pub struct GateDeps {
    pub platform: Arc<dyn ModerationPort>,
    pub messenger: Arc<dyn MessagingPort>,
    pub registry: Arc<Registry>,
    pub subscription: Arc<SubscriptionGate>,
    pub policy: Arc<ChatPolicyStore>,
    pub escalation: Arc<EscalationController>,
    pub flood: FloodLimiter,
}

pub struct MessageGate {
    platform: Arc<dyn ModerationPort>,
    messenger: Arc<dyn MessagingPort>,
    registry: Arc<Registry>,
    subscription: Arc<SubscriptionGate>,
    policy: Arc<ChatPolicyStore>,
    escalation: Arc<EscalationController>,
    engine: ContentPolicyEngine,
    flood: Mutex<FloodLimiter>,
}

impl MessageGate {
    pub fn new(deps: GateDeps) -> Self {
        Self {
            platform: deps.platform,
            messenger: deps.messenger,
            registry: deps.registry,
            subscription: deps.subscription,
            policy: deps.policy,
            escalation: deps.escalation,
            engine: ContentPolicyEngine::new(),
            flood: Mutex::new(deps.flood),
        }
    }

    /// Run the moderation pipeline; the first failing check short-circuits.
    ///
    /// Deletions and notices are best-effort: their failures are logged and
    /// never change the outcome.
    pub async fn intercept(&self, msg: &InboundMessage) -> GateOutcome {
        let user = msg.sender.id;
        let chat = msg.chat_id;

        if let Err(e) = self
            .registry
            .observe(&msg.sender, Some((chat, msg.chat_title.as_deref())))
            .await
        {
            tracing::warn!(chat_id = chat.0, user_id = user.0, error = %e, "failed to register sender");
        }

        if self.is_admin(msg).await {
            return GateOutcome::AdminExempt;
        }

        if !self.subscription.is_satisfied(user).await {
            self.delete(msg).await;
            if let Err(e) = self
                .messenger
                .send_inline_keyboard(chat, notices::SUBSCRIPTION_REQUIRED, self.subscription.prompt())
                .await
            {
                tracing::warn!(chat_id = chat.0, error = %e, "failed to send subscription prompt");
            }
            return GateOutcome::SubscriptionRequired;
        }

        let policy = self.policy.get(chat).await;
        let violation = match self.engine.evaluate(msg.content(), &policy) {
            Some(v) => Some(v),
            None => {
                let allowed = self.flood.lock().await.check(user, chat);
                (!allowed).then(Violation::flood)
            }
        };
        let Some(violation) = violation else {
            return GateOutcome::Allowed;
        };

        tracing::info!(
            chat_id = chat.0,
            user_id = user.0,
            kind = %violation.kind,
            "message violates policy"
        );
        self.delete(msg).await;

        let escalation = match self
            .escalation
            .handle_violation(user, chat, &violation, msg.content())
            .await
        {
            Ok(outcome) => {
                let notice = match &outcome {
                    Outcome::Warned { count, max } => {
                        notices::warning(&msg.sender, &violation.reason, *count, *max)
                    }
                    Outcome::Banned { .. } => notices::threshold_ban(&msg.sender),
                };
                self.notify(msg, &notice).await;
                Some(outcome)
            }
            Err(e) => {
                self.report_escalation_failure(msg, &e).await;
                None
            }
        };

        GateOutcome::Violation {
            violation,
            escalation,
        }
    }

    async fn is_admin(&self, msg: &InboundMessage) -> bool {
        let user = msg.sender.id;
        match self.platform.is_global_admin(user).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => tracing::warn!(user_id = user.0, error = %e, "global admin lookup failed"),
        }
        match self.platform.is_chat_admin(msg.chat_id, user).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    chat_id = msg.chat_id.0,
                    user_id = user.0,
                    error = %e,
                    "chat admin lookup failed"
                );
                false
            }
        }
    }

    async fn delete(&self, msg: &InboundMessage) {
        if let Err(e) = self.messenger.delete_message(msg.message_ref()).await {
            tracing::warn!(
                chat_id = msg.chat_id.0,
                message_id = msg.message_id.0,
                error = %e,
                "failed to delete message"
            );
        }
    }

    async fn notify(&self, msg: &InboundMessage, html: &str) {
        if let Err(e) = self.messenger.send_html(msg.chat_id, html).await {
            tracing::warn!(chat_id = msg.chat_id.0, error = %e, "failed to send notice");
        }
    }

    async fn report_escalation_failure(&self, msg: &InboundMessage, err: &Error) {
        match err {
            Error::ExternalAction(_) => self.notify(msg, notices::BAN_FAILED).await,
            // Banned on the platform; the ledger gap is already logged at error level.
            Error::PersistenceInconsistency { .. } => {
                self.notify(msg, &notices::threshold_ban(&msg.sender)).await
            }
            other => tracing::error!(
                chat_id = msg.chat_id.0,
                user_id = msg.sender.id.0,
                error = %other,
                "escalation failed"
            ),
        }
    }
}
