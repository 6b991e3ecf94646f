use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use guard_core::{
    config::Config,
    domain::{ChatId, UserId},
    escalation::EscalationController,
    flood::FloodLimiter,
    gate::{GateDeps, MessageGate},
    ledger::ViolationLedger,
    messaging::port::MessagingPort,
    policy::ChatPolicyStore,
    ports::ModerationPort,
    registry::Registry,
    sanctions::BanAction,
    store::ModerationStore,
    subscription::{SubscriptionGate, SubscriptionVerifier},
};

use crate::handlers;
use crate::{TelegramMessenger, TelegramModeration};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub moderation: Arc<dyn ModerationPort>,
    pub registry: Arc<Registry>,
    pub policy: Arc<ChatPolicyStore>,
    pub escalation: Arc<EscalationController>,
    pub subscription: Arc<SubscriptionGate>,
    pub gate: Arc<MessageGate>,
}

impl AppState {
    /// Wire the moderation services over the given ports.
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn ModerationStore>,
        messenger: Arc<dyn MessagingPort>,
        moderation: Arc<dyn ModerationPort>,
        verifier: Arc<dyn SubscriptionVerifier>,
    ) -> Self {
        let ledger = Arc::new(ViolationLedger::new(store.clone()));
        let policy = Arc::new(ChatPolicyStore::new(store.clone(), cfg.defaults.clone()));
        let bans = Arc::new(BanAction::new(moderation.clone(), ledger.clone()));
        let escalation = Arc::new(EscalationController::new(ledger, policy.clone(), bans));
        let registry = Arc::new(Registry::new(
            store.clone(),
            cfg.default_language.clone(),
            cfg.supported_languages.clone(),
        ));
        let subscription = Arc::new(SubscriptionGate::new(
            verifier,
            store,
            cfg.required_channels.clone(),
        ));
        let gate = Arc::new(MessageGate::new(GateDeps {
            platform: moderation.clone(),
            messenger: messenger.clone(),
            registry: registry.clone(),
            subscription: subscription.clone(),
            policy: policy.clone(),
            escalation: escalation.clone(),
            flood: FloodLimiter::new(cfg.antispam_limit, cfg.antispam_window),
        }));

        Self {
            cfg,
            messenger,
            moderation,
            registry,
            policy,
            escalation,
            subscription,
            gate,
        }
    }

    /// Global admin or admin of `chat_id`.
    pub async fn is_admin(&self, chat_id: ChatId, user_id: UserId) -> bool {
        if matches!(self.moderation.is_global_admin(user_id).await, Ok(true)) {
            return true;
        }
        match self.moderation.is_chat_admin(chat_id, user_id).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    chat_id = chat_id.0,
                    user_id = user_id.0,
                    error = %e,
                    "admin lookup failed"
                );
                false
            }
        }
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<dyn ModerationStore>,
    verifier: Arc<dyn SubscriptionVerifier>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    // Basic startup info.
    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "getMe failed"),
    }
    tracing::info!(
        admins = cfg.admins.len(),
        required_channels = cfg.required_channels.len(),
        banned_words = cfg.defaults.banned_words.len(),
        max_warnings = cfg.defaults.max_warnings,
        "moderation defaults loaded"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let moderation: Arc<dyn ModerationPort> =
        Arc::new(TelegramModeration::new(bot.clone(), cfg.admins.clone()));

    let state = Arc::new(AppState::new(
        cfg.clone(),
        store,
        messenger,
        moderation,
        verifier,
    ));

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
