use std::sync::Arc;

use teloxide::prelude::*;

use guard_core::{notices, subscription::CHECK_SUBSCRIPTION_CALLBACK};

use crate::{handlers::sender_of, router::AppState};

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let data = q.data.clone().unwrap_or_default();

    if data != CHECK_SUBSCRIPTION_CALLBACK {
        answer(&state, &q.id, None).await;
        return Ok(());
    }

    let sender = sender_of(&q.from);
    if let Err(e) = state.registry.register_user(&sender).await {
        tracing::warn!(user_id = sender.id.0, error = %e, "failed to register user");
    }

    let text = if state.subscription.confirm(sender.id).await {
        notices::SUBSCRIPTION_CONFIRMED
    } else {
        notices::SUBSCRIPTION_MISSING
    };
    answer(&state, &q.id, Some(text)).await;

    Ok(())
}

async fn answer(state: &AppState, callback_id: &str, text: Option<&str>) {
    if let Err(e) = state.messenger.answer_callback_query(callback_id, text).await {
        tracing::warn!(error = %e, "failed to answer callback query");
    }
}
