use std::sync::Arc;

use guard_core::{
    backup,
    config::Config,
    store::{ModerationStore, SqliteStore},
    subscription::{AlwaysSubscribed, SubscriptionVerifier},
};

#[tokio::main]
async fn main() -> Result<(), guard_core::Error> {
    guard_core::logging::init("guard")?;

    let cfg = Arc::new(Config::load()?);
    let store: Arc<dyn ModerationStore> = Arc::new(SqliteStore::open(&cfg.database_path)?);

    let backups = backup::spawn_backups(
        store.clone(),
        cfg.backup_dir.clone(),
        cfg.backup_interval,
    );

    let verifier: Arc<dyn SubscriptionVerifier> = Arc::new(AlwaysSubscribed);

    let res = guard_telegram::router::run_polling(cfg, store, verifier).await;
    if let Some(task) = backups {
        task.abort();
    }
    res.map_err(|e| guard_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
