//! Periodic consistent snapshots of the moderation store.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{store::ModerationStore, Result};

pub fn backup_file_name(now: DateTime<Utc>) -> String {
    format!("guard-{}.db", now.format("%Y%m%dT%H%M%SZ"))
}

/// Write one snapshot into `dir`, creating it if needed.
pub async fn run_backup(store: &dyn ModerationStore, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let dest = dir.join(backup_file_name(Utc::now()));
    store.backup_to(&dest).await?;
    Ok(dest)
}

/// Snapshot every `every`, starting one period from now. A zero period
/// disables backups and returns `None`.
pub fn spawn_backups(
    store: Arc<dyn ModerationStore>,
    dir: PathBuf,
    every: Duration,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }
    tracing::info!(dir = %dir.display(), every_secs = every.as_secs(), "periodic backups enabled");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match run_backup(store.as_ref(), &dir).await {
                Ok(path) => tracing::info!(path = %path.display(), "store backed up"),
                Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "store backup failed"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatId, Issuer, NewWarning, UserId},
        store::SqliteStore,
    };
    use chrono::TimeZone;

    #[test]
    fn file_name_is_sortable_utc() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(backup_file_name(at), "guard-20240309T070501Z.db");
    }

    #[tokio::test]
    async fn backup_lands_in_a_fresh_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("backups");
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert_warning(NewWarning {
                user_id: UserId(3),
                chat_id: ChatId(-9),
                issuer: Issuer::System,
                reason: "link".to_string(),
            })
            .await
            .unwrap();

        let path = run_backup(&store, &dir).await.unwrap();
        assert!(path.starts_with(&dir));

        let copy = SqliteStore::open(&path).unwrap();
        assert_eq!(copy.warnings_for(UserId(3), ChatId(-9)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_interval_disables_backups() {
        let store: Arc<dyn ModerationStore> = Arc::new(SqliteStore::in_memory().unwrap());
        assert!(spawn_backups(store, PathBuf::from("unused"), Duration::ZERO).is_none());
    }
}
