use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;

use crate::{
    content::Violation,
    domain::{
        BanRecord, ChatId, Issuer, NewBan, NewViolation, NewWarning, UserId, ViolationRecord,
        WarningRecord,
    },
    locks::KeyedLocks,
    store::ModerationStore,
    Result,
};

/// Warnings and bans per (user, chat).
///
/// The warning count is never stored; it is recomputed from the records as the
/// number of warnings issued after the most recent ban for the pair.
pub struct ViolationLedger {
    store: Arc<dyn ModerationStore>,
    locks: KeyedLocks<(UserId, ChatId)>,
}

/// Full audit trail of a (user, chat) pair.
#[derive(Clone, Debug)]
pub struct PairHistory {
    pub warnings: Vec<WarningRecord>,
    pub bans: Vec<BanRecord>,
}

impl PairHistory {
    pub fn warning_count(&self) -> u32 {
        let since = self.bans.iter().map(|b| b.seq).max().unwrap_or(0);
        self.warnings.iter().filter(|w| w.seq > since).count() as u32
    }
}

impl ViolationLedger {
    pub fn new(store: Arc<dyn ModerationStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Serialize a read-modify-write cycle on one (user, chat) pair.
    ///
    /// The ledger methods below do not take this lock themselves; callers that
    /// decide on the count (escalation, direct bans) hold it across the cycle.
    pub async fn lock_pair(&self, user: UserId, chat: ChatId) -> OwnedMutexGuard<()> {
        self.locks.lock((user, chat)).await
    }

    pub async fn record_warning(
        &self,
        user: UserId,
        chat: ChatId,
        issuer: Issuer,
        reason: &str,
    ) -> Result<WarningRecord> {
        self.store
            .insert_warning(NewWarning {
                user_id: user,
                chat_id: chat,
                issuer,
                reason: reason.to_string(),
            })
            .await
    }

    pub async fn record_ban(&self, ban: NewBan) -> Result<BanRecord> {
        self.store.insert_ban(ban).await
    }

    /// Log a rule match together with the offending content.
    pub async fn record_violation(
        &self,
        user: UserId,
        chat: ChatId,
        violation: &Violation,
        content: &str,
    ) -> Result<ViolationRecord> {
        self.store
            .insert_violation(NewViolation {
                user_id: user,
                chat_id: chat,
                kind: violation.kind.as_str().to_string(),
                content: content.to_string(),
            })
            .await
    }

    pub async fn violations(&self, user: UserId, chat: ChatId) -> Result<Vec<ViolationRecord>> {
        self.store.violations_for(user, chat).await
    }

    pub async fn history(&self, user: UserId, chat: ChatId) -> Result<PairHistory> {
        let warnings = self.store.warnings_for(user, chat).await?;
        let bans = self.store.bans_for(user, chat).await?;
        Ok(PairHistory { warnings, bans })
    }

    pub async fn warning_count(&self, user: UserId, chat: ChatId) -> Result<u32> {
        Ok(self.history(user, chat).await?.warning_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{content::ViolationKind, store::SqliteStore};
    use chrono::Utc;

    fn ban(user: UserId, chat: ChatId) -> NewBan {
        NewBan {
            user_id: user,
            chat_id: chat,
            issuer: Issuer::System,
            duration_secs: Some(60),
            reason: None,
            permanent: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn count_tracks_warnings_since_last_ban() {
        let ledger = ViolationLedger::new(Arc::new(SqliteStore::in_memory().unwrap()));
        let (u, c) = (UserId(1), ChatId(-100));

        assert_eq!(ledger.warning_count(u, c).await.unwrap(), 0);
        for k in 1..=3 {
            ledger.record_warning(u, c, Issuer::System, "x").await.unwrap();
            assert_eq!(ledger.warning_count(u, c).await.unwrap(), k);
        }

        ledger.record_ban(ban(u, c)).await.unwrap();
        assert_eq!(ledger.warning_count(u, c).await.unwrap(), 0);

        ledger.record_warning(u, c, Issuer::System, "y").await.unwrap();
        assert_eq!(ledger.warning_count(u, c).await.unwrap(), 1);

        // Audit trail keeps everything.
        let h = ledger.history(u, c).await.unwrap();
        assert_eq!(h.warnings.len(), 4);
        assert_eq!(h.bans.len(), 1);
    }

    #[tokio::test]
    async fn pairs_are_independent() {
        let ledger = ViolationLedger::new(Arc::new(SqliteStore::in_memory().unwrap()));
        ledger
            .record_warning(UserId(1), ChatId(-1), Issuer::System, "x")
            .await
            .unwrap();
        ledger.record_ban(ban(UserId(1), ChatId(-2))).await.unwrap();

        assert_eq!(ledger.warning_count(UserId(1), ChatId(-1)).await.unwrap(), 1);
        assert_eq!(ledger.warning_count(UserId(2), ChatId(-1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn violation_log_is_separate_from_warnings() {
        let ledger = ViolationLedger::new(Arc::new(SqliteStore::in_memory().unwrap()));
        let (u, c) = (UserId(1), ChatId(-1));
        let v = Violation {
            kind: ViolationKind::ExternalLink,
            reason: "posting external links".to_string(),
        };
        ledger
            .record_violation(u, c, &v, "see https://x.y")
            .await
            .unwrap();

        let logged = ledger.violations(u, c).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].kind, "external_link");
        assert_eq!(logged[0].content, "see https://x.y");
        assert_eq!(ledger.warning_count(u, c).await.unwrap(), 0);
    }
}
