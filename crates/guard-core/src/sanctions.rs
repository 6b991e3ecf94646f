//! The ban primitive shared by automatic escalation and admin commands.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    domain::{BanRecord, ChatId, Issuer, NewBan, UserId},
    errors::Error,
    ledger::ViolationLedger,
    ports::ModerationPort,
    Result,
};

#[derive(Clone, Debug)]
pub struct BanRequest {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub issuer: Issuer,
    /// `None` with `permanent = false` leaves the expiry to the platform.
    pub duration: Option<Duration>,
    pub reason: Option<String>,
    pub permanent: bool,
}

/// A ban that took effect on the platform and is recorded in the ledger.
#[derive(Clone, Debug)]
pub struct BanAck {
    pub record: BanRecord,
    pub until: Option<DateTime<Utc>>,
}

pub struct BanAction {
    platform: Arc<dyn ModerationPort>,
    ledger: Arc<ViolationLedger>,
}

impl BanAction {
    pub fn new(platform: Arc<dyn ModerationPort>, ledger: Arc<ViolationLedger>) -> Self {
        Self { platform, ledger }
    }

    /// Ban on the platform first, then record.
    ///
    /// Callers must hold the ledger lock for the (user, chat) pair.
    ///
    /// - unrepresentable expiry: `Error::PolicyEvaluation`, nothing is done
    /// - platform rejection: `Error::ExternalAction`, nothing is recorded
    /// - platform ok, record failed: `Error::PersistenceInconsistency`
    pub async fn ban(&self, req: BanRequest) -> Result<BanAck> {
        let now = Utc::now();
        let until = resolve_until(now, req.duration, req.permanent).ok_or_else(|| {
            Error::PolicyEvaluation {
                chat_id: req.chat_id,
                reason: "ban duration out of range".to_string(),
            }
        })?;

        if let Err(e) = self
            .platform
            .ban_member(req.chat_id, req.user_id, until)
            .await
        {
            tracing::warn!(
                chat_id = req.chat_id.0,
                user_id = req.user_id.0,
                error = %e,
                "platform rejected ban"
            );
            return Err(match e {
                Error::ExternalAction(_) => e,
                other => Error::ExternalAction(other.to_string()),
            });
        }

        let permanent = req.permanent;
        let duration_secs = if permanent {
            None
        } else {
            req.duration.map(|d| d.as_secs())
        };

        let new_ban = NewBan {
            user_id: req.user_id,
            chat_id: req.chat_id,
            issuer: req.issuer,
            duration_secs,
            reason: req.reason.clone(),
            permanent,
            created_at: now,
        };

        match self.ledger.record_ban(new_ban).await {
            Ok(record) => {
                tracing::info!(
                    chat_id = req.chat_id.0,
                    user_id = req.user_id.0,
                    permanent,
                    duration_secs,
                    "user banned"
                );
                Ok(BanAck { record, until })
            }
            Err(e) => {
                tracing::error!(
                    chat_id = req.chat_id.0,
                    user_id = req.user_id.0,
                    at = %now.to_rfc3339(),
                    error = %e,
                    "ban applied on platform but ledger write failed; reconcile manually"
                );
                Err(Error::PersistenceInconsistency {
                    chat_id: req.chat_id,
                    user_id: req.user_id,
                    at: now,
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Outer `None` when the expiry does not fit in a timestamp; an overflowing
/// span must never turn into an indefinite ban.
fn resolve_until(
    now: DateTime<Utc>,
    duration: Option<Duration>,
    permanent: bool,
) -> Option<Option<DateTime<Utc>>> {
    let Some(duration) = duration.filter(|_| !permanent) else {
        return Some(None);
    };
    let d = chrono::Duration::from_std(duration).ok()?;
    now.checked_add_signed(d).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::test_support::{FailingStore, FakePlatform};

    fn req(duration: Option<Duration>, permanent: bool) -> BanRequest {
        BanRequest {
            chat_id: ChatId(-1),
            user_id: UserId(7),
            issuer: Issuer::Admin(UserId(1)),
            duration,
            reason: Some("rude".to_string()),
            permanent,
        }
    }

    #[tokio::test]
    async fn permanent_ban_is_indefinite_and_recorded_without_duration() {
        let platform = Arc::new(FakePlatform::default());
        let ledger = Arc::new(ViolationLedger::new(Arc::new(SqliteStore::in_memory().unwrap())));
        let action = BanAction::new(platform.clone(), ledger.clone());

        let ack = action
            .ban(req(Some(Duration::from_secs(60)), true))
            .await
            .unwrap();
        assert_eq!(ack.until, None);
        assert!(ack.record.permanent);
        assert_eq!(ack.record.duration_secs, None);

        let bans = platform.bans();
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].2, None);
    }

    #[tokio::test]
    async fn temporary_ban_sets_expiry() {
        let platform = Arc::new(FakePlatform::default());
        let ledger = Arc::new(ViolationLedger::new(Arc::new(SqliteStore::in_memory().unwrap())));
        let action = BanAction::new(platform.clone(), ledger);

        let before = Utc::now();
        let ack = action
            .ban(req(Some(Duration::from_secs(3600)), false))
            .await
            .unwrap();
        let until = ack.until.unwrap();
        assert!(until >= before + chrono::Duration::seconds(3600));
        assert!(!ack.record.permanent);
        assert_eq!(ack.record.duration_secs, Some(3600));
        assert_eq!(platform.bans()[0].2, Some(until));
    }

    #[tokio::test]
    async fn no_duration_is_indefinite_but_not_permanent() {
        let platform = Arc::new(FakePlatform::default());
        let ledger = Arc::new(ViolationLedger::new(Arc::new(SqliteStore::in_memory().unwrap())));
        let action = BanAction::new(platform.clone(), ledger);

        let ack = action.ban(req(None, false)).await.unwrap();
        assert_eq!(ack.until, None);
        assert!(!ack.record.permanent);
        assert_eq!(ack.record.duration_secs, None);
    }

    #[tokio::test]
    async fn platform_rejection_records_nothing() {
        let platform = Arc::new(FakePlatform::default());
        platform.reject_bans();
        let ledger = Arc::new(ViolationLedger::new(Arc::new(SqliteStore::in_memory().unwrap())));
        let action = BanAction::new(platform, ledger.clone());

        let err = action.ban(req(None, true)).await.unwrap_err();
        assert!(matches!(err, Error::ExternalAction(_)));
        let h = ledger.history(UserId(7), ChatId(-1)).await.unwrap();
        assert!(h.bans.is_empty());
    }

    #[tokio::test]
    async fn ledger_failure_after_platform_ban_is_an_inconsistency() {
        let platform = Arc::new(FakePlatform::default());
        let ledger = Arc::new(ViolationLedger::new(Arc::new(FailingStore::bans())));
        let action = BanAction::new(platform.clone(), ledger);

        let err = action.ban(req(None, true)).await.unwrap_err();
        match err {
            Error::PersistenceInconsistency {
                chat_id, user_id, ..
            } => {
                assert_eq!(chat_id, ChatId(-1));
                assert_eq!(user_id, UserId(7));
            }
            other => panic!("unexpected error: {other}"),
        }
        // The platform ban did happen.
        assert_eq!(platform.bans().len(), 1);
    }

    #[tokio::test]
    async fn overflowing_duration_is_rejected_before_banning() {
        let platform = Arc::new(FakePlatform::default());
        let ledger = Arc::new(ViolationLedger::new(Arc::new(SqliteStore::in_memory().unwrap())));
        let action = BanAction::new(platform.clone(), ledger.clone());

        let huge = Duration::from_secs(999_999_999_999 * 604_800);
        let err = action.ban(req(Some(huge), false)).await.unwrap_err();
        assert!(matches!(err, Error::PolicyEvaluation { .. }));
        assert!(platform.bans().is_empty());
        let h = ledger.history(UserId(7), ChatId(-1)).await.unwrap();
        assert!(h.bans.is_empty());

        // Permanent bans ignore the span entirely.
        let ack = action.ban(req(Some(huge), true)).await.unwrap();
        assert_eq!(ack.until, None);
    }

    #[test]
    fn expiry_past_the_calendar_is_not_indefinite() {
        let now = Utc::now();
        let huge = Some(Duration::from_secs(u64::MAX / 4));
        assert_eq!(resolve_until(now, huge, false), None);
        assert_eq!(resolve_until(now, None, false), Some(None));
        assert_eq!(resolve_until(now, huge, true), Some(None));
    }
}
