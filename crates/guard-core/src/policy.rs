//! Per-chat policy settings merged over process-wide defaults.

use std::{sync::Arc, time::Duration};

use serde_json::{Map, Value};

use crate::{
    config::PolicyDefaults, domain::ChatId, errors::Error, locks::KeyedLocks,
    store::ModerationStore, Result,
};

pub const KEY_BANNED_WORDS: &str = "banned_words";
pub const KEY_MAX_WARNINGS: &str = "max_warnings";
pub const KEY_BAN_DURATION: &str = "ban_duration";

/// Resolved (total) policy of one chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsView {
    pub banned_words: Vec<String>,
    pub max_warnings: u32,
    pub ban_duration: Duration,
}

/// Partial update; `None` fields are left as they are.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub banned_words: Option<Vec<String>>,
    pub max_warnings: Option<u32>,
    pub ban_duration: Option<Duration>,
}

pub struct ChatPolicyStore {
    store: Arc<dyn ModerationStore>,
    defaults: Arc<PolicyDefaults>,
    locks: KeyedLocks<ChatId>,
}

impl ChatPolicyStore {
    pub fn new(store: Arc<dyn ModerationStore>, defaults: Arc<PolicyDefaults>) -> Self {
        Self {
            store,
            defaults,
            locks: KeyedLocks::new(),
        }
    }

    /// Resolved settings for a chat. Always total: a missing row, a malformed
    /// document or a store failure all degrade to the defaults.
    pub async fn get(&self, chat_id: ChatId) -> SettingsView {
        let _guard = self.locks.lock(chat_id).await;
        let doc = match self.load_document(chat_id).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(chat_id = chat_id.0, error = %e, "using default policy");
                Map::new()
            }
        };
        resolve(chat_id, &doc, &self.defaults)
    }

    /// Merge `update` into the stored document and overwrite it.
    pub async fn set(&self, chat_id: ChatId, update: SettingsUpdate) -> Result<SettingsView> {
        let _guard = self.locks.lock(chat_id).await;
        let mut doc = match self.load_document(chat_id).await {
            Ok(doc) => doc,
            Err(Error::PolicyEvaluation { reason, .. }) => {
                tracing::warn!(chat_id = chat_id.0, %reason, "replacing malformed settings");
                Map::new()
            }
            Err(e) => return Err(e),
        };

        if let Some(words) = update.banned_words {
            let words = normalize_words(words);
            doc.insert(
                KEY_BANNED_WORDS.to_string(),
                Value::Array(words.into_iter().map(Value::String).collect()),
            );
        }
        if let Some(max) = update.max_warnings {
            if max == 0 {
                return Err(Error::PolicyEvaluation {
                    chat_id,
                    reason: "max_warnings must be at least 1".to_string(),
                });
            }
            doc.insert(KEY_MAX_WARNINGS.to_string(), Value::from(max));
        }
        if let Some(d) = update.ban_duration {
            doc.insert(KEY_BAN_DURATION.to_string(), Value::from(d.as_secs()));
        }

        let serialized = serde_json::to_string(&Value::Object(doc.clone()))?;
        self.store.replace_chat_settings(chat_id, serialized).await?;
        tracing::info!(chat_id = chat_id.0, "chat settings updated");

        Ok(resolve(chat_id, &doc, &self.defaults))
    }

    async fn load_document(&self, chat_id: ChatId) -> Result<Map<String, Value>> {
        let Some(raw) = self.store.chat_settings(chat_id).await? else {
            return Ok(Map::new());
        };
        parse_document(chat_id, &raw)
    }
}

fn parse_document(chat_id: ChatId, raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::PolicyEvaluation {
            chat_id,
            reason: format!("expected an object, found {other}"),
        }),
        Err(e) => Err(Error::PolicyEvaluation {
            chat_id,
            reason: e.to_string(),
        }),
    }
}

/// Merge a settings document with the defaults. Keys with the wrong shape are
/// ignored (and logged) so every parameter still resolves.
fn resolve(chat_id: ChatId, doc: &Map<String, Value>, defaults: &PolicyDefaults) -> SettingsView {
    let banned_words = match doc.get(KEY_BANNED_WORDS) {
        None => defaults.banned_words.clone(),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => normalize_words(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        Some(other) => {
            malformed_key(chat_id, KEY_BANNED_WORDS, other);
            defaults.banned_words.clone()
        }
    };

    let max_warnings = match doc.get(KEY_MAX_WARNINGS) {
        None => defaults.max_warnings,
        Some(v) => match v.as_u64().filter(|n| *n >= 1 && *n <= u32::MAX as u64) {
            Some(n) => n as u32,
            None => {
                malformed_key(chat_id, KEY_MAX_WARNINGS, v);
                defaults.max_warnings
            }
        },
    };

    let ban_duration = match doc.get(KEY_BAN_DURATION) {
        None => defaults.ban_duration,
        Some(v) => match v.as_u64() {
            Some(secs) => Duration::from_secs(secs),
            None => {
                malformed_key(chat_id, KEY_BAN_DURATION, v);
                defaults.ban_duration
            }
        },
    };

    SettingsView {
        banned_words,
        max_warnings,
        ban_duration,
    }
}

fn malformed_key(chat_id: ChatId, key: &str, value: &Value) {
    tracing::warn!(chat_id = chat_id.0, key, %value, "ignoring malformed chat setting");
}

fn normalize_words(words: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for w in words {
        let w = w.trim().to_lowercase();
        if !w.is_empty() && !out.contains(&w) {
            out.push(w);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn defaults() -> Arc<PolicyDefaults> {
        Arc::new(PolicyDefaults {
            banned_words: vec!["spam".to_string()],
            max_warnings: 3,
            ban_duration: Duration::from_secs(86_400),
        })
    }

    fn policy() -> (Arc<SqliteStore>, ChatPolicyStore) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let policy = ChatPolicyStore::new(store.clone(), defaults());
        (store, policy)
    }

    #[tokio::test]
    async fn unknown_chat_resolves_to_defaults() {
        let (_, policy) = policy();
        let view = policy.get(ChatId(-42)).await;
        assert_eq!(view.banned_words, vec!["spam"]);
        assert_eq!(view.max_warnings, 3);
        assert_eq!(view.ban_duration, Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn partial_set_keeps_other_fields_at_defaults() {
        let (_, policy) = policy();
        policy
            .set(
                ChatId(-1),
                SettingsUpdate {
                    max_warnings: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let view = policy.get(ChatId(-1)).await;
        assert_eq!(view.max_warnings, 5);
        assert_eq!(view.banned_words, vec!["spam"]);
        assert_eq!(view.ban_duration, Duration::from_secs(86_400));

        // Defaults are untouched for other chats.
        assert_eq!(policy.get(ChatId(-2)).await.max_warnings, 3);
    }

    #[tokio::test]
    async fn successive_updates_merge_and_overwrite_document() {
        let (store, policy) = policy();
        let chat = ChatId(-1);
        policy
            .set(
                chat,
                SettingsUpdate {
                    banned_words: Some(vec![" Casino ".to_string(), "casino".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        policy
            .set(
                chat,
                SettingsUpdate {
                    ban_duration: Some(Duration::from_secs(600)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let view = policy.get(chat).await;
        assert_eq!(view.banned_words, vec!["casino"]);
        assert_eq!(view.ban_duration, Duration::from_secs(600));

        let raw = store.chat_settings(chat).await.unwrap().unwrap();
        let doc: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc[KEY_BAN_DURATION], 600);
        assert_eq!(doc[KEY_BANNED_WORDS][0], "casino");
    }

    #[tokio::test]
    async fn malformed_document_falls_back_to_defaults() {
        let (store, policy) = policy();
        store
            .replace_chat_settings(ChatId(-1), "not json".to_string())
            .await
            .unwrap();
        assert_eq!(policy.get(ChatId(-1)).await, policy.get(ChatId(-99)).await);

        // A write replaces the broken document.
        let view = policy
            .set(
                ChatId(-1),
                SettingsUpdate {
                    max_warnings: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(view.max_warnings, 2);
    }

    #[tokio::test]
    async fn wrongly_typed_key_is_ignored() {
        let (store, policy) = policy();
        store
            .replace_chat_settings(
                ChatId(-1),
                r#"{"max_warnings":"five","ban_duration":60}"#.to_string(),
            )
            .await
            .unwrap();
        let view = policy.get(ChatId(-1)).await;
        assert_eq!(view.max_warnings, 3);
        assert_eq!(view.ban_duration, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn zero_max_warnings_is_rejected() {
        let (_, policy) = policy();
        let err = policy
            .set(
                ChatId(-1),
                SettingsUpdate {
                    max_warnings: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PolicyEvaluation { .. }));
    }

    #[tokio::test]
    async fn concurrent_updates_do_not_lose_keys() {
        let (_, policy) = policy();
        let policy = Arc::new(policy);
        let chat = ChatId(-7);

        let a = {
            let p = policy.clone();
            tokio::spawn(async move {
                p.set(
                    chat,
                    SettingsUpdate {
                        max_warnings: Some(9),
                        ..Default::default()
                    },
                )
                .await
            })
        };
        let b = {
            let p = policy.clone();
            tokio::spawn(async move {
                p.set(
                    chat,
                    SettingsUpdate {
                        ban_duration: Some(Duration::from_secs(30)),
                        ..Default::default()
                    },
                )
                .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let view = policy.get(chat).await;
        assert_eq!(view.max_warnings, 9);
        assert_eq!(view.ban_duration, Duration::from_secs(30));
    }
}
