//! Persistent store: users, chats, warnings, bans and the violation log.
//!
//! Backed by SQLite. Every mutation is a single transaction executed on a
//! blocking thread; a failed write leaves no row behind.

use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{
    domain::{
        BanRecord, ChatId, ChatRecord, Issuer, NewBan, NewViolation, NewWarning, Sender, UserId,
        UserRecord, ViolationRecord, WarningRecord,
    },
    Error, Result,
};

#[async_trait]
pub trait ModerationStore: Send + Sync {
    /// Create the user if missing, otherwise refresh the display fields.
    /// Language and subscription flag of an existing user are preserved.
    async fn upsert_user(&self, sender: &Sender, default_language: &str) -> Result<UserRecord>;
    async fn user(&self, id: UserId) -> Result<Option<UserRecord>>;
    async fn set_user_language(&self, id: UserId, language: &str) -> Result<()>;
    async fn set_user_subscribed(&self, id: UserId, subscribed: bool) -> Result<()>;

    /// Create the chat if missing; refreshes the title when one is given.
    async fn ensure_chat(&self, id: ChatId, title: Option<&str>) -> Result<ChatRecord>;
    /// Raw serialized settings document, `None` when the chat has no row.
    async fn chat_settings(&self, id: ChatId) -> Result<Option<String>>;
    /// Overwrite the settings document, creating the chat row if needed.
    async fn replace_chat_settings(&self, id: ChatId, document: String) -> Result<()>;

    async fn insert_warning(&self, warning: NewWarning) -> Result<WarningRecord>;
    async fn insert_ban(&self, ban: NewBan) -> Result<BanRecord>;
    async fn warnings_for(&self, user: UserId, chat: ChatId) -> Result<Vec<WarningRecord>>;
    async fn bans_for(&self, user: UserId, chat: ChatId) -> Result<Vec<BanRecord>>;

    async fn insert_violation(&self, violation: NewViolation) -> Result<ViolationRecord>;
    async fn violations_for(&self, user: UserId, chat: ChatId) -> Result<Vec<ViolationRecord>>;

    /// Write a consistent copy of the whole store to `dest` (must not exist).
    async fn backup_to(&self, dest: &Path) -> Result<()>;
}

// A user row with a NULL language is a placeholder created for a ledger entry
// about someone the bot has not seen yet; it is not a registered profile.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    username TEXT NULL,
    full_name TEXT NOT NULL DEFAULT '',
    language TEXT NULL,
    is_subscribed INTEGER NOT NULL DEFAULT 0,
    join_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chats (
    chat_id INTEGER PRIMARY KEY,
    title TEXT NULL,
    settings TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS warnings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    seq INTEGER NOT NULL UNIQUE,
    user_id INTEGER NOT NULL,
    chat_id INTEGER NOT NULL,
    admin_id INTEGER NULL,
    reason TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY(user_id) REFERENCES users(user_id),
    FOREIGN KEY(chat_id) REFERENCES chats(chat_id)
);

CREATE INDEX IF NOT EXISTS idx_warnings_pair ON warnings (user_id, chat_id, seq);

CREATE TABLE IF NOT EXISTS bans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    seq INTEGER NOT NULL UNIQUE,
    user_id INTEGER NOT NULL,
    chat_id INTEGER NOT NULL,
    admin_id INTEGER NULL,
    duration INTEGER NULL,
    reason TEXT NULL,
    is_permanent INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY(user_id) REFERENCES users(user_id),
    FOREIGN KEY(chat_id) REFERENCES chats(chat_id)
);

CREATE INDEX IF NOT EXISTS idx_bans_pair ON bans (user_id, chat_id, seq);

CREATE TABLE IF NOT EXISTS violations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    chat_id INTEGER NOT NULL,
    violation_type TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY(user_id) REFERENCES users(user_id),
    FOREIGN KEY(chat_id) REFERENCES chats(chat_id)
);

CREATE INDEX IF NOT EXISTS idx_violations_pair ON violations (user_id, chat_id, id);
"#;

const SELECT_USER: &str = "SELECT user_id, username, full_name, language, is_subscribed, join_date
     FROM users WHERE user_id = ?1 AND language IS NOT NULL";

const SELECT_CHAT: &str = "SELECT chat_id, title, settings, created_at FROM chats WHERE chat_id = ?1";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file. The parent directory must exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        let store = Self::init(conn)?;
        tracing::info!(path = %path.display(), "moderation store opened");
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::Store("sqlite connection lock poisoned".to_string()))?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| Error::Store(format!("store task failed: {e}")))?
    }
}

fn admin_id(issuer: Issuer) -> Option<i64> {
    match issuer {
        Issuer::System => None,
        Issuer::Admin(id) => Some(id.0),
    }
}

fn issuer_from(admin_id: Option<i64>) -> Issuer {
    admin_id.map_or(Issuer::System, |id| Issuer::Admin(UserId(id)))
}

fn ensure_parents(conn: &Connection, user: UserId, chat: ChatId) -> rusqlite::Result<()> {
    let now = Utc::now();
    conn.execute(
        "INSERT OR IGNORE INTO users (user_id, join_date) VALUES (?1, ?2)",
        params![user.0, now],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO chats (chat_id, created_at) VALUES (?1, ?2)",
        params![chat.0, now],
    )?;
    Ok(())
}

/// Next store-wide sequence number; warnings and bans share one counter.
fn next_seq(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM (
            SELECT seq FROM warnings UNION ALL SELECT seq FROM bans
        )",
        [],
        |row| row.get(0),
    )
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        full_name: row.get(2)?,
        language: row.get(3)?,
        is_subscribed: row.get(4)?,
        joined_at: row.get(5)?,
    })
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRecord> {
    Ok(ChatRecord {
        id: ChatId(row.get(0)?),
        title: row.get(1)?,
        settings: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn warning_from_row(row: &Row<'_>) -> rusqlite::Result<WarningRecord> {
    Ok(WarningRecord {
        seq: row.get::<_, i64>(0)? as u64,
        user_id: UserId(row.get(1)?),
        chat_id: ChatId(row.get(2)?),
        issuer: issuer_from(row.get(3)?),
        reason: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn ban_from_row(row: &Row<'_>) -> rusqlite::Result<BanRecord> {
    Ok(BanRecord {
        seq: row.get::<_, i64>(0)? as u64,
        user_id: UserId(row.get(1)?),
        chat_id: ChatId(row.get(2)?),
        issuer: issuer_from(row.get(3)?),
        duration_secs: row.get::<_, Option<i64>>(4)?.map(|d| d as u64),
        reason: row.get(5)?,
        permanent: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn violation_from_row(row: &Row<'_>) -> rusqlite::Result<ViolationRecord> {
    Ok(ViolationRecord {
        id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        chat_id: ChatId(row.get(2)?),
        kind: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[async_trait]
impl ModerationStore for SqliteStore {
    async fn upsert_user(&self, sender: &Sender, default_language: &str) -> Result<UserRecord> {
        let sender = sender.clone();
        let default_language = default_language.to_string();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (user_id, username, full_name, language, join_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                    username = excluded.username,
                    full_name = excluded.full_name,
                    language = COALESCE(users.language, excluded.language)",
                params![
                    sender.id.0,
                    sender.username,
                    sender.full_name,
                    default_language,
                    Utc::now()
                ],
            )?;
            let rec = tx.query_row(SELECT_USER, params![sender.id.0], user_from_row)?;
            tx.commit()?;
            Ok(rec)
        })
        .await
    }

    async fn user(&self, id: UserId) -> Result<Option<UserRecord>> {
        self.call(move |conn| {
            Ok(conn
                .query_row(SELECT_USER, params![id.0], user_from_row)
                .optional()?)
        })
        .await
    }

    async fn set_user_language(&self, id: UserId, language: &str) -> Result<()> {
        let language = language.to_string();
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE users SET language = ?2 WHERE user_id = ?1 AND language IS NOT NULL",
                params![id.0, language],
            )?;
            if changed == 0 {
                return Err(Error::Store(format!("unknown user {}", id.0)));
            }
            Ok(())
        })
        .await
    }

    async fn set_user_subscribed(&self, id: UserId, subscribed: bool) -> Result<()> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE users SET is_subscribed = ?2 WHERE user_id = ?1 AND language IS NOT NULL",
                params![id.0, subscribed],
            )?;
            if changed == 0 {
                return Err(Error::Store(format!("unknown user {}", id.0)));
            }
            Ok(())
        })
        .await
    }

    async fn ensure_chat(&self, id: ChatId, title: Option<&str>) -> Result<ChatRecord> {
        let title = title.map(str::to_string);
        self.call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chats (chat_id, title, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_id) DO UPDATE SET title = COALESCE(excluded.title, chats.title)",
                params![id.0, title, Utc::now()],
            )?;
            let rec = tx.query_row(SELECT_CHAT, params![id.0], chat_from_row)?;
            tx.commit()?;
            Ok(rec)
        })
        .await
    }

    async fn chat_settings(&self, id: ChatId) -> Result<Option<String>> {
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT settings FROM chats WHERE chat_id = ?1",
                    params![id.0],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn replace_chat_settings(&self, id: ChatId, document: String) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO chats (chat_id, settings, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_id) DO UPDATE SET settings = excluded.settings",
                params![id.0, document, Utc::now()],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_warning(&self, warning: NewWarning) -> Result<WarningRecord> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            ensure_parents(&tx, warning.user_id, warning.chat_id)?;
            let seq = next_seq(&tx)?;
            let created_at = Utc::now();
            tx.execute(
                "INSERT INTO warnings (seq, user_id, chat_id, admin_id, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    seq,
                    warning.user_id.0,
                    warning.chat_id.0,
                    admin_id(warning.issuer),
                    warning.reason,
                    created_at
                ],
            )?;
            tx.commit()?;
            Ok(WarningRecord {
                seq: seq as u64,
                user_id: warning.user_id,
                chat_id: warning.chat_id,
                issuer: warning.issuer,
                reason: warning.reason,
                created_at,
            })
        })
        .await
    }

    async fn insert_ban(&self, ban: NewBan) -> Result<BanRecord> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            ensure_parents(&tx, ban.user_id, ban.chat_id)?;
            let seq = next_seq(&tx)?;
            let duration = ban.duration_secs.map(|d| i64::try_from(d).unwrap_or(i64::MAX));
            tx.execute(
                "INSERT INTO bans (seq, user_id, chat_id, admin_id, duration, reason, is_permanent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    seq,
                    ban.user_id.0,
                    ban.chat_id.0,
                    admin_id(ban.issuer),
                    duration,
                    ban.reason,
                    ban.permanent,
                    ban.created_at
                ],
            )?;
            tx.commit()?;
            Ok(BanRecord {
                seq: seq as u64,
                user_id: ban.user_id,
                chat_id: ban.chat_id,
                issuer: ban.issuer,
                duration_secs: ban.duration_secs,
                reason: ban.reason,
                permanent: ban.permanent,
                created_at: ban.created_at,
            })
        })
        .await
    }

    async fn warnings_for(&self, user: UserId, chat: ChatId) -> Result<Vec<WarningRecord>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, user_id, chat_id, admin_id, reason, created_at
                 FROM warnings WHERE user_id = ?1 AND chat_id = ?2 ORDER BY seq",
            )?;
            let rows = stmt
                .query_map(params![user.0, chat.0], warning_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn bans_for(&self, user: UserId, chat: ChatId) -> Result<Vec<BanRecord>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, user_id, chat_id, admin_id, duration, reason, is_permanent, created_at
                 FROM bans WHERE user_id = ?1 AND chat_id = ?2 ORDER BY seq",
            )?;
            let rows = stmt
                .query_map(params![user.0, chat.0], ban_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn insert_violation(&self, violation: NewViolation) -> Result<ViolationRecord> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            ensure_parents(&tx, violation.user_id, violation.chat_id)?;
            let created_at = Utc::now();
            tx.execute(
                "INSERT INTO violations (user_id, chat_id, violation_type, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    violation.user_id.0,
                    violation.chat_id.0,
                    violation.kind,
                    violation.content,
                    created_at
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(ViolationRecord {
                id,
                user_id: violation.user_id,
                chat_id: violation.chat_id,
                kind: violation.kind,
                content: violation.content,
                created_at,
            })
        })
        .await
    }

    async fn violations_for(&self, user: UserId, chat: ChatId) -> Result<Vec<ViolationRecord>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, chat_id, violation_type, content, created_at
                 FROM violations WHERE user_id = ?1 AND chat_id = ?2 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![user.0, chat.0], violation_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn backup_to(&self, dest: &Path) -> Result<()> {
        let dest = dest.to_string_lossy().into_owned();
        self.call(move |conn| {
            conn.execute("VACUUM INTO ?1", params![dest])?;
            Ok(())
        })
        .await
    }
}
