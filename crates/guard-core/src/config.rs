use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{errors::Error, Result};

/// Process-wide policy defaults. Immutable after startup; per-chat overrides
/// are merged on top of these and never write back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyDefaults {
    pub banned_words: Vec<String>,
    pub max_warnings: u32,
    pub ban_duration: Duration,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            banned_words: Vec::new(),
            max_warnings: 3,
            ban_duration: Duration::from_secs(86_400),
        }
    }
}

/// Typed configuration for the bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    pub admins: Vec<i64>,

    // Protection
    pub defaults: Arc<PolicyDefaults>,
    pub antispam_limit: u32,
    pub antispam_window: Duration,

    // Group
    pub required_channels: Vec<String>,
    pub welcome_message: String,

    // Languages
    pub default_language: String,
    pub supported_languages: Vec<String>,

    // Storage
    pub database_path: PathBuf,
    pub backup_dir: PathBuf,
    /// Zero disables periodic backups.
    pub backup_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bot_token = lookup("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admins = parse_csv_i64(lookup("ADMINS"));

        let max_warnings = parse_u64(&lookup, "MAX_WARNINGS")?.unwrap_or(3);
        if max_warnings == 0 || max_warnings > u32::MAX as u64 {
            return Err(Error::Config(format!(
                "MAX_WARNINGS must be a positive integer, got {max_warnings}"
            )));
        }
        let ban_duration =
            Duration::from_secs(parse_u64(&lookup, "BAN_DURATION")?.unwrap_or(86_400));
        let defaults = Arc::new(PolicyDefaults {
            banned_words: parse_csv_lower(lookup("BANNED_WORDS")),
            max_warnings: max_warnings as u32,
            ban_duration,
        });

        // Opt-in: a burst of clean messages is not a violation unless configured.
        let antispam_limit = parse_u64(&lookup, "ANTISPAM_LIMIT")?.unwrap_or(0) as u32;
        let antispam_window =
            Duration::from_secs(parse_u64(&lookup, "ANTISPAM_WINDOW")?.unwrap_or(10).max(1));

        let required_channels = parse_csv(lookup("REQUIRED_CHANNELS"))
            .into_iter()
            .map(|c| c.trim_start_matches('@').to_string())
            .filter(|c| !c.is_empty())
            .collect();
        let welcome_message = lookup("WELCOME_MESSAGE")
            .and_then(non_empty)
            .unwrap_or_else(|| "Welcome to the group!".to_string());

        let default_language = lookup("DEFAULT_LANGUAGE")
            .and_then(non_empty)
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "ar".to_string());
        let mut supported_languages = parse_csv_lower(
            lookup("SUPPORTED_LANGS").or_else(|| Some("ar,en,fr,es,ru".to_string())),
        );
        if !supported_languages.contains(&default_language) {
            supported_languages.push(default_language.clone());
        }

        let database_path = PathBuf::from(
            lookup("DATABASE_PATH")
                .and_then(non_empty)
                .unwrap_or_else(|| "guard-bot.db".to_string()),
        );
        let backup_dir = PathBuf::from(
            lookup("BACKUP_DIR")
                .and_then(non_empty)
                .unwrap_or_else(|| "backups".to_string()),
        );
        let backup_interval =
            Duration::from_secs(parse_u64(&lookup, "BACKUP_INTERVAL")?.unwrap_or(86_400));

        Ok(Self {
            bot_token,
            admins,
            defaults,
            antispam_limit,
            antispam_window,
            required_channels,
            welcome_message,
            default_language,
            supported_languages,
            database_path,
            backup_dir,
            backup_interval,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = lookup(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    parse_csv(v)
        .into_iter()
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn parse_csv_lower(v: Option<String>) -> Vec<String> {
    parse_csv(v).into_iter().map(|s| s.to_lowercase()).collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
