use std::path::Path;

use anyhow::Context;
use chrono::Duration;
use tracing::{info, warn};

const DEFAULT_DATABASE_URL: &str = "sqlite://habits.db?mode=rwc";
const MAX_SESSION_DAYS: i64 = 3650;
const MAX_SESSION_HOURS: i64 = MAX_SESSION_DAYS * 24;

/// Outcome of loading one env file. Loading happens before the tracing
/// subscriber exists, so results are reported afterwards by `log_env_files`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFile {
    pub path: String,
    pub loaded: bool,
}

pub fn load_environment() -> Result<Vec<EnvFile>, Box<dyn std::error::Error + Send + Sync>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    load_env_files(&env_files)
}

pub fn load_env_files(paths: &[&str]) -> Result<Vec<EnvFile>, Box<dyn std::error::Error + Send + Sync>> {
    let mut results = Vec::with_capacity(paths.len());

    for path in paths {
        let loaded = Path::new(path).exists();
        if loaded {
            dotenvy::from_filename_override(path)?;
        }
        results.push(EnvFile {
            path: path.to_string(),
            loaded,
        });
    }

    Ok(results)
}

pub fn log_env_files(files: &[EnvFile]) {
    for file in files {
        if file.loaded {
            info!("Loaded environment from: {}", file.path);
        } else {
            warn!("Warning: Environment file {} not found, skipping", file.path);
        }
    }
}

/// Runtime settings not owned by Rocket's own figment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub session_hours: i64,
    pub remember_me_days: i64,
    pub session_cleanup_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            session_hours: 1,
            remember_me_days: 30,
            session_cleanup_interval_secs: 3600,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let session_hours = parse_var("SESSION_HOURS", defaults.session_hours)?;
        ensure_in_range("SESSION_HOURS", session_hours, MAX_SESSION_HOURS)?;

        let remember_me_days = parse_var("REMEMBER_ME_DAYS", defaults.remember_me_days)?;
        ensure_in_range("REMEMBER_ME_DAYS", remember_me_days, MAX_SESSION_DAYS)?;

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty())
                .unwrap_or(defaults.database_url),
            session_hours,
            remember_me_days,
            session_cleanup_interval_secs: parse_var(
                "SESSION_CLEANUP_INTERVAL_SECS",
                defaults.session_cleanup_interval_secs,
            )?,
        })
    }

    /// Lifetime of a new session. Values outside `1..=MAX` are clamped.
    pub fn session_lifetime(&self, remember_me: bool) -> Duration {
        if remember_me {
            Duration::days(self.remember_me_days.clamp(1, MAX_SESSION_DAYS))
        } else {
            Duration::hours(self.session_hours.clamp(1, MAX_SESSION_HOURS))
        }
    }
}

fn ensure_in_range(name: &str, value: i64, max: i64) -> anyhow::Result<()> {
    if !(1..=max).contains(&value) {
        anyhow::bail!("{} must be between 1 and {}, got {}", name, max, value);
    }
    Ok(())
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}
