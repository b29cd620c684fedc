//! Configuration loader and validator for the points bot.
//!
//! Values come from an optional YAML file and are overridden by the
//! environment (`BOT_TOKEN`, `COACH_SECRET`, `DATABASE_URL`).
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const ENV_BOT_TOKEN: &str = "BOT_TOKEN";
pub const ENV_COACH_SECRET: &str = "COACH_SECRET";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub telegram: Telegram,
    pub coach: Coach,
    pub database: Database,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub data_dir: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Telegram {
    pub bot_token: String,
}

/// Coach registration settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Coach {
    /// Must be given verbatim with `/coach <secret>`.
    pub secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Database {
    /// Defaults to `sqlite://<data_dir>/points.db?mode=rwc` (created if missing).
    pub url: Option<String>,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Overlay values found through `lookup` (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_BOT_TOKEN) {
            self.telegram.bot_token = token;
        }
        if let Some(secret) = lookup(ENV_COACH_SECRET) {
            self.coach.secret = secret;
        }
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.database.url = Some(url);
        }
    }

    pub fn database_url(&self) -> String {
        match &self.database.url {
            Some(url) if !url.trim().is_empty() => url.clone(),
            _ => format!(
                "sqlite://{}/points.db?mode=rwc",
                self.app.data_dir.trim_end_matches('/')
            ),
        }
    }
}

/// Load configuration from a YAML file and the environment, then validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - A missing file is fine as long as the environment supplies the rest.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_with(path, |key| std::env::var(key).ok())
}

fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let mut cfg = if path.exists() {
        let content = fs::read_to_string(path)?;
        serde_yaml::from_str(&content)?
    } else {
        Config::default()
    };
    cfg.apply_env(lookup);
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "telegram.bot_token must be non-empty (or set BOT_TOKEN)",
        ));
    }
    if cfg.coach.secret.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "coach.secret must be non-empty (or set COACH_SECRET)",
        ));
    }
    if cfg.coach.secret.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid("coach.secret must not contain whitespace"));
    }
    if matches!(&cfg.database.url, Some(url) if url.trim().is_empty()) {
        return Err(ConfigError::Invalid("database.url must be non-empty when set"));
    }
    Ok(())
}

/// Example configuration file.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"

coach:
  secret: "CHANGE_ME"

# Optional; defaults to sqlite://<data_dir>/points.db
database:
  url: "sqlite://./data/points.db?mode=rwc"
"#
}
