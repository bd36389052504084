//! Engine Configuration
//!
//! Loaded from an optional JSON file, then overridden from `GRIDMATCH_*`
//! environment variables. Every field has a default.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::city::Cities;
use crate::game::engine::MatchSettings;
use crate::network::{ServerConfig, SessionConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file or an override does not parse.
    #[error("could not parse config: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Token service address.
    pub token_addr: SocketAddr,
    /// Account service address. Disabled when absent.
    pub account_addr: Option<SocketAddr>,
    /// Tokens requested per match.
    pub max_players: usize,
    /// Attempt budget per session.
    pub attempts: u32,
    /// Per-read timeout in millis.
    pub read_timeout_ms: u64,
    /// Sessions served concurrently per service.
    pub workers: usize,
    /// Player record folder.
    pub players_folder: PathBuf,
    /// Recovery snapshot path.
    pub snapshot_path: PathBuf,
    /// Snapshot persistence period in millis.
    pub save_period_ms: u64,
    /// The four cities, quadrant order. The type only admits four.
    pub cities: Cities,
    /// Fixed match secret. Random when absent.
    pub secret: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token_addr: SocketAddr::from(([0, 0, 0, 0], crate::DEFAULT_TOKEN_PORT)),
            account_addr: None,
            max_players: 3,
            attempts: 3,
            read_timeout_ms: 1000,
            workers: 4,
            players_folder: PathBuf::from("players"),
            snapshot_path: PathBuf::from("latestGame.json"),
            save_period_ms: 17,
            cities: Cities::default(),
            secret: None,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env()
    }

    /// Apply `GRIDMATCH_*` overrides on top of `self`.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(v) = var("GRIDMATCH_TOKEN_ADDR") {
            self.token_addr = parse("GRIDMATCH_TOKEN_ADDR", &v)?;
        }
        if let Some(v) = var("GRIDMATCH_ACCOUNT_ADDR") {
            self.account_addr = Some(parse("GRIDMATCH_ACCOUNT_ADDR", &v)?);
        }
        if let Some(v) = var("GRIDMATCH_MAX_PLAYERS") {
            self.max_players = parse("GRIDMATCH_MAX_PLAYERS", &v)?;
        }
        if let Some(v) = var("GRIDMATCH_ATTEMPTS") {
            self.attempts = parse("GRIDMATCH_ATTEMPTS", &v)?;
        }
        if let Some(v) = var("GRIDMATCH_READ_TIMEOUT_MS") {
            self.read_timeout_ms = parse("GRIDMATCH_READ_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("GRIDMATCH_WORKERS") {
            self.workers = parse("GRIDMATCH_WORKERS", &v)?;
        }
        if let Some(v) = var("GRIDMATCH_PLAYERS_FOLDER") {
            self.players_folder = PathBuf::from(v);
        }
        if let Some(v) = var("GRIDMATCH_SNAPSHOT_PATH") {
            self.snapshot_path = PathBuf::from(v);
        }
        if let Some(v) = var("GRIDMATCH_SAVE_PERIOD_MS") {
            self.save_period_ms = parse("GRIDMATCH_SAVE_PERIOD_MS", &v)?;
        }
        if let Some(v) = var("GRIDMATCH_SECRET") {
            self.secret = Some(v);
        }
        Ok(self)
    }

    /// Reject values the services cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_players == 0 {
            return Err(ConfigError::Invalid("max_players must be at least 1".into()));
        }
        if self.attempts == 0 {
            return Err(ConfigError::Invalid("attempts must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.read_timeout_ms == 0 || self.save_period_ms == 0 {
            return Err(ConfigError::Invalid("periods and timeouts must be positive".into()));
        }
        if self.secret.as_deref() == Some("") {
            return Err(ConfigError::Invalid("secret must not be empty".into()));
        }
        Ok(())
    }

    /// Session limits.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            attempts: self.attempts,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }

    /// Token service settings.
    pub fn token_server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.token_addr,
            workers: self.workers,
            session: self.session_config(),
        }
    }

    /// Account service settings, if enabled.
    pub fn account_server_config(&self) -> Option<ServerConfig> {
        self.account_addr.map(|bind_addr| ServerConfig {
            bind_addr,
            workers: self.workers,
            session: self.session_config(),
        })
    }

    /// Match settings.
    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            snapshot_path: self.snapshot_path.clone(),
            save_period: Duration::from_millis(self.save_period_ms),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ConfigError::Parse(format!("{key}={value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.token_addr.port(), 6002);
        assert_eq!(config.max_players, 3);
        assert!(config.account_addr.is_none());
        assert!(config.validate().is_ok());
        assert_eq!(config.match_settings().save_period, Duration::from_millis(17));
    }

    #[test]
    fn test_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("engine.json");
        std::fs::write(&path, r#"{"max_players": 5, "account_addr": "127.0.0.1:6003"}"#).unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.max_players, 5);
        assert_eq!(config.attempts, 3);
        assert_eq!(config.account_server_config().unwrap().bind_addr.port(), 6003);
    }

    #[test]
    fn test_wrong_city_count_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("engine.json");
        std::fs::write(&path, r#"{"cities": [{"name": "a", "temperature": 1.0}]}"#).unwrap();
        assert!(matches!(EngineConfig::from_file(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> =
            [("GRIDMATCH_WORKERS", "8"), ("GRIDMATCH_SECRET", "abc")].into_iter().collect();
        let config = EngineConfig::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.secret.as_deref(), Some("abc"));

        let bad = EngineConfig::default().with_overrides(|k| {
            (k == "GRIDMATCH_ATTEMPTS").then(|| "many".to_string())
        });
        assert!(matches!(bad, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate() {
        let zero = |f: fn(&mut EngineConfig)| {
            let mut c = EngineConfig::default();
            f(&mut c);
            c.validate()
        };
        assert!(zero(|c| c.attempts = 0).is_err());
        assert!(zero(|c| c.max_players = 0).is_err());
        assert!(zero(|c| c.workers = 0).is_err());
        assert!(zero(|c| c.save_period_ms = 0).is_err());
        assert!(zero(|c| c.secret = Some(String::new())).is_err());
    }
}
