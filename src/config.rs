//! Configuration file parser for ~/.config/siphon/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which has no stanzas. Unknown top-level keys are accepted but logged as a
//! warning, since they are usually typos. Every `[[stanza]]` is validated on
//! load so a bad feed URL or interval is reported before any poll runs.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::http::Credentials;
use crate::util::{parse_interval, validate_feed_url};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid stanza '{name}': {reason}")]
    InvalidStanza { name: String, reason: String },

    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How often the scheduler wakes up to check which stanzas are due.
    pub check_interval_secs: u64,

    pub http: HttpConfig,

    pub checkpoint: CheckpointConfig,

    /// Feed subscriptions, one `[[stanza]]` table each.
    #[serde(rename = "stanza")]
    pub stanzas: Vec<StanzaConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            http: HttpConfig::default(),
            checkpoint: CheckpointConfig::default(),
            stanzas: Vec::new(),
        }
    }
}

/// Settings shared by every feed request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bound on one whole fetch, body included.
    pub timeout_secs: u64,
    /// Maximum feed body size in bytes.
    pub max_feed_size: usize,
    pub user_agent: String,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_feed_size: 10 * 1024 * 1024, // 10MB
            user_agent: concat!("siphon/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// One SQLite database holding every stanza's checkpoint.
    #[default]
    Sqlite,
    /// One JSON file per stanza in a directory.
    Files,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    /// Database file or directory; defaults to a location in the config dir.
    pub path: Option<PathBuf>,
    /// Bound on one checkpoint read or write (SQLite busy wait included).
    pub timeout_secs: u64,
}

impl CheckpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::default(),
            path: None,
            timeout_secs: crate::checkpoint::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

/// One feed subscription.
#[derive(Debug, Deserialize)]
pub struct StanzaConfig {
    /// Stanza identity: checkpoint key and event `source`.
    pub name: String,

    pub url: String,

    /// Seconds, or a number with an s/m/h/d/w suffix (`15m`, `8h`).
    #[serde(deserialize_with = "deserialize_interval")]
    pub interval: Duration,

    /// Only emit entries newer than the last checkpoint.
    #[serde(default = "default_true")]
    pub include_only_changed: bool,

    /// Convert HTML content and summaries to plain text.
    #[serde(default)]
    pub clean_html: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,

    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default = "default_sourcetype")]
    pub sourcetype: String,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_index")]
    pub index: String,
}

impl StanzaConfig {
    /// A stanza with defaults for everything but its identity, URL and interval.
    pub fn new(name: impl Into<String>, url: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            interval,
            include_only_changed: true,
            clean_html: false,
            username: None,
            password: None,
            proxy: None,
            sourcetype: default_sourcetype(),
            host: None,
            index: default_index(),
        }
    }

    /// Credentials, when both a username and a password are configured.
    pub fn credentials(&self) -> Option<Credentials> {
        use secrecy::ExposeSecret;

        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user.as_str(), pass.expose_secret())),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidStanza {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        validate_feed_url(&self.url).map_err(|e| invalid(e.to_string()))?;
        if self.interval.is_zero() {
            return Err(invalid("interval must be greater than zero".to_string()));
        }
        if self.username.is_some() != self.password.is_some() {
            tracing::warn!(
                stanza = %self.name,
                "Only one of username/password set, authentication disabled"
            );
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_sourcetype() -> String {
    "syndication".to_string()
}

fn default_index() -> String {
    "default".to_string()
}

fn deserialize_interval<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawInterval {
        Seconds(u64),
        Text(String),
    }

    match RawInterval::deserialize(deserializer)? {
        RawInterval::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawInterval::Text(text) => parse_interval(&text).map_err(serde::de::Error::custom),
    }
}

fn deserialize_secret<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SecretString>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Config file location; it need not exist
    ///
    /// # Returns
    ///
    /// The validated config, with defaults for every omitted setting.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Io`] - The file exists but cannot be read
    /// - [`ConfigError::TooLarge`] - The file exceeds 1 MiB
    /// - [`ConfigError::Parse`] - Invalid TOML, with line number info
    /// - [`ConfigError::InvalidStanza`] - A stanza with an empty or duplicate name, a bad URL or a zero interval
    /// - [`ConfigError::InvalidSetting`] - A zero `timeout_secs`
    ///
    /// # Behavior
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            stanzas = config.stanzas.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = ["check_interval_secs", "http", "checkpoint", "stanza"];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // A zero bound would fail every fetch or checkpoint access outright
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "http.timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.checkpoint.timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "checkpoint.timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for stanza in &self.stanzas {
            stanza.validate()?;
            if !seen.insert(stanza.name.as_str()) {
                return Err(ConfigError::InvalidStanza {
                    name: stanza.name.clone(),
                    reason: "duplicate stanza name".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn stanza(&self, name: &str) -> Option<&StanzaConfig> {
        self.stanzas.iter().find(|s| s.name == name)
    }
}

// ============================================================================
// Tests
// ============================================================================
