//! Configuration for the Wi-Fi presence agent.
//!
//! Values come from `config.json` in the user config directory, then from
//! `PRESENCE_*` environment variables, then from CLI flags.

use crate::classifier::{DeviceType, OuiTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const ENV_MAX_DEVICES: &str = "PRESENCE_MAX_DEVICES";
pub const ENV_MAX_SNAPSHOTS: &str = "PRESENCE_MAX_SNAPSHOTS";
pub const ENV_ENABLE_FILTERING: &str = "PRESENCE_ENABLE_DEVICE_FILTERING";
pub const ENV_API_HOST: &str = "PRESENCE_API_HOST";
pub const ENV_API_PORT: &str = "PRESENCE_API_PORT";
pub const ENV_OUI_FILE: &str = "PRESENCE_OUI_FILE";

/// Main configuration for the presence agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Presence store capacity
    pub store: StoreConfig,

    /// Vendor registry used for classification
    pub classifier: ClassifierConfig,

    /// Device-type filtering applied during ingestion
    pub filter: FilterConfig,

    /// HTTP API bind address
    pub api: ApiConfig,

    /// Look-back window of the realtime view
    #[serde(with = "duration_serde")]
    pub realtime_window: Duration,

    /// Snapshots scanned by the realtime view, newest first
    pub realtime_scan_limit: usize,

    /// Raw payloads buffered between transport and store
    pub ingest_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            classifier: ClassifierConfig::default(),
            filter: FilterConfig::default(),
            api: ApiConfig::default(),
            realtime_window: Duration::from_secs(60),
            realtime_scan_limit: 500,
            ingest_queue_capacity: 1024,
        }
    }
}

impl Config {
    /// Load configuration from the default location, then apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wifi-presence-agent")
            .join("config.json")
    }

    /// Apply `PRESENCE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override(&lookup, ENV_MAX_DEVICES, |s| s.parse::<usize>().ok()) {
            self.store.max_devices = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_MAX_SNAPSHOTS, |s| s.parse::<usize>().ok()) {
            self.store.max_snapshots = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_ENABLE_FILTERING, parse_bool) {
            self.filter.enabled = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_API_HOST, |s| {
            Some(s.to_string()).filter(|s| !s.is_empty())
        }) {
            self.api.host = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_API_PORT, |s| s.parse::<u16>().ok()) {
            self.api.port = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_OUI_FILE, |s| {
            Some(PathBuf::from(s)).filter(|p| !p.as_os_str().is_empty())
        }) {
            self.classifier.oui_file = Some(v);
        }
    }
}

fn parse_override<F, T, P>(lookup: &F, key: &str, parse: P) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    let raw = lookup(key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        warn!(key, value = %raw, "Ignoring invalid configuration override");
    }
    parsed
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Presence store bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Device summaries kept before the least recently seen is evicted
    pub max_devices: usize,
    /// Snapshots kept in the history ring
    pub max_snapshots: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_devices: 10_000,
            max_snapshots: 1_000,
        }
    }
}

/// Vendor registry source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// IEEE OUI registry file merged over the built-in excerpt
    pub oui_file: Option<PathBuf>,
}

impl ClassifierConfig {
    /// Build the vendor table: the registry file, if any, then the
    /// built-in entries for prefixes the file does not cover.
    pub fn vendor_table(&self) -> Result<OuiTable, ConfigError> {
        let Some(path) = &self.oui_file else {
            return Ok(OuiTable::builtin());
        };
        let mut table = OuiTable::load(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let loaded = table.len();
        table.extend(OuiTable::builtin());
        info!(path = %path.display(), loaded, total = table.len(), "Loaded OUI registry");
        Ok(table)
    }
}

/// Device-type allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    pub allowed_types: Vec<DeviceType>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_types: vec![DeviceType::Smartphone, DeviceType::Laptop],
        }
    }
}

impl FilterConfig {
    /// Parse allowed types from a comma-separated string.
    pub fn types_from_csv(s: &str) -> Result<Vec<DeviceType>, ConfigError> {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| t.parse::<DeviceType>().map_err(ConfigError::Parse))
            .collect()
    }
}

/// HTTP API bind address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Serialize(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "Parse error: {e}"),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
