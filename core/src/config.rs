//! Inspector configuration
//!
//! Settings come from a JSON `.netwatchrc` in the working directory, falling
//! back to one in the home directory. Fields with the wrong JSON type keep
//! their defaults and unknown keys are ignored. `NETWATCH_PORT` overrides the
//! port.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::storage::StoreConfig;

pub const CONFIG_FILE_NAME: &str = ".netwatchrc";
pub const PORT_ENV_VAR: &str = "NETWATCH_PORT";
pub const DEFAULT_PORT: u16 = 9090;
pub const DEFAULT_MAX_REQUESTS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct NetwatchConfig {
    /// Port the ingestion server listens on
    pub port: u16,
    /// URL patterns never recorded (substring, glob or `/regex/`)
    pub ignored_urls: Vec<String>,
    /// Retention limit for the request store
    pub max_requests: usize,
}

impl Default for NetwatchConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            ignored_urls: Vec::new(),
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

impl NetwatchConfig {
    /// Load from `./.netwatchrc`, then `~/.netwatchrc`, then apply the
    /// environment override.
    pub fn load() -> Self {
        let mut candidates = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(CONFIG_FILE_NAME));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(CONFIG_FILE_NAME));
        }
        let mut config = Self::load_from_paths(&candidates);
        config.apply_env_override();
        config
    }

    /// The first candidate holding a JSON object wins; unreadable or
    /// unparseable files are skipped.
    pub fn load_from_paths(candidates: &[PathBuf]) -> Self {
        candidates
            .iter()
            .find_map(|path| read_object(path))
            .map(|object| Self::from_object(&object))
            .unwrap_or_default()
    }

    pub fn from_json_str(contents: &str) -> Self {
        match serde_json::from_str::<Value>(contents) {
            Ok(Value::Object(object)) => Self::from_object(&object),
            _ => Self::default(),
        }
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        Self {
            port: object
                .get("port")
                .and_then(Value::as_u64)
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(defaults.port),
            ignored_urls: object
                .get("ignoredUrls")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(defaults.ignored_urls),
            max_requests: object
                .get("maxRequests")
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.max_requests),
        }
    }

    pub fn apply_env_override(&mut self) {
        if let Ok(value) = std::env::var(PORT_ENV_VAR) {
            match value.trim().parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!("Ignoring invalid {}={:?}", PORT_ENV_VAR, value),
            }
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_requests: self.max_requests,
            ..StoreConfig::default()
        }
    }
}

fn read_object(path: &Path) -> Option<Map<String, Value>> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(object)) => Some(object),
        Ok(_) | Err(_) => {
            tracing::warn!("Ignoring malformed config file {}", path.display());
            None
        }
    }
}
