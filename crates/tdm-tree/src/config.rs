//! Device manager configuration loading.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use serde::Deserialize;
use smol_str::SmolStr;

use crate::device::{DeviceType, DEFAULT_FULL_TOPIC};
use crate::error::TreeError;
use crate::tree::TreeOptions;

pub const DEFAULT_STORE_PATH: &str = "devices.toml";
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    pub store_path: PathBuf,
    pub default_type: DeviceType,
    pub full_topic: SmolStr,
    pub log_level: SmolStr,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            default_type: DeviceType::Tasmota,
            full_topic: SmolStr::new_inline(DEFAULT_FULL_TOPIC),
            log_level: SmolStr::new_inline(DEFAULT_LOG_LEVEL),
        }
    }
}

impl TreeConfig {
    /// Load a TOML config; a relative store path resolves against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TreeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| TreeError::InvalidConfig(format!("{}: {err}", path.display()).into()))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_toml(&text, base)
    }

    pub fn from_toml(text: &str, base: &Path) -> Result<Self, TreeError> {
        let raw: ConfigToml = toml::from_str(text)
            .map_err(|err| TreeError::InvalidConfig(format!("config: {err}").into()))?;
        raw.into_config(base)
    }

    #[must_use]
    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions {
            default_type: self.default_type,
            full_topic: self.full_topic.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    store: Option<StoreSection>,
    devices: Option<DevicesSection>,
    log: Option<LogSection>,
}

#[derive(Debug, Deserialize)]
struct StoreSection {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DevicesSection {
    default_type: Option<String>,
    full_topic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogSection {
    level: Option<String>,
}

impl ConfigToml {
    fn into_config(self, base: &Path) -> Result<TreeConfig, TreeError> {
        let defaults = TreeConfig::default();

        let store_path = match self.store.and_then(|store| store.path) {
            Some(path) if path.trim().is_empty() => {
                return Err(TreeError::InvalidConfig("store.path must not be empty".into()));
            }
            Some(path) => PathBuf::from(path),
            None => defaults.store_path,
        };
        let store_path = if store_path.is_relative() {
            base.join(store_path)
        } else {
            store_path
        };

        let (default_type, full_topic) = match self.devices {
            Some(devices) => (
                devices
                    .default_type
                    .as_deref()
                    .map(DeviceType::parse)
                    .transpose()?
                    .unwrap_or(defaults.default_type),
                devices
                    .full_topic
                    .filter(|topic| !topic.trim().is_empty())
                    .map_or(defaults.full_topic, SmolStr::new),
            ),
            None => (defaults.default_type, defaults.full_topic),
        };
        if !full_topic.contains("%topic%") {
            return Err(TreeError::InvalidConfig(
                format!("devices.full_topic '{full_topic}' must contain %topic%").into(),
            ));
        }

        let log_level = match self.log.and_then(|log| log.level) {
            Some(level) => {
                let level = level.trim().to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(TreeError::InvalidConfig(
                        format!("invalid log.level '{level}'").into(),
                    ));
                }
                SmolStr::new(level)
            }
            None => defaults.log_level,
        };

        Ok(TreeConfig {
            store_path,
            default_type,
            full_topic,
            log_level,
        })
    }
}
