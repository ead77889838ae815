//! Proxy configuration: global watch list, recording flag and the ordered
//! plugin list.

use crate::matching::UrlMatcherSet;
use crate::pipeline::ProxyOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid URL pattern '{pattern}' in {scope}: {source}")]
    Pattern {
        scope: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("plugin #{index} has no name")]
    MissingPluginName { index: usize },
    #[error("unknown plugin '{name}'")]
    UnknownPlugin { name: String },
    #[error("invalid configuration for plugin '{name}': {source}")]
    PluginConfig {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

fn default_enabled() -> bool {
    true
}

/// One entry of the plugin list. Order in the file is registration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginEntry {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the global watch list for this plugin only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls_to_watch: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

impl PluginEntry {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            urls_to_watch: None,
            config,
        }
    }

    /// Deserialize the plugin section; a missing section means all defaults.
    pub fn parse_config<T: serde::de::DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let value = match &self.config {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|source| ConfigError::PluginConfig {
            name: self.name.clone(),
            source,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Empty means every URL is watched
    #[serde(default)]
    pub urls_to_watch: Vec<String>,
    #[serde(default)]
    pub record: bool,
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
    /// Directory of the file this config came from
    #[serde(skip)]
    pub config_dir: PathBuf,
}

impl ProxyConfig {
    /// Load from YAML, or JSON when the extension is `.json`, then validate.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let mut config: ProxyConfig = if is_json {
            serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        };
        config.config_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.validate()?;
        Ok(config)
    }

    /// Check watch patterns and plugin names. Plugin sections are checked
    /// when the plugins are built so one bad section only disables its plugin.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_patterns("urlsToWatch", &self.urls_to_watch)?;
        for (index, entry) in self.plugins.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(ConfigError::MissingPluginName { index });
            }
            if let Some(urls) = &entry.urls_to_watch {
                validate_patterns(&format!("plugin '{}'", entry.name), urls)?;
            }
        }
        Ok(())
    }

    pub fn options(&self) -> ProxyOptions {
        ProxyOptions {
            urls_to_watch: self.urls_to_watch.clone(),
            record: self.record,
            config_dir: self.config_dir.clone(),
        }
    }
}

fn validate_patterns(scope: &str, patterns: &[String]) -> Result<(), ConfigError> {
    for pattern in patterns {
        UrlMatcherSet::compile(std::slice::from_ref(pattern)).map_err(|source| {
            ConfigError::Pattern {
                scope: scope.to_string(),
                pattern: pattern.clone(),
                source,
            }
        })?;
    }
    Ok(())
}
