//! Builds the plugin pipeline from a [`ProxyConfig`].

use crate::chaos::{
    LatencyConfig, LatencyPlugin, RandomErrorConfig, RandomErrorPlugin, LATENCY_PLUGIN_NAME,
    RANDOM_ERROR_PLUGIN_NAME,
};
use crate::config::{ConfigError, PluginEntry, ProxyConfig};
use crate::mocks::{MockResponseConfig, MockResponsePlugin, MOCK_PLUGIN_NAME};
use crate::permissions::{
    MinimalPermissionsConfig, MinimalPermissionsPlugin, PERMISSIONS_PLUGIN_NAME,
};
use crate::pipeline::{EventSet, Plugin, PluginPipeline, ProxyOptions};
use crate::recording::ExchangeRecorder;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

/// Plugin names this build knows how to construct.
pub const KNOWN_PLUGINS: [&str; 4] = [
    LATENCY_PLUGIN_NAME,
    MOCK_PLUGIN_NAME,
    RANDOM_ERROR_PLUGIN_NAME,
    PERMISSIONS_PLUGIN_NAME,
];

/// Construct one plugin from its config entry.
pub fn build_plugin(
    entry: &PluginEntry,
    recorder: &Arc<ExchangeRecorder>,
) -> Result<Arc<dyn Plugin>, ConfigError> {
    let plugin: Arc<dyn Plugin> = match entry.name.as_str() {
        LATENCY_PLUGIN_NAME => Arc::new(LatencyPlugin::new(
            entry.parse_config::<LatencyConfig>()?,
            Arc::clone(recorder),
        )),
        MOCK_PLUGIN_NAME => Arc::new(MockResponsePlugin::new(
            entry.parse_config::<MockResponseConfig>()?,
            Arc::clone(recorder),
        )),
        RANDOM_ERROR_PLUGIN_NAME => Arc::new(RandomErrorPlugin::new(
            entry.parse_config::<RandomErrorConfig>()?,
            Arc::clone(recorder),
        )),
        PERMISSIONS_PLUGIN_NAME => Arc::new(MinimalPermissionsPlugin::new(
            entry.parse_config::<MinimalPermissionsConfig>()?,
        )),
        other => {
            return Err(ConfigError::UnknownPlugin {
                name: other.to_string(),
            })
        }
    };
    Ok(plugin)
}

/// Register every enabled plugin in file order.
///
/// Entries that cannot be built stay in the pipeline as disabled plugins so
/// the failure shows up in [`PluginPipeline::disabled`] like any other setup
/// failure.
pub async fn build_pipeline(
    config: &ProxyConfig,
    recorder: Arc<ExchangeRecorder>,
) -> PluginPipeline {
    let mut builder = PluginPipeline::builder(Arc::clone(&recorder)).options(config.options());

    for entry in &config.plugins {
        if !entry.enabled {
            debug!(plugin = %entry.name, "Plugin disabled in config");
            continue;
        }
        let plugin = build_plugin(entry, &recorder).unwrap_or_else(|e| {
            error!(plugin = %entry.name, "{e}");
            Arc::new(Misconfigured {
                name: entry.name.clone(),
                error: e.to_string(),
            })
        });
        builder = match &entry.urls_to_watch {
            Some(urls) => builder.scoped_plugin(plugin, urls.clone()),
            None => builder.plugin(plugin),
        };
    }

    builder.build().await
}

/// Stand-in for an entry that could not be built; always fails to register.
struct Misconfigured {
    name: String,
    error: String,
}

#[async_trait]
impl Plugin for Misconfigured {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register(&self, _options: &ProxyOptions) -> anyhow::Result<EventSet> {
        anyhow::bail!("{}", self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> Arc<ExchangeRecorder> {
        Arc::new(ExchangeRecorder::new())
    }

    #[test]
    fn test_unknown_plugin_name() {
        let entry = PluginEntry::new("DevToolsPlugin", json!({}));
        let err = build_plugin(&entry, &recorder()).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownPlugin { ref name } if name == "DevToolsPlugin"));
    }

    #[test]
    fn test_known_plugins_build() {
        let latency = PluginEntry::new(LATENCY_PLUGIN_NAME, json!({"minMs": 1, "maxMs": 2}));
        assert_eq!(build_plugin(&latency, &recorder()).unwrap().name(), LATENCY_PLUGIN_NAME);
        let mocks = PluginEntry::new(MOCK_PLUGIN_NAME, serde_json::Value::Null);
        assert_eq!(build_plugin(&mocks, &recorder()).unwrap().name(), MOCK_PLUGIN_NAME);
    }

    #[tokio::test]
    async fn test_bad_entry_disables_only_itself() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProxyConfig {
            plugins: vec![
                PluginEntry::new("NoSuchPlugin", json!({})),
                PluginEntry::new(PERMISSIONS_PLUGIN_NAME, json!({})),
                PluginEntry::new(LATENCY_PLUGIN_NAME, json!({"minMs": 0, "maxMs": 0})),
                PluginEntry {
                    enabled: false,
                    ..PluginEntry::new(RANDOM_ERROR_PLUGIN_NAME, json!({}))
                },
            ],
            config_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let pipeline = build_pipeline(&config, recorder()).await;
        assert_eq!(
            pipeline.plugin_names(),
            vec!["NoSuchPlugin", PERMISSIONS_PLUGIN_NAME, LATENCY_PLUGIN_NAME]
        );
        let disabled: Vec<_> = pipeline.disabled().iter().map(|e| e.to_string()).collect();
        assert_eq!(disabled.len(), 2);
        assert!(disabled[0].contains("unknown plugin 'NoSuchPlugin'"));
        assert!(disabled[1].contains(PERMISSIONS_PLUGIN_NAME));
    }
}
