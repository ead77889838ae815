//! Minimal-permission analysis as a recording-stopped plugin.

use super::catalog::{
    CatalogRequest, CatalogSource, FileCatalogSource, HttpCatalogSource, PermissionCatalogLoader,
    DEFAULT_CATALOG_TIMEOUT,
};
use super::solver::{MinimalPermissionSolver, Observations};
use super::types::{PermissionCatalog, PermissionType};
use crate::pipeline::{EventSet, Plugin, PluginEvent, ProxyOptions, RecordingArgs};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const PERMISSIONS_PLUGIN_NAME: &str = "MinimalPermissionsPlugin";

/// Key under which the report is stored in the recording's global data.
pub const REPORT_KEY: &str = "minimalPermissions";

fn default_timeout_secs() -> u64 {
    DEFAULT_CATALOG_TIMEOUT.as_secs()
}

/// Where the plugin reads ranked scopes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogConfig {
    #[serde(rename_all = "camelCase")]
    Remote {
        url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    File { file: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimalPermissionsConfig {
    pub catalog: CatalogConfig,
}

pub struct MinimalPermissionsPlugin {
    config: Option<MinimalPermissionsConfig>,
    loader: OnceCell<PermissionCatalogLoader>,
}

impl MinimalPermissionsPlugin {
    pub fn new(config: MinimalPermissionsConfig) -> Self {
        Self {
            config: Some(config),
            loader: OnceCell::new(),
        }
    }

    pub fn with_source(source: Arc<dyn CatalogSource>) -> Self {
        let plugin = Self {
            config: None,
            loader: OnceCell::new(),
        };
        let _ = plugin.loader.set(PermissionCatalogLoader::new(source));
        plugin
    }

    fn build_source(
        config: &MinimalPermissionsConfig,
        options: &ProxyOptions,
    ) -> anyhow::Result<Arc<dyn CatalogSource>> {
        let source: Arc<dyn CatalogSource> = match &config.catalog {
            CatalogConfig::Remote { url, timeout_secs } => Arc::new(HttpCatalogSource::new(
                url.clone(),
                Duration::from_secs(*timeout_secs),
            )?),
            CatalogConfig::File { file } => {
                Arc::new(FileCatalogSource::new(options.config_dir.join(file)))
            }
        };
        Ok(source)
    }

    /// Fetch whatever the catalog is missing for the observed operations.
    /// Returns `None` after logging when the catalog is unavailable.
    async fn catalog_for(
        loader: &PermissionCatalogLoader,
        observations: &Observations,
    ) -> Option<Arc<PermissionCatalog>> {
        let mut catalog = loader.cached();
        for permission_type in PermissionType::ALL {
            let requests: Vec<_> = observations
                .groups
                .iter()
                .filter(|((_, t), _)| *t == permission_type)
                .flat_map(|((surface, _), group)| {
                    group
                        .operations
                        .iter()
                        .map(move |key| CatalogRequest::new(surface, key))
                })
                .collect();
            if requests.is_empty() {
                continue;
            }
            match loader.ensure(permission_type, &requests).await {
                Ok(updated) => catalog = updated,
                Err(e) => {
                    error!("{e}; skipping minimal permissions analysis");
                    return None;
                }
            }
        }
        Some(catalog)
    }
}

#[async_trait]
impl Plugin for MinimalPermissionsPlugin {
    fn name(&self) -> &str {
        PERMISSIONS_PLUGIN_NAME
    }

    async fn register(&self, options: &ProxyOptions) -> anyhow::Result<EventSet> {
        if self.loader.get().is_none() {
            let config = self
                .config
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("no permission catalog configured"))?;
            let source = Self::build_source(config, options)?;
            info!(source = %source.describe(), "Using permission catalog");
            let _ = self.loader.set(PermissionCatalogLoader::new(source));
        }
        Ok(EventSet::of(&[PluginEvent::RecordingStopped]))
    }

    async fn recording_stopped(&self, args: &RecordingArgs) -> anyhow::Result<()> {
        let Some(loader) = self.loader.get() else {
            return Ok(());
        };
        let observations = MinimalPermissionSolver::observe(&args.logs);
        if observations.is_empty() {
            info!("No authenticated requests recorded; nothing to analyze");
            return Ok(());
        }

        let Some(catalog) = Self::catalog_for(loader, &observations).await else {
            return Ok(());
        };
        let report = MinimalPermissionSolver::solve(&observations, &catalog);

        for solution in &report.solutions {
            if solution.uses_minimal_permissions {
                info!(
                    api = %solution.api_surface,
                    permission_type = %solution.permission_type,
                    minimal = ?solution.minimal_scopes,
                    "Using minimal permissions"
                );
            } else {
                warn!(
                    api = %solution.api_surface,
                    permission_type = %solution.permission_type,
                    minimal = ?solution.minimal_scopes,
                    excess = ?solution.excess_scopes,
                    "Excessive permissions"
                );
            }
            for op in &solution.unmatched_operations {
                warn!(api = %solution.api_surface, operation = %op, "No permission data for operation");
            }
        }

        args.global_data
            .insert(REPORT_KEY, serde_json::to_value(&report)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::InterceptedExchange;
    use crate::pipeline::PluginPipeline;
    use crate::permissions::credential::test_token;
    use crate::recording::ExchangeRecorder;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_catalog_config_forms() {
        let remote: MinimalPermissionsConfig =
            serde_yaml::from_str("catalog: { url: 'https://perm.test/api', timeoutSecs: 3 }").unwrap();
        assert_eq!(
            remote.catalog,
            CatalogConfig::Remote {
                url: "https://perm.test/api".into(),
                timeout_secs: 3
            }
        );
        let file: MinimalPermissionsConfig =
            serde_yaml::from_str("catalog: { file: catalog.json }").unwrap();
        assert_eq!(
            file.catalog,
            CatalogConfig::File {
                file: "catalog.json".into()
            }
        );
    }

    #[tokio::test]
    async fn test_report_stored_in_global_data() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("catalog.json"),
            json!({"results": [
                {"operation": "GET /v1.0/me", "scope": "User.Read"},
                {"operation": "GET /v1.0/me", "scope": "User.ReadWrite"}
            ]})
            .to_string(),
        )
        .unwrap();

        let recorder = Arc::new(ExchangeRecorder::new());
        let pipeline = PluginPipeline::builder(recorder)
            .options(ProxyOptions {
                config_dir: dir.path().to_path_buf(),
                ..Default::default()
            })
            .plugin(Arc::new(MinimalPermissionsPlugin::new(
                MinimalPermissionsConfig {
                    catalog: CatalogConfig::File {
                        file: "catalog.json".into(),
                    },
                },
            )))
            .build()
            .await;
        assert!(pipeline.disabled().is_empty());

        pipeline.start_recording();
        let token = test_token(json!({"scp": "User.Read Mail.Send"}));
        let mut exchange = InterceptedExchange::new("GET", "https://api.test/v1.0/me")
            .with_header("Authorization", format!("Bearer {token}"));
        pipeline.dispatch_before_request(&mut exchange).await;
        let args = pipeline.stop_recording().await.unwrap();

        let report = args.global_data.get(REPORT_KEY).unwrap();
        let solution = &report["solutions"][0];
        assert_eq!(solution["apiSurface"], "https://api.test");
        assert_eq!(solution["minimalScopes"], json!(["User.Read"]));
        assert_eq!(solution["excessScopes"], json!(["Mail.Send"]));
        assert_eq!(solution["usesMinimalPermissions"], false);
    }

    #[tokio::test]
    async fn test_missing_catalog_skips_analysis() {
        let dir = TempDir::new().unwrap();
        let plugin = MinimalPermissionsPlugin::with_source(Arc::new(FileCatalogSource::new(
            dir.path().join("absent.json"),
        )));
        let recorder = Arc::new(ExchangeRecorder::new());
        let pipeline = PluginPipeline::builder(recorder)
            .plugin(Arc::new(plugin))
            .build()
            .await;

        pipeline.start_recording();
        let token = test_token(json!({"scp": "User.Read"}));
        let mut exchange = InterceptedExchange::new("GET", "https://api.test/v1.0/me")
            .with_header("Authorization", format!("Bearer {token}"));
        pipeline.dispatch_before_request(&mut exchange).await;
        let args = pipeline.stop_recording().await.unwrap();
        assert!(!args.global_data.contains_key(REPORT_KEY));
    }

    #[tokio::test]
    async fn test_unconfigured_plugin_is_disabled() {
        let plugin = MinimalPermissionsPlugin {
            config: None,
            loader: OnceCell::new(),
        };
        let recorder = Arc::new(ExchangeRecorder::new());
        let pipeline = PluginPipeline::builder(recorder)
            .plugin(Arc::new(plugin))
            .build()
            .await;
        assert_eq!(pipeline.disabled().len(), 1);
    }
}
