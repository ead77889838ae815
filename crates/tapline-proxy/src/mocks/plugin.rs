//! The mock responder as a pipeline plugin.

use super::engine::{MockMatchingEngine, MockOutcome, MockSettings};
use super::source::FileRuleSource;
use super::watcher::{RuleFileWatcher, DEFAULT_DEBOUNCE};
use crate::exchange::InterceptedExchange;
use crate::pipeline::{EventSet, Plugin, PluginEvent, ProxyOptions};
use crate::recording::{ExchangeRecorder, MessageType, RecordedLogEntry};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const MOCK_PLUGIN_NAME: &str = "MockResponsePlugin";

fn default_mocks_file() -> PathBuf {
    PathBuf::from("mocks.json")
}

fn default_watch() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockResponseConfig {
    /// Relative paths resolve against the config directory
    #[serde(default = "default_mocks_file")]
    pub mocks_file: PathBuf,
    #[serde(default)]
    pub no_mocks: bool,
    #[serde(default)]
    pub block_unmocked_requests: bool,
    /// Reload the mocks file when it changes
    #[serde(default = "default_watch")]
    pub watch: bool,
}

impl Default for MockResponseConfig {
    fn default() -> Self {
        Self {
            mocks_file: default_mocks_file(),
            no_mocks: false,
            block_unmocked_requests: false,
            watch: default_watch(),
        }
    }
}

impl MockResponseConfig {
    fn settings(&self) -> MockSettings {
        MockSettings {
            no_mocks: self.no_mocks,
            block_unmocked_requests: self.block_unmocked_requests,
        }
    }
}

/// Answers matching requests from the mocks file.
pub struct MockResponsePlugin {
    config: MockResponseConfig,
    recorder: Arc<ExchangeRecorder>,
    engine: OnceCell<Arc<MockMatchingEngine>>,
    watcher: Mutex<Option<RuleFileWatcher>>,
}

impl MockResponsePlugin {
    pub fn new(config: MockResponseConfig, recorder: Arc<ExchangeRecorder>) -> Self {
        Self {
            config,
            recorder,
            engine: OnceCell::new(),
            watcher: Mutex::new(None),
        }
    }

    /// Use a prepared engine instead of loading the mocks file at registration.
    pub fn with_engine(engine: MockMatchingEngine, recorder: Arc<ExchangeRecorder>) -> Self {
        let plugin = Self::new(MockResponseConfig::default(), recorder);
        // a fresh cell cannot already be set
        let _ = plugin.engine.set(Arc::new(engine));
        plugin
    }

    pub fn engine(&self) -> Option<&MockMatchingEngine> {
        self.engine.get().map(Arc::as_ref)
    }

    fn load_engine(&self, options: &ProxyOptions) -> MockMatchingEngine {
        let path = options.config_dir.join(&self.config.mocks_file);
        let source = Arc::new(FileRuleSource::load(path));
        if self.config.watch {
            match RuleFileWatcher::spawn(Arc::clone(&source), DEFAULT_DEBOUNCE) {
                Ok(watcher) => *self.watcher.lock() = Some(watcher),
                Err(e) => warn!("{e}; mocks will not be reloaded"),
            }
        }
        MockMatchingEngine::new(source).with_settings(self.config.settings())
    }
}

#[async_trait]
impl Plugin for MockResponsePlugin {
    fn name(&self) -> &str {
        MOCK_PLUGIN_NAME
    }

    async fn register(&self, options: &ProxyOptions) -> anyhow::Result<EventSet> {
        if self.engine.get().is_none() {
            let engine = self.load_engine(options);
            let _ = self.engine.set(Arc::new(engine));
        }
        if self.config.no_mocks {
            info!("Mocks disabled");
        }
        Ok(EventSet::of(&[PluginEvent::BeforeRequest]))
    }

    async fn before_request(&self, exchange: &mut InterceptedExchange) -> anyhow::Result<()> {
        if exchange.has_response() {
            return Ok(());
        }
        let Some(engine) = self.engine.get() else {
            return Ok(());
        };

        // `@file` bodies are read from disk while rendering
        let engine = Arc::clone(engine);
        let request = exchange.request().clone();
        let outcome = tokio::task::spawn_blocking(move || engine.evaluate(&request)).await?;

        let (response, line) = match outcome {
            MockOutcome::Disabled | MockOutcome::PassThrough => return Ok(()),
            MockOutcome::Mocked { response, rules } => {
                let rules = rules
                    .iter()
                    .map(|i| format!("#{i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                (response, format!("mock {rules}"))
            }
            MockOutcome::Blocked { response } => (response, "blocked unmocked request".to_string()),
        };

        info!(
            method = %exchange.method(),
            url = %exchange.url(),
            status = response.status,
            "{line}"
        );
        exchange.respond(MOCK_PLUGIN_NAME, response)?;
        self.recorder.record(
            RecordedLogEntry::new(
                MessageType::Mocked,
                format!("{} {}", exchange.method(), exchange.url()),
            )
            .with_line(line)
            .with_plugin(MOCK_PLUGIN_NAME)
            .with_exchange(Arc::new(exchange.snapshot())),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{DynamicTokenProvider, TokenContext};
    use crate::pipeline::{DispatchOutcome, PluginPipeline};
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_loads_mocks_relative_to_config_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("api-mocks.json"),
            r#"{"mocks":[{"request":{"url":"https://api.test/me"},"response":{"body":"@me.json"}}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("me.json"), r#"{"id":"@dynamic.method"}"#).unwrap();

        let recorder = Arc::new(ExchangeRecorder::new());
        let plugin = Arc::new(MockResponsePlugin::new(
            MockResponseConfig {
                mocks_file: "api-mocks.json".into(),
                watch: false,
                ..Default::default()
            },
            Arc::clone(&recorder),
        ));
        let pipeline = PluginPipeline::builder(Arc::clone(&recorder))
            .options(ProxyOptions {
                config_dir: dir.path().to_path_buf(),
                ..Default::default()
            })
            .plugin(plugin)
            .build()
            .await;

        recorder.start();
        let mut exchange = InterceptedExchange::new("GET", "https://api.test/me");
        let outcome = pipeline.dispatch_before_request(&mut exchange).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Responded {
                plugin: MOCK_PLUGIN_NAME.into()
            }
        );
        assert_eq!(exchange.response().unwrap().body_str(), Some(r#"{"id":"GET"}"#));

        let log = recorder.stop().unwrap();
        let mocked = log
            .iter()
            .find(|e| e.category == MessageType::Mocked)
            .unwrap();
        assert_eq!(mocked.message, vec!["GET https://api.test/me", "mock #0"]);
        assert!(mocked.exchange.as_ref().unwrap().response.is_some());
    }

    #[tokio::test]
    async fn test_skips_exchange_with_response() {
        let recorder = Arc::new(ExchangeRecorder::new());
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("mocks.json"),
            r#"[{"request":{"url":"*","nth":1}}]"#,
        )
        .unwrap();
        let plugin = MockResponsePlugin::new(
            MockResponseConfig {
                watch: false,
                ..Default::default()
            },
            recorder,
        );
        plugin
            .register(&ProxyOptions {
                config_dir: dir.path().to_path_buf(),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut exchange = InterceptedExchange::new("GET", "https://api.test/me");
        exchange
            .respond(
                "other",
                crate::response::ResponseBuilder::new(418).build(),
            )
            .unwrap();
        plugin.before_request(&mut exchange).await.unwrap();
        assert_eq!(exchange.committed_by(), Some("other"));
        assert_eq!(plugin.engine().unwrap().counter().count("0:GET *"), 0);
    }

    /// Records the thread a body was rendered on.
    #[derive(Default)]
    struct ThreadToken(Mutex<Option<std::thread::ThreadId>>);

    impl DynamicTokenProvider for ThreadToken {
        fn resolve(&self, name: &str, _ctx: &TokenContext<'_>) -> Option<String> {
            (name == "thread").then(|| {
                *self.0.lock() = Some(std::thread::current().id());
                "seen".to_string()
            })
        }
    }

    #[tokio::test]
    async fn test_file_body_rendered_off_the_runtime_thread() {
        let dir = TempDir::new().unwrap();
        let mocks = dir.path().join("mocks.json");
        fs::write(
            &mocks,
            r#"[{"request":{"url":"https://api.test/report"},"response":{"body":"@report.txt"}}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("report.txt"), "rendered on @dynamic.thread").unwrap();

        let tokens = Arc::new(ThreadToken::default());
        let engine = MockMatchingEngine::new(Arc::new(FileRuleSource::load(&mocks)))
            .with_tokens(tokens.clone());
        let plugin = MockResponsePlugin::with_engine(engine, Arc::new(ExchangeRecorder::new()));

        let mut exchange = InterceptedExchange::new("GET", "https://api.test/report");
        plugin.before_request(&mut exchange).await.unwrap();

        assert_eq!(exchange.response().unwrap().body_str(), Some("rendered on seen"));
        let rendered_on = tokens.0.lock().expect("body was rendered");
        assert_ne!(rendered_on, std::thread::current().id());
    }
}
