use super::{decide_error, ChaosDecision};
use crate::exchange::{flexible_headers, ExchangeResponse, Headers, InterceptedExchange};
use crate::pipeline::{EventSet, Plugin, PluginEvent, ProxyOptions};
use crate::recording::{ExchangeRecorder, MessageType, RecordedLogEntry};
use crate::response::ResponseBuilder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub const RANDOM_ERROR_PLUGIN_NAME: &str = "RandomErrorPlugin";

const RETRY_AFTER: &str = "Retry-After";

fn default_rate() -> u8 {
    50
}

fn default_retry_after() -> u64 {
    5
}

/// One error response the plugin may pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorTemplate {
    pub status_code: u16,
    #[serde(default, with = "flexible_headers")]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomErrorConfig {
    /// Failure probability in percent
    #[serde(default = "default_rate")]
    pub rate: u8,
    #[serde(default)]
    pub errors: Vec<ErrorTemplate>,
    /// Value of `Retry-After` on 429 and 503 responses
    #[serde(default = "default_retry_after")]
    pub retry_after_seconds: u64,
}

impl Default for RandomErrorConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            errors: Vec::new(),
            retry_after_seconds: default_retry_after(),
        }
    }
}

/// Fails a share of watched requests with one of the configured errors.
pub struct RandomErrorPlugin {
    config: RandomErrorConfig,
    recorder: Arc<ExchangeRecorder>,
}

impl RandomErrorPlugin {
    pub fn new(config: RandomErrorConfig, recorder: Arc<ExchangeRecorder>) -> Self {
        Self { config, recorder }
    }

    fn build(&self, template: &ErrorTemplate) -> ExchangeResponse {
        let mut builder = ResponseBuilder::new(template.status_code).append_headers(&template.headers);
        if matches!(template.status_code, 429 | 503) && !template.headers.contains(RETRY_AFTER) {
            builder = builder.header(RETRY_AFTER, &self.config.retry_after_seconds.to_string());
        }
        if let Some(body) = &template.body {
            builder = builder.json_body(body);
        }
        builder.build()
    }
}

#[async_trait]
impl Plugin for RandomErrorPlugin {
    fn name(&self) -> &str {
        RANDOM_ERROR_PLUGIN_NAME
    }

    async fn register(&self, _options: &ProxyOptions) -> anyhow::Result<EventSet> {
        if self.config.rate > 100 {
            anyhow::bail!("rate must be between 0 and 100, got {}", self.config.rate);
        }
        if self.config.errors.is_empty() {
            anyhow::bail!("no error responses configured");
        }
        Ok(EventSet::of(&[PluginEvent::BeforeRequest]))
    }

    async fn before_request(&self, exchange: &mut InterceptedExchange) -> anyhow::Result<()> {
        if exchange.has_response() {
            return Ok(());
        }
        let decision = decide_error(&self.config, &mut rand::thread_rng());
        let ChaosDecision::Error { template } = decision else {
            return Ok(());
        };
        let Some(template) = self.config.errors.get(template) else {
            return Ok(());
        };

        let response = self.build(template);
        info!(url = %exchange.url(), status = response.status, "Failing request");
        exchange.respond(RANDOM_ERROR_PLUGIN_NAME, response)?;
        self.recorder.record(
            RecordedLogEntry::new(
                MessageType::Chaos,
                format!("{} {}", exchange.method(), exchange.url()),
            )
            .with_line(format!("{} error", template.status_code))
            .with_plugin(RANDOM_ERROR_PLUGIN_NAME)
            .with_exchange(Arc::new(exchange.snapshot())),
        );
        Ok(())
    }
}
