use super::{decide_latency, ChaosDecision};
use crate::exchange::InterceptedExchange;
use crate::pipeline::{EventSet, Plugin, PluginEvent, ProxyOptions};
use crate::recording::{ExchangeRecorder, MessageType, RecordedLogEntry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const LATENCY_PLUGIN_NAME: &str = "LatencyPlugin";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyConfig {
    #[serde(default)]
    pub min_ms: u64,
    #[serde(default)]
    pub max_ms: u64,
}

/// Delays every watched request by a random amount. Never responds.
pub struct LatencyPlugin {
    config: LatencyConfig,
    recorder: Arc<ExchangeRecorder>,
}

impl LatencyPlugin {
    pub fn new(config: LatencyConfig, recorder: Arc<ExchangeRecorder>) -> Self {
        Self { config, recorder }
    }
}

#[async_trait]
impl Plugin for LatencyPlugin {
    fn name(&self) -> &str {
        LATENCY_PLUGIN_NAME
    }

    async fn register(&self, _options: &ProxyOptions) -> anyhow::Result<EventSet> {
        Ok(EventSet::of(&[PluginEvent::BeforeRequest]))
    }

    async fn before_request(&self, exchange: &mut InterceptedExchange) -> anyhow::Result<()> {
        let decision = decide_latency(&self.config, &mut rand::thread_rng());
        let ChaosDecision::Latency { duration_ms } = decision else {
            return Ok(());
        };
        debug!(url = %exchange.url(), duration_ms, "Delaying request");
        self.recorder.record(
            RecordedLogEntry::new(
                MessageType::Chaos,
                format!("{} {}", exchange.method(), exchange.url()),
            )
            .with_line(format!("delayed {duration_ms}ms"))
            .with_plugin(LATENCY_PLUGIN_NAME),
        );
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        Ok(())
    }
}
