//! The plugin contract and the arguments handed to each lifecycle event.

use crate::exchange::InterceptedExchange;
use crate::recording::RecordedLogEntry;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Named lifecycle events a plugin may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginEvent {
    OptionsLoaded,
    BeforeRequest,
    AfterResponse,
    RecordingStopped,
}

impl PluginEvent {
    pub const ALL: [PluginEvent; 4] = [
        PluginEvent::OptionsLoaded,
        PluginEvent::BeforeRequest,
        PluginEvent::AfterResponse,
        PluginEvent::RecordingStopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginEvent::OptionsLoaded => "options-loaded",
            PluginEvent::BeforeRequest => "before-request",
            PluginEvent::AfterResponse => "after-response",
            PluginEvent::RecordingStopped => "recording-stopped",
        }
    }

    fn bit(self) -> u8 {
        match self {
            PluginEvent::OptionsLoaded => 1,
            PluginEvent::BeforeRequest => 1 << 1,
            PluginEvent::AfterResponse => 1 << 2,
            PluginEvent::RecordingStopped => 1 << 3,
        }
    }
}

/// Subset of events returned by [`Plugin::register`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventSet(u8);

impl EventSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn of(events: &[PluginEvent]) -> Self {
        events.iter().fold(Self::empty(), |set, e| set.with(*e))
    }

    pub fn with(self, event: PluginEvent) -> Self {
        Self(self.0 | event.bit())
    }

    pub fn contains(&self, event: PluginEvent) -> bool {
        self.0 & event.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Options every plugin sees at registration and on options-loaded.
#[derive(Debug, Clone, Default)]
pub struct ProxyOptions {
    pub urls_to_watch: Vec<String>,
    pub record: bool,
    /// Directory relative plugin paths resolve against
    pub config_dir: PathBuf,
}

/// Key/value bag shared by all recording-stopped handlers of one session.
#[derive(Debug, Clone, Default)]
pub struct GlobalData(Arc<RwLock<HashMap<String, Value>>>);

impl GlobalData {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.0.write().insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }
}

/// Input of the recording-stopped event.
#[derive(Debug, Clone)]
pub struct RecordingArgs {
    pub logs: Arc<[RecordedLogEntry]>,
    pub global_data: GlobalData,
}

/// A pipeline participant.
///
/// Handlers default to no-ops; only events included in the set returned by
/// [`Plugin::register`] are delivered. Handlers for before-request must return
/// without side effects when the exchange already has a response.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// One-time setup. An error disables this plugin only.
    async fn register(&self, options: &ProxyOptions) -> anyhow::Result<EventSet>;

    async fn options_loaded(&self, _options: &ProxyOptions) -> anyhow::Result<()> {
        Ok(())
    }

    async fn before_request(&self, _exchange: &mut InterceptedExchange) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_response(&self, _exchange: &InterceptedExchange) -> anyhow::Result<()> {
        Ok(())
    }

    async fn recording_stopped(&self, _args: &RecordingArgs) -> anyhow::Result<()> {
        Ok(())
    }
}
