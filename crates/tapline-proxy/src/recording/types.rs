//! Log entry types shared by the recorder and every recording-stopped consumer.

use crate::exchange::ExchangeSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Category of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    Normal,
    InterceptedRequest,
    PassedThrough,
    Mocked,
    Chaos,
    Warning,
    Tip,
    Failed,
    InterceptedResponse,
    Skipped,
}

impl MessageType {
    pub fn label(&self) -> &'static str {
        match self {
            MessageType::Normal => "log",
            MessageType::InterceptedRequest => "req",
            MessageType::PassedThrough => "pass",
            MessageType::Mocked => "mock",
            MessageType::Chaos => "oops",
            MessageType::Warning => "warn",
            MessageType::Tip => "tip",
            MessageType::Failed => "fail",
            MessageType::InterceptedResponse => "resp",
            MessageType::Skipped => "skip",
        }
    }
}

/// One append-only entry in a recording session.
#[derive(Debug, Clone)]
pub struct RecordedLogEntry {
    pub category: MessageType,
    pub message: Vec<String>,
    /// Plugin that produced the entry, `None` for the pipeline itself
    pub plugin: Option<String>,
    pub exchange: Option<Arc<ExchangeSnapshot>>,
    pub timestamp: DateTime<Utc>,
}

impl RecordedLogEntry {
    pub fn new(category: MessageType, message: impl Into<String>) -> Self {
        Self {
            category,
            message: vec![message.into()],
            plugin: None,
            exchange: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.message.push(line.into());
        self
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    pub fn with_exchange(mut self, exchange: Arc<ExchangeSnapshot>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn text(&self) -> String {
        self.message.join(" ")
    }
}
