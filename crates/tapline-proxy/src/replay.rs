//! Replays a recorded session file through a pipeline.

use crate::exchange::{flexible_headers, Headers, InterceptedExchange};
use crate::pipeline::{DispatchOutcome, PluginPipeline, RecordingArgs};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to read session file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid session file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One request of a session file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default, with = "flexible_headers")]
    pub headers: Headers,
    /// Strings are sent verbatim, anything else as JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl SessionRequest {
    pub fn to_exchange(&self) -> InterceptedExchange {
        let exchange =
            InterceptedExchange::new(&self.method, self.url.clone()).with_headers(self.headers.clone());
        match &self.body {
            None | Some(Value::Null) => exchange,
            Some(Value::String(text)) => exchange.with_body(text.clone()),
            Some(other) => exchange.with_body(other.to_string()),
        }
    }
}

pub fn load_session(path: &Path) -> Result<Vec<SessionRequest>, SessionError> {
    let text = std::fs::read_to_string(path).map_err(|source| SessionError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| SessionError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Result of one replayed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedExchange {
    pub method: String,
    pub url: String,
    pub outcome: DispatchOutcome,
    pub status: Option<u16>,
}

/// Run every request through the pipeline inside one recording session.
///
/// Requests nobody answers are not forwarded; they are reported as passed
/// through with no status.
pub async fn replay(
    pipeline: &PluginPipeline,
    requests: &[SessionRequest],
) -> (Vec<ReplayedExchange>, Option<RecordingArgs>) {
    pipeline.start_recording();
    let mut results = Vec::with_capacity(requests.len());
    for request in requests {
        let mut exchange = request.to_exchange();
        let outcome = pipeline.dispatch_before_request(&mut exchange).await;
        pipeline.dispatch_after_response(&exchange).await;
        results.push(ReplayedExchange {
            method: exchange.method().to_string(),
            url: exchange.url().to_string(),
            status: exchange.response().map(|r| r.status),
            outcome,
        });
    }
    let args = pipeline.stop_recording().await;
    (results, args)
}
