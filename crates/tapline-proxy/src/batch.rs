//! Batch request decomposition and composite response assembly.
//!
//! A batch request is a `POST` to a URL whose path ends with `/$batch`; its
//! body lists sub-operations as `{"requests":[{"id","method","url"}]}`.
//! Relative sub-URLs resolve against the batch URL's origin and version
//! segment, so `/me` under `https://api.test/v1.0/$batch` becomes
//! `https://api.test/v1.0/me`.

use crate::exchange::ExchangeResponse;
use hyper::Uri;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

const BATCH_SEGMENT: &str = "$batch";

/// One sub-operation of a batch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOperation {
    pub id: String,
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Serialized sub-request body, when the item carried one
    pub body: Option<String>,
}

#[derive(Deserialize)]
struct BatchRequestBody {
    requests: Vec<BatchRequestItem>,
}

#[derive(Deserialize)]
struct BatchRequestItem {
    #[serde(deserialize_with = "id_as_string")]
    id: String,
    method: String,
    url: String,
    #[serde(default)]
    body: Option<Value>,
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "batch id must be a string or number, got {other}"
        ))),
    }
}

/// True when the URL path ends with `/$batch`.
pub fn is_batch_url(url: &str) -> bool {
    match url.parse::<Uri>() {
        Ok(uri) => uri.path().trim_end_matches('/').ends_with("/$batch"),
        Err(_) => false,
    }
}

pub struct BatchExpander;

impl BatchExpander {
    /// Decompose a batch body into its operations, in body order.
    ///
    /// Returns an empty list when the URL is not a batch endpoint or the body is
    /// malformed.
    pub fn expand(batch_url: &str, body: &[u8]) -> Vec<BatchOperation> {
        let Some(base) = Self::base_url(batch_url) else {
            return Vec::new();
        };
        let parsed: BatchRequestBody = match serde_json::from_slice(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(url = %batch_url, "Ignoring malformed batch body: {e}");
                return Vec::new();
            }
        };
        parsed
            .requests
            .into_iter()
            .map(|item| BatchOperation {
                id: item.id,
                method: item.method.to_ascii_uppercase(),
                url: resolve(&base, &item.url),
                body: item.body.map(|b| match b {
                    Value::String(s) => s,
                    other => other.to_string(),
                }),
            })
            .collect()
    }

    /// `scheme://authority/<prefix up to the version segment>`, without a trailing slash.
    fn base_url(batch_url: &str) -> Option<String> {
        let uri = batch_url.parse::<Uri>().ok()?;
        let scheme = uri.scheme_str()?;
        let authority = uri.authority()?;
        let path = uri.path().trim_end_matches('/');
        let prefix = path.strip_suffix(BATCH_SEGMENT)?;
        let prefix = prefix.trim_end_matches('/');
        Some(format!("{scheme}://{authority}{prefix}"))
    }
}

fn resolve(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    format!("{base}/{}", url.trim_start_matches('/'))
}

/// One entry of a composite batch response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResponseEntry {
    pub id: String,
    pub status: u16,
    pub headers: Map<String, Value>,
    pub body: Value,
}

impl BatchResponseEntry {
    /// Wrap a synthesized response. JSON bodies are embedded as values, anything
    /// else as a string; bodies that are not valid UTF-8 (binary `@file`
    /// bodies) are converted lossily.
    ///
    /// Repeated header names are folded into one entry under the first
    /// spelling, values joined with `", "`.
    pub fn from_response(id: &str, response: &ExchangeResponse) -> Self {
        let mut headers = Map::new();
        for (name, value) in response.headers.iter() {
            let existing = headers
                .iter_mut()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v);
            match existing {
                Some(Value::String(joined)) => {
                    joined.push_str(", ");
                    joined.push_str(value);
                }
                _ => {
                    headers.insert(name.to_string(), Value::String(value.to_string()));
                }
            }
        }
        let body = if response.body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&response.body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&response.body).into_owned())
            })
        };
        Self {
            id: id.to_string(),
            status: response.status,
            headers,
            body,
        }
    }
}

/// `{"responses": [...]}` preserving entry order.
pub fn composite_body(entries: &[BatchResponseEntry]) -> Value {
    serde_json::json!({ "responses": entries })
}
