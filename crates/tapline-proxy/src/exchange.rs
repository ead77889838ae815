//! The intercepted exchange: one request and, once a plugin commits one, its response.
//!
//! The network engine creates an [`InterceptedExchange`] when a request arrives.
//! Plugins never mutate the response directly; they go through
//! [`InterceptedExchange::respond`], which enforces the single-writer contract
//! backed by [`ResponseState`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Opaque per-connection handle used to correlate a request with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single header line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Ordered header list. Names compare case-insensitively, insertion order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append without touching existing values of the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Replace every value of `name` with a single one, keeping the position of
    /// the first occurrence.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter().position(|h| h.name.eq_ignore_ascii_case(&name)) {
            Some(first) => {
                self.0[first].value = value;
                let mut index = 0;
                self.0.retain(|h| {
                    let keep = index <= first || !h.name.eq_ignore_ascii_case(&name);
                    index += 1;
                    keep
                });
            }
            None => self.append(name, value),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|h| !h.name.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|h| (h.name.as_str(), h.value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// Headers accepted as `[{"name","value"}]` or `{"name": "value"}`.
pub mod flexible_headers {
    use super::{Header, Headers};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::{Map, Value};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        List(Vec<Header>),
        Map(Map<String, Value>),
    }

    pub fn serialize<S: Serializer>(headers: &Headers, serializer: S) -> Result<S::Ok, S::Error> {
        headers.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Headers, D::Error> {
        let headers = match Option::<Repr>::deserialize(deserializer)? {
            None => Headers::new(),
            Some(Repr::List(list)) => list.into_iter().map(|h| (h.name, h.value)).collect(),
            Some(Repr::Map(map)) => map
                .into_iter()
                .map(|(name, value)| {
                    let value = match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (name, value)
                })
                .collect(),
        };
        Ok(headers)
    }
}

/// Request half of an exchange.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    /// Upper-cased HTTP method
    pub method: String,
    /// Absolute URL
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl ExchangeRequest {
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Response half of an exchange, either committed by a plugin or observed from upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl ExchangeResponse {
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// "Has a response been set" flag shared between the exchange and the pipeline.
#[derive(Debug, Default)]
pub struct ResponseState {
    has_been_set: AtomicBool,
}

impl ResponseState {
    pub fn is_set(&self) -> bool {
        self.has_been_set.load(Ordering::Acquire)
    }

    /// Flip the flag from unset to set. Returns false when someone got there first.
    pub fn try_set(&self) -> bool {
        self.has_been_set
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A plugin attempted to commit a second response for the same exchange.
#[derive(Debug, Clone, thiserror::Error)]
#[error("plugin '{plugin}' tried to commit a response already committed by '{committed_by}'")]
pub struct ContractViolation {
    pub plugin: String,
    pub committed_by: String,
}

/// One request observed by the proxy plus the response committed for it, if any.
#[derive(Debug)]
pub struct InterceptedExchange {
    session: SessionId,
    request: ExchangeRequest,
    response: Option<ExchangeResponse>,
    committed_by: Option<String>,
    state: Arc<ResponseState>,
}

impl InterceptedExchange {
    pub fn new(method: impl AsRef<str>, url: impl Into<String>) -> Self {
        Self {
            session: SessionId::next(),
            request: ExchangeRequest {
                method: method.as_ref().to_ascii_uppercase(),
                url: url.into(),
                headers: Headers::new(),
                body: Bytes::new(),
            },
            response: None,
            committed_by: None,
            state: Arc::new(ResponseState::default()),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.request.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = body.into();
        self
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn request(&self) -> &ExchangeRequest {
        &self.request
    }

    pub fn method(&self) -> &str {
        &self.request.method
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn response(&self) -> Option<&ExchangeResponse> {
        self.response.as_ref()
    }

    /// Name of the plugin that committed the response.
    pub fn committed_by(&self) -> Option<&str> {
        self.committed_by.as_deref()
    }

    pub fn response_state(&self) -> &Arc<ResponseState> {
        &self.state
    }

    pub fn has_response(&self) -> bool {
        self.state.is_set()
    }

    /// Commit a response on behalf of `plugin`. Only the first commit wins.
    pub fn respond(
        &mut self,
        plugin: &str,
        response: ExchangeResponse,
    ) -> Result<(), ContractViolation> {
        if !self.state.try_set() {
            return Err(ContractViolation {
                plugin: plugin.to_string(),
                committed_by: self
                    .committed_by
                    .clone()
                    .unwrap_or_else(|| "<unknown>".to_string()),
            });
        }
        self.committed_by = Some(plugin.to_string());
        self.response = Some(response);
        Ok(())
    }

    /// Attach the upstream response of a passed-through exchange.
    /// Ignored once a plugin has committed a response.
    pub fn set_upstream_response(&mut self, response: ExchangeResponse) -> bool {
        if self.state.is_set() {
            return false;
        }
        self.response = Some(response);
        true
    }

    /// Immutable copy suitable for the recording log.
    pub fn snapshot(&self) -> ExchangeSnapshot {
        ExchangeSnapshot {
            session: self.session,
            request: self.request.clone(),
            response: self.response.clone(),
        }
    }
}

/// Frozen view of an exchange referenced by log entries.
#[derive(Debug, Clone)]
pub struct ExchangeSnapshot {
    pub session: SessionId,
    pub request: ExchangeRequest,
    pub response: Option<ExchangeResponse>,
}
