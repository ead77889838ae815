use crate::exchange::{ExchangeResponse, Headers};
use bytes::Bytes;
use serde_json::Value;

pub const CONTENT_TYPE: &str = "content-type";
pub const APPLICATION_JSON: &str = "application/json";

/// Builds the [`ExchangeResponse`] a plugin commits.
///
/// Header names are kept as given; later headers with the same name replace
/// earlier ones. `content-type: application/json` is added at build time when a
/// body is present and no content type was set.
pub struct ResponseBuilder {
    status: u16,
    body: Option<Bytes>,
    headers: Headers,
    default_json: bool,
}

impl ResponseBuilder {
    pub fn new(status: u16) -> Self {
        ResponseBuilder {
            status,
            body: None,
            headers: Headers::new(),
            default_json: true,
        }
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the body. Strings are emitted raw, not quoted.
    pub fn json_body(mut self, value: &Value) -> Self {
        let payload = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.body = Some(Bytes::from(payload));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn merge_headers<H, K, V>(mut self, headers: H) -> Self
    where
        H: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in headers {
            self.headers.insert(key, value);
        }
        self
    }

    /// Append every header from `headers`, keeping repeated names.
    pub fn append_headers(mut self, headers: &Headers) -> Self {
        for (name, value) in headers.iter() {
            self.headers.append(name, value);
        }
        self
    }

    /// Do not add a default content type.
    pub fn raw(mut self) -> Self {
        self.default_json = false;
        self
    }

    pub fn build(mut self) -> ExchangeResponse {
        let body = self.body.unwrap_or_default();
        if self.default_json && !body.is_empty() && !self.headers.contains(CONTENT_TYPE) {
            self.headers.append(CONTENT_TYPE, APPLICATION_JSON);
        }
        ExchangeResponse {
            status: self.status,
            headers: self.headers,
            body,
        }
    }
}

/// `{"error": {"message": ...}}` body used for synthesized gateway errors.
pub fn error_body(message: &str) -> Value {
    serde_json::json!({ "error": { "message": message } })
}
