//! Response body resolution: `@file` references and `@dynamic.*` tokens.

use bytes::Bytes;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::path::Path;
use tracing::error;

const DYNAMIC_PREFIX: &str = "@dynamic";

static DYNAMIC_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@dynamic\.([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Request details available to token providers.
#[derive(Debug, Clone, Copy)]
pub struct TokenContext<'a> {
    pub method: &'a str,
    pub url: &'a str,
}

/// Resolves `@dynamic.<name>` tokens. `None` leaves the token in place.
pub trait DynamicTokenProvider: Send + Sync {
    fn resolve(&self, name: &str, ctx: &TokenContext<'_>) -> Option<String>;
}

/// `requestId`, `date`, `url` and `method`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinTokens;

impl DynamicTokenProvider for BuiltinTokens {
    fn resolve(&self, name: &str, ctx: &TokenContext<'_>) -> Option<String> {
        match name {
            "requestId" => Some(uuid::Uuid::new_v4().to_string()),
            "date" => Some(Utc::now().to_rfc2822()),
            "url" => Some(ctx.url.to_string()),
            "method" => Some(ctx.method.to_string()),
            _ => None,
        }
    }
}

pub fn substitute_tokens(
    text: &str,
    provider: &dyn DynamicTokenProvider,
    ctx: &TokenContext<'_>,
) -> String {
    DYNAMIC_TOKEN
        .replace_all(text, |caps: &Captures| {
            provider
                .resolve(&caps[1], ctx)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Turn a rule's body template into response bytes.
///
/// A string starting with `@` (other than `@dynamic`) names a file relative to
/// `base_dir`, loaded verbatim. If it cannot be read the literal token becomes
/// the body and an error is logged. Tokens are substituted afterwards in any
/// UTF-8 body.
///
/// The file read blocks; async callers run this on the blocking pool.
pub fn render_body(
    template: &Value,
    base_dir: &Path,
    provider: &dyn DynamicTokenProvider,
    ctx: &TokenContext<'_>,
) -> Bytes {
    let raw: Bytes = match (template, file_reference(template)) {
        (Value::Null, _) => return Bytes::new(),
        (Value::String(s), Some(relative)) => {
            let path = base_dir.join(relative);
            match std::fs::read(&path) {
                Ok(contents) => Bytes::from(contents),
                Err(e) => {
                    error!(
                        path = %path.display(),
                        "Failed to load mock body file: {e}; returning '{s}' as the body"
                    );
                    Bytes::from(s.clone())
                }
            }
        }
        (Value::String(s), None) => Bytes::from(s.clone()),
        (other, _) => Bytes::from(other.to_string()),
    };

    match std::str::from_utf8(&raw) {
        Ok(text) if text.contains(DYNAMIC_PREFIX) => {
            Bytes::from(substitute_tokens(text, provider, ctx))
        }
        _ => raw,
    }
}

/// Relative path named by an `@file` body, if the body is one.
pub fn file_reference(template: &Value) -> Option<&str> {
    match template {
        Value::String(s) if s.starts_with('@') && !s.starts_with(DYNAMIC_PREFIX) => {
            Some(s[1..].trim())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    const CTX: TokenContext<'static> = TokenContext {
        method: "GET",
        url: "https://api.test/me",
    };

    #[test]
    fn test_inline_values() {
        let dir = Path::new(".");
        assert_eq!(render_body(&Value::Null, dir, &BuiltinTokens, &CTX), Bytes::new());
        assert_eq!(
            render_body(&serde_json::json!({"a": 1}), dir, &BuiltinTokens, &CTX),
            Bytes::from_static(br#"{"a":1}"#)
        );
        assert_eq!(
            render_body(&Value::String("plain".into()), dir, &BuiltinTokens, &CTX),
            Bytes::from_static(b"plain")
        );
    }

    #[test]
    fn test_file_reference_loaded_verbatim() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("photo.bin"), [0xffu8, 0x00, 0x10]).unwrap();
        let body = render_body(
            &Value::String("@photo.bin".into()),
            dir.path(),
            &BuiltinTokens,
            &CTX,
        );
        assert_eq!(body.as_ref(), &[0xff, 0x00, 0x10]);
    }

    #[test]
    #[traced_test]
    fn test_missing_file_falls_back_to_literal() {
        let dir = TempDir::new().unwrap();
        let body = render_body(
            &Value::String("@missing.json".into()),
            dir.path(),
            &BuiltinTokens,
            &CTX,
        );
        assert_eq!(body, Bytes::from_static(b"@missing.json"));
        assert!(logs_contain("Failed to load mock body file"));
    }

    #[test]
    fn test_dynamic_tokens() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("body.json"),
            r#"{"url":"@dynamic.url","m":"@dynamic.method","x":"@dynamic.unknown"}"#,
        )
        .unwrap();
        let body = render_body(
            &Value::String("@body.json".into()),
            dir.path(),
            &BuiltinTokens,
            &CTX,
        );
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["url"], "https://api.test/me");
        assert_eq!(value["m"], "GET");
        assert_eq!(value["x"], "@dynamic.unknown");
    }

    #[test]
    fn test_request_id_and_date_tokens() {
        let text = substitute_tokens("@dynamic.requestId|@dynamic.date", &BuiltinTokens, &CTX);
        let (id, date) = text.split_once('|').unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
        assert!(chrono::DateTime::parse_from_rfc2822(date).is_ok());
    }

    #[test]
    fn test_dynamic_prefix_is_not_a_file() {
        let body = render_body(
            &Value::String("@dynamic.method".into()),
            Path::new("."),
            &BuiltinTokens,
            &CTX,
        );
        assert_eq!(body, Bytes::from_static(b"GET"));
    }
}
