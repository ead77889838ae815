//! URL tokenization for permission lookups.
//!
//! Identifier path segments are replaced with `{id}` so that calls against
//! different resources of the same kind collapse to one [`OperationKey`].

use hyper::Uri;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ID_PLACEHOLDER: &str = "{id}";

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});
static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static EMAIL_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@/\s]+@[^@/\s]+\.[^@/\s]+$").unwrap());
// users('someone') / items(42)
static KEY_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_.]*)\((.+)\)$").unwrap());

/// Canonical form of an API call: method plus tokenized path.
///
/// Serializes as `"METHOD /path"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct OperationKey {
    pub method: String,
    pub path: String,
}

impl OperationKey {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: tokenize_path(path),
        }
    }

    /// Key for an absolute (or origin-relative) URL. Query and fragment are dropped.
    pub fn from_url(method: &str, url: &str) -> Self {
        let path = match url.parse::<Uri>() {
            Ok(uri) => uri.path().to_string(),
            Err(_) => strip_origin(url.split(['?', '#']).next().unwrap_or_default()).to_string(),
        };
        Self::new(method, &path)
    }
}

// Fallback for URLs hyper refuses to parse, e.g. ones carrying `{id}` placeholders.
fn strip_origin(url: &str) -> &str {
    match url.find("://") {
        Some(i) => {
            let rest = &url[i + 3..];
            rest.find('/').map(|j| &rest[j..]).unwrap_or("/")
        }
        None => url,
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid operation '{0}', expected 'METHOD /path'")]
pub struct ParseOperationError(String);

impl FromStr for OperationKey {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (method, url) = s
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| ParseOperationError(s.to_string()))?;
        let url = url.trim();
        if method.is_empty() || url.is_empty() {
            return Err(ParseOperationError(s.to_string()));
        }
        Ok(Self::from_url(method, url))
    }
}

impl From<OperationKey> for String {
    fn from(key: OperationKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for OperationKey {
    type Error = ParseOperationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Replace identifier segments of a path with the placeholder.
pub fn tokenize_path(path: &str) -> String {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(tokenize_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn tokenize_segment(segment: &str) -> String {
    if segment.is_empty() || segment == ID_PLACEHOLDER {
        return segment.to_string();
    }
    if NUMERIC_SEGMENT.is_match(segment)
        || UUID_SEGMENT.is_match(segment)
        || EMAIL_SEGMENT.is_match(segment)
    {
        return ID_PLACEHOLDER.to_string();
    }
    if let Some(caps) = KEY_SEGMENT.captures(segment) {
        return format!("{}({ID_PLACEHOLDER})", &caps[1]);
    }
    segment.to_string()
}

/// `scheme://authority` of an absolute URL, used to group operations by API surface.
pub fn api_origin(url: &str) -> Option<String> {
    let uri = url.parse::<Uri>().ok()?;
    let scheme = uri.scheme_str()?;
    let authority = uri.authority()?;
    Some(format!("{scheme}://{}", authority.as_str().to_ascii_lowercase()))
}
