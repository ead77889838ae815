//! Rule file data model.

use crate::exchange::{flexible_headers, Headers};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_method() -> String {
    "GET".to_string()
}

/// Request half of a mock rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Respond only on the nth matching request (1-based)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_fragment: Option<String>,
}

/// Response template of a mock rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, with = "flexible_headers")]
    pub headers: Headers,
    /// Inline value, or a string starting with `@` naming a file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl MockResponse {
    pub fn status(&self) -> u16 {
        self.status_code.unwrap_or(200)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockRule {
    pub request: MockRequest,
    #[serde(default)]
    pub response: MockResponse,
}

/// A rules file: either a bare array of rules or `{"mocks": [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RuleFile {
    Bare(Vec<MockRule>),
    Wrapped {
        mocks: Vec<MockRule>,
        #[serde(rename = "$schema", default)]
        _schema: Option<String>,
    },
}

impl RuleFile {
    pub fn into_rules(self) -> Vec<MockRule> {
        match self {
            RuleFile::Bare(rules) => rules,
            RuleFile::Wrapped { mocks, .. } => mocks,
        }
    }
}
