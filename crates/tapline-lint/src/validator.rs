//! Validation logic for mock rule files.

use crate::types::{LintIssue, LintResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use tapline_proxy::matching::UrlMatcher;
use tapline_proxy::mocks::file_reference;

const METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "TRACE", "CONNECT",
];

static HEADER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[!#$%&'*+\-.^_`|~0-9A-Za-z]+$").unwrap());

/// What the ordering checks need to know about one rule.
struct RuleShape {
    index: usize,
    method: String,
    matcher: UrlMatcher,
    /// No `nth` and no body fragment: matches every request its URL and method match
    unconditional: bool,
}

impl RuleShape {
    fn is_catch_all(&self) -> bool {
        self.matcher.matches("https://a.invalid/x") && self.matcher.matches("http://b.invalid:8080/y/z")
    }

    /// Every request `later` matches is already taken by `self`.
    fn shadows(&self, later: &RuleShape) -> bool {
        self.unconditional
            && self.method == later.method
            && self.matcher.matches(later.matcher.pattern())
    }
}

/// Validate a parsed rule file. `base_dir` resolves `@file` bodies.
pub fn validate_rule_file(file: &Path, value: &Value, base_dir: &Path, result: &mut LintResult) {
    let rules = match value {
        Value::Array(rules) => rules,
        Value::Object(obj) => match obj.get("mocks").and_then(Value::as_array) {
            Some(rules) => rules,
            None => {
                result.add_issue(
                    LintIssue::error("E003", "Rule file object has no 'mocks' array", file)
                        .with_suggestion("Use {\"mocks\": [...]} or a bare array of rules"),
                );
                return;
            }
        },
        _ => {
            result.add_issue(LintIssue::error(
                "E003",
                "Rule file must be an array of rules or an object with 'mocks'",
                file,
            ));
            return;
        }
    };

    let shapes: Vec<RuleShape> = rules
        .iter()
        .enumerate()
        .filter_map(|(idx, rule)| validate_rule(file, rule, idx, base_dir, result))
        .collect();
    check_ordering(file, &shapes, result);
}

/// Validate one rule. Returns its shape when the request part is usable.
fn validate_rule(
    file: &Path,
    rule: &Value,
    idx: usize,
    base_dir: &Path,
    result: &mut LintResult,
) -> Option<RuleShape> {
    let location = format!("mocks[{idx}]");

    if let Some(response) = rule.get("response") {
        validate_response(file, response, &format!("{location}.response"), base_dir, result);
    }

    let Some(request) = rule.get("request").filter(|r| r.is_object()) else {
        result.add_issue(
            LintIssue::error("E004", "Rule has no 'request' object", file).with_location(location),
        );
        return None;
    };

    let url = match request.get("url").and_then(Value::as_str) {
        Some(url) if !url.trim().is_empty() => url,
        _ => {
            result.add_issue(
                LintIssue::error("E004", "Rule request has no 'url'", file)
                    .with_location(format!("{location}.request"))
                    .with_suggestion("Add a URL or a wildcard pattern such as \"https://host/*\""),
            );
            return None;
        }
    };
    let matcher = match UrlMatcher::compile(url) {
        Ok(matcher) => matcher,
        Err(e) => {
            result.add_issue(
                LintIssue::error("E009", format!("Invalid URL pattern: {e}"), file)
                    .with_location(format!("{location}.request.url")),
            );
            return None;
        }
    };

    let method = match request.get("method") {
        None => "GET".to_string(),
        Some(Value::String(m)) if METHODS.contains(&m.to_ascii_uppercase().as_str()) => {
            m.to_ascii_uppercase()
        }
        Some(other) => {
            result.add_issue(
                LintIssue::error("E005", format!("Invalid HTTP method: {other}"), file)
                    .with_location(format!("{location}.request.method"))
                    .with_suggestion(format!("Use one of {}", METHODS.join(", "))),
            );
            return None;
        }
    };

    let nth = request.get("nth");
    if let Some(nth) = nth {
        if !nth.as_u64().is_some_and(|n| n >= 1) {
            result.add_issue(
                LintIssue::error("E006", format!("Invalid nth: {nth}"), file)
                    .with_location(format!("{location}.request.nth"))
                    .with_suggestion("nth is a 1-based occurrence count"),
            );
        }
    }

    Some(RuleShape {
        index: idx,
        method,
        matcher,
        unconditional: nth.is_none() && request.get("bodyFragment").is_none(),
    })
}

/// Validate a rule's response section.
pub fn validate_response(
    file: &Path,
    response: &Value,
    location: &str,
    base_dir: &Path,
    result: &mut LintResult,
) {
    if let Some(status) = response.get("statusCode") {
        if !status.as_u64().is_some_and(|code| (100..=599).contains(&code)) {
            result.add_issue(
                LintIssue::error("E007", format!("Invalid HTTP status code: {status}"), file)
                    .with_location(format!("{location}.statusCode"))
                    .with_suggestion("Use a valid HTTP status code (100-599)"),
            );
        }
    }

    if let Some(headers) = response.get("headers") {
        validate_headers(file, headers, &format!("{location}.headers"), result);
    }

    if let Some(relative) = response.get("body").and_then(file_reference) {
        if !base_dir.join(relative).is_file() {
            result.add_issue(
                LintIssue::warning("W001", format!("Body file '{relative}' not found"), file)
                    .with_location(format!("{location}.body"))
                    .with_suggestion(format!(
                        "Paths resolve against {}; the literal token will be served",
                        base_dir.display()
                    )),
            );
        }
    }
}

/// Validate response headers, in object or `[{name, value}]` form.
pub fn validate_headers(file: &Path, headers: &Value, location: &str, result: &mut LintResult) {
    let pairs: Vec<(String, &Value)> = match headers {
        Value::Object(obj) => obj.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(list) => list
            .iter()
            .map(|h| {
                let name = h.get("name").and_then(Value::as_str).unwrap_or_default();
                (name.to_string(), h.get("value").unwrap_or(&Value::Null))
            })
            .collect(),
        _ => {
            result.add_issue(
                LintIssue::error("E008", "Headers must be an object or a list", file)
                    .with_location(location),
            );
            return;
        }
    };

    for (name, value) in pairs {
        if !HEADER_NAME.is_match(&name) {
            result.add_issue(
                LintIssue::error("E008", format!("Invalid header name '{name}'"), file)
                    .with_location(location),
            );
        }
        if !value.is_string() {
            result.add_issue(
                LintIssue::warning(
                    "W004",
                    format!("Header '{name}' value is not a string"),
                    file,
                )
                .with_location(format!("{location}.{name}"))
                .with_suggestion(format!("Change to: \"{name}\": \"{}\"", value)),
            );
        }
    }
}

fn check_ordering(file: &Path, rules: &[RuleShape], result: &mut LintResult) {
    let last = rules.last().map(|r| r.index);
    for (pos, rule) in rules.iter().enumerate() {
        if rule.unconditional && rule.is_catch_all() && Some(rule.index) != last {
            result.add_issue(
                LintIssue::warning(
                    "W003",
                    format!(
                        "Catch-all rule '{}' is not last; later {} rules never match",
                        rule.matcher.pattern(),
                        rule.method
                    ),
                    file,
                )
                .with_location(format!("mocks[{}]", rule.index))
                .with_suggestion("Move the catch-all rule to the end of the file"),
            );
        }

        let shadowed_by = rules[..pos]
            .iter()
            .find(|earlier| !earlier.is_catch_all() && earlier.shadows(rule));
        if let Some(earlier) = shadowed_by {
            result.add_issue(
                LintIssue::warning(
                    "W002",
                    format!(
                        "Rule is unreachable: mocks[{}] '{}' matches first",
                        earlier.index,
                        earlier.matcher.pattern()
                    ),
                    file,
                )
                .with_location(format!("mocks[{}]", rule.index))
                .with_suggestion("Reorder the rules or add nth to the earlier one"),
            );
        }
    }
}
