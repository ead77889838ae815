//! Mock rule file linter for Tapline.
//!
//! Catches rule files the proxy would reject and rules that load but can
//! never match. Usable as a library or through the `tapline-lint` binary.
//!
//! # Example
//!
//! ```no_run
//! use tapline_lint::{lint_directory, lint_file};
//! use std::path::Path;
//!
//! let result = lint_file(Path::new("mocks.json"));
//! let all = lint_directory(Path::new("./mocks"));
//!
//! if result.has_errors() || all.has_errors() {
//!     eprintln!("Found {} errors", result.errors + all.errors);
//! }
//! ```

mod types;
mod validator;

use std::path::Path;

pub use types::{LintIssue, LintResult, Severity};
pub use validator::{validate_headers, validate_response, validate_rule_file};

/// Lint a single rule file. `@file` bodies resolve against its directory.
pub fn lint_file(path: &Path) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            result.add_issue(LintIssue::error(
                "E001",
                format!("Failed to read file: {e}"),
                path,
            ));
            return result;
        }
    };

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    lint_str(&content, path, base_dir, result)
}

/// Lint all JSON files in a directory (non-recursive).
pub fn lint_directory(path: &Path) -> LintResult {
    let mut result = LintResult::new();

    let entries = match std::fs::read_dir(path) {
        Ok(e) => e,
        Err(e) => {
            result.add_issue(LintIssue::error(
                "E001",
                format!("Failed to read directory: {e}"),
                path,
            ));
            return result;
        }
    };

    let mut files: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|e| e == "json"))
        .collect();
    files.sort();
    for file in files {
        result.merge(lint_file(&file));
    }
    result
}

/// Lint rule JSON held in memory.
pub fn lint_json(json: &str, source_name: &str, base_dir: &Path) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;
    lint_str(json, Path::new(source_name), base_dir, result)
}

fn lint_str(json: &str, path: &Path, base_dir: &Path, mut result: LintResult) -> LintResult {
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(value) => validate_rule_file(path, &value, base_dir, &mut result),
        Err(e) => result.add_issue(
            LintIssue::error("E002", format!("Invalid JSON: {e}"), path)
                .with_suggestion("Check for JSON syntax errors"),
        ),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(lint_file(&dir.path().join("absent.json")).codes(), vec!["E001"]);

        std::fs::write(dir.path().join("broken.json"), "[{").unwrap();
        std::fs::write(
            dir.path().join("good.json"),
            r#"[{"request": {"url": "https://api.test/me"}}]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let result = lint_directory(dir.path());
        assert_eq!(result.files_checked, 2);
        assert_eq!(result.codes(), vec!["E002"]);
    }

    #[test]
    fn test_lint_json_in_memory() {
        let result = lint_json(
            r#"{"mocks": [{"request": {"url": "https://api.test/me"}, "response": {"body": "@me.json"}}]}"#,
            "inline",
            Path::new("/nonexistent"),
        );
        assert_eq!(result.codes(), vec!["W001"]);
        assert!(!result.has_errors());
    }
}
