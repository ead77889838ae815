//! Rule sets and the sources that hand out atomic snapshots of them.

use super::counter::Eligibility;
use super::error::MockError;
use super::types::{MockRule, RuleFile};
use crate::matching::UrlMatcher;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// A rule with its URL pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Position in the rules file
    pub index: usize,
    pub rule: MockRule,
    pub method: String,
    pub matcher: UrlMatcher,
    counter_key: String,
}

impl CompiledRule {
    /// Counter key, `"<index>:<METHOD> <pattern>"`. Unique per rule, and
    /// stable across reloads that keep the rule in place.
    pub fn counter_key(&self) -> &str {
        &self.counter_key
    }

    /// Method, URL and body-fragment check. The nth condition is evaluated by
    /// the caller against the counter.
    pub fn matches(&self, method: &str, url: &str, body: Option<&str>) -> bool {
        if !self.method.eq_ignore_ascii_case(method) || !self.matcher.matches(url) {
            return false;
        }
        match &self.rule.request.body_fragment {
            Some(fragment) => body.map(|b| b.contains(fragment.as_str())).unwrap_or(false),
            None => true,
        }
    }

    pub fn eligibility(&self, method: &str, url: &str, body: Option<&str>) -> Eligibility {
        if !self.matches(method, url, body) {
            return Eligibility::Skip;
        }
        match self.rule.request.nth {
            Some(nth) => Eligibility::Nth(nth),
            None => Eligibility::Always,
        }
    }
}

/// Immutable, ordered rule list plus the directory `@file` bodies resolve against.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    base_dir: PathBuf,
}

impl RuleSet {
    pub fn new(rules: Vec<MockRule>, base_dir: impl Into<PathBuf>) -> Result<Self, MockError> {
        let rules = rules
            .into_iter()
            .enumerate()
            .map(|(index, rule)| {
                let matcher = UrlMatcher::compile(&rule.request.url).map_err(|source| {
                    MockError::Pattern {
                        index,
                        pattern: rule.request.url.clone(),
                        source,
                    }
                })?;
                let method = rule.request.method.to_ascii_uppercase();
                Ok(CompiledRule {
                    index,
                    counter_key: format!("{index}:{method} {}", rule.request.url),
                    method,
                    rule,
                    matcher,
                })
            })
            .collect::<Result<Vec<_>, MockError>>()?;
        Ok(Self {
            rules,
            base_dir: base_dir.into(),
        })
    }

    pub fn empty(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            rules: Vec::new(),
            base_dir: base_dir.into(),
        }
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, MockError> {
        let file: RuleFile = serde_json::from_str(text).map_err(|source| MockError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(file.into_rules(), parent_dir(path))
    }

    pub fn from_file(path: &Path) -> Result<Self, MockError> {
        let text = std::fs::read_to_string(path).map_err(|source| MockError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Provides the current rule set. Snapshots are never partially updated.
pub trait RuleSource: Send + Sync {
    fn snapshot(&self) -> Arc<RuleSet>;
}

/// Fixed in-memory rules.
pub struct StaticRuleSource(Arc<RuleSet>);

impl StaticRuleSource {
    pub fn new(rules: RuleSet) -> Self {
        Self(Arc::new(rules))
    }
}

impl RuleSource for StaticRuleSource {
    fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.0)
    }
}

/// Rules loaded from a JSON file, reloadable in place.
pub struct FileRuleSource {
    path: PathBuf,
    current: RwLock<Arc<RuleSet>>,
}

impl FileRuleSource {
    /// Load `path`. A missing or malformed file logs an error and yields an
    /// empty rule set.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let rules = match RuleSet::from_file(&path) {
            Ok(rules) => {
                info!(path = %path.display(), rules = rules.len(), "Loaded mocks");
                rules
            }
            Err(e) => {
                error!("{e}; no mocks loaded");
                RuleSet::empty(parent_dir(&path))
            }
        };
        Self {
            path,
            current: RwLock::new(Arc::new(rules)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file and swap the new rules in. On failure the previous
    /// rules stay active.
    pub fn reload(&self) -> Result<usize, MockError> {
        let rules = RuleSet::from_file(&self.path)?;
        let count = rules.len();
        *self.current.write() = Arc::new(rules);
        info!(path = %self.path.display(), rules = count, "Reloaded mocks");
        Ok(count)
    }
}

impl RuleSource for FileRuleSource {
    fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read())
    }
}
