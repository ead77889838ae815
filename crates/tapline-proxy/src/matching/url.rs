use regex::Regex;
use std::fmt;

/// Compiled glob-style URL pattern. `*` matches any run of characters, `/` included.
#[derive(Clone)]
pub struct UrlMatcher {
    pattern: String,
    kind: MatcherKind,
}

#[derive(Clone)]
enum MatcherKind {
    Any,
    Exact,
    Wildcard(Regex),
}

impl UrlMatcher {
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        if pattern == "*" {
            return Ok(Self {
                pattern: pattern.to_string(),
                kind: MatcherKind::Any,
            });
        }
        if !pattern.contains('*') {
            return Ok(Self {
                pattern: pattern.to_string(),
                kind: MatcherKind::Exact,
            });
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$"))?;
        Ok(Self {
            pattern: pattern.to_string(),
            kind: MatcherKind::Wildcard(regex),
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        match &self.kind {
            MatcherKind::Any => true,
            MatcherKind::Exact => url == self.pattern,
            MatcherKind::Wildcard(regex) => regex.is_match(url),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn has_wildcard(&self) -> bool {
        !matches!(self.kind, MatcherKind::Exact)
    }
}

impl fmt::Debug for UrlMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlMatcher")
            .field("pattern", &self.pattern)
            .field("wildcard", &self.has_wildcard())
            .finish()
    }
}

/// Include/exclude watch list. Patterns prefixed with `!` exclude.
///
/// A URL is watched when at least one include pattern matches and no exclude
/// pattern does. An empty set watches nothing.
#[derive(Debug, Clone, Default)]
pub struct UrlMatcherSet {
    include: Vec<UrlMatcher>,
    exclude: Vec<UrlMatcher>,
}

impl UrlMatcherSet {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let mut set = UrlMatcherSet::default();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            match pattern.strip_prefix('!') {
                Some(excluded) => set.exclude.push(UrlMatcher::compile(excluded)?),
                None => set.include.push(UrlMatcher::compile(pattern)?),
            }
        }
        Ok(set)
    }

    /// Set that watches every URL.
    pub fn watch_all() -> Self {
        Self {
            include: vec![UrlMatcher {
                pattern: "*".to_string(),
                kind: MatcherKind::Any,
            }],
            exclude: Vec::new(),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        if self.exclude.iter().any(|m| m.matches(url)) {
            return false;
        }
        self.include.iter().any(|m| m.matches(url))
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    pub fn len(&self) -> usize {
        self.include.len() + self.exclude.len()
    }
}
