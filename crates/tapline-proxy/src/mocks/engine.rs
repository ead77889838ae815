//! Rule selection and response synthesis.

use super::body::{render_body, BuiltinTokens, DynamicTokenProvider, TokenContext};
use super::counter::MockApplicationCounter;
use super::source::{CompiledRule, RuleSet, RuleSource};
use crate::batch::{
    composite_body, is_batch_url, BatchExpander, BatchOperation, BatchResponseEntry,
};
use crate::exchange::{ExchangeRequest, ExchangeResponse};
use crate::response::{error_body, ResponseBuilder};
use std::sync::Arc;
use tracing::debug;

/// Global switches for the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockSettings {
    /// Pass everything through untouched
    pub no_mocks: bool,
    /// Answer requests without a matching rule with `502 Bad Gateway`
    pub block_unmocked_requests: bool,
}

/// Result of evaluating one request against the rules.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    /// Mocking is switched off
    Disabled,
    /// One or more rules produced the response; indexes in rules-file order
    Mocked {
        response: ExchangeResponse,
        rules: Vec<usize>,
    },
    /// No rule matched and unmocked requests are blocked
    Blocked { response: ExchangeResponse },
    /// No rule matched
    PassThrough,
}

/// Matches requests against the current rule snapshot.
///
/// Nth counters belong to the engine, not to the rule set, so they survive
/// reloads of the underlying source.
pub struct MockMatchingEngine {
    source: Arc<dyn RuleSource>,
    counter: MockApplicationCounter,
    tokens: Arc<dyn DynamicTokenProvider>,
    settings: MockSettings,
}

impl MockMatchingEngine {
    pub fn new(source: Arc<dyn RuleSource>) -> Self {
        Self {
            source,
            counter: MockApplicationCounter::new(),
            tokens: Arc::new(BuiltinTokens),
            settings: MockSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: MockSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_tokens(mut self, tokens: Arc<dyn DynamicTokenProvider>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn settings(&self) -> MockSettings {
        self.settings
    }

    pub fn counter(&self) -> &MockApplicationCounter {
        &self.counter
    }

    pub fn evaluate(&self, request: &ExchangeRequest) -> MockOutcome {
        if self.settings.no_mocks {
            return MockOutcome::Disabled;
        }
        let rules = self.source.snapshot();

        if is_batch_url(&request.url) {
            let operations = BatchExpander::expand(&request.url, &request.body);
            if !operations.is_empty() {
                return self.evaluate_batch(&rules, &operations);
            }
            debug!(url = %request.url, "Batch body had no operations; matching as a single request");
        }

        let body = request.body_str();
        match self.select(&rules, &request.method, &request.url, body) {
            Some(rule) => MockOutcome::Mocked {
                response: self.render(&rules, rule, &request.method, &request.url),
                rules: vec![rule.index],
            },
            None => self.unmatched(&request.method, &request.url),
        }
    }

    fn evaluate_batch(&self, rules: &RuleSet, operations: &[BatchOperation]) -> MockOutcome {
        let mut entries = Vec::with_capacity(operations.len());
        let mut matched = Vec::new();

        for op in operations {
            match self.select(rules, &op.method, &op.url, op.body.as_deref()) {
                Some(rule) => {
                    matched.push(rule.index);
                    let response = self.render(rules, rule, &op.method, &op.url);
                    entries.push(BatchResponseEntry::from_response(&op.id, &response));
                }
                None => {
                    let response = unmatched_response(&op.method, &op.url);
                    entries.push(BatchResponseEntry::from_response(&op.id, &response));
                }
            }
        }

        if matched.is_empty() && !self.settings.block_unmocked_requests {
            return MockOutcome::PassThrough;
        }

        let response = ResponseBuilder::new(200)
            .json_body(&composite_body(&entries))
            .build();
        if matched.is_empty() {
            MockOutcome::Blocked { response }
        } else {
            MockOutcome::Mocked {
                response,
                rules: matched,
            }
        }
    }

    /// First rule in declaration order that applies. Every matching nth rule
    /// counts the request, selected or not.
    fn select<'a>(
        &self,
        rules: &'a RuleSet,
        method: &str,
        url: &str,
        body: Option<&str>,
    ) -> Option<&'a CompiledRule> {
        self.counter.select_and_increment(
            rules.rules(),
            CompiledRule::counter_key,
            |rule| rule.eligibility(method, url, body),
        )
    }

    fn render(
        &self,
        rules: &RuleSet,
        rule: &CompiledRule,
        method: &str,
        url: &str,
    ) -> ExchangeResponse {
        let template = &rule.rule.response;
        let ctx = TokenContext { method, url };
        let body = template
            .body
            .as_ref()
            .map(|b| render_body(b, rules.base_dir(), self.tokens.as_ref(), &ctx))
            .unwrap_or_default();
        ResponseBuilder::new(template.status())
            .append_headers(&template.headers)
            .body(body)
            .build()
    }

    fn unmatched(&self, method: &str, url: &str) -> MockOutcome {
        if self.settings.block_unmocked_requests {
            MockOutcome::Blocked {
                response: unmatched_response(method, url),
            }
        } else {
            MockOutcome::PassThrough
        }
    }
}

fn unmatched_response(method: &str, url: &str) -> ExchangeResponse {
    ResponseBuilder::new(502)
        .json_body(&error_body(&format!("No mock response found for {method} {url}")))
        .build()
}
