//! Mock rule matching.
//!
//! Rules come from a JSON file and are matched first-wins in declaration
//! order. A rule can be limited to the nth matching request and to requests
//! whose body contains a fragment. Batch requests are answered per
//! sub-operation with one composite response.
//!
//! ## Module Structure
//!
//! - `types`: the rules file format
//! - `source`: compiled rule sets and [`RuleSource`] snapshots
//! - `counter`: nth-call bookkeeping
//! - `body`: `@file` bodies and `@dynamic.*` tokens
//! - `engine`: [`MockMatchingEngine`]
//! - `watcher`: hot reload of the rules file
//! - `plugin`: [`MockResponsePlugin`]

mod body;
mod counter;
mod engine;
mod error;
mod plugin;
mod source;
mod types;
mod watcher;

pub use body::{
    file_reference, render_body, substitute_tokens, BuiltinTokens, DynamicTokenProvider,
    TokenContext,
};
pub use counter::{Eligibility, MockApplicationCounter};
pub use engine::{MockMatchingEngine, MockOutcome, MockSettings};
pub use error::MockError;
pub use plugin::{MockResponseConfig, MockResponsePlugin, MOCK_PLUGIN_NAME};
pub use source::{CompiledRule, FileRuleSource, RuleSet, RuleSource, StaticRuleSource};
pub use types::{MockRequest, MockResponse, MockRule, RuleFile};
pub use watcher::{RuleFileWatcher, DEFAULT_DEBOUNCE};
