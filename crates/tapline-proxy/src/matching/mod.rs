//! URL pattern matching and tokenization shared by the pipeline, the mock
//! engine and the permission solver.

mod tokenize;
mod url;

pub use tokenize::{api_origin, tokenize_path, OperationKey, ParseOperationError, ID_PLACEHOLDER};
pub use url::{UrlMatcher, UrlMatcherSet};
