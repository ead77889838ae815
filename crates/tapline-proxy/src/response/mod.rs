//! Building committed responses and converting them for the network layer.

mod builder;
mod convert;

pub use builder::{error_body, ResponseBuilder, APPLICATION_JSON, CONTENT_TYPE};
pub use convert::{exchange_from_request, into_hyper, response_from_hyper};
