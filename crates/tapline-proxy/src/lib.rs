//! Tapline proxy core.
//!
//! An ordered plugin pipeline for intercepted HTTP exchanges, mock rule
//! matching with hot reload, chaos plugins, and minimal-permission analysis
//! over recorded sessions. Networking and TLS belong to the embedding proxy;
//! this crate works on [`exchange::InterceptedExchange`] values and converts
//! to and from `hyper` types at the edges.

pub mod batch;
pub mod chaos;
pub mod config;
pub mod exchange;
pub mod matching;
pub mod mocks;
pub mod permissions;
pub mod pipeline;
pub mod recording;
pub mod registry;
pub mod replay;
pub mod response;

pub use config::{ConfigError, PluginEntry, ProxyConfig};
pub use exchange::{ExchangeResponse, Headers, InterceptedExchange};
pub use pipeline::{DispatchOutcome, Plugin, PluginPipeline};
pub use recording::ExchangeRecorder;
