//! Plugin pipeline and event bus.
//!
//! Plugins register in a fixed order and subscribe to lifecycle events. The
//! pipeline delivers each event to subscribers in that order and enforces the
//! single-writer response contract on before-request.
//!
//! ## Module Structure
//!
//! - `plugin`: the [`Plugin`] trait, events and event arguments
//! - `bus`: ordered, URL-scoped subscriber lists
//! - `dispatch`: [`PluginPipeline`] and its builder
//! - `error`: diagnostics produced during registration and dispatch

mod bus;
mod dispatch;
mod error;
mod plugin;

#[cfg(test)]
mod tests;

pub use bus::{EventBus, Subscriber};
pub use dispatch::{DispatchOutcome, PipelineBuilder, PluginPipeline};
pub use error::PipelineError;
pub use plugin::{
    EventSet, GlobalData, Plugin, PluginEvent, ProxyOptions, RecordingArgs,
};
