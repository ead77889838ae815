use super::plugin::PluginEvent;
use crate::exchange::ContractViolation;

/// Diagnostics produced while registering plugins or dispatching events.
///
/// None of these abort the pipeline; they are logged and the offending plugin
/// is skipped or disabled.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("plugin '{plugin}' failed to register: {source}")]
    Setup {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("plugin '{plugin}' failed handling {}: {source}", event.as_str())]
    Handler {
        plugin: String,
        event: PluginEvent,
        #[source]
        source: anyhow::Error,
    },
    #[error("plugin '{plugin}' panicked handling {}: {message}", event.as_str())]
    Panicked {
        plugin: String,
        event: PluginEvent,
        message: String,
    },
    #[error("invalid watch pattern for plugin '{plugin}': {source}")]
    WatchPattern {
        plugin: String,
        #[source]
        source: regex::Error,
    },
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}
