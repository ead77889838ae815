//! Ordered, best-effort dispatch of lifecycle events to registered plugins.

use super::bus::EventBus;
use super::error::PipelineError;
use super::plugin::{GlobalData, Plugin, PluginEvent, ProxyOptions, RecordingArgs};
use crate::exchange::{ContractViolation, InterceptedExchange};
use crate::matching::UrlMatcherSet;
use crate::recording::{ExchangeRecorder, MessageType, RecordedLogEntry};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to an exchange during before-request dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The URL is outside the global watch list; no plugin saw it
    NotWatched,
    /// Every plugin ran and none produced a response
    PassedThrough,
    /// A plugin committed a response
    Responded { plugin: String },
}

struct PendingPlugin {
    plugin: Arc<dyn Plugin>,
    urls_to_watch: Option<Vec<String>>,
}

/// Collects plugins in registration order, then registers them all.
pub struct PipelineBuilder {
    recorder: Arc<ExchangeRecorder>,
    options: ProxyOptions,
    plugins: Vec<PendingPlugin>,
}

impl PipelineBuilder {
    pub fn new(recorder: Arc<ExchangeRecorder>) -> Self {
        Self {
            recorder,
            options: ProxyOptions::default(),
            plugins: Vec::new(),
        }
    }

    pub fn options(mut self, options: ProxyOptions) -> Self {
        self.options = options;
        self
    }

    /// Add a plugin scoped to the global watch list.
    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(PendingPlugin {
            plugin,
            urls_to_watch: None,
        });
        self
    }

    /// Add a plugin with its own watch list.
    pub fn scoped_plugin(mut self, plugin: Arc<dyn Plugin>, urls_to_watch: Vec<String>) -> Self {
        self.plugins.push(PendingPlugin {
            plugin,
            urls_to_watch: Some(urls_to_watch),
        });
        self
    }

    /// Run every plugin's registration in order. A failing plugin is disabled
    /// and the rest still register.
    pub async fn build(self) -> PluginPipeline {
        let watch = compile_watch("<global>", &self.options.urls_to_watch)
            .unwrap_or_else(|e| {
                error!("{e}; no URLs will be intercepted");
                UrlMatcherSet::default()
            });

        let mut bus = EventBus::new();
        let mut plugins = Vec::with_capacity(self.plugins.len());
        let mut disabled = Vec::new();

        for (index, pending) in self.plugins.into_iter().enumerate() {
            let name = pending.plugin.name().to_string();

            let plugin_watch = match &pending.urls_to_watch {
                Some(urls) => match compile_watch(&name, urls) {
                    Ok(set) => set,
                    Err(e) => {
                        error!(plugin = %name, "{e}; plugin disabled");
                        disabled.push(e);
                        plugins.push(pending.plugin);
                        continue;
                    }
                },
                None => watch.clone(),
            };

            let registration = AssertUnwindSafe(pending.plugin.register(&self.options))
                .catch_unwind()
                .await;
            match registration {
                Ok(Ok(events)) => {
                    bus.subscribe(index, &name, events, plugin_watch);
                    info!(plugin = %name, index, "Plugin registered");
                }
                Ok(Err(source)) => {
                    let e = PipelineError::Setup {
                        plugin: name.clone(),
                        source,
                    };
                    error!(plugin = %name, "{e}; plugin disabled");
                    disabled.push(e);
                }
                Err(panic) => {
                    let e = PipelineError::Setup {
                        plugin: name.clone(),
                        source: anyhow::anyhow!("panicked: {}", panic_message(panic.as_ref())),
                    };
                    error!(plugin = %name, "{e}; plugin disabled");
                    disabled.push(e);
                }
            }
            plugins.push(pending.plugin);
        }

        if self.options.record {
            self.recorder.start();
        }

        PluginPipeline {
            plugins,
            bus,
            watch,
            recorder: self.recorder,
            options: self.options,
            disabled,
        }
    }
}

fn compile_watch(plugin: &str, urls: &[String]) -> Result<UrlMatcherSet, PipelineError> {
    if urls.is_empty() {
        return Ok(UrlMatcherSet::watch_all());
    }
    UrlMatcherSet::compile(urls).map_err(|source| PipelineError::WatchPattern {
        plugin: plugin.to_string(),
        source,
    })
}

/// Owns the ordered plugin list and drives event dispatch.
///
/// All dispatch methods take `&self` and may be called concurrently from
/// independent connections.
pub struct PluginPipeline {
    plugins: Vec<Arc<dyn Plugin>>,
    bus: EventBus,
    watch: UrlMatcherSet,
    recorder: Arc<ExchangeRecorder>,
    options: ProxyOptions,
    disabled: Vec<PipelineError>,
}

impl PluginPipeline {
    pub fn builder(recorder: Arc<ExchangeRecorder>) -> PipelineBuilder {
        PipelineBuilder::new(recorder)
    }

    pub fn recorder(&self) -> &Arc<ExchangeRecorder> {
        &self.recorder
    }

    pub fn options(&self) -> &ProxyOptions {
        &self.options
    }

    /// Registration failures, one per disabled plugin.
    pub fn disabled(&self) -> &[PipelineError] {
        &self.disabled
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn is_watched(&self, url: &str) -> bool {
        self.watch.matches(url)
    }

    pub async fn dispatch_options_loaded(&self) {
        for sub in self.bus.subscribers(PluginEvent::OptionsLoaded) {
            let plugin = &self.plugins[sub.index];
            self.guard(
                &sub.name,
                PluginEvent::OptionsLoaded,
                plugin.options_loaded(&self.options),
            )
            .await;
        }
    }

    /// Offer the exchange to every subscribed plugin in registration order.
    ///
    /// The first plugin that commits a response wins; later plugins still run
    /// but must not commit again. A second commit is logged as a contract
    /// violation and otherwise ignored.
    pub async fn dispatch_before_request(
        &self,
        exchange: &mut InterceptedExchange,
    ) -> DispatchOutcome {
        if !self.watch.matches(exchange.url()) {
            self.recorder.record(
                RecordedLogEntry::new(
                    MessageType::PassedThrough,
                    format!("{} {}", exchange.method(), exchange.url()),
                )
                .with_line("not watched"),
            );
            return DispatchOutcome::NotWatched;
        }

        self.recorder.record(
            RecordedLogEntry::new(
                MessageType::InterceptedRequest,
                format!("{} {}", exchange.method(), exchange.url()),
            )
            .with_exchange(Arc::new(exchange.snapshot())),
        );

        let url = exchange.url().to_string();
        for sub in self.bus.subscribers_for(PluginEvent::BeforeRequest, &url) {
            let plugin = &self.plugins[sub.index];
            self.guard(
                &sub.name,
                PluginEvent::BeforeRequest,
                plugin.before_request(exchange),
            )
            .await;
        }

        match exchange.committed_by() {
            Some(plugin) => DispatchOutcome::Responded {
                plugin: plugin.to_string(),
            },
            None => {
                self.recorder.record(
                    RecordedLogEntry::new(
                        MessageType::PassedThrough,
                        format!("{} {}", exchange.method(), exchange.url()),
                    )
                    .with_exchange(Arc::new(exchange.snapshot())),
                );
                DispatchOutcome::PassedThrough
            }
        }
    }

    pub async fn dispatch_after_response(&self, exchange: &InterceptedExchange) {
        if !self.watch.matches(exchange.url()) {
            return;
        }
        if let Some(response) = exchange.response() {
            self.recorder.record(
                RecordedLogEntry::new(
                    MessageType::InterceptedResponse,
                    format!("{} {}", response.status, exchange.url()),
                )
                .with_exchange(Arc::new(exchange.snapshot())),
            );
        }
        for sub in self.bus.subscribers_for(PluginEvent::AfterResponse, exchange.url()) {
            let plugin = &self.plugins[sub.index];
            self.guard(
                &sub.name,
                PluginEvent::AfterResponse,
                plugin.after_response(exchange),
            )
            .await;
        }
    }

    pub fn start_recording(&self) {
        self.recorder.start();
    }

    /// Stop the active session and run every recording-stopped handler on its log.
    ///
    /// Returns the arguments the handlers saw (including whatever they put in
    /// the shared bag), or `None` if nothing was being recorded.
    pub async fn stop_recording(&self) -> Option<RecordingArgs> {
        let logs = self.recorder.stop()?;
        let args = RecordingArgs {
            logs,
            global_data: GlobalData::default(),
        };
        self.dispatch_recording_stopped(&args).await;
        Some(args)
    }

    pub async fn dispatch_recording_stopped(&self, args: &RecordingArgs) {
        for sub in self.bus.subscribers(PluginEvent::RecordingStopped) {
            let plugin = &self.plugins[sub.index];
            self.guard(
                &sub.name,
                PluginEvent::RecordingStopped,
                plugin.recording_stopped(args),
            )
            .await;
        }
    }

    /// Await one handler, turning errors and panics into log entries.
    async fn guard<F>(&self, plugin: &str, event: PluginEvent, handler: F)
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let result = AssertUnwindSafe(handler).catch_unwind().await;
        let failure = match result {
            Ok(Ok(())) => {
                debug!(plugin, event = event.as_str(), "handled");
                return;
            }
            Ok(Err(source)) => match source.downcast::<ContractViolation>() {
                Ok(violation) => {
                    let e = PipelineError::from(violation);
                    warn!(plugin, event = event.as_str(), "{e}");
                    self.recorder.record(
                        RecordedLogEntry::new(MessageType::Warning, e.to_string())
                            .with_plugin(plugin),
                    );
                    return;
                }
                Err(source) => PipelineError::Handler {
                    plugin: plugin.to_string(),
                    event,
                    source,
                },
            },
            Err(panic) => PipelineError::Panicked {
                plugin: plugin.to_string(),
                event,
                message: panic_message(panic.as_ref()),
            },
        };
        error!(plugin, event = event.as_str(), "{failure}");
        self.recorder.record(
            RecordedLogEntry::new(MessageType::Failed, failure.to_string()).with_plugin(plugin),
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
