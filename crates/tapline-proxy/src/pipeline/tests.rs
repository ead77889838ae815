//! Tests for plugin registration and ordered dispatch.

use super::*;
use crate::exchange::{ExchangeResponse, Headers, InterceptedExchange};
use crate::recording::{ExchangeRecorder, MessageType};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Commits a response on every before-request, ignoring the response state.
struct Responder {
    name: String,
    status: u16,
    calls: AtomicUsize,
    check_state: bool,
}

impl Responder {
    fn new(name: &str, status: u16, check_state: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            status,
            calls: AtomicUsize::new(0),
            check_state,
        })
    }
}

#[async_trait]
impl Plugin for Responder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register(&self, _options: &ProxyOptions) -> anyhow::Result<EventSet> {
        Ok(EventSet::of(&[PluginEvent::BeforeRequest]))
    }

    async fn before_request(&self, exchange: &mut InterceptedExchange) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.check_state && exchange.has_response() {
            return Ok(());
        }
        exchange.respond(
            &self.name,
            ExchangeResponse {
                status: self.status,
                headers: Headers::new(),
                body: Bytes::new(),
            },
        )?;
        Ok(())
    }
}

struct FailingSetup;

#[async_trait]
impl Plugin for FailingSetup {
    fn name(&self) -> &str {
        "failing-setup"
    }

    async fn register(&self, _options: &ProxyOptions) -> anyhow::Result<EventSet> {
        anyhow::bail!("remote configuration unavailable")
    }
}

struct Panicky;

#[async_trait]
impl Plugin for Panicky {
    fn name(&self) -> &str {
        "panicky"
    }

    async fn register(&self, _options: &ProxyOptions) -> anyhow::Result<EventSet> {
        Ok(EventSet::of(&[
            PluginEvent::BeforeRequest,
            PluginEvent::RecordingStopped,
        ]))
    }

    async fn before_request(&self, _exchange: &mut InterceptedExchange) -> anyhow::Result<()> {
        panic!("boom")
    }

    async fn recording_stopped(&self, _args: &RecordingArgs) -> anyhow::Result<()> {
        anyhow::bail!("report failed")
    }
}

/// Records the order in which events reach it.
struct Observer {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Plugin for Observer {
    fn name(&self) -> &str {
        "observer"
    }

    async fn register(&self, _options: &ProxyOptions) -> anyhow::Result<EventSet> {
        Ok(EventSet::of(&PluginEvent::ALL))
    }

    async fn options_loaded(&self, _options: &ProxyOptions) -> anyhow::Result<()> {
        self.seen.lock().push("options".into());
        Ok(())
    }

    async fn before_request(&self, exchange: &mut InterceptedExchange) -> anyhow::Result<()> {
        self.seen
            .lock()
            .push(format!("before:{}", exchange.has_response()));
        Ok(())
    }

    async fn after_response(&self, _exchange: &InterceptedExchange) -> anyhow::Result<()> {
        self.seen.lock().push("after".into());
        Ok(())
    }

    async fn recording_stopped(&self, args: &RecordingArgs) -> anyhow::Result<()> {
        self.seen.lock().push(format!("stopped:{}", args.logs.len()));
        args.global_data
            .insert("observer", serde_json::json!(args.logs.len()));
        Ok(())
    }
}

fn options(urls: &[&str]) -> ProxyOptions {
    ProxyOptions {
        urls_to_watch: urls.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_first_registered_plugin_wins() {
    let recorder = Arc::new(ExchangeRecorder::new());
    let first = Responder::new("first", 201, false);
    let second = Responder::new("second", 500, false);

    let pipeline = PluginPipeline::builder(Arc::clone(&recorder))
        .plugin(first.clone())
        .plugin(second.clone())
        .build()
        .await;

    recorder.start();
    let mut exchange = InterceptedExchange::new("GET", "https://api.test/x");
    let outcome = pipeline.dispatch_before_request(&mut exchange).await;

    assert_eq!(
        outcome,
        DispatchOutcome::Responded {
            plugin: "first".into()
        }
    );
    assert_eq!(exchange.response().unwrap().status, 201);
    // The second plugin still ran; its commit was rejected and logged
    assert_eq!(second.calls.load(Ordering::SeqCst), 1);

    let log = recorder.stop().unwrap();
    let warning = log
        .iter()
        .find(|e| e.category == MessageType::Warning)
        .expect("contract violation logged");
    assert_eq!(warning.plugin.as_deref(), Some("second"));
    assert!(warning.text().contains("already committed by 'first'"));
}

#[tokio::test]
async fn test_state_aware_plugin_skips_silently() {
    let recorder = Arc::new(ExchangeRecorder::new());
    let pipeline = PluginPipeline::builder(Arc::clone(&recorder))
        .plugin(Responder::new("first", 200, true))
        .plugin(Responder::new("second", 404, true))
        .build()
        .await;

    recorder.start();
    let mut exchange = InterceptedExchange::new("GET", "https://api.test/x");
    pipeline.dispatch_before_request(&mut exchange).await;

    let log = recorder.stop().unwrap();
    assert!(log.iter().all(|e| e.category != MessageType::Warning));
    assert_eq!(exchange.committed_by(), Some("first"));
}

#[tokio::test]
async fn test_setup_failure_disables_only_that_plugin() {
    let recorder = Arc::new(ExchangeRecorder::new());
    let pipeline = PluginPipeline::builder(recorder)
        .plugin(Arc::new(FailingSetup))
        .plugin(Responder::new("mock", 200, true))
        .build()
        .await;

    assert_eq!(pipeline.disabled().len(), 1);
    assert!(pipeline.disabled()[0]
        .to_string()
        .contains("remote configuration unavailable"));

    let mut exchange = InterceptedExchange::new("GET", "https://api.test/x");
    let outcome = pipeline.dispatch_before_request(&mut exchange).await;
    assert_eq!(
        outcome,
        DispatchOutcome::Responded {
            plugin: "mock".into()
        }
    );
}

#[tokio::test]
async fn test_panicking_handler_does_not_stop_others() {
    let recorder = Arc::new(ExchangeRecorder::new());
    let observer = Arc::new(Observer {
        seen: Mutex::new(Vec::new()),
    });
    let pipeline = PluginPipeline::builder(Arc::clone(&recorder))
        .plugin(Arc::new(Panicky))
        .plugin(Responder::new("mock", 200, true))
        .plugin(observer.clone())
        .build()
        .await;

    pipeline.start_recording();
    let mut exchange = InterceptedExchange::new("GET", "https://api.test/x");
    let outcome = pipeline.dispatch_before_request(&mut exchange).await;
    assert!(matches!(outcome, DispatchOutcome::Responded { .. }));

    let args = pipeline.stop_recording().await.unwrap();
    let failures: Vec<_> = args
        .logs
        .iter()
        .filter(|e| e.category == MessageType::Failed)
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].text().contains("panicked"));
    // recording-stopped still reached the observer after the panicky plugin errored
    assert!(args.global_data.contains_key("observer"));
    assert_eq!(
        observer.seen.lock().as_slice(),
        &["before:true".to_string(), format!("stopped:{}", args.logs.len())]
    );
}

#[tokio::test]
async fn test_unwatched_urls_skip_plugins() {
    let recorder = Arc::new(ExchangeRecorder::new());
    let responder = Responder::new("mock", 200, true);
    let pipeline = PluginPipeline::builder(recorder)
        .options(options(&["https://api.test/*"]))
        .plugin(responder.clone())
        .build()
        .await;

    let mut exchange = InterceptedExchange::new("GET", "https://other.test/x");
    assert_eq!(
        pipeline.dispatch_before_request(&mut exchange).await,
        DispatchOutcome::NotWatched
    );
    assert_eq!(responder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_plugin_watch_scope() {
    let recorder = Arc::new(ExchangeRecorder::new());
    let scoped = Responder::new("scoped", 418, true);
    let pipeline = PluginPipeline::builder(recorder)
        .scoped_plugin(scoped.clone(), vec!["https://api.test/teapot/*".into()])
        .build()
        .await;

    let mut exchange = InterceptedExchange::new("GET", "https://api.test/coffee/1");
    assert_eq!(
        pipeline.dispatch_before_request(&mut exchange).await,
        DispatchOutcome::PassedThrough
    );
    let mut exchange = InterceptedExchange::new("GET", "https://api.test/teapot/1");
    pipeline.dispatch_before_request(&mut exchange).await;
    assert_eq!(exchange.response().unwrap().status, 418);
    assert_eq!(scoped.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_blank_plugin_watch_list_watches_nothing() {
    let recorder = Arc::new(ExchangeRecorder::new());
    let pipeline = PluginPipeline::builder(recorder)
        .scoped_plugin(Responder::new("blank", 200, true), vec!["  ".into()])
        .build()
        .await;
    assert!(pipeline.disabled().is_empty());

    let mut exchange = InterceptedExchange::new("GET", "https://api.test/x");
    assert_eq!(
        pipeline.dispatch_before_request(&mut exchange).await,
        DispatchOutcome::PassedThrough
    );
}

#[tokio::test]
async fn test_zero_plugins_is_noop() {
    let recorder = Arc::new(ExchangeRecorder::new());
    let pipeline = PluginPipeline::builder(Arc::clone(&recorder)).build().await;

    pipeline.dispatch_options_loaded().await;
    pipeline.start_recording();
    let mut exchange = InterceptedExchange::new("GET", "https://api.test/x");
    assert_eq!(
        pipeline.dispatch_before_request(&mut exchange).await,
        DispatchOutcome::PassedThrough
    );
    pipeline.dispatch_after_response(&exchange).await;
    let args = pipeline.stop_recording().await.unwrap();
    let categories: Vec<_> = args.logs.iter().map(|e| e.category).collect();
    assert_eq!(
        categories,
        vec![MessageType::InterceptedRequest, MessageType::PassedThrough]
    );
}

#[tokio::test]
async fn test_all_events_reach_observer_in_order() {
    let recorder = Arc::new(ExchangeRecorder::new());
    let observer = Arc::new(Observer {
        seen: Mutex::new(Vec::new()),
    });
    let pipeline = PluginPipeline::builder(recorder)
        .plugin(observer.clone())
        .build()
        .await;

    pipeline.dispatch_options_loaded().await;
    pipeline.start_recording();
    let mut exchange = InterceptedExchange::new("GET", "https://api.test/x");
    pipeline.dispatch_before_request(&mut exchange).await;
    exchange.set_upstream_response(ExchangeResponse {
        status: 200,
        headers: Headers::new(),
        body: Bytes::from_static(b"{}"),
    });
    pipeline.dispatch_after_response(&exchange).await;
    pipeline.stop_recording().await;

    let seen = observer.seen.lock().clone();
    assert_eq!(seen[0], "options");
    assert_eq!(seen[1], "before:false");
    assert_eq!(seen[2], "after");
    assert!(seen[3].starts_with("stopped:"));
}

#[tokio::test]
async fn test_stop_without_recording_dispatches_nothing() {
    let recorder = Arc::new(ExchangeRecorder::new());
    let observer = Arc::new(Observer {
        seen: Mutex::new(Vec::new()),
    });
    let pipeline = PluginPipeline::builder(recorder)
        .plugin(observer.clone())
        .build()
        .await;
    assert!(pipeline.stop_recording().await.is_none());
    assert!(observer.seen.lock().is_empty());
}

#[tokio::test]
async fn test_record_option_starts_session() {
    let recorder = Arc::new(ExchangeRecorder::new());
    let _pipeline = PluginPipeline::builder(Arc::clone(&recorder))
        .options(ProxyOptions {
            record: true,
            ..Default::default()
        })
        .build()
        .await;
    assert!(recorder.is_recording());
}
