//! Tapline replay tool.
//!
//! Loads a proxy configuration, replays a session file through the configured
//! plugins with recording on, and prints what each plugin decided plus the
//! minimal-permissions report.
//!
//! Usage:
//!   tapline --config tapline.yaml --session session.json [--log-json]

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tapline_proxy::permissions::REPORT_KEY;
use tapline_proxy::pipeline::DispatchOutcome;
use tapline_proxy::replay::{load_session, replay};
use tapline_proxy::{registry, ExchangeRecorder, ProxyConfig};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "tapline")]
#[command(author, version, about = "Replay a session through the Tapline plugin pipeline", long_about = None)]
struct Args {
    /// Proxy configuration (YAML, or JSON by extension)
    #[arg(short, long, env = "TAPLINE_CONFIG", default_value = "tapline.yaml")]
    config: PathBuf,

    /// Session file: JSON array of {method, url, headers, body}
    #[arg(short, long)]
    session: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = ProxyConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let requests = load_session(&args.session)?;
    info!(
        config = %args.config.display(),
        plugins = config.plugins.len(),
        requests = requests.len(),
        "Replaying session"
    );

    let recorder = Arc::new(ExchangeRecorder::new());
    let pipeline = registry::build_pipeline(&config, recorder).await;
    for e in pipeline.disabled() {
        warn!("{e}");
    }

    let (results, recording) = replay(&pipeline, &requests).await;
    for result in &results {
        let outcome = match &result.outcome {
            DispatchOutcome::NotWatched => "not watched".to_string(),
            DispatchOutcome::PassedThrough => "passed through".to_string(),
            DispatchOutcome::Responded { plugin } => format!("answered by {plugin}"),
        };
        match result.status {
            Some(status) => println!("{} {} -> {status} ({outcome})", result.method, result.url),
            None => println!("{} {} -> {outcome}", result.method, result.url),
        }
    }

    if let Some(report) = recording.and_then(|args| args.global_data.get(REPORT_KEY)) {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
