//! tasknotify - routes task resolution events to notification channels.
//!
//! Events are read as line-delimited JSON from stdin, one bus message per
//! line: `{"status": {...}, "routes": ["notify.ci.irc-user.bob.on-any"]}`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tasknotify_service::{
    bus, Config, DispatchMetrics, Dispatcher, HttpNotifier, HttpTaskLookup, LogNotifier, Notifier,
    PayloadBuilder, StaticTaskLookup, TaskLookup, TemplateRenderer,
};

/// Route task resolution events to notification channels.
#[derive(Parser, Debug)]
#[command(name = "tasknotify", about = "Route task resolution events to notification channels")]
struct Args {
    /// Deployment root URL
    #[arg(long, default_value = "http://localhost:8080")]
    root_url: String,

    /// Prefix notification routing keys are addressed under
    #[arg(long, default_value = "notify")]
    route_prefix: String,

    /// Exception resolution reason that suppresses notifications (repeatable)
    #[arg(long = "ignore-reason", default_value = "canceled")]
    ignore_reasons: Vec<String>,

    /// Maximum number of events processed concurrently
    #[arg(long, default_value = "16")]
    prefetch: usize,

    /// Log notifications instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// JSON file mapping task ids to task definitions (skips the queue)
    #[arg(long)]
    tasks_file: Option<PathBuf>,

    /// Notification gateway base URL
    #[arg(long)]
    notify_url: Option<String>,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            root_url: args.root_url,
            route_prefix: args.route_prefix,
            ignore_task_reason_resolved: args.ignore_reasons.into_iter().collect(),
            prefetch: args.prefetch,
            dry_run: args.dry_run,
            tasks_file: args.tasks_file,
            notify_url: args.notify_url,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr; stdin carries events.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tasknotify=info".parse()?))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from(args);
    config.validate()?;

    let lookup: Arc<dyn TaskLookup> = match &config.tasks_file {
        Some(path) => {
            let lookup = StaticTaskLookup::from_file(path)?;
            info!(path = %path.display(), tasks = lookup.len(), "Loaded task definitions");
            Arc::new(lookup)
        }
        None => Arc::new(HttpTaskLookup::new(config.root_url.clone())),
    };

    let notifier: Arc<dyn Notifier> = match (&config.notify_url, config.dry_run) {
        (_, true) => Arc::new(LogNotifier),
        (Some(url), false) => Arc::new(HttpNotifier::new(url.clone())),
        (None, false) => Arc::new(HttpNotifier::for_root_url(&config.root_url)),
    };

    let metrics = Arc::new(DispatchMetrics::new());
    let dispatcher = Arc::new(
        Dispatcher::new(
            config.event_filter(),
            config.route_parser(),
            PayloadBuilder::new(TemplateRenderer::default(), config.links()),
            lookup,
            notifier,
        )
        .with_metrics(metrics.clone()),
    );

    info!(
        root_url = %config.root_url,
        route_prefix = %config.route_prefix,
        prefetch = config.prefetch,
        dry_run = config.dry_run,
        "Starting tasknotify"
    );
    for binding in bus::bindings(&config.route_prefix) {
        info!(
            exchange = binding.exchange,
            pattern = %binding.routing_key_pattern,
            "Binding"
        );
    }

    let (tx, rx) = mpsc::channel(config.prefetch);
    let reader = tokio::spawn(bus::read_json_lines(BufReader::new(tokio::io::stdin()), tx));

    tokio::select! {
        _ = bus::consume(rx, dispatcher, config.prefetch) => {
            info!("Event stream drained");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
        }
    }
    reader.abort();

    info!(metrics = %metrics.render(), "Final dispatch metrics");
    Ok(())
}
