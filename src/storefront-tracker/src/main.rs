//! Storefront tracker — replays newline-delimited storefront events through
//! the tracking pipeline.
//!
//! Destination calls are written to the log; server-mirrored events are
//! posted to the configured first-party endpoint. Pipeline counters go to a
//! Prometheus recorder and can be printed on exit with `--print-metrics`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use storefront_core::config::AppConfig;
use storefront_core::types::{IdentityData, TrackedEvent};
use storefront_web_sdk::{HttpEventSink, LogLoader, StaticPageContext, Tracker};

#[derive(Parser, Debug)]
#[command(name = "storefront-tracker")]
#[command(about = "Fan storefront events out to marketing destinations")]
#[command(version)]
struct Cli {
    /// NDJSON file of events (reads stdin when omitted)
    #[arg(long)]
    events: Option<PathBuf>,

    /// Store slug used in the server endpoint (overrides config)
    #[arg(long, env = "STOREFRONT_TRACKING__TRACKING__STORE_SLUG")]
    store_slug: Option<String>,

    /// First-party API origin (overrides config)
    #[arg(long, env = "STOREFRONT_TRACKING__FORWARDER__API_BASE_URL")]
    api_base_url: Option<String>,

    /// Page URL reported as the event source
    #[arg(long)]
    page_url: Option<String>,

    /// Raw `Cookie` header to read correlation cookies from
    #[arg(long)]
    cookies: Option<String>,

    /// Customer email attached to mirrored events
    #[arg(long)]
    user_email: Option<String>,

    /// Do not mirror events to the server endpoint
    #[arg(long, default_value_t = false)]
    disable_server_side: bool,

    /// Write collected metrics in Prometheus text format to stdout on exit
    #[arg(long, default_value_t = false)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_tracker=info,storefront_web_sdk=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Storefront tracker starting up");

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Failed to install metrics recorder");
            None
        }
    };

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(slug) = cli.store_slug {
        config.tracking.store_slug = slug;
    }
    if let Some(url) = cli.api_base_url {
        config.forwarder.api_base_url = url;
    }
    if cli.disable_server_side {
        config.tracking.server_side_enabled = false;
    }

    info!(
        store_slug = %config.tracking.store_slug,
        destinations = ?config.tracking.destinations.enabled().collect::<Vec<_>>(),
        server_side = config.tracking.server_side_enabled,
        api_base_url = %config.forwarder.api_base_url,
        "Configuration loaded"
    );

    let context = StaticPageContext::new();
    if let Some(url) = cli.page_url {
        context.set_page_url(url);
    }
    if let Some(ref header) = cli.cookies {
        context.set_cookie_header(header);
    }

    let sink = Arc::new(HttpEventSink::new(&config.forwarder)?);
    let tracker = Tracker::builder(Arc::new(LogLoader))
        .with_event_sink(sink.clone())
        .with_page_context(Arc::new(context))
        .with_scheduler_config(config.scheduler.clone())
        .with_forwarder_config(&config.forwarder)
        .build();

    if let Some(email) = cli.user_email {
        tracker.set_user(IdentityData::email(email));
    }
    tracker.init(config.tracking.clone());

    let tracked = match cli.events {
        Some(path) => {
            let file = tokio::fs::File::open(&path).await?;
            replay(&tracker, BufReader::new(file)).await?
        }
        None => replay(&tracker, BufReader::new(tokio::io::stdin())).await?,
    };

    tracker.flush().await;
    sink.drain().await;

    info!(tracked, "Storefront tracker finished");

    if cli.print_metrics {
        if let Some(handle) = metrics {
            print!("{}", handle.render());
        }
    }
    Ok(())
}

/// Track every parseable line; malformed lines are logged and skipped.
async fn replay<R>(tracker: &Tracker, reader: R) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut tracked = 0;
    let mut line_no = 0;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TrackedEvent>(&line) {
            Ok(event) => {
                tracker.track(event, None);
                tracked += 1;
            }
            Err(e) => warn!(line = line_no, error = %e, "Skipping malformed event"),
        }
    }
    Ok(tracked)
}
