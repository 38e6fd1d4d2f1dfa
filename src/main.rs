//! Release Monitor binary entrypoint.
//! Boots the poll scheduler and the Axum HTTP server (liveness, status,
//! manual trigger, metrics).

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use release_monitor::api::{self, AppState};
use release_monitor::config::MonitorConfig;
use release_monitor::detector::ChangeDetector;
use release_monitor::metrics::Metrics;
use release_monitor::notify::discord::DiscordNotifier;
use release_monitor::scheduler::PollScheduler;
use release_monitor::source::fetcher::HttpFetcher;
use release_monitor::store::VersionStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("release_monitor=info,monitor=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = MonitorConfig::from_env().context("loading monitor configuration")?;
    tracing::info!(
        interval_secs = cfg.poll_interval.as_secs(),
        sources = cfg.sources.len(),
        quiet = cfg.quiet_mode,
        "configuration loaded"
    );

    let metrics = Metrics::init();

    let fetcher = Arc::new(HttpFetcher::new(cfg.fetch_timeout));
    let store = Arc::new(VersionStore::new());
    let detector = Arc::new(ChangeDetector::new(fetcher, store));
    let notifier = Arc::new(DiscordNotifier::new(cfg.webhook_url.clone(), cfg.quiet_mode));
    let scheduler = Arc::new(PollScheduler::new(
        cfg.sources.clone(),
        detector,
        notifier,
        cfg.poll_interval,
    ));

    let loop_handle = Arc::clone(&scheduler)
        .start()
        .context("scheduler was already started")?;

    let state = AppState {
        scheduler: Arc::clone(&scheduler),
        started_at: Utc::now(),
    };
    let app = api::create_router(state).merge(metrics.router());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding liveness endpoint on port {port}"))?;
    tracing::info!(port, "http endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("http server")?;

    // Let an in-flight cycle finish before the process exits.
    scheduler.shutdown();
    let _ = loop_handle.await;

    Ok(())
}
