use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use discourse_collector::collector::{CacheStore, Collector};
use discourse_collector::config::{Config, ExportType, DEFAULT_SQLITE_PATH};
use discourse_collector::discourse::DiscourseClient;
use discourse_collector::export::{CsvExporter, Exporter, JsonExporter, SqliteExporter};
use discourse_collector::rate_limiter::RateLimiter;
use discourse_collector::runner::{self, CyclePlan};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting discourse-collector");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        site_url = %config.site_url,
        scope = ?config.scope(),
        rate_limit_ms = config.rate_limit.as_millis(),
        "Configuration loaded"
    );

    let limiter = Arc::new(RateLimiter::new(config.rate_limit));
    let client = DiscourseClient::new(&config.site_url, config.request_timeout, limiter)
        .context("Failed to create Discourse client")?;
    let collector = Collector::new(Arc::new(client), Arc::new(CacheStore::new()));

    let exporter = match config.export_type {
        ExportType::Json => Exporter::Json(JsonExporter::new(config.export_path.clone())),
        ExportType::Sqlite => {
            let path = config
                .export_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH));
            Exporter::Sqlite(
                SqliteExporter::open(&path)
                    .await
                    .context("Failed to initialize SQLite export")?,
            )
        }
        ExportType::Csv => Exporter::Csv(CsvExporter::new(config.csv_folder.clone())),
    };

    let plan = CyclePlan {
        scope: config.scope(),
        collect: config.collect_items(),
        export: config.export_items(),
    };

    if !config.repeat_collect {
        runner::run_once(&collector, &exporter, &plan).await?;
        return Ok(());
    }

    info!(
        interval_secs = config.collection_interval.as_secs(),
        "Repeat collection enabled"
    );
    let loop_handle = tokio::spawn(runner::run_loop(
        collector,
        exporter,
        plan,
        config.collection_interval,
    ));

    shutdown_signal().await;

    info!("Shutting down...");
    loop_handle.abort();
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,discourse_collector=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    // Logs go to stderr so a JSON export on stdout stays clean
    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
