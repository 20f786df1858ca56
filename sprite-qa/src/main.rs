//! sprite-qa - sprite quality feedback service
//!
//! Runs the HTTP surface and, unless disabled, a periodic worker that drains
//! the analysis job queue.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sprite_common::config::TomlConfig;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sprite_qa::services::{
    AnalysisWorker, BackgroundRemover, FixVerifier, HttpBackgroundRemover, HttpImageGenerator,
    HttpVisionAnalyzer, VerifierSettings, WorkerSettings,
};
use sprite_qa::{AppState, BatchDefaults};

/// Command-line arguments for sprite-qa
#[derive(Parser, Debug)]
#[command(name = "sprite-qa")]
#[command(about = "Sprite generation quality feedback service")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "SPRITE_QA_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database path (overrides config)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Serve the API only, without the periodic analysis worker
    #[arg(long)]
    no_worker: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::resolve(args.config.as_deref()).context("Failed to load config")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(path) = args.database {
        config.database.path = Some(path);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("sprite_qa={0},sprite_common={0},tower_http=info", config.logging.level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sprite-qa v{}", env!("CARGO_PKG_VERSION"));

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db = sprite_common::db::init_database(&db_path, config.database.max_connections)
        .await
        .context("Failed to open database")?;
    sprite_qa::db::init_tables(&db)
        .await
        .context("Failed to initialize tables")?;

    let services = &config.services;
    let vision = Arc::new(
        HttpVisionAnalyzer::new(
            services.vision_url.clone(),
            services.vision_api_key.clone(),
            services.vision_timeout_secs,
            services.vision_min_interval_ms,
        )
        .context("Failed to build vision client")?,
    );
    let generator = Arc::new(
        HttpImageGenerator::new(
            services.generation_url.clone(),
            services.generation_api_key.clone(),
            services.generation_timeout_secs,
        )
        .context("Failed to build generation client")?,
    );
    let background: Option<Arc<dyn BackgroundRemover>> = match &services.background_url {
        Some(url) => {
            let remover = HttpBackgroundRemover::new(url.clone(), services.background_timeout_secs)
                .context("Failed to build background removal client")?;
            Some(Arc::new(remover) as Arc<dyn BackgroundRemover>)
        }
        None => {
            info!("Background removal disabled");
            None
        }
    };

    let worker = Arc::new(AnalysisWorker::new(
        db.clone(),
        vision.clone(),
        WorkerSettings {
            max_retries: i64::from(config.worker.max_retries),
            retry_malformed: config.worker.retry_malformed,
            job_delay: Duration::from_millis(config.worker.job_delay_ms),
            max_lock_wait_ms: config.database.max_lock_wait_ms,
            stale_after: Duration::from_secs(config.worker.stale_after_secs),
        },
    ));

    // Nothing is in flight yet, so every processing claim is left over
    worker
        .recover_stale(Duration::ZERO)
        .await
        .context("Failed to release abandoned analysis jobs")?;
    let verifier = Arc::new(FixVerifier::new(
        db.clone(),
        vision,
        generator,
        background,
        VerifierSettings {
            quality_tier: config.verification.quality_tier.clone(),
            background_timeout: Duration::from_secs(services.background_timeout_secs),
        },
    ));

    let shutdown = CancellationToken::new();
    let drain_limit = i64::from(config.worker.batch_size);

    let worker_task = if config.worker.enabled && !args.no_worker {
        let interval = Duration::from_secs(config.worker.poll_interval_secs.max(1));
        Some(tokio::spawn(worker.clone().run(
            interval,
            drain_limit,
            shutdown.clone(),
        )))
    } else {
        info!("Periodic analysis worker disabled");
        None
    };

    let state = AppState::new(
        db.clone(),
        worker,
        verifier,
        BatchDefaults {
            limit: i64::from(config.verification.default_limit),
            min_occurrences: config.verification.min_occurrences,
            delay: Duration::from_millis(config.verification.batch_delay_ms),
        },
        drain_limit,
        shutdown.clone(),
    );
    let app = sprite_qa::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_token.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Some(task) = worker_task {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Analysis worker task ended abnormally");
        }
    }
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
