mod api;
mod chat_source;
mod config;
mod db;
mod distribution;
mod errors;
mod extraction;
mod lifecycle;
mod models;
mod store;
mod wire;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{create_router, AppState};
use chat_source::{ChatSource, NullChatSource};
use config::{Config, LoggingConfig};
use db::Database;
use distribution::DistributionEngine;
use extraction::{ExtractorClient, HttpExtractorClient};
use lifecycle::MessageLifecycleProcessor;
use store::{PendingQueueStore, QueueStore};

/// Deletes rotated log files beyond the retention policy (`max_files`/`max_age_days`).
/// Runs before the tracing subscriber is installed, so it reports via `eprintln!`.
fn cleanup_old_logs(logging_config: &LoggingConfig) {
    use std::fs;
    use std::time::SystemTime;

    if logging_config.max_files == 0 && logging_config.max_age_days == 0 {
        return;
    }

    let log_dir = std::path::Path::new(&logging_config.directory);
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<_> = match fs::read_dir(log_dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| name.starts_with(&logging_config.file_prefix))
                    .unwrap_or(false)
            })
            .filter_map(|entry| {
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((entry.path(), modified))
            })
            .collect(),
        Err(e) => {
            eprintln!("failed to read log directory: {e}");
            return;
        }
    };

    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let now = SystemTime::now();
    let max_age = Duration::from_secs((logging_config.max_age_days as u64) * 24 * 60 * 60);
    let mut deleted = 0;

    for (idx, (path, modified)) in log_files.iter().enumerate() {
        let mut should_delete = logging_config.max_files > 0 && idx >= logging_config.max_files as usize;
        if logging_config.max_age_days > 0 {
            if let Ok(age) = now.duration_since(*modified) {
                should_delete = should_delete || age > max_age;
            }
        }
        if should_delete {
            match fs::remove_file(path) {
                Ok(_) => deleted += 1,
                Err(e) => eprintln!("failed to delete log file {path:?}: {e}"),
            }
        }
    }

    if deleted > 0 {
        eprintln!("cleaned up {deleted} old log file(s)");
    }
}

/// Drives the chat-event subscriber loop (§5 "per-event task lifetime"): each event is
/// dispatched to a tracked background task; on cancellation the loop stops reading new
/// events and waits up to 10s for in-flight tasks to drain before aborting the rest.
async fn run_chat_subscriber(
    mut source: Box<dyn ChatSource>,
    lifecycle: Arc<MessageLifecycleProcessor>,
    shutdown: CancellationToken,
) {
    let mut tasks: JoinSet<()> = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = source.next_event() => {
                match event {
                    Some(event) => {
                        let lp = lifecycle.clone();
                        tasks.spawn(async move { lp.process_event(event).await; });
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!(in_flight = tasks.len(), "chat-event subscriber stopping, draining in-flight tasks");
    let drain = tokio::time::timeout(Duration::from_secs(10), async {
        while tasks.join_next().await.is_some() {}
    });
    if drain.await.is_err() {
        tasks.shutdown().await;
        tracing::warn!("event task drain timed out after 10s, aborting remaining tasks");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_string_lossy().into_owned()))
            .unwrap_or_else(|| ".".to_string())
    });
    let config_base = format!("{config_dir}/config");

    let config = match Config::from_file(&config_base) {
        Ok(cfg) => {
            eprintln!("configuration loaded from {config_base}");
            cfg
        }
        Err(e) => {
            eprintln!("failed to load configuration from {config_base}: {e}, using defaults");
            Config::default()
        }
    };

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());

    if config.logging.enabled {
        use tracing_appender::rolling;

        if let Err(e) = std::fs::create_dir_all(&config.logging.directory) {
            eprintln!("failed to create log directory {}: {e}", config.logging.directory);
        }
        cleanup_old_logs(&config.logging);

        let file_appender = match config.logging.rotation.as_str() {
            "hourly" => rolling::hourly(&config.logging.directory, &config.logging.file_prefix),
            "never" => rolling::never(&config.logging.directory, &config.logging.file_prefix),
            _ => rolling::daily(&config.logging.directory, &config.logging.file_prefix),
        };
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        subscriber
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
            .init();
        std::mem::forget(guard);
    } else {
        subscriber.init();
    }

    tracing::info!("starting trade-signal relay server");
    tracing::info!(version = env!("BUILD_INFO"), "server version");

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| config.database.url.clone());
    let db = Arc::new(Database::connect(&database_url).await?);
    tracing::info!(url = %database_url, "database initialized");

    let queue_store: Arc<dyn PendingQueueStore> = Arc::new(QueueStore::connect(&config.queue_store).await?);
    tracing::info!(url = %config.queue_store.url, "queue store connected");

    let extractor: Option<Arc<dyn ExtractorClient>> =
        match (std::env::var("EXTRACTOR_API_KEY"), &config.extraction.extractor_endpoint) {
            (Ok(api_key), Some(endpoint)) => {
                let model = config
                    .extraction
                    .extractor_model
                    .clone()
                    .unwrap_or_else(|| "default".to_string());
                tracing::info!(endpoint = %endpoint, model = %model, "model-assisted extraction (Stage B) enabled");
                Some(Arc::new(HttpExtractorClient::new(endpoint.clone(), model, api_key)))
            }
            _ => {
                tracing::info!("model-assisted extraction (Stage B) disabled: no EXTRACTOR_API_KEY/endpoint configured");
                None
            }
        };

    let distribution = Arc::new(DistributionEngine::new(
        db.clone(),
        queue_store.clone(),
        config.queue_store.session_ttl_secs,
    ));
    let lifecycle_processor = Arc::new(MessageLifecycleProcessor::new(
        db.clone(),
        distribution.clone(),
        extractor,
        config.extraction.clone(),
    ));

    let shutdown_token = CancellationToken::new();
    let subscriber_handle = {
        let lifecycle_processor = lifecycle_processor.clone();
        let token = shutdown_token.clone();
        tokio::spawn(run_chat_subscriber(Box::new(NullChatSource), lifecycle_processor, token))
    };

    let app_state = AppState {
        db: db.clone(),
        queue_store: queue_store.clone(),
        config: Arc::new(config.clone()),
    };
    let app = create_router(app_state);

    let addr: SocketAddr = config
        .server_address()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address '{}': {e}", config.server_address()))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "HTTP server listening");

    let server_shutdown_token = shutdown_token.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received");
            server_shutdown_token.cancel();
        })
        .await?;

    if let Err(e) = subscriber_handle.await {
        tracing::error!(error = %e, "chat-event subscriber task panicked");
    }

    Ok(())
}
