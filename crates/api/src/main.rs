//! API server entry point.

use std::process::ExitCode;
use std::sync::Arc;

use api::config::{Config, LogFormat};
use index_store::{InMemoryIndexStore, IndexStore};
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{BootstrapSeeder, InMemoryBroker};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Runs projectors, seeder and HTTP server against `store` until shutdown.
async fn serve<S: IndexStore + Clone + 'static>(
    config: &Config,
    store: S,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError> {
    // 1. Start consumers before seeding so live events are never held back
    let broker = InMemoryBroker::new();
    let supervisor = api::spawn_projectors(store.clone(), &broker, config.stock_policy).await?;

    // 2. Seed an empty index alongside the first events
    if config.seed_on_start {
        let seeder = BootstrapSeeder::new(store.clone());
        tokio::spawn(async move {
            if let Err(err) = seeder.run().await {
                tracing::error!(error = %err, "bootstrap seeding failed");
            }
        });
    }

    // 3. Build the application and serve
    let state = Arc::new(api::AppState::new(store, broker));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 4. Let in-flight events finish before exiting
    for (projection, stats) in supervisor.shutdown().await {
        tracing::info!(
            projection,
            acked = stats.acked(),
            dropped = stats.dropped(),
            requeued = stats.requeued(),
            "projector stopped"
        );
    }

    Ok(())
}

async fn run(config: Config, metrics_handle: PrometheusHandle) -> Result<(), BoxError> {
    match &config.redis_url {
        Some(url) => {
            let store = api::connect_redis(url, config.store_connect_retries).await?;
            serve(&config, store, metrics_handle).await
        }
        None => {
            tracing::info!("REDIS_URL not set, using in-memory index store");
            serve(&config, InMemoryIndexStore::new(), metrics_handle).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);

    let metrics_handle = match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!(error = %err, "failed to install Prometheus recorder");
            return ExitCode::FAILURE;
        }
    };
    api::routes::metrics::describe();

    match run(config, metrics_handle).await {
        Ok(()) => {
            tracing::info!("server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "server exited with error");
            ExitCode::FAILURE
        }
    }
}
