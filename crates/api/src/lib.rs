//! HTTP surface and process wiring for the catalog search index.
//!
//! Provides the book search endpoint, health and Prometheus metrics, and a
//! development ingress that publishes catalog events onto the in-process
//! broker consumed by the projectors.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use contracts::{BookAdded, IntegrationEvent, StockChanged};
use index_store::{IndexStore, RedisIndexStore};
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{
    BookAddedProjection, BrokerError, InMemoryBroker, ProjectorSupervisor, QueryEngine,
    StockChangedProjection, StockPolicy,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: IndexStore> {
    pub store: S,
    pub query_engine: QueryEngine<S>,
    pub broker: InMemoryBroker,
}

impl<S: IndexStore + Clone> AppState<S> {
    pub fn new(store: S, broker: InMemoryBroker) -> Self {
        Self {
            query_engine: QueryEngine::new(store.clone()),
            store,
            broker,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: IndexStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/api/search/books", get(routes::search::books::<S>))
        .route("/events/book-added", post(routes::events::book_added::<S>))
        .route("/events/stock-changed", post(routes::events::stock_changed::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Subscribes both projectors to their queues on `broker` and starts them.
pub async fn spawn_projectors<S: IndexStore + Clone + 'static>(
    store: S,
    broker: &InMemoryBroker,
    policy: StockPolicy,
) -> Result<ProjectorSupervisor, BrokerError> {
    let mut supervisor = ProjectorSupervisor::new();
    supervisor.spawn(
        Arc::new(BookAddedProjection::new(store.clone(), policy)),
        broker.subscribe(BookAdded::QUEUE).await?,
    );
    supervisor.spawn(
        Arc::new(StockChangedProjection::new(store, policy)),
        broker.subscribe(StockChanged::QUEUE).await?,
    );
    tracing::info!(workers = supervisor.worker_count(), %policy, "projectors started");
    Ok(supervisor)
}

/// Connects to Redis and waits until it answers `PING`.
///
/// Makes up to `attempts` tries (at least one) with a linearly growing
/// pause between them and returns the last error if none succeeds.
pub async fn connect_redis(url: &str, attempts: u32) -> index_store::Result<RedisIndexStore> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = match RedisIndexStore::connect(url).await {
            Ok(store) => store.ping().await.map(|()| store),
            Err(err) => Err(err),
        };

        match result {
            Ok(store) => {
                tracing::info!(attempt, "connected to Redis index store");
                return Ok(store);
            }
            Err(err) if attempt < attempts => {
                tracing::warn!(attempt, attempts, error = %err, "Redis not reachable, retrying");
                tokio::time::sleep(Duration::from_millis(500) * attempt).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
