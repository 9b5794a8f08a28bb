//! JudgeHub - Application Entry Point
//!
//! This is the main entry point for the JudgeHub control plane.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use judgehub::{
    config::CONFIG,
    constants::{DECLARE_DIR, SERVERS_FILE},
    gateway,
    judge::{transport::WsConnect, Dispatcher, DispatcherConfig, ServerRegistry, TranscriptStore},
    models::Declarations,
    queue::{ListBackend, MemoryBackend, QueueManager, RedisBackend},
    state::AppState,
    store::Stores,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| CONFIG.server.rust_log.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting JudgeHub control plane...");

    // Queue fabric backend
    let backend: Arc<dyn ListBackend> = if CONFIG.queue.backend == "memory" {
        tracing::info!("Using in-memory queue backend");
        Arc::new(MemoryBackend::new())
    } else {
        tracing::info!("Connecting to redis at {}...", CONFIG.queue.backend);
        Arc::new(RedisBackend::connect(&CONFIG.queue.backend).await?)
    };
    let queues = Arc::new(QueueManager::new(backend));

    // Persistent stores
    tracing::info!("Opening {} stores...", CONFIG.storage.store_place);
    let stores = Stores::from_config(&CONFIG.storage).await?;

    // Declaration documents for the worker handshake
    let declarations = Arc::new(
        Declarations::load(&CONFIG.storage.data_path.join(DECLARE_DIR)).await?,
    );

    // Judge dispatcher
    let registry = Arc::new(ServerRegistry::new(
        CONFIG.storage.data_path.join(SERVERS_FILE),
    ));
    let transcripts = TranscriptStore::new(CONFIG.storage.data_path.clone());
    let dispatcher = Dispatcher::new(
        DispatcherConfig::from(&CONFIG.judge),
        Arc::new(WsConnect),
        declarations.clone(),
        registry,
        transcripts.clone(),
        stores.submissions.clone(),
        stores.problems.clone(),
    );

    tracing::info!("Connecting to judge servers...");
    dispatcher.from_registry().await?;
    let (scheduler, supervisor) = dispatcher.start();
    tracing::info!("Scheduler and supervisor are started");

    // Create application state
    let state = AppState::new(
        stores,
        queues.clone(),
        dispatcher.clone(),
        transcripts,
        declarations,
        CONFIG.clone(),
    );

    // Build the router
    let app = Router::new()
        .merge(gateway::routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start the server
    let addr = SocketAddr::new(CONFIG.server.host.parse()?, CONFIG.server.port);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    // Stop services in dependency order
    tracing::info!("Killing services...");
    dispatcher.shutdown().await;
    let _ = scheduler.await;
    let _ = supervisor.await;
    tracing::info!("Scheduler and supervisor are stopped");

    queues.stop().await;
    tracing::info!("Queues are closed. Shutting down...");

    Ok(())
}
