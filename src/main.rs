use block_sync::{
    cache::MokaSnapshotCache,
    config::Config,
    db::BlockStore,
    routes::create_app,
    ws::{SnapshotPersister, SyncContext, SyncOptions, UpgradeDispatcher, WorkspaceRegistry},
    AppState,
};
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "block_sync=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // Initialize database connection if URL is provided
    let block_store = match &config.db_url {
        Some(db_url) => match BlockStore::connect(db_url).await {
            Ok(store) => {
                info!("Database initialized successfully");
                Some(Arc::new(store))
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Snapshots will not be persisted");
                None
            }
        },
        None => {
            warn!("No database URL configured - snapshots will not be persisted");
            None
        }
    };

    // Shared snapshot cache and workspace registry
    let cache = Arc::new(MokaSnapshotCache::from_config(&config));
    let persister = block_store
        .clone()
        .map(|store| store as Arc<dyn SnapshotPersister>);
    let ctx = SyncContext::new(cache, persister, SyncOptions::from_config(&config));
    let registry = WorkspaceRegistry::new(ctx);

    // Start the WebSocket dispatcher
    let ws_addr = config.websocket_address();
    let ws_listener = tokio::net::TcpListener::bind(&ws_addr)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind WebSocket server to {}", ws_addr));
    tokio::spawn(UpgradeDispatcher::new(registry.clone()).serve(ws_listener));

    // Start the HTTP/API server
    let server_address = config.server_address();
    let state = Arc::new(AppState::new(config, registry.clone(), block_store));
    let app_routes = create_app(state);

    let listener = tokio::net::TcpListener::bind(&server_address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", server_address));

    info!("🚀 Server running on http://{}", server_address);
    info!("📡 WebSocket available at ws://{}/?workspaceId=<blockId>", ws_addr);
    info!("📚 Swagger UI available at http://{}/swagger", server_address);

    if let Err(e) = axum::serve(listener, app_routes)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    registry.shutdown().await;
    info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
