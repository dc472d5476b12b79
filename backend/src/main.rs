//! Sealbox backend server binary.
//!
//! Wires the object store, transfer service, access machine and sweeper
//! together and serves the HTTP API. All secret material stays client
//! side; this process only ever sees ciphertext parts and opaque ids.

use sealbox_backend::access::AccessMachine;
use sealbox_backend::notify::create_notifier;
use sealbox_backend::object_store::MemoryObjectStore;
use sealbox_backend::store::ExchangeStore;
use sealbox_backend::sweep::Sweeper;
use sealbox_backend::transfer::TransferService;
use sealbox_backend::{build_router, AppState, Config};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Initialize structured logging
    init_tracing();

    // Load and validate configuration
    let config = Config::from_env();
    log_startup_info(&config);

    // Initialize core components
    let store = ExchangeStore::new(Arc::new(MemoryObjectStore::new()));
    let notifier = create_notifier();
    let state = AppState {
        transfer: TransferService::new(store.clone(), notifier.clone(), config.clone()),
        access: AccessMachine::new(store.clone(), notifier, config.clone()),
        config: config.clone(),
    };

    // Start the background expiration sweeper
    Arc::new(Sweeper::new(store, config.sweep_interval)).start();

    // Build and serve the application
    let app = build_router(state);
    serve(app, &config).await;
}

/// Initialize tracing with environment-based log levels.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sealbox_backend=debug,tower_http=info")),
        )
        .init();
}

/// Log startup configuration (no secrets).
fn log_startup_info(config: &Config) {
    info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        storage = "memory",
        upload_window_secs = config.upload_window.as_secs(),
        view_ttl_secs = config.view_ttl.as_secs(),
        sweep_interval_secs = config.sweep_interval.as_secs(),
        max_parts = config.max_parts,
        max_part_bytes = config.max_part_bytes,
        "Starting Sealbox backend"
    );
}

/// Bind to address and serve the application.
async fn serve(app: axum::Router, config: &Config) {
    let bind_addr = format!("{}:{}", config.bind_addr, config.port);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(addr = %bind_addr, error = %err, "Failed to bind");
            std::process::exit(1);
        }
    };

    info!(addr = %bind_addr, "Server listening");

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(error = %err, "Server error");
        std::process::exit(1);
    }
}
