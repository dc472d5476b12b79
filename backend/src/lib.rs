//! # Sealbox Backend
//!
//! Zero-knowledge relay for end-to-end encrypted secret exchanges.
//!
//! ## Design Principles
//!
//! - **No plaintext content**: everything a sender uploads is ciphertext
//!   produced client-side; the decryption password travels in the link
//!   fragment and never reaches this server
//! - **No user identity**: only opaque exchange, response and view ids
//! - **Bounded lifetime**: exchanges expire on a schedule and part blobs
//!   are physically deleted once viewed out or expired
//! - **Minimal logging**: ids and counts only, never passwords or codes
//!
//! ## API Overview
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/health` | GET | Health check |
//! | `/api/{kind}` | POST | Create exchange |
//! | `/api/{kind}/transfers` | POST | Initiate a transfer |
//! | `/api/{kind}/parts` | POST | Upload one encrypted part |
//! | `/api/{kind}/parts` | GET | Download one encrypted part |
//! | `/api/send/access` | GET | Load access status |
//! | `/api/send/views` | PUT | Initiate a view |
//! | `/api/send/views/confirm` | PUT | Confirm a view |
//! | `/api/send/views/complete` | POST | Complete a view |
//! | `/api/receive/responses` | GET | List ready responses |

pub mod access;
pub mod config;
pub mod handlers;
pub mod ids;
pub mod models;
pub mod notify;
pub mod object_store;
pub mod store;
pub mod sweep;
pub mod transfer;

pub use config::Config;
pub use handlers::AppState;

use axum::{
    http::Method,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

/// Slack on top of the part ceiling for headers-adjacent body overhead.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Build the Axum router with all endpoints and middleware.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_part_bytes + BODY_LIMIT_SLACK;
    Router::new()
        // Health check (unauthenticated)
        .route("/health", get(handlers::health))
        // Creation and upload
        .route("/api/:kind", post(handlers::create_exchange))
        .route("/api/:kind/transfers", post(handlers::initiate_transfer))
        .route("/api/:kind/parts", post(handlers::upload_part))
        .route("/api/:kind/parts", get(handlers::download_part))
        // Viewer access path
        .route("/api/send/access", get(handlers::load_access_status))
        .route("/api/send/views", put(handlers::initiate_view))
        .route("/api/send/views/confirm", put(handlers::confirm_view))
        .route("/api/send/views/complete", post(handlers::complete_view))
        // Pull-side read path
        .route("/api/receive/responses", get(handlers::list_responses))
        // Middleware stack (order matters: first added = outermost)
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT])
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
