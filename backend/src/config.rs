//! Configuration for the Sealbox backend server.
//!
//! All configuration is loaded from environment variables.
//! No secrets are configured here and none are logged.

use std::time::Duration;

/// Fixed ceiling on parts per exchange.
pub const MAX_PARTS: u32 = 15;

/// Part size ceiling (4 MiB), chosen to stay under request-body limits.
pub const MAX_PART_BYTES: usize = 4 * 1024 * 1024;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,

    /// Server port
    pub port: u16,

    // === Windows ===
    /// Age ceiling past which part uploads are rejected (default: 20 min)
    pub upload_window: Duration,

    /// View credential lifetime ceiling (default: 1 hour)
    pub view_ttl: Duration,

    /// Expiration sweep interval (default: 60 seconds)
    pub sweep_interval: Duration,

    // === Limits ===
    /// Maximum size of one encrypted part in bytes
    pub max_part_bytes: usize,

    /// Maximum parts per exchange
    pub max_parts: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),

            upload_window: Duration::from_secs(
                std::env::var("UPLOAD_WINDOW_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(20 * 60),
            ),
            view_ttl: Duration::from_secs(
                std::env::var("VIEW_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            sweep_interval: Duration::from_secs(
                std::env::var("SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),

            max_part_bytes: std::env::var("MAX_PART_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_PART_BYTES),
            max_parts: std::env::var("MAX_PARTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_PARTS),
        }
    }

    /// Upload window as a chrono duration for timestamp arithmetic.
    pub fn upload_window_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.upload_window).unwrap_or_else(|_| chrono::Duration::minutes(20))
    }

    /// View TTL as a chrono duration for timestamp arithmetic.
    pub fn view_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.view_ttl).unwrap_or_else(|_| chrono::Duration::hours(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
