//! Outbound notifications.
//!
//! Two seams: webhook delivery for exchange lifecycle events, and
//! confirmation-code issuance. Webhooks are plain JSON POSTs carrying ids
//! and an event name, never secret material. Confirmation-code transport
//! (email) is an external collaborator; the default implementation logs
//! that a code was issued without logging the code itself.
//! Best-effort delivery - failures are logged but not retried.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle events delivered to a configured webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEvent {
    /// All parts arrived; the exchange became downloadable.
    ExchangeReady,
    /// A view unlocked and the credential was disclosed.
    ViewUnlocked,
    /// A response to a pull exchange became ready.
    ResponseReady,
}

impl WebhookEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookEvent::ExchangeReady => "exchange-ready",
            WebhookEvent::ViewUnlocked => "view-unlocked",
            WebhookEvent::ResponseReady => "response-ready",
        }
    }
}

/// Notification seam; implemented over HTTP in production and by a
/// recording stub in tests.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a lifecycle event to `webhook_url` (best-effort).
    async fn webhook(&self, webhook_url: &str, event: WebhookEvent, exchange_id: &str, child_id: Option<&str>);

    /// Issue a confirmation code to a confirmation address.
    async fn confirmation_code(&self, email: &str, exchange_id: &str, view_id: &str, code: &str);
}

/// Webhook notifier backed by a shared HTTP client.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn webhook(
        &self,
        webhook_url: &str,
        event: WebhookEvent,
        exchange_id: &str,
        child_id: Option<&str>,
    ) {
        let body = json!({
            "event": event.as_str(),
            "exchangeId": exchange_id,
            "childId": child_id,
        });

        match self.client.post(webhook_url).json(&body).send().await {
            Ok(response) => {
                debug!(
                    event = event.as_str(),
                    status = %response.status(),
                    "Delivered webhook"
                );
            }
            Err(err) => {
                // Best-effort delivery; the exchange proceeds regardless.
                warn!(event = event.as_str(), error = %err, "Webhook delivery failed");
            }
        }
    }

    async fn confirmation_code(&self, email: &str, exchange_id: &str, view_id: &str, _code: &str) {
        // Email transport is an external collaborator; record issuance
        // only. The code itself is never logged.
        info!(
            email_domain = email.rsplit('@').next().unwrap_or("unknown"),
            exchange_id,
            view_id,
            "Confirmation code issued"
        );
    }
}

/// Create the shared notifier.
pub fn create_notifier() -> Arc<dyn Notifier> {
    Arc::new(WebhookNotifier::new())
}
