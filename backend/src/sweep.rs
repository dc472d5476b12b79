//! Background expiration sweeper.
//!
//! Every interval tick walks the three marker categories in key order.
//! Marker keys embed the expiration instant, so the walk can stop at the
//! first marker that is not yet past. Each reaped record runs as a
//! best-effort parallel batch (delete blobs, persist state, delete the
//! marker); individual failures are logged and retried on the next tick
//! because the marker survives. A marker whose record is already gone or
//! already reaped is simply deleted, which makes crash replay a no-op.

use crate::models::{DeleteReason, ExchangeKind, ViewCloseReason};
use crate::object_store::StoreError;
use crate::store::{ExchangeStore, ExpiryCategory, ExpiryMarker, StateRef};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const CATEGORIES: [ExpiryCategory; 3] = [
    ExpiryCategory::SendExpiry,
    ExpiryCategory::ReceiveResponseExpiry,
    ExpiryCategory::ViewExpiry,
];

/// Counters for one category sweep, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Markers whose expiration had passed.
    pub due: usize,
    /// Records actually transitioned by this sweep.
    pub reaped: usize,
    /// Stale markers removed without a transition.
    pub caught_up: usize,
}

/// Periodic reaper for expired exchanges, responses and views.
pub struct Sweeper {
    store: ExchangeStore,
    interval: Duration,
}

impl Sweeper {
    pub fn new(store: ExchangeStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Spawn the sweep loop; runs until the process exits.
    pub fn start(self: Arc<Self>) {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Expiration sweeper started");
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.sweep_all().await;
            }
        });
    }

    /// One pass over all three categories.
    pub async fn sweep_all(&self) {
        for category in CATEGORIES {
            match self.sweep(category).await {
                Ok(stats) if stats.due > 0 => {
                    info!(
                        category = category.as_str(),
                        due = stats.due,
                        reaped = stats.reaped,
                        caught_up = stats.caught_up,
                        "Sweep pass finished"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    error!(category = category.as_str(), error = %err, "Sweep pass failed");
                }
            }
        }
    }

    /// Sweep one category: walk markers oldest-first, stop at the first
    /// marker that has not expired yet.
    pub async fn sweep(&self, category: ExpiryCategory) -> Result<SweepStats, StoreError> {
        let now = Utc::now();
        let mut stats = SweepStats::default();

        for marker in self.store.list_markers(category).await? {
            if marker.expires_at > now {
                break;
            }
            stats.due += 1;

            let outcome = match category {
                ExpiryCategory::SendExpiry => self.reap_exchange(&marker).await,
                ExpiryCategory::ReceiveResponseExpiry => self.reap_response(&marker).await,
                ExpiryCategory::ViewExpiry => self.reap_view(&marker).await,
            };
            match outcome {
                Ok(true) => stats.reaped += 1,
                Ok(false) => stats.caught_up += 1,
                Err(err) => {
                    // Marker stays behind; the next tick retries.
                    warn!(
                        key = marker.key,
                        exchange_id = marker.exchange_id,
                        error = %err,
                        "Failed to reap expired record"
                    );
                }
            }
        }
        Ok(stats)
    }

    /// Reap one expired push exchange: mark deleted, drop part blobs.
    async fn reap_exchange(&self, marker: &ExpiryMarker) -> Result<bool, StoreError> {
        let target = StateRef::exchange(ExpiryCategory::SendExpiry.kind(), &marker.exchange_id);
        self.reap_state(&target, marker).await
    }

    /// Reap one expired pull response, addressed by the marker's child id.
    async fn reap_response(&self, marker: &ExpiryMarker) -> Result<bool, StoreError> {
        let Some(response_id) = &marker.child_id else {
            // Malformed marker; remove it rather than retry forever.
            self.store.delete_marker(&marker.key).await?;
            return Ok(false);
        };
        let target = StateRef::response(&marker.exchange_id, response_id);
        self.reap_state(&target, marker).await
    }

    async fn reap_state(&self, target: &StateRef, marker: &ExpiryMarker) -> Result<bool, StoreError> {
        let Some(mut state) = self.store.get_state(target).await? else {
            self.store.delete_marker(&marker.key).await?;
            return Ok(false);
        };
        if state.data_deleted_at.is_some() {
            // Already reaped; a crashed sweep left the marker behind.
            self.store.delete_marker(&marker.key).await?;
            return Ok(false);
        }

        state.data_deleted_at = Some(Utc::now());
        state.data_deleted_reason = Some(DeleteReason::Expired);

        let (deleted, persisted, unmarked) = futures::join!(
            self.store.delete_parts(target),
            self.store.put_state(target, &state),
            self.store.delete_marker(&marker.key),
        );
        if let Ok(count) = &deleted {
            debug!(
                exchange_id = marker.exchange_id,
                response_id = ?target.response_id,
                parts = count,
                "Reaped expired record"
            );
        }
        deleted?;
        persisted?;
        unmarked?;
        Ok(true)
    }

    /// Close one expired view. When that exhausts the exchange's view
    /// budget, the exchange data itself is reaped too.
    async fn reap_view(&self, marker: &ExpiryMarker) -> Result<bool, StoreError> {
        let Some(view_id) = &marker.child_id else {
            self.store.delete_marker(&marker.key).await?;
            return Ok(false);
        };

        let target = StateRef::exchange(ExchangeKind::Send, &marker.exchange_id);
        let Some(mut state) = self.store.get_state(&target).await? else {
            self.store.delete_marker(&marker.key).await?;
            return Ok(false);
        };
        let already_closed = match state.view_mut(view_id) {
            None => true,
            Some(view) if view.closed_at.is_some() => true,
            Some(view) => {
                view.closed_at = Some(Utc::now());
                view.closed_reason = Some(ViewCloseReason::Expired);
                false
            }
        };
        if already_closed {
            self.store.delete_marker(&marker.key).await?;
            return Ok(false);
        }

        // A fully consumed view budget with every view closed means the
        // exchange can never be viewed again.
        let exhausted = match self
            .store
            .get_config(ExchangeKind::Send, &marker.exchange_id)
            .await?
        {
            Some(config) => {
                config
                    .max_views
                    .map(|max| state.views.len() as u32 >= max)
                    .unwrap_or(false)
                    && state.views.iter().all(|v| v.closed_at.is_some())
                    && state.data_deleted_at.is_none()
            }
            None => false,
        };
        if exhausted {
            state.data_deleted_at = Some(Utc::now());
            state.data_deleted_reason = Some(DeleteReason::Viewed);
        }

        let (deleted, persisted, unmarked) = futures::join!(
            async {
                if exhausted {
                    self.store.delete_parts(&target).await.map(Some)
                } else {
                    Ok(None)
                }
            },
            self.store.put_state(&target, &state),
            self.store.delete_marker(&marker.key),
        );
        debug!(
            exchange_id = marker.exchange_id,
            view_id,
            exhausted,
            "Closed expired view"
        );
        deleted?;
        persisted?;
        unmarked?;
        Ok(true)
    }
}
