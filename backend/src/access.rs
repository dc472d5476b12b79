//! Access state machine for push exchanges.
//!
//! Governs whether and how a viewer may unlock an exchange: password
//! check, optional confirmation-code challenge, view budget and
//! time-based expiry. Stages: needs-password → needs-confirmation →
//! viewable, or a terminal not-viewable.
//!
//! A checkpoint (last view id + last view password, persisted client
//! side) whose password no longer matches is treated as a stale hand-off:
//! the caller falls through to starting a new view instead of retrying
//! the same one. That consumes a view slot on a stale client cache, a
//! deliberate trade of a slot for robustness.

use crate::config::Config;
use crate::ids;
use crate::models::*;
use crate::notify::{Notifier, WebhookEvent};
use crate::object_store::StoreError;
use crate::store::{ExchangeStore, ExpiryCategory, StateRef};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Cumulative confirmation submissions that permanently close a view.
pub const MAX_CONFIRMATION_SUBMISSIONS: usize = 10;

/// Access-path errors; each maps to one stable reason string.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Exchange not found.")]
    ExchangeNotFound,

    #[error("Exchange is not ready.")]
    NotReady,

    #[error("Exchange has expired.")]
    ExchangeExpired,

    #[error("Exchange data has been deleted.")]
    DataDeleted,

    #[error("No views remaining.")]
    NoViewsRemaining,

    #[error("Invalid password.")]
    InvalidPassword,

    #[error("View not found.")]
    ViewNotFound,

    #[error("View is closed.")]
    ViewClosed,

    #[error("View has expired.")]
    ViewExpired,

    #[error("View is not ready.")]
    ViewNotReady,

    #[error("Invalid view password.")]
    InvalidViewPassword,

    #[error("Invalid part number.")]
    InvalidPartNumber,

    #[error("Invalid confirmation code.")]
    InvalidConfirmationCode,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Exchange-level gate outcome shared by every access operation.
enum Gated {
    Open(Box<(ExchangeConfig, ExchangeState)>),
    Blocked(NotViewableReason),
}

/// Evaluates viewer requests against config + mutable state.
#[derive(Clone)]
pub struct AccessMachine {
    store: ExchangeStore,
    notifier: Arc<dyn Notifier>,
    config: Config,
}

impl AccessMachine {
    pub fn new(store: ExchangeStore, notifier: Arc<dyn Notifier>, config: Config) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    fn target(exchange_id: &str) -> StateRef {
        StateRef::exchange(ExchangeKind::Send, exchange_id)
    }

    /// Load config + state and apply the viewability gates in order:
    /// existence, readiness, expiration, deletion.
    async fn gate(&self, exchange_id: &str, now: DateTime<Utc>) -> Result<Gated, StoreError> {
        let Some(config) = self
            .store
            .get_config(ExchangeKind::Send, exchange_id)
            .await?
        else {
            return Ok(Gated::Blocked(NotViewableReason::NotFound));
        };
        let Some(state) = self.store.get_state(&Self::target(exchange_id)).await? else {
            return Ok(Gated::Blocked(NotViewableReason::NotFound));
        };

        if state.data_deleted_at.is_some() {
            return Ok(Gated::Blocked(NotViewableReason::Deleted));
        }
        if state.ready_at.is_none() {
            return Ok(Gated::Blocked(NotViewableReason::NotReady));
        }
        if config.is_expired(now) {
            return Ok(Gated::Blocked(NotViewableReason::Expired));
        }
        Ok(Gated::Open(Box::new((config, state))))
    }

    fn gate_error(reason: NotViewableReason) -> AccessError {
        match reason {
            NotViewableReason::NotFound => AccessError::ExchangeNotFound,
            NotViewableReason::NotReady => AccessError::NotReady,
            NotViewableReason::Expired => AccessError::ExchangeExpired,
            NotViewableReason::Deleted => AccessError::DataDeleted,
            NotViewableReason::NoViewsRemaining => AccessError::NoViewsRemaining,
        }
    }

    fn views_exhausted(config: &ExchangeConfig, state: &ExchangeState) -> bool {
        config
            .max_views
            .map(|max| state.views.len() as u32 >= max)
            .unwrap_or(false)
    }

    fn all_views_closed(state: &ExchangeState) -> bool {
        state.views.iter().all(|v| v.closed_at.is_some())
    }

    fn viewable(config: &ExchangeConfig, state: &ExchangeState, view: &View) -> AccessStatus {
        AccessStatus::Viewable {
            view_id: view.id.clone(),
            view_password: view.password.clone(),
            fields: config.fields.clone(),
            total_encrypted_parts: state.total_encrypted_parts.unwrap_or(0),
        }
    }

    /// Read-only evaluation of where a viewer stands. Never creates or
    /// mutates a view.
    pub async fn load_status(
        &self,
        exchange_id: &str,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<AccessStatus, AccessError> {
        let now = Utc::now();
        let (config, state) = match self.gate(exchange_id, now).await? {
            Gated::Blocked(reason) => return Ok(AccessStatus::NotViewable { reason }),
            Gated::Open(open) => *open,
        };

        // A live checkpointed view short-circuits the fresh-view branch.
        if let Some(cp) = checkpoint {
            if let Some(view) = state.view(&cp.view_id) {
                if view.is_open(now, self.config.view_ttl_chrono())
                    && view.password == cp.view_password
                {
                    if view.ready_at.is_some() {
                        return Ok(Self::viewable(&config, &state, view));
                    }
                    if config.confirmation_email.is_some() {
                        return Ok(AccessStatus::NeedsConfirmation {
                            view_id: view.id.clone(),
                        });
                    }
                }
                // Closed, expired or password-mismatched checkpoint:
                // fall through to the fresh-view branch.
            }
        }

        if Self::views_exhausted(&config, &state) {
            return Ok(AccessStatus::NotViewable {
                reason: NotViewableReason::NoViewsRemaining,
            });
        }
        if config.password.is_some() {
            return Ok(AccessStatus::NeedsPassword);
        }
        Ok(AccessStatus::NeedsToInitiateView)
    }

    /// Start a new view. Returns a confirmation challenge or an unlocked
    /// credential. A wrong exchange password consumes no view slot.
    pub async fn initiate_view(
        &self,
        exchange_id: &str,
        password: Option<&str>,
    ) -> Result<AccessStatus, AccessError> {
        let now = Utc::now();
        let (config, mut state) = match self.gate(exchange_id, now).await? {
            Gated::Blocked(reason) => return Err(Self::gate_error(reason)),
            Gated::Open(open) => *open,
        };

        if let Some(expected) = &config.password {
            if password != Some(expected.as_str()) {
                debug!(exchange_id, "View initiation rejected: wrong password");
                return Err(AccessError::InvalidPassword);
            }
        }
        if Self::views_exhausted(&config, &state) {
            return Err(AccessError::NoViewsRemaining);
        }

        // The view password must never equal the parts password.
        let view_password = loop {
            let candidate = ids::random_password();
            if candidate != state.parts_password {
                break candidate;
            }
        };

        let mut view = View {
            id: ids::generate("vw"),
            initiated_at: now,
            password: view_password,
            ready_at: None,
            closed_at: None,
            closed_reason: None,
            confirmation_attempts: Vec::new(),
            confirmation_submissions: Vec::new(),
        };

        let status = if let Some(email) = &config.confirmation_email {
            let code = ids::confirmation_code();
            view.confirmation_attempts.push(ConfirmationAttempt {
                code: code.clone(),
                sent_at: now,
                confirmed_at: None,
            });

            let notifier = self.notifier.clone();
            let email = email.clone();
            let exchange_id_owned = exchange_id.to_string();
            let view_id = view.id.clone();
            tokio::spawn(async move {
                notifier
                    .confirmation_code(&email, &exchange_id_owned, &view_id, &code)
                    .await;
            });

            AccessStatus::NeedsConfirmation {
                view_id: view.id.clone(),
            }
        } else {
            view.ready_at = Some(now);
            Self::viewable(&config, &state, &view)
        };

        let view_id = view.id.clone();
        let unlocked = view.ready_at.is_some();
        state.views.push(view);

        self.store
            .write_marker(
                ExpiryCategory::ViewExpiry,
                now + self.config.view_ttl_chrono(),
                exchange_id,
                Some(&view_id),
            )
            .await?;
        self.store.put_state(&Self::target(exchange_id), &state).await?;

        info!(exchange_id, view_id, unlocked, "View initiated");
        if unlocked {
            self.notify_unlocked(&config, &view_id);
        }
        Ok(status)
    }

    /// Compare a submitted code against the live confirmation attempt.
    pub async fn confirm_view(
        &self,
        exchange_id: &str,
        view_id: &str,
        code: &str,
    ) -> Result<AccessStatus, AccessError> {
        let now = Utc::now();
        let (config, mut state) = match self.gate(exchange_id, now).await? {
            Gated::Blocked(reason) => return Err(Self::gate_error(reason)),
            Gated::Open(open) => *open,
        };

        let ttl = self.config.view_ttl_chrono();
        let target = Self::target(exchange_id);
        let view = state.view_mut(view_id).ok_or(AccessError::ViewNotFound)?;

        if view.closed_at.is_some() {
            return Err(AccessError::ViewClosed);
        }
        if now - view.initiated_at >= ttl {
            return Err(AccessError::ViewExpired);
        }

        // Every submission is recorded, right or wrong.
        view.confirmation_submissions.push(ConfirmationSubmission {
            code: code.to_string(),
            submitted_at: now,
        });

        // Only the most recently sent code is live for comparison.
        let matched = view
            .live_attempt_mut()
            .filter(|attempt| attempt.confirmed_at.is_none() && attempt.code == code)
            .map(|attempt| {
                attempt.confirmed_at = Some(now);
            })
            .is_some();

        if matched {
            view.ready_at = Some(now);
            let status = {
                let view = state.view(view_id).ok_or(AccessError::ViewNotFound)?;
                Self::viewable(&config, &state, view)
            };
            self.store.put_state(&target, &state).await?;
            info!(exchange_id, view_id, "View confirmed");
            self.notify_unlocked(&config, view_id);
            return Ok(status);
        }

        let submissions = view.confirmation_submissions.len();
        if submissions >= MAX_CONFIRMATION_SUBMISSIONS {
            view.closed_at = Some(now);
            view.closed_reason = Some(ViewCloseReason::TooManyConfirmationAttempts);
            warn!(exchange_id, view_id, submissions, "View locked out");
        }
        self.store.put_state(&target, &state).await?;
        Err(AccessError::InvalidConfirmationCode)
    }

    /// Authenticate a view credential and hand back one part.
    pub async fn download_part(
        &self,
        exchange_id: &str,
        view_id: &str,
        view_password: &str,
        part_number: u32,
    ) -> Result<Vec<u8>, AccessError> {
        let now = Utc::now();
        let (_config, state) = match self.gate(exchange_id, now).await? {
            Gated::Blocked(reason) => return Err(Self::gate_error(reason)),
            Gated::Open(open) => *open,
        };

        let view = state.view(view_id).ok_or(AccessError::ViewNotFound)?;
        if view.closed_at.is_some() {
            return Err(AccessError::ViewClosed);
        }
        if now - view.initiated_at >= self.config.view_ttl_chrono() {
            return Err(AccessError::ViewExpired);
        }
        if view.password != view_password {
            return Err(AccessError::InvalidViewPassword);
        }
        if view.ready_at.is_none() {
            return Err(AccessError::ViewNotReady);
        }

        self.store
            .get_part(&Self::target(exchange_id), part_number)
            .await?
            .ok_or(AccessError::InvalidPartNumber)
    }

    /// Close a view as client-completed. When that exhausts the view
    /// budget the exchange data is reaped immediately.
    pub async fn complete_view(
        &self,
        exchange_id: &str,
        view_id: &str,
        view_password: &str,
    ) -> Result<(), AccessError> {
        let now = Utc::now();
        let (config, mut state) = match self.gate(exchange_id, now).await? {
            Gated::Blocked(reason) => return Err(Self::gate_error(reason)),
            Gated::Open(open) => *open,
        };

        let target = Self::target(exchange_id);
        let view = state.view_mut(view_id).ok_or(AccessError::ViewNotFound)?;
        if view.closed_at.is_some() {
            return Err(AccessError::ViewClosed);
        }
        if view.password != view_password {
            return Err(AccessError::InvalidViewPassword);
        }

        view.closed_at = Some(now);
        view.closed_reason = Some(ViewCloseReason::ClientCompleted);

        if Self::views_exhausted(&config, &state) && Self::all_views_closed(&state) {
            state.data_deleted_at = Some(now);
            state.data_deleted_reason = Some(DeleteReason::Viewed);
            let deleted = self.store.delete_parts(&target).await?;
            info!(exchange_id, deleted, "Exchange fully viewed, data reaped");
        }

        self.store.put_state(&target, &state).await?;
        debug!(exchange_id, view_id, "View completed");
        Ok(())
    }

    fn notify_unlocked(&self, config: &ExchangeConfig, view_id: &str) {
        let Some(webhook_url) = config.webhook_url.clone() else {
            return;
        };
        let notifier = self.notifier.clone();
        let exchange_id = config.id.clone();
        let view_id = view_id.to_string();
        tokio::spawn(async move {
            notifier
                .webhook(
                    &webhook_url,
                    WebhookEvent::ViewUnlocked,
                    &exchange_id,
                    Some(&view_id),
                )
                .await;
        });
    }
}
