//! Server-side transfer logic: exchange creation, transfer initiation,
//! part upload, and the pull-exchange read path.
//!
//! Uploads are idempotent by overwrite: re-uploading a part number simply
//! replaces the prior blob. Readiness is recomputed from an authoritative
//! listing of the store rather than a client-asserted counter, so
//! duplicate or out-of-order completions from the sender's worker pool
//! are harmless.

use crate::config::Config;
use crate::ids;
use crate::models::*;
use crate::notify::{Notifier, WebhookEvent};
use crate::object_store::StoreError;
use crate::store::{ExchangeStore, ExpiryCategory, StateRef};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Transfer-path errors; each maps to one stable reason string.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Exchange not found.")]
    ExchangeNotFound,

    #[error("Invalid encrypted part password.")]
    InvalidPartsPassword,

    #[error("Transfer already initiated.")]
    AlreadyInitiated,

    #[error("Send is too old to accept parts.")]
    UploadWindowElapsed,

    #[error("Too many parts.")]
    TooManyParts,

    #[error("Invalid part number.")]
    InvalidPartNumber,

    #[error("Exchange data has been deleted.")]
    DataDeleted,

    #[error("Exchange is not ready.")]
    NotReady,

    #[error("Invalid password.")]
    InvalidPassword,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creation, upload and pull-side download operations.
#[derive(Clone)]
pub struct TransferService {
    store: ExchangeStore,
    notifier: Arc<dyn Notifier>,
    config: Config,
}

impl TransferService {
    pub fn new(store: ExchangeStore, notifier: Arc<dyn Notifier>, config: Config) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Create an exchange: config and, for push exchanges, the state that
    /// will receive parts. Writes the expiration marker when configured.
    pub async fn create_exchange(
        &self,
        kind: ExchangeKind,
        req: CreateExchangeRequest,
    ) -> Result<ExchangeConfig, TransferError> {
        let now = Utc::now();
        let id = ids::generate(kind.id_prefix());
        let config = ExchangeConfig {
            id: id.clone(),
            kind,
            created_at: now,
            fields: req.fields,
            expires_at: req.expires_at,
            max_views: req.max_views,
            password: req.password,
            confirmation_email: req.confirmation_email,
            webhook_url: req.webhook_url,
        };
        self.store.put_config(&config).await?;

        if config.kind == ExchangeKind::Send {
            if let Some(expires_at) = config.expires_at {
                self.store
                    .write_marker(ExpiryCategory::SendExpiry, expires_at, &id, None)
                    .await?;
            }
        }

        info!(exchange_id = %id, kind = config.kind.as_str(), "Created exchange");
        Ok(config)
    }

    /// Allocate upload credentials: the state record and its one-time
    /// parts password. For pull exchanges this allocates a fresh nested
    /// response every time; for push exchanges it is single-shot. The
    /// exchange id is the public link token, so re-initiating a push
    /// exchange would let any viewer erase its views and deletion flags
    /// and refill it with new parts.
    pub async fn initiate(
        &self,
        kind: ExchangeKind,
        exchange_id: &str,
    ) -> Result<InitiateTransferResponse, TransferError> {
        let config = self
            .store
            .get_config(kind, exchange_id)
            .await?
            .ok_or(TransferError::ExchangeNotFound)?;

        let now = Utc::now();
        if config.is_expired(now) {
            return Err(TransferError::ExchangeNotFound);
        }

        let parts_password = ids::random_password();
        let (target, response_id) = match kind {
            ExchangeKind::Send => {
                let target = StateRef::exchange(kind, exchange_id);
                if self.store.get_state(&target).await?.is_some() {
                    return Err(TransferError::AlreadyInitiated);
                }
                (target, None)
            }
            ExchangeKind::Receive => {
                let rid = ids::generate("rp");
                (StateRef::response(exchange_id, rid.clone()), Some(rid))
            }
        };

        let state_id = response_id.clone().unwrap_or_else(|| exchange_id.to_string());
        let state = ExchangeState::new(state_id, parts_password.clone(), now);
        self.store.put_state(&target, &state).await?;

        if kind == ExchangeKind::Receive {
            if let (Some(expires_at), Some(rid)) = (config.expires_at, response_id.as_deref()) {
                self.store
                    .write_marker(ExpiryCategory::ReceiveResponseExpiry, expires_at, exchange_id, Some(rid))
                    .await?;
            }
        }

        debug!(exchange_id, response_id = ?response_id, "Initiated transfer");
        Ok(InitiateTransferResponse {
            exchange_id: exchange_id.to_string(),
            response_id,
            parts_password,
        })
    }

    /// Accept one encrypted part and recompute readiness from the store.
    pub async fn upload_part(
        &self,
        target: &StateRef,
        parts_password: &str,
        part_number: u32,
        total_parts: u32,
        body: Vec<u8>,
    ) -> Result<(), TransferError> {
        if total_parts > self.config.max_parts {
            return Err(TransferError::TooManyParts);
        }
        if part_number == 0 || part_number > total_parts {
            return Err(TransferError::InvalidPartNumber);
        }

        let mut state = self
            .store
            .get_state(target)
            .await?
            .ok_or(TransferError::ExchangeNotFound)?;

        if state.parts_password != parts_password {
            return Err(TransferError::InvalidPartsPassword);
        }
        if state.data_deleted_at.is_some() {
            return Err(TransferError::DataDeleted);
        }

        let now = Utc::now();
        if now - state.created_at > self.config.upload_window_chrono() {
            return Err(TransferError::UploadWindowElapsed);
        }

        self.store.put_part(target, part_number, body).await?;

        // The last part to arrive that brings the observed count to the
        // declared total flips readiness.
        let observed = self.store.list_part_numbers(target).await?;
        if observed.len() as u32 == total_parts && state.ready_at.is_none() {
            state.ready_at = Some(now);
            state.total_encrypted_parts = Some(total_parts);
            self.store.put_state(target, &state).await?;

            info!(
                exchange_id = %target.exchange_id,
                response_id = ?target.response_id,
                total_parts,
                "Exchange became ready"
            );
            self.notify_ready(target).await?;
        }

        Ok(())
    }

    async fn notify_ready(&self, target: &StateRef) -> Result<(), TransferError> {
        let config = self
            .store
            .get_config(target.kind, &target.exchange_id)
            .await?;
        let Some(config) = config else { return Ok(()) };
        let Some(webhook_url) = config.webhook_url else {
            return Ok(());
        };

        let event = match target.response_id {
            Some(_) => WebhookEvent::ResponseReady,
            None => WebhookEvent::ExchangeReady,
        };
        let notifier = self.notifier.clone();
        let exchange_id = target.exchange_id.clone();
        let child_id = target.response_id.clone();
        tokio::spawn(async move {
            notifier
                .webhook(&webhook_url, event, &exchange_id, child_id.as_deref())
                .await;
        });
        Ok(())
    }

    /// Ready responses to a pull exchange, gated by its config password.
    pub async fn list_responses(
        &self,
        exchange_id: &str,
        password: Option<&str>,
    ) -> Result<Vec<ResponseSummary>, TransferError> {
        let config = self.gate_pull_read(exchange_id, password).await?;

        let mut summaries = Vec::new();
        for rid in self.store.list_response_ids(&config.id).await? {
            let target = StateRef::response(&config.id, &rid);
            let Some(state) = self.store.get_state(&target).await? else {
                continue;
            };
            if state.data_deleted_at.is_some() {
                continue;
            }
            if let (Some(ready_at), Some(total)) = (state.ready_at, state.total_encrypted_parts) {
                summaries.push(ResponseSummary {
                    response_id: rid,
                    ready_at,
                    total_encrypted_parts: total,
                });
            }
        }
        Ok(summaries)
    }

    /// Download one part of a ready pull response.
    pub async fn download_response_part(
        &self,
        exchange_id: &str,
        response_id: &str,
        password: Option<&str>,
        part_number: u32,
    ) -> Result<Vec<u8>, TransferError> {
        self.gate_pull_read(exchange_id, password).await?;

        let target = StateRef::response(exchange_id, response_id);
        let state = self
            .store
            .get_state(&target)
            .await?
            .ok_or(TransferError::ExchangeNotFound)?;
        if state.data_deleted_at.is_some() {
            return Err(TransferError::DataDeleted);
        }
        if state.ready_at.is_none() {
            return Err(TransferError::NotReady);
        }
        self.store
            .get_part(&target, part_number)
            .await?
            .ok_or(TransferError::InvalidPartNumber)
    }

    async fn gate_pull_read(
        &self,
        exchange_id: &str,
        password: Option<&str>,
    ) -> Result<ExchangeConfig, TransferError> {
        let config = self
            .store
            .get_config(ExchangeKind::Receive, exchange_id)
            .await?
            .ok_or(TransferError::ExchangeNotFound)?;
        if let Some(expected) = &config.password {
            if password != Some(expected.as_str()) {
                return Err(TransferError::InvalidPassword);
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::create_notifier;
    use crate::object_store::MemoryObjectStore;

    fn service() -> TransferService {
        let store = ExchangeStore::new(Arc::new(MemoryObjectStore::new()));
        TransferService::new(store, create_notifier(), Config::from_env())
    }

    fn send_request() -> CreateExchangeRequest {
        CreateExchangeRequest {
            fields: vec![FieldSpec {
                title: "Secret".into(),
                kind: FieldKind::SingleLineText,
            }],
            max_views: Some(1),
            ..CreateExchangeRequest::default()
        }
    }

    #[tokio::test]
    async fn push_initiation_is_single_shot() {
        let svc = service();
        let config = svc
            .create_exchange(ExchangeKind::Send, send_request())
            .await
            .unwrap();

        svc.initiate(ExchangeKind::Send, &config.id).await.unwrap();

        // The exchange id is public; a second initiation must not hand
        // out fresh credentials or erase the existing state.
        let err = svc.initiate(ExchangeKind::Send, &config.id).await.unwrap_err();
        assert!(matches!(err, TransferError::AlreadyInitiated));
        assert_eq!(err.to_string(), "Transfer already initiated.");
    }

    #[tokio::test]
    async fn pull_initiation_allocates_a_fresh_response_each_time() {
        let svc = service();
        let config = svc
            .create_exchange(ExchangeKind::Receive, CreateExchangeRequest::default())
            .await
            .unwrap();

        let first = svc.initiate(ExchangeKind::Receive, &config.id).await.unwrap();
        let second = svc.initiate(ExchangeKind::Receive, &config.id).await.unwrap();
        assert_ne!(first.response_id, second.response_id);
        assert_ne!(first.parts_password, second.parts_password);
    }

    #[tokio::test]
    async fn upload_rejects_wrong_parts_password() {
        let svc = service();
        let config = svc.create_exchange(ExchangeKind::Send, send_request()).await.unwrap();
        let _ticket = svc.initiate(ExchangeKind::Send, &config.id).await.unwrap();
        let target = StateRef::exchange(ExchangeKind::Send, &config.id);

        let err = svc
            .upload_part(&target, "WrongPassword0000000", 1, 1, vec![1])
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidPartsPassword));
        assert_eq!(err.to_string(), "Invalid encrypted part password.");
    }

    #[tokio::test]
    async fn upload_validates_part_numbers_and_ceiling() {
        let svc = service();
        let config = svc.create_exchange(ExchangeKind::Send, send_request()).await.unwrap();
        let ticket = svc.initiate(ExchangeKind::Send, &config.id).await.unwrap();
        let target = StateRef::exchange(ExchangeKind::Send, &config.id);

        let err = svc
            .upload_part(&target, &ticket.parts_password, 0, 2, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidPartNumber));

        let err = svc
            .upload_part(&target, &ticket.parts_password, 3, 2, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidPartNumber));

        let err = svc
            .upload_part(&target, &ticket.parts_password, 1, 16, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::TooManyParts));
    }

    #[tokio::test]
    async fn readiness_flips_on_listing_count_regardless_of_order() {
        let svc = service();
        let config = svc.create_exchange(ExchangeKind::Send, send_request()).await.unwrap();
        let ticket = svc.initiate(ExchangeKind::Send, &config.id).await.unwrap();
        let target = StateRef::exchange(ExchangeKind::Send, &config.id);

        svc.upload_part(&target, &ticket.parts_password, 3, 3, vec![3])
            .await
            .unwrap();
        svc.upload_part(&target, &ticket.parts_password, 1, 3, vec![1])
            .await
            .unwrap();

        let state = svc.store.get_state(&target).await.unwrap().unwrap();
        assert!(state.ready_at.is_none());

        // Duplicate upload does not flip readiness early.
        svc.upload_part(&target, &ticket.parts_password, 1, 3, vec![1])
            .await
            .unwrap();
        let state = svc.store.get_state(&target).await.unwrap().unwrap();
        assert!(state.ready_at.is_none());

        svc.upload_part(&target, &ticket.parts_password, 2, 3, vec![2])
            .await
            .unwrap();
        let state = svc.store.get_state(&target).await.unwrap().unwrap();
        assert!(state.ready_at.is_some());
        assert_eq!(state.total_encrypted_parts, Some(3));
    }

    #[tokio::test]
    async fn upload_window_is_enforced() {
        let svc = service();
        let config = svc.create_exchange(ExchangeKind::Send, send_request()).await.unwrap();
        let ticket = svc.initiate(ExchangeKind::Send, &config.id).await.unwrap();
        let target = StateRef::exchange(ExchangeKind::Send, &config.id);

        // Age the state past the ceiling.
        let mut state = svc.store.get_state(&target).await.unwrap().unwrap();
        state.created_at = Utc::now() - chrono::Duration::minutes(21);
        svc.store.put_state(&target, &state).await.unwrap();

        let err = svc
            .upload_part(&target, &ticket.parts_password, 1, 1, vec![1])
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::UploadWindowElapsed));
        assert_eq!(err.to_string(), "Send is too old to accept parts.");
    }

    #[tokio::test]
    async fn pull_flow_allocates_responses_and_gates_reads() {
        let svc = service();
        let config = svc
            .create_exchange(
                ExchangeKind::Receive,
                CreateExchangeRequest {
                    password: Some("hunter2".into()),
                    ..CreateExchangeRequest::default()
                },
            )
            .await
            .unwrap();

        let ticket = svc.initiate(ExchangeKind::Receive, &config.id).await.unwrap();
        let rid = ticket.response_id.clone().unwrap();
        let target = StateRef::response(&config.id, &rid);

        svc.upload_part(&target, &ticket.parts_password, 1, 1, vec![7])
            .await
            .unwrap();

        let err = svc.list_responses(&config.id, None).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidPassword));

        let responses = svc.list_responses(&config.id, Some("hunter2")).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].response_id, rid);
        assert_eq!(responses[0].total_encrypted_parts, 1);

        let body = svc
            .download_response_part(&config.id, &rid, Some("hunter2"), 1)
            .await
            .unwrap();
        assert_eq!(body, vec![7]);
    }
}
