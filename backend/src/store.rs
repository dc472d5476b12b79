//! Typed exchange store adapter.
//!
//! A thin façade over the object store with deterministic, path-like keys
//! for the three record families (config, state, numbered part blobs)
//! plus zero-byte expiration markers. Marker keys embed an ISO-8601 UTC
//! timestamp, so a lexicographic prefix listing yields markers in
//! expiration order - the sweeper depends on exactly that.

use crate::models::{ExchangeConfig, ExchangeKind, ExchangeState};
use crate::object_store::{ObjectStore, StoreError};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

/// Fixed-width UTC format; lexicographic order equals chronological order.
const MARKER_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Addresses one state record and its part blobs: either a push exchange
/// or one response nested under a pull exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRef {
    pub kind: ExchangeKind,
    pub exchange_id: String,
    pub response_id: Option<String>,
}

impl StateRef {
    pub fn exchange(kind: ExchangeKind, exchange_id: impl Into<String>) -> Self {
        Self {
            kind,
            exchange_id: exchange_id.into(),
            response_id: None,
        }
    }

    pub fn response(exchange_id: impl Into<String>, response_id: impl Into<String>) -> Self {
        Self {
            kind: ExchangeKind::Receive,
            exchange_id: exchange_id.into(),
            response_id: Some(response_id.into()),
        }
    }

    fn instance_prefix(&self) -> String {
        match &self.response_id {
            Some(rid) => format!(
                "{}/instance-data/{}/responses/{}",
                self.kind.as_str(),
                self.exchange_id,
                rid
            ),
            None => format!("{}/instance-data/{}", self.kind.as_str(), self.exchange_id),
        }
    }

    fn state_key(&self) -> String {
        format!("{}/state.json", self.instance_prefix())
    }

    fn parts_prefix(&self) -> String {
        format!("{}/encrypted-parts/", self.instance_prefix())
    }

    fn part_key(&self, number: u32) -> String {
        format!("{}{}.bin", self.parts_prefix(), number)
    }
}

/// Marker categories, one per sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCategory {
    /// Push exchange reached its configured expiration.
    SendExpiry,
    /// Pull response reached the parent exchange's expiration.
    ReceiveResponseExpiry,
    /// View outlived its credential-lifetime ceiling.
    ViewExpiry,
}

impl ExpiryCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpiryCategory::SendExpiry => "send-expiry",
            ExpiryCategory::ReceiveResponseExpiry => "receive-response-expiry",
            ExpiryCategory::ViewExpiry => "view-expiry",
        }
    }

    /// Kind namespace the marker lives under.
    pub fn kind(self) -> ExchangeKind {
        match self {
            ExpiryCategory::SendExpiry | ExpiryCategory::ViewExpiry => ExchangeKind::Send,
            ExpiryCategory::ReceiveResponseExpiry => ExchangeKind::Receive,
        }
    }

    fn prefix(self) -> String {
        format!("{}/expirations/{}/", self.kind().as_str(), self.as_str())
    }
}

/// One parsed expiration marker.
#[derive(Debug, Clone)]
pub struct ExpiryMarker {
    /// Full store key; needed to delete the marker.
    pub key: String,
    pub expires_at: DateTime<Utc>,
    pub exchange_id: String,
    /// Response id or view id, depending on the category.
    pub child_id: Option<String>,
}

/// Typed read/modify/write access to exchange records and part blobs.
#[derive(Clone)]
pub struct ExchangeStore {
    store: Arc<dyn ObjectStore>,
}

impl ExchangeStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn config_key(kind: ExchangeKind, exchange_id: &str) -> String {
        format!("{}/instance-data/{}/config.json", kind.as_str(), exchange_id)
    }

    // === Configs ===

    pub async fn get_config(
        &self,
        kind: ExchangeKind,
        exchange_id: &str,
    ) -> Result<Option<ExchangeConfig>, StoreError> {
        let key = Self::config_key(kind, exchange_id);
        match self.store.get(&key).await? {
            Some(bytes) => Ok(Some(parse_record(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put_config(&self, config: &ExchangeConfig) -> Result<(), StoreError> {
        let key = Self::config_key(config.kind, &config.id);
        self.store.put(&key, encode_record(&key, config)?).await
    }

    // === States ===

    pub async fn get_state(&self, target: &StateRef) -> Result<Option<ExchangeState>, StoreError> {
        let key = target.state_key();
        match self.store.get(&key).await? {
            Some(bytes) => Ok(Some(parse_record(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put_state(
        &self,
        target: &StateRef,
        state: &ExchangeState,
    ) -> Result<(), StoreError> {
        let key = target.state_key();
        self.store.put(&key, encode_record(&key, state)?).await
    }

    /// Response ids present under a pull exchange, in key order.
    pub async fn list_response_ids(&self, exchange_id: &str) -> Result<Vec<String>, StoreError> {
        let prefix = format!("receive/instance-data/{exchange_id}/responses/");
        let keys = self.store.list(&prefix).await?;
        let mut ids = Vec::new();
        for key in keys {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if let Some(rid) = rest.strip_suffix("/state.json") {
                    ids.push(rid.to_string());
                }
            }
        }
        Ok(ids)
    }

    // === Part blobs ===

    pub async fn put_part(
        &self,
        target: &StateRef,
        number: u32,
        bytes: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.store.put(&target.part_key(number), bytes).await
    }

    pub async fn get_part(
        &self,
        target: &StateRef,
        number: u32,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.get(&target.part_key(number)).await
    }

    /// Part numbers derived from an authoritative listing of the store.
    pub async fn list_part_numbers(&self, target: &StateRef) -> Result<Vec<u32>, StoreError> {
        let prefix = target.parts_prefix();
        let keys = self.store.list(&prefix).await?;
        let mut numbers: Vec<u32> = keys
            .iter()
            .filter_map(|key| {
                key.strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_suffix(".bin"))
                    .and_then(|n| n.parse().ok())
            })
            .collect();
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// Delete every part blob, best-effort in parallel. Individual
    /// failures are logged and do not abort the batch.
    pub async fn delete_parts(&self, target: &StateRef) -> Result<usize, StoreError> {
        let prefix = target.parts_prefix();
        let keys = self.store.list(&prefix).await?;
        let deleted = keys.len();
        let results = join_all(keys.iter().map(|key| self.store.delete(key))).await;
        for (key, result) in keys.iter().zip(results) {
            if let Err(err) = result {
                warn!(key, error = %err, "Failed to delete part blob");
            }
        }
        Ok(deleted)
    }

    // === Expiration markers ===

    pub async fn write_marker(
        &self,
        category: ExpiryCategory,
        expires_at: DateTime<Utc>,
        exchange_id: &str,
        child_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut key = format!(
            "{}{}/{}",
            category.prefix(),
            expires_at.format(MARKER_TIME_FORMAT),
            exchange_id
        );
        if let Some(child) = child_id {
            key.push('/');
            key.push_str(child);
        }
        self.store.put(&key, Vec::new()).await
    }

    /// All markers of a category, oldest expiration first.
    pub async fn list_markers(
        &self,
        category: ExpiryCategory,
    ) -> Result<Vec<ExpiryMarker>, StoreError> {
        let prefix = category.prefix();
        let keys = self.store.list(&prefix).await?;
        let mut markers = Vec::with_capacity(keys.len());
        for key in keys {
            match parse_marker(&prefix, &key) {
                Some(marker) => markers.push(marker),
                None => warn!(key, "Skipping malformed expiration marker"),
            }
        }
        Ok(markers)
    }

    pub async fn delete_marker(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(key).await
    }
}

fn parse_marker(prefix: &str, key: &str) -> Option<ExpiryMarker> {
    let rest = key.strip_prefix(prefix)?;
    let mut segments = rest.split('/');
    let timestamp = segments.next()?;
    let exchange_id = segments.next()?.to_string();
    let child_id = segments.next().map(str::to_string);
    let expires_at = NaiveDateTime::parse_from_str(timestamp, MARKER_TIME_FORMAT)
        .ok()?
        .and_utc();
    Some(ExpiryMarker {
        key: key.to_string(),
        expires_at,
        exchange_id,
        child_id,
    })
}

fn parse_record<T: serde::de::DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|err| StoreError::CorruptRecord {
        key: key.to_string(),
        detail: err.to_string(),
    })
}

fn encode_record<T: serde::Serialize>(key: &str, record: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(record).map_err(|err| StoreError::CorruptRecord {
        key: key.to_string(),
        detail: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryObjectStore;
    use chrono::{Duration, TimeZone};

    fn store() -> ExchangeStore {
        ExchangeStore::new(Arc::new(MemoryObjectStore::new()))
    }

    #[test]
    fn key_layout() {
        let send = StateRef::exchange(ExchangeKind::Send, "sx123");
        assert_eq!(send.state_key(), "send/instance-data/sx123/state.json");
        assert_eq!(send.part_key(3), "send/instance-data/sx123/encrypted-parts/3.bin");
        assert_eq!(
            ExchangeStore::config_key(ExchangeKind::Send, "sx123"),
            "send/instance-data/sx123/config.json"
        );

        let response = StateRef::response("rx9", "rp4");
        assert_eq!(
            response.state_key(),
            "receive/instance-data/rx9/responses/rp4/state.json"
        );
        assert_eq!(
            response.part_key(1),
            "receive/instance-data/rx9/responses/rp4/encrypted-parts/1.bin"
        );
    }

    #[tokio::test]
    async fn state_round_trip() {
        let exchanges = store();
        let target = StateRef::exchange(ExchangeKind::Send, "sx1");
        assert!(exchanges.get_state(&target).await.unwrap().is_none());

        let state = ExchangeState::new("sx1".into(), "PartsPassword1234567".into(), Utc::now());
        exchanges.put_state(&target, &state).await.unwrap();

        let loaded = exchanges.get_state(&target).await.unwrap().unwrap();
        assert_eq!(loaded.parts_password, state.parts_password);
    }

    #[tokio::test]
    async fn part_listing_is_authoritative() {
        let exchanges = store();
        let target = StateRef::exchange(ExchangeKind::Send, "sx1");

        exchanges.put_part(&target, 2, vec![2]).await.unwrap();
        exchanges.put_part(&target, 1, vec![1]).await.unwrap();
        // Overwriting a part leaves one blob for that number.
        exchanges.put_part(&target, 1, vec![9]).await.unwrap();

        assert_eq!(exchanges.list_part_numbers(&target).await.unwrap(), vec![1, 2]);
        assert_eq!(exchanges.get_part(&target, 1).await.unwrap(), Some(vec![9]));

        let deleted = exchanges.delete_parts(&target).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(exchanges.list_part_numbers(&target).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn markers_sort_by_embedded_timestamp() {
        let exchanges = store();
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        exchanges
            .write_marker(ExpiryCategory::SendExpiry, base + Duration::hours(2), "sxB", None)
            .await
            .unwrap();
        exchanges
            .write_marker(ExpiryCategory::SendExpiry, base, "sxA", None)
            .await
            .unwrap();
        exchanges
            .write_marker(
                ExpiryCategory::ViewExpiry,
                base + Duration::hours(1),
                "sxA",
                Some("vw1"),
            )
            .await
            .unwrap();

        let markers = exchanges.list_markers(ExpiryCategory::SendExpiry).await.unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].exchange_id, "sxA");
        assert_eq!(markers[0].expires_at, base);
        assert_eq!(markers[1].exchange_id, "sxB");

        let view_markers = exchanges.list_markers(ExpiryCategory::ViewExpiry).await.unwrap();
        assert_eq!(view_markers.len(), 1);
        assert_eq!(view_markers[0].child_id.as_deref(), Some("vw1"));

        exchanges.delete_marker(&markers[0].key).await.unwrap();
        let markers = exchanges.list_markers(ExpiryCategory::SendExpiry).await.unwrap();
        assert_eq!(markers.len(), 1);
    }

    #[tokio::test]
    async fn response_ids_listing() {
        let exchanges = store();
        let state = ExchangeState::new("rp1".into(), "PartsPassword1234567".into(), Utc::now());
        exchanges
            .put_state(&StateRef::response("rx1", "rp1"), &state)
            .await
            .unwrap();
        exchanges
            .put_state(&StateRef::response("rx1", "rp2"), &state)
            .await
            .unwrap();
        // Parts alone do not constitute a response.
        exchanges
            .put_part(&StateRef::response("rx1", "rp3"), 1, vec![0])
            .await
            .unwrap();

        let ids = exchanges.list_response_ids("rx1").await.unwrap();
        assert_eq!(ids, vec!["rp1", "rp2"]);
    }
}
