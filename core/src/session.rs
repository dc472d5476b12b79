//! Client-side transfer session: end-to-end send and receive.
//!
//! The session is an explicit service object constructed once per
//! sender/viewer and passed by reference; all network effects go through
//! the [`ExchangeTransport`] trait so tests can wire it to an in-process
//! backend. Parts move with a bounded worker pool (three in flight);
//! completion order across workers is unspecified, so downloads re-sort
//! by part number before joining.

use crate::chunker;
use crate::codec::{self, PublicBlob, SecretEntry};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};

/// Fixed number of parts in flight per session.
pub const TRANSFER_CONCURRENCY: usize = 3;

/// Credentials for uploading parts, handed out by the backend when a
/// transfer is initiated.
#[derive(Debug, Clone)]
pub struct TransferTicket {
    pub exchange_id: String,
    /// Set when uploading a response to a pull exchange.
    pub response_id: Option<String>,
    /// Authenticates part uploads; distinct from any viewer password.
    pub parts_password: String,
}

/// Credentials for downloading parts, handed out once a view unlocks.
#[derive(Debug, Clone)]
pub struct DownloadTicket {
    pub exchange_id: String,
    pub view_id: String,
    pub view_password: String,
    pub total_parts: u32,
}

/// Everything a sender needs to build the share link.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub ticket: TransferTicket,
    /// Decryption password; goes in the URL fragment, never to the server.
    pub password: String,
    pub total_parts: u32,
}

/// Transport seam between the session and the backend API.
#[async_trait]
pub trait ExchangeTransport: Send + Sync {
    /// Obtain an exchange/response id and a one-time parts password.
    async fn initiate_transfer(&self) -> Result<TransferTicket>;

    /// Upload one part, tagged with its 1-based number and declared total.
    /// Re-uploading a part number overwrites the prior blob.
    async fn upload_part(
        &self,
        ticket: &TransferTicket,
        part_number: u32,
        total_parts: u32,
        body: Vec<u8>,
    ) -> Result<()>;

    /// Download one part by its 1-based number.
    async fn download_part(&self, ticket: &DownloadTicket, part_number: u32) -> Result<Vec<u8>>;
}

/// Drives pack → split → upload and download → join → unpack.
pub struct TransferSession<T> {
    transport: T,
    part_ceiling: usize,
}

impl<T: ExchangeTransport> TransferSession<T> {
    pub fn new(transport: T) -> Self {
        Self::with_part_ceiling(transport, chunker::MAX_PART_BYTES)
    }

    pub fn with_part_ceiling(transport: T, part_ceiling: usize) -> Self {
        Self {
            transport,
            part_ceiling,
        }
    }

    /// Encrypt `entries` locally and upload the resulting parts.
    pub async fn send(&self, entries: &[SecretEntry]) -> Result<SendReceipt> {
        let ticket = self.transport.initiate_transfer().await?;

        let blob = codec::pack(entries)?;
        let serialized = serde_json::to_string(&PublicBlob::from_packed(&blob))?;
        let parts = chunker::split(&serialized, self.part_ceiling);
        let total_parts = parts.len() as u32;

        let transport = &self.transport;
        let ticket_ref = &ticket;
        stream::iter(parts.into_iter().enumerate())
            .map(|(index, part)| async move {
                transport
                    .upload_part(ticket_ref, index as u32 + 1, total_parts, part.into_bytes())
                    .await
            })
            .buffer_unordered(TRANSFER_CONCURRENCY)
            .try_collect::<Vec<()>>()
            .await?;

        Ok(SendReceipt {
            ticket,
            password: blob.password,
            total_parts,
        })
    }

    /// Download all parts for an unlocked view and decrypt locally.
    pub async fn receive(&self, ticket: &DownloadTicket, password: &str) -> Result<Vec<SecretEntry>> {
        let transport = &self.transport;
        let mut numbered: Vec<(u32, Vec<u8>)> = stream::iter(1..=ticket.total_parts)
            .map(|number| async move {
                transport
                    .download_part(ticket, number)
                    .await
                    .map(|body| (number, body))
            })
            .buffer_unordered(TRANSFER_CONCURRENCY)
            .try_collect()
            .await?;

        // Workers complete in arbitrary order; join requires index order.
        numbered.sort_by_key(|(number, _)| *number);

        let mut parts = Vec::with_capacity(numbered.len());
        for (number, body) in numbered {
            let part = String::from_utf8(body)
                .map_err(|_| Error::Malformed(format!("part {number} is not valid UTF-8")))?;
            parts.push(part);
        }

        let serialized = chunker::join(&parts);
        let public: PublicBlob = serde_json::from_str(&serialized)?;
        codec::unpack(
            &public.iv.to_bytes()?,
            &public.ciphertext.to_bytes()?,
            &public.salt.to_bytes()?,
            password,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SecretFile;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory transport that records parts and tracks peak concurrency.
    #[derive(Default)]
    struct MockTransport {
        parts: Mutex<HashMap<u32, Vec<u8>>>,
        uploads: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl MockTransport {
        fn enter(&self) {
            let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(active, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ExchangeTransport for &MockTransport {
        async fn initiate_transfer(&self) -> Result<TransferTicket> {
            Ok(TransferTicket {
                exchange_id: "sx0000000000test".into(),
                response_id: None,
                parts_password: "PartsPassword1234567".into(),
            })
        }

        async fn upload_part(
            &self,
            _ticket: &TransferTicket,
            part_number: u32,
            _total_parts: u32,
            body: Vec<u8>,
        ) -> Result<()> {
            self.enter();
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.parts.lock().unwrap().insert(part_number, body);
            self.uploads.fetch_add(1, Ordering::SeqCst);
            self.leave();
            Ok(())
        }

        async fn download_part(
            &self,
            _ticket: &DownloadTicket,
            part_number: u32,
        ) -> Result<Vec<u8>> {
            self.enter();
            tokio::time::sleep(Duration::from_millis(5)).await;
            let body = self
                .parts
                .lock()
                .unwrap()
                .get(&part_number)
                .cloned()
                .ok_or(Error::MissingPart {
                    number: part_number,
                });
            self.leave();
            body
        }
    }

    fn sample_entries() -> Vec<SecretEntry> {
        vec![SecretEntry {
            text_values: vec!["api token".into()],
            files: vec![SecretFile {
                name: "dump.bin".into(),
                bytes: (0u8..=255).cycle().take(3000).collect(),
            }],
        }]
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn send_then_receive_round_trip() {
        let transport = MockTransport::default();
        let session = TransferSession::with_part_ceiling(&transport, 512);
        let entries = sample_entries();

        let receipt = session.send(&entries).await.unwrap();
        assert!(receipt.total_parts > 1, "payload should span several parts");
        assert_eq!(
            transport.parts.lock().unwrap().len() as u32,
            receipt.total_parts
        );

        let ticket = DownloadTicket {
            exchange_id: receipt.ticket.exchange_id.clone(),
            view_id: "vw0000000000test".into(),
            view_password: "ViewPassword12345678".into(),
            total_parts: receipt.total_parts,
        };
        let decoded = session.receive(&ticket, &receipt.password).await.unwrap();
        assert_eq!(decoded, entries);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrency_stays_bounded() {
        let transport = MockTransport::default();
        let session = TransferSession::with_part_ceiling(&transport, 128);

        session.send(&sample_entries()).await.unwrap();

        let peak = transport.peak_in_flight.load(Ordering::SeqCst);
        assert!(peak <= TRANSFER_CONCURRENCY, "peak in flight was {peak}");
        assert!(transport.uploads.load(Ordering::SeqCst) > TRANSFER_CONCURRENCY);
    }

    #[tokio::test]
    async fn wrong_password_surfaces_decrypt_failure() {
        let transport = MockTransport::default();
        let session = TransferSession::new(&transport);

        let receipt = session.send(&sample_entries()).await.unwrap();
        let ticket = DownloadTicket {
            exchange_id: receipt.ticket.exchange_id.clone(),
            view_id: "vw0000000000test".into(),
            view_password: "ViewPassword12345678".into(),
            total_parts: receipt.total_parts,
        };

        let err = session.receive(&ticket, "WrongPassword0000000").await.unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed));
    }

    #[tokio::test]
    async fn missing_part_fails_download() {
        let transport = MockTransport::default();
        let session = TransferSession::new(&transport);
        let receipt = session.send(&sample_entries()).await.unwrap();

        let ticket = DownloadTicket {
            exchange_id: receipt.ticket.exchange_id.clone(),
            view_id: "vw0000000000test".into(),
            view_password: "ViewPassword12345678".into(),
            // Ask for one more part than was ever uploaded.
            total_parts: receipt.total_parts + 1,
        };
        let err = session.receive(&ticket, &receipt.password).await.unwrap_err();
        assert!(matches!(err, Error::MissingPart { .. }));
    }
}
