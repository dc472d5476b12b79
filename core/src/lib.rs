//! Sealbox Core - client-side packing and transfer for secret exchanges.
//!
//! This library provides everything a sender or viewer runs locally:
//! - Pack/unpack of text and file values into one encrypted blob
//!   (AES-256-GCM, PBKDF2-HMAC-SHA256 key stretching)
//! - Reversible byte-to-string packing for binary payloads in JSON
//! - Chunking of the serialized blob into size-bounded parts
//! - A transfer session that moves parts with bounded concurrency over
//!   an abstract transport
//!
//! # Security Properties
//!
//! - Encryption and decryption happen entirely on the client
//! - The decryption password travels only in the URL fragment; the
//!   backend stores `{iv, ciphertext, salt}` and never the password
//! - Every file carries a SHA-256 content hash that is re-verified on
//!   unpack, catching tampering or truncation during chunked transfer
//!
//! # Example: pack, chunk, reassemble, unpack
//!
//! ```
//! use sealbox_core::{chunker, codec, PublicBlob, SecretEntry, SecretFile};
//!
//! let entries = vec![SecretEntry {
//!     text_values: vec!["database password".into()],
//!     files: vec![SecretFile { name: "cert.der".into(), bytes: vec![1, 2, 3] }],
//! }];
//!
//! // Sender side: encrypt locally, split for upload.
//! let blob = codec::pack(&entries).unwrap();
//! let serialized = serde_json::to_string(&PublicBlob::from_packed(&blob)).unwrap();
//! let parts = chunker::split(&serialized, chunker::MAX_PART_BYTES);
//!
//! // Viewer side: join in index order, decrypt with the fragment password.
//! let joined = chunker::join(&parts);
//! let public: PublicBlob = serde_json::from_str(&joined).unwrap();
//! let decoded = codec::unpack(
//!     &public.iv.to_bytes().unwrap(),
//!     &public.ciphertext.to_bytes().unwrap(),
//!     &public.salt.to_bytes().unwrap(),
//!     &blob.password,
//! )
//! .unwrap();
//! assert_eq!(decoded, entries);
//! ```

pub mod bytestring;
pub mod chunker;
pub mod codec;
pub mod error;
pub mod session;

pub use codec::{PackedBlob, PackedBytes, PublicBlob, SecretEntry, SecretFile};
pub use error::{Error, Result};
pub use session::{
    DownloadTicket, ExchangeTransport, SendReceipt, TransferSession, TransferTicket,
    TRANSFER_CONCURRENCY,
};
