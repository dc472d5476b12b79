//! Error types for sealbox-core.
//!
//! # Error Categories
//!
//! - **Packing errors**: `InvalidPackedChar`, `ByteLengthMismatch`
//! - **Crypto errors**: `DecryptionFailed`, `EncryptionFailed`
//! - **Integrity errors**: `IntegrityMismatch`
//! - **Transfer errors**: `Transport`, `MissingPart`, `Malformed`

use thiserror::Error;

/// Result type alias for sealbox-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during pack/unpack and part transfer.
#[derive(Debug, Error)]
pub enum Error {
    /// A packed string contained a character outside the packing alphabet.
    ///
    /// Packed strings only ever contain BMP characters or surrogate values
    /// lifted into the supplementary plane.
    #[error("invalid packed character U+{codepoint:X}")]
    InvalidPackedChar {
        /// The offending code point.
        codepoint: u32,
    },

    /// Declared byte length does not fit the packed payload.
    ///
    /// A packed string of `n` characters can only carry `2n` or `2n - 1`
    /// bytes (the last character may be zero-padded).
    #[error("declared byte length {declared} does not fit packed payload of {chars} characters")]
    ByteLengthMismatch {
        /// Declared original byte length.
        declared: usize,
        /// Number of characters in the packed string.
        chars: usize,
    },

    /// AES-GCM encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// AES-GCM decryption failed.
    ///
    /// Wrong password, corrupted ciphertext and truncation are
    /// indistinguishable here by design.
    #[error("decryption failed")]
    DecryptionFailed,

    /// A file's content hash did not match after decryption.
    ///
    /// This is the end-to-end check that catches tampering or truncation
    /// during chunked transfer.
    #[error("content hash mismatch for file {name:?}")]
    IntegrityMismatch {
        /// Name of the file that failed verification.
        name: String,
    },

    /// The packed blob or one of its parts could not be parsed.
    #[error("malformed packed blob: {0}")]
    Malformed(String),

    /// The transport failed to move a part.
    #[error("transport error: {0}")]
    Transport(String),

    /// A part number was missing from the download set.
    #[error("part {number} missing from download")]
    MissingPart {
        /// 1-based part number.
        number: u32,
    },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Malformed(err.to_string())
    }
}
