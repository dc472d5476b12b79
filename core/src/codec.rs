//! Pack/unpack of secret values into one encrypted, integrity-checked blob.
//!
//! `pack` turns an ordered list of secret entries (text values and files)
//! into `{iv, ciphertext, salt}` plus a freshly generated password. The
//! password is the only secret the server never sees: it travels in the
//! URL fragment and is re-stretched with PBKDF2 on unpack.
//!
//! Every file carries a SHA-256 content hash inside the encrypted JSON.
//! `unpack` re-verifies those hashes after decryption, which is the only
//! point where tampering or truncation during chunked transfer is caught
//! end to end.

use crate::bytestring;
use crate::error::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of generated passwords (62-symbol alphabet, ~119 bits).
pub const PASSWORD_LEN: usize = 20;

/// PBKDF2-HMAC-SHA256 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length in bytes.
pub const SALT_LEN: usize = 32;

/// AES-GCM IV length in bytes (96 bits).
pub const IV_LEN: usize = 12;

/// One ordered group of secret values, matching one schema field set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecretEntry {
    /// Plain text values in schema order.
    pub text_values: Vec<String>,
    /// File values in schema order.
    pub files: Vec<SecretFile>,
}

/// A file value inside a secret entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretFile {
    /// Original file name.
    pub name: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

/// The encrypted representation of all secret values for one exchange.
///
/// Only `iv`, `ciphertext` and `salt` are ever serialized for upload;
/// `password` stays with the caller.
#[derive(Debug, Clone)]
pub struct PackedBlob {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub salt: Vec<u8>,
    pub password: String,
}

/// A binary payload carried inside JSON as a packed string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedBytes {
    /// Two-bytes-per-character packed content.
    pub data: String,
    /// Original byte length, used to strip the zero pad.
    pub byte_len: usize,
}

impl PackedBytes {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytestring::encode(bytes),
            byte_len: bytes.len(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bytestring::decode(&self.data, self.byte_len)
    }
}

/// The public portion of a [`PackedBlob`]: what gets chunked and uploaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicBlob {
    pub iv: PackedBytes,
    pub ciphertext: PackedBytes,
    pub salt: PackedBytes,
}

impl PublicBlob {
    pub fn from_packed(blob: &PackedBlob) -> Self {
        Self {
            iv: PackedBytes::from_bytes(&blob.iv),
            ciphertext: PackedBytes::from_bytes(&blob.ciphertext),
            salt: PackedBytes::from_bytes(&blob.salt),
        }
    }
}

/// Wire form of one secret entry inside the encrypted JSON.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry {
    text_values: Vec<String>,
    files: Vec<WireFile>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    name: String,
    #[serde(flatten)]
    content: PackedBytes,
    /// Hex SHA-256 of the raw bytes.
    sha256: String,
}

/// Generate a random alphanumeric password.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Stretch a password into a 256-bit AES-GCM key.
fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Pack secret entries with a freshly generated password.
pub fn pack(entries: &[SecretEntry]) -> Result<PackedBlob> {
    pack_with_password(entries, generate_password())
}

/// Pack secret entries under a caller-supplied password.
pub fn pack_with_password(entries: &[SecretEntry], password: String) -> Result<PackedBlob> {
    let wire: Vec<WireEntry> = entries
        .iter()
        .map(|entry| WireEntry {
            text_values: entry.text_values.clone(),
            files: entry
                .files
                .iter()
                .map(|file| WireFile {
                    name: file.name.clone(),
                    content: PackedBytes::from_bytes(&file.bytes),
                    sha256: content_hash(&file.bytes),
                })
                .collect(),
        })
        .collect();
    let plaintext = serde_json::to_vec(&wire)?;

    let mut rng = rand::thread_rng();
    let mut salt = vec![0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    let mut iv = vec![0u8; IV_LEN];
    rng.fill_bytes(&mut iv);

    let key = derive_key(&password, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_slice())
        .map_err(|_| Error::EncryptionFailed)?;

    Ok(PackedBlob {
        iv,
        ciphertext,
        salt,
        password,
    })
}

/// Decrypt and reconstitute secret entries, verifying every file hash.
pub fn unpack(iv: &[u8], ciphertext: &[u8], salt: &[u8], password: &str) -> Result<Vec<SecretEntry>> {
    let key = derive_key(password, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| Error::DecryptionFailed)?;

    let wire: Vec<WireEntry> = serde_json::from_slice(&plaintext)?;
    let mut entries = Vec::with_capacity(wire.len());
    for entry in wire {
        let mut files = Vec::with_capacity(entry.files.len());
        for file in entry.files {
            let bytes = file.content.to_bytes()?;
            if content_hash(&bytes) != file.sha256 {
                return Err(Error::IntegrityMismatch { name: file.name });
            }
            files.push(SecretFile {
                name: file.name,
                bytes,
            });
        }
        entries.push(SecretEntry {
            text_values: entry.text_values,
            files,
        });
    }
    Ok(entries)
}
