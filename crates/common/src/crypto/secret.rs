//! Document encryption using XChaCha20-Poly1305
//!
//! Every shared document has a random 256-bit [`DocumentKey`]. Snapshots and
//! updates are sealed with XChaCha20-Poly1305 under a fresh random 192-bit
//! nonce per call; the nonce space is wide enough that random generation never
//! needs a per-key counter.
//!
//! The stored form is a single self-describing [`EncryptedBlob`]:
//! `nonce (24 bytes) || ciphertext || tag (16 bytes)`.
//!
//! Decryption fails closed. A wrong key, a flipped bit, and a truncated blob all
//! produce the same [`DecryptionFailure`], so callers cannot be used as an
//! oracle.

use std::fmt;
use std::ops::Deref;

use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{rand_core::RngCore, Aead, AeadCore, KeyInit, OsRng},
    Key, XChaCha20Poly1305, XNonce,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::keys::KeyError;

/// Size of the XChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 24;
/// Size of a document key in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;
/// Size of the Poly1305 authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// The one error decryption ever reports.
///
/// Carries no detail about which check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("decryption failed")]
pub struct DecryptionFailure;

/// A 256-bit symmetric key protecting one shared document
///
/// # Examples
///
/// ```ignore
/// let key = DocumentKey::generate();
/// let blob = encrypt(b"ledger snapshot", &key);
/// let plaintext = decrypt(&blob, &key)?;
/// ```
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DocumentKey([u8; SECRET_SIZE]);

impl From<[u8; SECRET_SIZE]> for DocumentKey {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        DocumentKey(bytes)
    }
}

impl Deref for DocumentKey {
    type Target = [u8; SECRET_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DocumentKey(<redacted>)")
    }
}

impl DocumentKey {
    /// Generate a new random key using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut buff = [0; SECRET_SIZE];
        OsRng.fill_bytes(&mut buff);
        Self(buff)
    }

    /// Create a key from a byte slice
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::KeyLengthMismatch`] if the slice is not exactly
    /// `SECRET_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; SECRET_SIZE] = data.try_into().map_err(|_| KeyError::KeyLengthMismatch {
            expected: SECRET_SIZE,
            actual: data.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Get a reference to the key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.0))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| KeyError::Decode(e.to_string()))?,
        );
        Self::from_slice(&bytes)
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(self.bytes()))
    }
}

/// Encrypted bytes in storage framing: `nonce || ciphertext || tag`
///
/// Opaque everywhere except at the network boundary, where it is encoded
/// once with [`EncryptedBlob::to_base64`] (or its serde impl, which emits the
/// same string).
#[derive(Clone, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub struct EncryptedBlob(Vec<u8>);

impl EncryptedBlob {
    /// Parse storage framing.
    ///
    /// # Errors
    ///
    /// A blob too short to hold a nonce and a tag can never decrypt, so it is
    /// rejected with the same [`DecryptionFailure`].
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DecryptionFailure> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(DecryptionFailure);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn nonce(&self) -> &[u8] {
        &self.0[..NONCE_SIZE]
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.0[NONCE_SIZE..]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, DecryptionFailure> {
        let bytes = STANDARD.decode(encoded).map_err(|_| DecryptionFailure)?;
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedBlob({} bytes)", self.0.len())
    }
}

impl std::str::FromStr for EncryptedBlob {
    type Err = DecryptionFailure;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

/// Encrypt a payload under a fresh random nonce.
///
/// Non-deterministic: encrypting the same plaintext twice yields different
/// blobs.
pub fn encrypt(plaintext: &[u8], key: &DocumentKey) -> EncryptedBlob {
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let Ok(ciphertext) = key.cipher().encrypt(&nonce, plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(nonce.as_ref());
    out.extend_from_slice(&ciphertext);
    EncryptedBlob(out)
}

/// Decrypt and authenticate a blob.
///
/// # Errors
///
/// Returns [`DecryptionFailure`] on a wrong key or any tampering.
pub fn decrypt(blob: &EncryptedBlob, key: &DocumentKey) -> Result<Vec<u8>, DecryptionFailure> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(DecryptionFailure);
    }
    let nonce = XNonce::from_slice(blob.nonce());
    key.cipher()
        .decrypt(nonce, blob.ciphertext())
        .map_err(|_| DecryptionFailure)
}

impl DocumentKey {
    /// Encrypt raw bytes under this key
    pub fn encrypt(&self, plaintext: &[u8]) -> EncryptedBlob {
        encrypt(plaintext, self)
    }

    /// Decrypt raw bytes under this key
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Vec<u8>, DecryptionFailure> {
        decrypt(blob, self)
    }

    /// Encrypt a UTF-8 string
    pub fn encrypt_str(&self, plaintext: &str) -> EncryptedBlob {
        self.encrypt(plaintext.as_bytes())
    }

    /// Decrypt a UTF-8 string; invalid UTF-8 is reported as a decryption failure
    pub fn decrypt_str(&self, blob: &EncryptedBlob) -> Result<String, DecryptionFailure> {
        String::from_utf8(self.decrypt(blob)?).map_err(|_| DecryptionFailure)
    }

    /// Serialize a value to JSON and encrypt it
    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> Result<EncryptedBlob, serde_json::Error> {
        let plaintext = Zeroizing::new(serde_json::to_vec(value)?);
        Ok(self.encrypt(&plaintext))
    }

    /// Decrypt a blob and parse the plaintext as JSON
    pub fn decrypt_json<T: DeserializeOwned>(&self, blob: &EncryptedBlob) -> Result<T, DecryptionFailure> {
        let plaintext = Zeroizing::new(self.decrypt(blob)?);
        serde_json::from_slice(&plaintext).map_err(|_| DecryptionFailure)
    }
}
