//! Document key sharing over X25519 boxes
//!
//! A [`DocumentKey`] never travels in the clear. Each member receives their own
//! [`WrappedDocumentKey`], bound to exactly one recipient encryption public key.
//! Two modes share the same X25519 + XSalsa20-Poly1305 primitive:
//!
//! - **Authenticated** ([`wrap`] / [`unwrap`]): ECDH between a known sender
//!   keypair and the recipient. The recipient needs the sender's public key to
//!   open it, so the wrap is attributable to that sender. Used when an owner
//!   re-shares the key with an existing member.
//! - **Sealed** ([`seal`] / [`unseal`]): an ephemeral keypair is generated per
//!   call and its public half travels with the ciphertext. Only the recipient's
//!   public key is needed to produce it. Used to store one's own copy of the
//!   key, for rekeying, and for invites.
//!
//! # Wire Format
//!
//! ```text
//! authenticated: [ 0x01 ][ nonce: 24 bytes ][ boxed key: 48 bytes ]
//! sealed:        [ 0x02 ][ ephemeral pubkey: 32 bytes ][ boxed key: 48 bytes ]
//! ```
//!
//! Both modes fail closed: any tampering, a wrong key, or a mode mismatch is
//! the same [`KeyWrapError::UnwrapFailed`].

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use crypto_box::{
    aead::{generic_array::GenericArray, Aead, AeadCore, OsRng},
    SalsaBox,
};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use zeroize::Zeroizing;

use super::keys::{EncryptionKeypair, EncryptionPublicKey, PUBLIC_KEY_SIZE};
use super::secret::{DocumentKey, SECRET_SIZE, TAG_SIZE};

/// Size of the XSalsa20 box nonce in bytes
pub const BOX_NONCE_SIZE: usize = 24;
/// A boxed 32-byte document key plus its Poly1305 tag
const BOXED_KEY_SIZE: usize = SECRET_SIZE + TAG_SIZE;

const TAG_AUTHENTICATED: u8 = 0x01;
const TAG_SEALED: u8 = 0x02;

/// Errors that can occur while wrapping or unwrapping a document key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyWrapError {
    /// Wrong key, tampered ciphertext, or wrong mode; callers cannot tell which
    #[error("failed to unwrap document key")]
    UnwrapFailed,
    #[error("malformed wrapped key: {0}")]
    Malformed(String),
}

/// How a [`WrappedDocumentKey`] was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    /// Boxed from a known sender keypair
    Authenticated,
    /// Sealed from a throwaway ephemeral keypair
    Sealed,
}

impl WrapMode {
    fn tag(self) -> u8 {
        match self {
            WrapMode::Authenticated => TAG_AUTHENTICATED,
            WrapMode::Sealed => TAG_SEALED,
        }
    }

    fn payload_size(self) -> usize {
        match self {
            WrapMode::Authenticated => BOX_NONCE_SIZE + BOXED_KEY_SIZE,
            WrapMode::Sealed => PUBLIC_KEY_SIZE + BOXED_KEY_SIZE,
        }
    }
}

impl fmt::Display for WrapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WrapMode::Authenticated => write!(f, "authenticated"),
            WrapMode::Sealed => write!(f, "sealed"),
        }
    }
}

/// A document key encrypted for exactly one recipient
#[derive(Clone, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct WrappedDocumentKey {
    mode: WrapMode,
    payload: Vec<u8>,
}

impl WrappedDocumentKey {
    pub fn mode(&self) -> WrapMode {
        self.mode
    }

    /// Tag byte followed by the mode specific payload
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.mode.tag());
        out.extend_from_slice(&self.payload);
        out
    }

    /// # Errors
    ///
    /// Returns [`KeyWrapError::Malformed`] on an unknown tag or a payload of
    /// the wrong size for its mode.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyWrapError> {
        let (tag, payload) = bytes
            .split_first()
            .ok_or_else(|| KeyWrapError::Malformed("empty".to_string()))?;
        let mode = match *tag {
            TAG_AUTHENTICATED => WrapMode::Authenticated,
            TAG_SEALED => WrapMode::Sealed,
            other => return Err(KeyWrapError::Malformed(format!("unknown tag {other:#04x}"))),
        };
        if payload.len() != mode.payload_size() {
            return Err(KeyWrapError::Malformed(format!(
                "invalid {} payload size, expected {}, got {}",
                mode,
                mode.payload_size(),
                payload.len()
            )));
        }
        Ok(Self {
            mode,
            payload: payload.to_vec(),
        })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, KeyWrapError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| KeyWrapError::Malformed(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for WrappedDocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for WrappedDocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedDocumentKey({}, {} bytes)", self.mode, self.payload.len())
    }
}

impl FromStr for WrappedDocumentKey {
    type Err = KeyWrapError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

fn into_document_key(plaintext: Vec<u8>) -> Result<DocumentKey, KeyWrapError> {
    let plaintext = Zeroizing::new(plaintext);
    DocumentKey::from_slice(&plaintext).map_err(|_| KeyWrapError::UnwrapFailed)
}

/// Box a document key from `sender` to `recipient`.
///
/// A fresh random nonce is used per call, so wrapping the same key twice
/// yields different bytes.
pub fn wrap(
    key: &DocumentKey,
    recipient: &EncryptionPublicKey,
    sender: &EncryptionKeypair,
) -> WrappedDocumentKey {
    let sender_box = SalsaBox::new(&recipient.box_public(), &sender.box_secret());
    let nonce = SalsaBox::generate_nonce(&mut OsRng);

    let Ok(boxed) = sender_box.encrypt(&nonce, key.bytes()) else {
        unreachable!("crypto_box encryption cannot fail with valid inputs");
    };

    let mut payload = Vec::with_capacity(BOX_NONCE_SIZE + boxed.len());
    payload.extend_from_slice(nonce.as_slice());
    payload.extend_from_slice(&boxed);

    WrappedDocumentKey {
        mode: WrapMode::Authenticated,
        payload,
    }
}

/// Open a key boxed by [`wrap`].
///
/// # Errors
///
/// Returns [`KeyWrapError::UnwrapFailed`] if the box was not made by `sender`
/// for `recipient`, was tampered with, or is a sealed key.
pub fn unwrap(
    wrapped: &WrappedDocumentKey,
    sender: &EncryptionPublicKey,
    recipient: &EncryptionKeypair,
) -> Result<DocumentKey, KeyWrapError> {
    if wrapped.mode != WrapMode::Authenticated
        || wrapped.payload.len() != WrapMode::Authenticated.payload_size()
    {
        return Err(KeyWrapError::UnwrapFailed);
    }

    let (nonce, boxed) = wrapped.payload.split_at(BOX_NONCE_SIZE);
    let recipient_box = SalsaBox::new(&sender.box_public(), &recipient.box_secret());
    let plaintext = recipient_box
        .decrypt(GenericArray::from_slice(nonce), boxed)
        .map_err(|_| KeyWrapError::UnwrapFailed)?;

    into_document_key(plaintext)
}

/// Seal a document key anonymously for `recipient`.
///
/// An ephemeral keypair is generated internally per call and discarded.
pub fn seal(key: &DocumentKey, recipient: &EncryptionPublicKey) -> WrappedDocumentKey {
    let Ok(payload) = recipient.box_public().seal(&mut OsRng, key.bytes()) else {
        unreachable!("sealed box encryption cannot fail with valid inputs");
    };

    WrappedDocumentKey {
        mode: WrapMode::Sealed,
        payload,
    }
}

/// Open a key sealed by [`seal`].
///
/// `recipient_public` must be the public half of `recipient`; the sealed box
/// construction binds the ciphertext to it.
///
/// # Errors
///
/// Returns [`KeyWrapError::UnwrapFailed`] on a wrong keypair, mismatched
/// public key, tampering, or an authenticated (non-sealed) key.
pub fn unseal(
    wrapped: &WrappedDocumentKey,
    recipient_public: &EncryptionPublicKey,
    recipient: &EncryptionKeypair,
) -> Result<DocumentKey, KeyWrapError> {
    if wrapped.mode != WrapMode::Sealed || recipient.public() != *recipient_public {
        return Err(KeyWrapError::UnwrapFailed);
    }

    let plaintext = recipient
        .box_secret()
        .unseal(&wrapped.payload)
        .map_err(|_| KeyWrapError::UnwrapFailed)?;

    into_document_key(plaintext)
}
