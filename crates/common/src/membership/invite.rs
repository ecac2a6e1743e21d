//! Invite links
//!
//! An invite is a random secret that only ever travels in the fragment of a
//! link, which browsers never send to a server:
//!
//! ```text
//! https://<host>/invite/<invite id>#<urlsafe base64 secret>
//! ```
//!
//! The secret deterministically derives an X25519 keypair. The document key
//! is sealed to that keypair's public half and stored on the relay server
//! as an [`InviteRecord`]. Whoever holds the link can re-derive the keypair
//! and unseal the document key; the server, holding only the record, cannot.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chacha20poly1305::aead::{rand_core::RngCore, OsRng};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use url::Url;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{
    ready, seal, unseal, CryptoError, DocumentKey, EncryptionKeypair, EncryptionPublicKey, KeyWrapError,
    WrappedDocumentKey,
};

/// Size of the secret carried in an invite link
pub const INVITE_SECRET_SIZE: usize = 32;

const INVITE_INFO: &[u8] = b"hearth/invite/v1";

#[derive(Debug, thiserror::Error)]
pub enum InviteError {
    #[error("malformed invite link: {0}")]
    MalformedLink(String),
    #[error("invite link does not match the invite record")]
    KeyMismatch,
    #[error("failed to open invite: {0}")]
    Unwrap(#[from] KeyWrapError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

fn invite_keypair(secret: &[u8; INVITE_SECRET_SIZE]) -> EncryptionKeypair {
    let hkdf = Hkdf::<Sha256>::new(None, secret);
    let mut okm = Zeroizing::new([0u8; 32]);
    let Ok(()) = hkdf.expand(INVITE_INFO, okm.as_mut()) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    EncryptionKeypair::from_bytes(*okm)
}

/// What the relay server stores for a pending invite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRecord {
    pub invite_id: Uuid,
    pub invite_public_key: EncryptionPublicKey,
    pub wrapped_document_key: WrappedDocumentKey,
}

/// A freshly created invite, held by the inviting member
pub struct Invite {
    id: Uuid,
    host: String,
    secret: Zeroizing<[u8; INVITE_SECRET_SIZE]>,
    public_key: EncryptionPublicKey,
    wrapped_document_key: WrappedDocumentKey,
}

impl Invite {
    /// Create an invite to the document protected by `key`
    pub fn create(key: &DocumentKey, host: &str) -> Self {
        let mut secret = Zeroizing::new([0u8; INVITE_SECRET_SIZE]);
        OsRng.fill_bytes(secret.as_mut());

        let public_key = invite_keypair(&secret).public();
        let wrapped_document_key = seal(key, &public_key);

        Self {
            id: Uuid::new_v4(),
            host: host.to_string(),
            secret,
            public_key,
            wrapped_document_key,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The shareable link. Contains the secret; treat it like one.
    pub fn link(&self) -> String {
        format!(
            "https://{}/invite/{}#{}",
            self.host,
            self.id,
            URL_SAFE_NO_PAD.encode(&self.secret[..])
        )
    }

    /// The record to upload. Never contains the secret.
    pub fn server_payload(&self) -> InviteRecord {
        InviteRecord {
            invite_id: self.id,
            invite_public_key: self.public_key,
            wrapped_document_key: self.wrapped_document_key.clone(),
        }
    }
}

impl fmt::Debug for Invite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invite")
            .field("id", &self.id)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// The parts of an invite link the invitee needs
pub struct InviteLink {
    invite_id: Uuid,
    secret: Zeroizing<[u8; INVITE_SECRET_SIZE]>,
}

impl InviteLink {
    /// Parse `https://<host>/invite/<id>#<secret>`
    pub fn parse(link: &str) -> Result<Self, InviteError> {
        let url = Url::parse(link.trim()).map_err(|e| InviteError::MalformedLink(e.to_string()))?;

        let mut segments = url
            .path_segments()
            .ok_or_else(|| InviteError::MalformedLink("no path".into()))?
            .filter(|segment| !segment.is_empty());
        let invite_id = match (segments.next(), segments.next(), segments.next()) {
            (Some("invite"), Some(id), None) => Uuid::parse_str(id)
                .map_err(|e| InviteError::MalformedLink(format!("bad invite id: {e}")))?,
            _ => return Err(InviteError::MalformedLink("expected /invite/<id>".into())),
        };

        let fragment = url
            .fragment()
            .filter(|fragment| !fragment.is_empty())
            .ok_or_else(|| InviteError::MalformedLink("missing invite secret".into()))?;
        let decoded = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(fragment)
                .map_err(|_| InviteError::MalformedLink("bad invite secret".into()))?,
        );
        let secret: [u8; INVITE_SECRET_SIZE] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| InviteError::MalformedLink("bad invite secret".into()))?;

        Ok(Self {
            invite_id,
            secret: Zeroizing::new(secret),
        })
    }

    pub fn invite_id(&self) -> Uuid {
        self.invite_id
    }

    /// Recover the document key from the server's record.
    ///
    /// Fails with [`InviteError::KeyMismatch`] if the record is for another
    /// invite or its public key is not the one this link's secret derives.
    pub async fn accept(&self, record: &InviteRecord) -> Result<DocumentKey, InviteError> {
        ready().await?;

        if record.invite_id != self.invite_id {
            return Err(InviteError::KeyMismatch);
        }
        let keypair = invite_keypair(&self.secret);
        if keypair.public() != record.invite_public_key {
            return Err(InviteError::KeyMismatch);
        }

        let key = unseal(&record.wrapped_document_key, &record.invite_public_key, &keypair)?;
        tracing::debug!(invite = %self.invite_id, "invite accepted");
        Ok(key)
    }
}

impl fmt::Debug for InviteLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InviteLink")
            .field("invite_id", &self.invite_id)
            .finish_non_exhaustive()
    }
}
