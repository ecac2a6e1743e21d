use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{
    DerivedKeys, EncryptionKeypair, EncryptionPublicKey, IdentityHash, SigningKeypair,
    SigningPublicKey, PRIVATE_KEY_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no active session")]
pub struct SessionMissing;

/// The unlocked secrets of the current member
///
/// Lives only in memory. Serializable so a host can hand it across a
/// process boundary it trusts, but never written to disk by this crate.
#[serde_as]
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde_as(as = "Base64")]
    signing_secret: [u8; PRIVATE_KEY_SIZE],
    #[serde_as(as = "Base64")]
    encryption_secret: [u8; PRIVATE_KEY_SIZE],
    #[zeroize(skip)]
    identity_hash: IdentityHash,
}

impl SessionData {
    pub fn from_keys(keys: &DerivedKeys) -> Self {
        Self {
            signing_secret: *keys.signing.to_bytes(),
            encryption_secret: *keys.encryption.to_bytes(),
            identity_hash: keys.identity_hash(),
        }
    }

    pub fn signing_keypair(&self) -> SigningKeypair {
        SigningKeypair::from_seed(&self.signing_secret)
    }

    pub fn encryption_keypair(&self) -> EncryptionKeypair {
        EncryptionKeypair::from_bytes(self.encryption_secret)
    }

    pub fn signing_public_key(&self) -> SigningPublicKey {
        self.signing_keypair().public()
    }

    pub fn encryption_public_key(&self) -> EncryptionPublicKey {
        self.encryption_keypair().public()
    }

    pub fn identity_hash(&self) -> &IdentityHash {
        &self.identity_hash
    }
}

impl fmt::Debug for SessionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionData")
            .field("identity_hash", &self.identity_hash)
            .finish_non_exhaustive()
    }
}

/// Shared handle to the current session, if any
///
/// Clones point at the same slot. Writers swap a whole `Arc<SessionData>`
/// in or out, so a reader holding a snapshot is unaffected by a concurrent
/// `clear`.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<Arc<SessionData>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, session: SessionData) {
        *self.inner.write() = Some(Arc::new(session));
    }

    pub fn get(&self) -> Option<Arc<SessionData>> {
        self.inner.read().clone()
    }

    pub fn has(&self) -> bool {
        self.inner.read().is_some()
    }

    pub fn clear(&self) {
        self.inner.write().take();
    }

    /// Like [`SessionStore::get`], but an absent session is an error
    pub fn require(&self) -> Result<Arc<SessionData>, SessionMissing> {
        self.get().ok_or(SessionMissing)
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("unlocked", &self.has())
            .finish()
    }
}
