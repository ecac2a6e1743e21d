//! Member identity: creation, registration and unlock
//!
//! A new member goes through three states before their keys are usable:
//!
//! ```text
//! generate_new() ──► PendingIdentity ──confirm()──► ConfirmedIdentity ──register_identity()──► session
//! ```
//!
//! Only a [`ConfirmedIdentity`] can be registered, so the recovery phrase is
//! always acknowledged by the user before the relay server hears about the
//! member. A returning member skips straight to [`IdentityService::unlock_with_seed`].

mod session;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::{
    derive_keys, ready, CryptoError, DerivedKeys, EncryptionPublicKey, IdentityHash,
    RecoveryPhrase, SeedError, SigningPublicKey,
};

pub use session::{SessionData, SessionMissing, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("default error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("identity already registered: {0}")]
    AlreadyRegistered(IdentityHash),
}

/// Public half of a new identity, as sent to the relay server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub identity_hash: IdentityHash,
    pub signing_public_key: SigningPublicKey,
    pub encryption_public_key: EncryptionPublicKey,
}

/// Where new identities get recorded
#[async_trait]
pub trait IdentityRegistry: Send + Sync + fmt::Debug {
    /// Record a new identity with the relay server
    ///
    /// # Arguments
    /// * `registration` - The identity hash and both public keys
    ///
    /// # Returns
    /// * `Ok(())` - The identity is registered
    /// * `Err(RegistryError::AlreadyRegistered)` - The hash is already known
    async fn register(&self, registration: &Registration) -> Result<(), RegistryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid recovery phrase")]
    InvalidMnemonic,
    #[error("registration failed: {0}")]
    Registration(#[from] RegistryError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<SeedError> for IdentityError {
    fn from(_: SeedError) -> Self {
        IdentityError::InvalidMnemonic
    }
}

/// A freshly generated identity the user has not acknowledged yet
pub struct PendingIdentity {
    phrase: RecoveryPhrase,
    keys: DerivedKeys,
}

impl PendingIdentity {
    /// The phrase to show the user, exactly once
    pub fn phrase(&self) -> &RecoveryPhrase {
        &self.phrase
    }

    pub fn identity_hash(&self) -> IdentityHash {
        self.keys.identity_hash()
    }

    pub fn signing_public_key(&self) -> SigningPublicKey {
        self.keys.signing.public()
    }

    pub fn encryption_public_key(&self) -> EncryptionPublicKey {
        self.keys.encryption.public()
    }

    /// The user has written the phrase down
    pub fn confirm(self) -> ConfirmedIdentity {
        ConfirmedIdentity { keys: self.keys }
    }

    /// Confirm by having the user type the phrase back.
    ///
    /// Hands the pending identity back unchanged if the typed phrase is
    /// different, so the caller can prompt again.
    pub fn confirm_with_phrase(self, typed: &str) -> Result<ConfirmedIdentity, PendingIdentity> {
        match RecoveryPhrase::parse(typed) {
            Ok(parsed) if parsed == self.phrase => Ok(self.confirm()),
            _ => Err(self),
        }
    }
}

impl fmt::Debug for PendingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingIdentity")
            .field("identity_hash", &self.identity_hash())
            .finish_non_exhaustive()
    }
}

/// An identity whose phrase the user has acknowledged
///
/// The phrase itself is dropped (and zeroized) on confirmation.
#[derive(Debug)]
pub struct ConfirmedIdentity {
    keys: DerivedKeys,
}

impl ConfirmedIdentity {
    pub fn identity_hash(&self) -> IdentityHash {
        self.keys.identity_hash()
    }

    pub fn registration(&self) -> Registration {
        Registration {
            identity_hash: self.keys.identity_hash(),
            signing_public_key: self.keys.signing.public(),
            encryption_public_key: self.keys.encryption.public(),
        }
    }
}

/// Creates and unlocks identities, and owns writes to the [`SessionStore`]
#[derive(Debug, Clone, Default)]
pub struct IdentityService {
    session: SessionStore,
}

impl IdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing store, e.g. one already shared with a request signer
    pub fn with_session(session: SessionStore) -> Self {
        Self { session }
    }

    /// Generate a phrase and derive its keys. Nothing is stored.
    pub fn generate_new(&self) -> PendingIdentity {
        let phrase = RecoveryPhrase::generate();
        let keys = derive_keys(&phrase.to_master_seed());
        PendingIdentity { phrase, keys }
    }

    /// Register a confirmed identity, then unlock it.
    ///
    /// If the registry rejects the identity no session is stored.
    pub async fn register_identity<R>(
        &self,
        registry: &R,
        identity: ConfirmedIdentity,
    ) -> Result<IdentityHash, IdentityError>
    where
        R: IdentityRegistry + ?Sized,
    {
        ready().await?;

        let registration = identity.registration();
        registry.register(&registration).await?;

        self.session.store(SessionData::from_keys(&identity.keys));
        tracing::debug!(identity = %registration.identity_hash, "identity registered");
        Ok(registration.identity_hash)
    }

    /// Re-derive a returning member's keys and unlock the session
    pub async fn unlock_with_seed(&self, phrase: &str) -> Result<IdentityHash, IdentityError> {
        ready().await?;

        let phrase = RecoveryPhrase::parse(phrase)?;
        let keys = derive_keys(&phrase.to_master_seed());
        let identity_hash = keys.identity_hash();

        self.session.store(SessionData::from_keys(&keys));
        tracing::debug!(identity = %identity_hash, "session unlocked");
        Ok(identity_hash)
    }

    pub fn lock(&self) {
        self.session.clear();
        tracing::debug!("session locked");
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.has()
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testkit::MemoryRegistry;

    #[tokio::test]
    async fn test_new_user_flow() {
        let service = IdentityService::new();
        let registry = MemoryRegistry::default();

        let pending = service.generate_new();
        let expected = pending.identity_hash();
        assert!(!service.is_unlocked());

        let hash = service
            .register_identity(&registry, pending.confirm())
            .await
            .unwrap();

        assert_eq!(hash, expected);
        assert!(service.is_unlocked());
        assert!(registry.get(&hash).is_some());
    }

    #[tokio::test]
    async fn test_failed_registration_stores_nothing() {
        let service = IdentityService::new();
        let registry = MemoryRegistry::default();

        let first = service.generate_new();
        let phrase = first.phrase().as_str().to_string();
        service
            .register_identity(&registry, first.confirm())
            .await
            .unwrap();
        service.lock();

        // same phrase again is a duplicate registration
        let again = service.unlock_with_seed(&phrase).await.unwrap();
        service.lock();
        let duplicate = ConfirmedIdentity {
            keys: derive_keys(&RecoveryPhrase::parse(&phrase).unwrap().to_master_seed()),
        };
        let err = service
            .register_identity(&registry, duplicate)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IdentityError::Registration(RegistryError::AlreadyRegistered(h)) if h == again
        ));
        assert!(!service.is_unlocked());
    }

    #[tokio::test]
    async fn test_unlock_rejects_invalid_phrase() {
        let service = IdentityService::new();
        let err = service.unlock_with_seed("not a real phrase").await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidMnemonic));
        assert_eq!(err.to_string(), "invalid recovery phrase");
        assert!(!service.is_unlocked());
    }

    #[tokio::test]
    async fn test_unlock_is_deterministic() {
        let service = IdentityService::new();
        let pending = service.generate_new();
        let phrase = pending.phrase().as_str().to_uppercase();

        let hash = service.unlock_with_seed(&phrase).await.unwrap();
        assert_eq!(hash, pending.identity_hash());

        let session = service.session().require().unwrap();
        assert_eq!(session.signing_public_key(), pending.signing_public_key());
        assert_eq!(session.encryption_public_key(), pending.encryption_public_key());
    }

    #[test]
    fn test_confirm_with_phrase() {
        let service = IdentityService::new();
        let pending = service.generate_new();
        let phrase = pending.phrase().as_str().to_string();

        let pending = pending.confirm_with_phrase("abandon abandon about").unwrap_err();
        let confirmed = pending
            .confirm_with_phrase(&format!("  {phrase} "))
            .unwrap();
        assert_eq!(confirmed.registration().identity_hash, confirmed.identity_hash());
    }

    #[tokio::test]
    async fn test_lock_clears_shared_session() {
        let store = SessionStore::new();
        let service = IdentityService::with_session(store.clone());
        let pending = service.generate_new();
        service
            .unlock_with_seed(pending.phrase().as_str())
            .await
            .unwrap();
        assert!(store.has());

        service.lock();
        assert!(!store.has());
    }
}
