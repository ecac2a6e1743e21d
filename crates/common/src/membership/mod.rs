//! Document membership and key distribution
//!
//! Each member of a document holds one [`MembershipRecord`]: their identity
//! hash, their encryption public key and a copy of the current
//! [`DocumentKey`] wrapped for that key. Removing a member means rotating the
//! document key and handing out fresh records to everyone else
//! ([`Rekeyer`]). New members join through an [`Invite`].

mod invite;
mod rekey;

use serde::{Deserialize, Serialize};

use crate::crypto::{
    seal, unseal, unwrap, wrap, DocumentKey, EncryptionKeypair, EncryptionPublicKey,
    IdentityHash, KeyWrapError, WrappedDocumentKey,
};
use crate::identity::{Registration, SessionData};

pub use invite::{Invite, InviteError, InviteLink, InviteRecord, INVITE_SECRET_SIZE};
pub use rekey::{
    PublishError, RekeyBundle, RekeyError, RekeyFailure, RekeyPublication, RekeyPublisher, Rekeyer,
    DEFAULT_MAX_ATTEMPTS,
};

/// The public identity of a document member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub identity_hash: IdentityHash,
    pub encryption_public_key: EncryptionPublicKey,
}

impl Member {
    pub fn new(identity_hash: IdentityHash, encryption_public_key: EncryptionPublicKey) -> Self {
        Self {
            identity_hash,
            encryption_public_key,
        }
    }

    pub fn from_session(session: &SessionData) -> Self {
        Self::new(
            session.identity_hash().clone(),
            session.encryption_public_key(),
        )
    }

    /// Seal `key` anonymously for this member
    pub fn seal_key(&self, key: &DocumentKey) -> MembershipRecord {
        MembershipRecord {
            identity_hash: self.identity_hash.clone(),
            encryption_public_key: self.encryption_public_key,
            wrapped_document_key: seal(key, &self.encryption_public_key),
        }
    }

    /// Box `key` for this member from a known sender
    pub fn wrap_key_from(&self, key: &DocumentKey, sender: &EncryptionKeypair) -> MembershipRecord {
        MembershipRecord {
            identity_hash: self.identity_hash.clone(),
            encryption_public_key: self.encryption_public_key,
            wrapped_document_key: wrap(key, &self.encryption_public_key, sender),
        }
    }
}

impl From<&Registration> for Member {
    fn from(registration: &Registration) -> Self {
        Self::new(
            registration.identity_hash.clone(),
            registration.encryption_public_key,
        )
    }
}

/// One member's copy of the document key, as stored by the relay server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRecord {
    pub identity_hash: IdentityHash,
    pub encryption_public_key: EncryptionPublicKey,
    pub wrapped_document_key: WrappedDocumentKey,
}

impl MembershipRecord {
    pub fn member(&self) -> Member {
        Member::new(self.identity_hash.clone(), self.encryption_public_key)
    }

    /// Recover the document key from a sealed record
    pub fn open(&self, keypair: &EncryptionKeypair) -> Result<DocumentKey, KeyWrapError> {
        unseal(&self.wrapped_document_key, &self.encryption_public_key, keypair)
    }

    /// Recover the document key from a record boxed by `sender`
    pub fn open_from(
        &self,
        sender: &EncryptionPublicKey,
        keypair: &EncryptionKeypair,
    ) -> Result<DocumentKey, KeyWrapError> {
        unwrap(&self.wrapped_document_key, sender, keypair)
    }
}
