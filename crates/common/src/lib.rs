/**
 * Cryptographic types and operations.
 *  - Recovery phrases and key derivation
 *  - Document encryption and key wrapping
 *  - One-time readiness self-test
 */
pub mod crypto;
/**
 * Member identities: creating, registering
 *  and unlocking them, and the in-memory
 *  session that holds the unlocked keys.
 */
pub mod identity;
/**
 * Detached-signature authentication for
 *  requests to the relay server.
 */
pub mod auth;
/**
 * Encrypted snapshots and updates of a
 *  shared document, plus the wire records
 *  the relay server stores them as.
 */
pub mod sync;
/**
 * Who holds the document key: membership
 *  records, key rotation when a member
 *  leaves, and invite links.
 */
pub mod membership;
/**
 * In-memory stand-ins for the document
 *  engine and the relay server.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::auth::{RequestSigner, SignedRequest, Verification};
    pub use crate::crypto::{
        ready, DocumentKey, EncryptedBlob, IdentityHash, RecoveryPhrase, WrappedDocumentKey,
    };
    pub use crate::identity::{IdentityService, SessionStore};
    pub use crate::membership::{Invite, InviteLink, Member, MembershipRecord, Rekeyer};
    pub use crate::sync::{DocumentReplica, EncryptedSnapshot, EncryptedUpdate, SnapshotCodec};
}
