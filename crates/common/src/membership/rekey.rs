//! Document key rotation after a member leaves
//!
//! A rekey replaces the document key with a fresh one, seals it for every
//! remaining member and moves the latest snapshot onto it. The result is one
//! [`RekeyBundle`] that the relay server must accept or reject as a whole;
//! until it does, the old key stays authoritative.
//!
//! ```text
//! 1. generate new DocumentKey
//! 2. seal it for each remaining member (never for a removed one)
//! 3. re-encrypt the snapshot old key -> new key, version + 1
//! 4. publish { new memberships, new snapshot } in one call
//! ```
//!
//! The relay server only ever receives a [`RekeyPublication`]: sealed
//! memberships and the encrypted snapshot. The new key itself stays in the
//! [`RekeyBundle`] returned to the caller.
//!
//! If publishing fails the whole procedure starts again from step 1 with a
//! brand new key, so a half-published key is never reused.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Member, MembershipRecord};
use crate::crypto::{ready, CryptoError, DocumentKey, IdentityHash};
use crate::sync::{EncryptedSnapshot, SnapshotCodec, SnapshotError, SnapshotRecord};

/// How many times [`Rekeyer::rekey_and_publish`] tries before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("default error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Hands a finished rekey to the relay server
#[async_trait]
pub trait RekeyPublisher: Send + Sync + fmt::Debug {
    /// Atomically replace the document's memberships and snapshot
    ///
    /// # Arguments
    /// * `publication` - The new memberships and re-encrypted snapshot
    ///
    /// # Returns
    /// * `Ok(())` - The server accepted the publication; the new key is live
    /// * `Err(PublishError)` - Nothing changed on the server
    async fn publish_rekey(&self, publication: &RekeyPublication) -> Result<(), PublishError>;
}

/// What went wrong inside a rekey attempt
#[derive(Debug, thiserror::Error)]
pub enum RekeyFailure {
    #[error("removed member {0} is still listed as remaining")]
    RemovedMemberRetained(IdentityHash),
    #[error("no remaining members to rekey for")]
    NoRemainingMembers,
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, thiserror::Error)]
pub enum RekeyError {
    #[error("rekey aborted after {attempts} attempt(s): {cause}")]
    Aborted { attempts: u32, cause: RekeyFailure },
}

impl RekeyError {
    pub fn attempts(&self) -> u32 {
        match self {
            RekeyError::Aborted { attempts, .. } => *attempts,
        }
    }

    pub fn cause(&self) -> &RekeyFailure {
        match self {
            RekeyError::Aborted { cause, .. } => cause,
        }
    }
}

/// Everything a rekey produces, kept together so it is published together
#[derive(Debug, Clone)]
pub struct RekeyBundle {
    pub new_key: DocumentKey,
    pub memberships: Vec<MembershipRecord>,
    pub snapshot: EncryptedSnapshot,
}

impl RekeyBundle {
    pub fn membership_for(&self, identity_hash: &IdentityHash) -> Option<&MembershipRecord> {
        self.memberships
            .iter()
            .find(|record| &record.identity_hash == identity_hash)
    }

    pub fn snapshot_record(&self) -> SnapshotRecord {
        self.snapshot.clone().into()
    }

    /// The part of the bundle the relay server gets. Never holds the key.
    pub fn publication(&self) -> RekeyPublication {
        RekeyPublication {
            memberships: self.memberships.clone(),
            snapshot: self.snapshot_record(),
        }
    }
}

/// Wire form of a rekey: ciphertext and metadata only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RekeyPublication {
    pub memberships: Vec<MembershipRecord>,
    pub snapshot: SnapshotRecord,
}

/// Rotates document keys. Holds no state between calls.
#[derive(Debug, Clone)]
pub struct Rekeyer {
    codec: SnapshotCodec,
    max_attempts: u32,
}

impl Default for Rekeyer {
    fn default() -> Self {
        Self {
            codec: SnapshotCodec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Rekeyer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many publish attempts are made; at least one always is
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Build a rekey bundle without publishing it
    pub async fn rekey(
        &self,
        snapshot: &EncryptedSnapshot,
        old_key: &DocumentKey,
        remaining: &[Member],
        removed: &[Member],
    ) -> Result<RekeyBundle, RekeyError> {
        self.attempt(snapshot, old_key, remaining, removed)
            .await
            .map_err(|cause| RekeyError::Aborted { attempts: 1, cause })
    }

    /// Build and publish a rekey bundle, retrying with a fresh key on
    /// publish failure.
    ///
    /// Only publish failures are retried; a bad member list or an
    /// undecryptable snapshot aborts immediately.
    pub async fn rekey_and_publish<P>(
        &self,
        publisher: &P,
        snapshot: &EncryptedSnapshot,
        old_key: &DocumentKey,
        remaining: &[Member],
        removed: &[Member],
    ) -> Result<RekeyBundle, RekeyError>
    where
        P: RekeyPublisher + ?Sized,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let bundle = self
                .attempt(snapshot, old_key, remaining, removed)
                .await
                .map_err(|cause| RekeyError::Aborted { attempts, cause })?;

            match publisher.publish_rekey(&bundle.publication()).await {
                Ok(()) => {
                    tracing::debug!(
                        attempts,
                        members = bundle.memberships.len(),
                        version = bundle.snapshot.version,
                        "rekey published"
                    );
                    return Ok(bundle);
                }
                Err(e) if attempts < self.max_attempts => {
                    tracing::warn!(attempts, error = %e, "rekey publish failed, retrying");
                }
                Err(e) => {
                    tracing::warn!(attempts, error = %e, "rekey publish failed, giving up");
                    return Err(RekeyError::Aborted {
                        attempts,
                        cause: e.into(),
                    });
                }
            }
        }
    }

    async fn attempt(
        &self,
        snapshot: &EncryptedSnapshot,
        old_key: &DocumentKey,
        remaining: &[Member],
        removed: &[Member],
    ) -> Result<RekeyBundle, RekeyFailure> {
        ready().await?;
        check_members(remaining, removed)?;

        let new_key = DocumentKey::generate();
        let memberships = remaining
            .iter()
            .map(|member| member.seal_key(&new_key))
            .collect();
        let snapshot =
            self.codec
                .reencrypt_snapshot(snapshot, old_key, &new_key, snapshot.version + 1)?;

        Ok(RekeyBundle {
            new_key,
            memberships,
            snapshot,
        })
    }
}

fn check_members(remaining: &[Member], removed: &[Member]) -> Result<(), RekeyFailure> {
    if remaining.is_empty() {
        return Err(RekeyFailure::NoRemainingMembers);
    }

    let removed_hashes: HashSet<_> = removed.iter().map(|m| &m.identity_hash).collect();
    let removed_keys: HashSet<_> = removed.iter().map(|m| m.encryption_public_key).collect();

    for member in remaining {
        if removed_hashes.contains(&member.identity_hash)
            || removed_keys.contains(&member.encryption_public_key)
        {
            return Err(RekeyFailure::RemovedMemberRetained(
                member.identity_hash.clone(),
            ));
        }
    }
    Ok(())
}
