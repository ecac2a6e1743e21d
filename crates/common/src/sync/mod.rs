//! Encrypted snapshots and updates of a shared document
//!
//! The CRDT engine itself lives outside this crate, behind [`DocumentReplica`].
//! [`SnapshotCodec`] only moves opaque bytes between the replica and the
//! [`DocumentKey`], so the relay server sees nothing but ciphertext, version
//! numbers and ordering stamps.
//!
//! # Ordering
//!
//! Every outgoing update is stamped by the codec's [`UpdateClock`]. Receivers
//! apply batches in stamp order, and decrypt the whole batch before importing
//! anything so a single bad update never leaves a replica half-applied.

mod clock;
mod records;

use std::fmt;

use zeroize::Zeroizing;

use crate::crypto::{DecryptionFailure, DocumentKey, EncryptedBlob};

pub use clock::{
    MalformedTimestamp, OrderingTimestamp, UpdateClock, MAX_FORWARD_DRIFT_MS, MAX_MILLIS,
};
pub use records::{SnapshotMetadata, SnapshotRecord, UpdateRecord};

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("default error: {0}")]
    Default(#[from] anyhow::Error),
}

/// The local copy of a CRDT document
pub trait DocumentReplica: fmt::Debug {
    /// Full state including history
    fn export_snapshot(&self) -> Result<Vec<u8>, ReplicaError>;

    /// Current state without history
    fn export_shallow_snapshot(&self) -> Result<Vec<u8>, ReplicaError>;

    /// Changes made after the encoded version vector `since`
    ///
    /// An empty `since` exports every change.
    fn export_updates(&self, since: &[u8]) -> Result<Vec<u8>, ReplicaError>;

    /// Encoded causal version of the current state
    fn version_vector(&self) -> Vec<u8>;

    /// Merge a snapshot or update produced by another replica
    fn import(&mut self, bytes: &[u8]) -> Result<(), ReplicaError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Decryption(#[from] DecryptionFailure),
    #[error("replica error: {0}")]
    Replica(#[from] ReplicaError),
}

/// A sealed copy of the whole document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSnapshot {
    pub data: EncryptedBlob,
    pub version: u64,
    pub version_vector: Vec<u8>,
    /// Milliseconds since the unix epoch
    pub created_at: i64,
}

/// A sealed batch of changes on top of a snapshot version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedUpdate {
    pub data: EncryptedBlob,
    pub base_snapshot_version: u64,
    pub ordering_timestamp: OrderingTimestamp,
}

/// Encrypts replica exports and imports decrypted ones
#[derive(Debug, Clone, Default)]
pub struct SnapshotCodec {
    clock: UpdateClock,
}

impl SnapshotCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: UpdateClock) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &UpdateClock {
        &self.clock
    }

    pub fn create_encrypted_snapshot<D: DocumentReplica + ?Sized>(
        &self,
        doc: &D,
        key: &DocumentKey,
        version: u64,
    ) -> Result<EncryptedSnapshot, SnapshotError> {
        let plaintext = Zeroizing::new(doc.export_snapshot()?);
        Ok(seal_snapshot(&plaintext, doc.version_vector(), key, version))
    }

    /// Like [`SnapshotCodec::create_encrypted_snapshot`] but without history
    pub fn create_encrypted_shallow_snapshot<D: DocumentReplica + ?Sized>(
        &self,
        doc: &D,
        key: &DocumentKey,
        version: u64,
    ) -> Result<EncryptedSnapshot, SnapshotError> {
        let plaintext = Zeroizing::new(doc.export_shallow_snapshot()?);
        Ok(seal_snapshot(&plaintext, doc.version_vector(), key, version))
    }

    /// Encrypt the changes made since `since` and stamp them with the clock
    pub fn create_encrypted_update<D: DocumentReplica + ?Sized>(
        &self,
        doc: &D,
        key: &DocumentKey,
        base_snapshot_version: u64,
        since: &[u8],
    ) -> Result<EncryptedUpdate, SnapshotError> {
        let plaintext = Zeroizing::new(doc.export_updates(since)?);
        Ok(EncryptedUpdate {
            data: key.encrypt(&plaintext),
            base_snapshot_version,
            ordering_timestamp: self.clock.tick(),
        })
    }

    /// Decrypt a snapshot without importing it
    pub fn decrypt_snapshot(
        &self,
        snapshot: &EncryptedSnapshot,
        key: &DocumentKey,
    ) -> Result<Zeroizing<Vec<u8>>, SnapshotError> {
        Ok(Zeroizing::new(key.decrypt(&snapshot.data)?))
    }

    pub fn load_encrypted_snapshot<D: DocumentReplica + ?Sized>(
        &self,
        doc: &mut D,
        snapshot: &EncryptedSnapshot,
        key: &DocumentKey,
    ) -> Result<(), SnapshotError> {
        let plaintext = self.decrypt_snapshot(snapshot, key)?;
        doc.import(&plaintext)?;
        tracing::debug!(version = snapshot.version, "loaded encrypted snapshot");
        Ok(())
    }

    pub fn apply_encrypted_update<D: DocumentReplica + ?Sized>(
        &self,
        doc: &mut D,
        update: &EncryptedUpdate,
        key: &DocumentKey,
    ) -> Result<(), SnapshotError> {
        let plaintext = Zeroizing::new(key.decrypt(&update.data)?);
        doc.import(&plaintext)?;
        self.clock.observe(&update.ordering_timestamp);
        Ok(())
    }

    /// Apply a batch in ordering stamp order.
    ///
    /// Every update is decrypted before the first import; if any fails to
    /// decrypt, nothing is imported. Returns the number of updates applied.
    pub fn apply_encrypted_updates<D: DocumentReplica + ?Sized>(
        &self,
        doc: &mut D,
        updates: &[EncryptedUpdate],
        key: &DocumentKey,
    ) -> Result<usize, SnapshotError> {
        let mut ordered: Vec<&EncryptedUpdate> = updates.iter().collect();
        ordered.sort_by_key(|update| update.ordering_timestamp);

        let decrypted = ordered
            .iter()
            .map(|update| key.decrypt(&update.data).map(Zeroizing::new))
            .collect::<Result<Vec<_>, _>>()?;

        for (update, plaintext) in ordered.iter().zip(&decrypted) {
            doc.import(plaintext)?;
            self.clock.observe(&update.ordering_timestamp);
        }
        tracing::debug!(count = decrypted.len(), "applied encrypted updates");
        Ok(decrypted.len())
    }

    /// Move a snapshot from `old_key` to `new_key` in one pass.
    ///
    /// The plaintext only exists inside this call, in a buffer that is
    /// zeroized before returning. The version vector is carried over.
    pub fn reencrypt_snapshot(
        &self,
        snapshot: &EncryptedSnapshot,
        old_key: &DocumentKey,
        new_key: &DocumentKey,
        version: u64,
    ) -> Result<EncryptedSnapshot, SnapshotError> {
        let plaintext = self.decrypt_snapshot(snapshot, old_key)?;
        Ok(seal_snapshot(
            &plaintext,
            snapshot.version_vector.clone(),
            new_key,
            version,
        ))
    }
}

fn seal_snapshot(
    plaintext: &[u8],
    version_vector: Vec<u8>,
    key: &DocumentKey,
    version: u64,
) -> EncryptedSnapshot {
    EncryptedSnapshot {
        data: key.encrypt(plaintext),
        version,
        version_vector,
        created_at: chrono::Utc::now().timestamp_millis(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testkit::MemoryReplica;

    #[test]
    fn test_snapshot_roundtrip() {
        let codec = SnapshotCodec::new();
        let key = DocumentKey::generate();
        let mut source = MemoryReplica::new("alice");
        source.insert("groceries: 42.10");

        let snapshot = codec.create_encrypted_snapshot(&source, &key, 1).unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.version_vector, source.version_vector());

        let mut target = MemoryReplica::new("bob");
        codec.load_encrypted_snapshot(&mut target, &snapshot, &key).unwrap();
        assert_eq!(target.entries(), source.entries());
    }

    #[test]
    fn test_snapshot_wrong_key() {
        let codec = SnapshotCodec::new();
        let mut source = MemoryReplica::new("alice");
        source.insert("rent: 900");
        let snapshot = codec
            .create_encrypted_snapshot(&source, &DocumentKey::generate(), 1)
            .unwrap();

        let mut target = MemoryReplica::new("bob");
        let err = codec
            .load_encrypted_snapshot(&mut target, &snapshot, &DocumentKey::generate())
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Decryption(_)));
        assert!(target.entries().is_empty());
    }

    #[test]
    fn test_update_roundtrip() {
        let codec = SnapshotCodec::new();
        let key = DocumentKey::generate();
        let mut alice = MemoryReplica::new("alice");
        alice.insert("coffee: 3.50");
        let since = alice.version_vector();
        alice.insert("bread: 2.20");

        let update = codec.create_encrypted_update(&alice, &key, 7, &since).unwrap();
        assert_eq!(update.base_snapshot_version, 7);

        let mut bob = MemoryReplica::new("bob");
        codec.apply_encrypted_update(&mut bob, &update, &key).unwrap();
        assert_eq!(bob.entries(), vec!["alice:bread: 2.20".to_string()]);
    }

    #[test]
    fn test_updates_are_stamped_in_order() {
        let codec = SnapshotCodec::new();
        let key = DocumentKey::generate();
        let doc = MemoryReplica::new("alice");
        let a = codec.create_encrypted_update(&doc, &key, 1, &[]).unwrap();
        let b = codec.create_encrypted_update(&doc, &key, 1, &[]).unwrap();
        assert!(a.ordering_timestamp < b.ordering_timestamp);
    }

    #[test]
    fn test_future_stamp_does_not_break_later_updates() {
        let codec = SnapshotCodec::new();
        let key = DocumentKey::generate();
        let mut alice = MemoryReplica::new("alice");
        alice.insert("rent: 900");

        let hostile = EncryptedUpdate {
            data: key.encrypt(&alice.export_updates(&[]).unwrap()),
            base_snapshot_version: 1,
            ordering_timestamp: "9999999999999-999999".parse().unwrap(),
        };
        let mut bob = MemoryReplica::new("bob");
        codec.apply_encrypted_update(&mut bob, &hostile, &key).unwrap();
        assert!(codec.clock().last() < hostile.ordering_timestamp);

        bob.insert("power: 61");
        let next = codec.create_encrypted_update(&bob, &key, 1, &[]).unwrap();
        let json = serde_json::to_string(&UpdateRecord::from(next.clone())).unwrap();
        let parsed: UpdateRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(EncryptedUpdate::from(parsed), next);
    }

    #[test]
    fn test_reencrypt_snapshot() {
        let codec = SnapshotCodec::new();
        let old_key = DocumentKey::generate();
        let new_key = DocumentKey::generate();
        let mut doc = MemoryReplica::new("alice");
        doc.insert("utilities: 120");

        let snapshot = codec.create_encrypted_snapshot(&doc, &old_key, 4).unwrap();
        let moved = codec
            .reencrypt_snapshot(&snapshot, &old_key, &new_key, 5)
            .unwrap();

        assert_eq!(moved.version, 5);
        assert_eq!(moved.version_vector, snapshot.version_vector);
        assert!(codec.decrypt_snapshot(&moved, &old_key).is_err());
        assert_eq!(
            *codec.decrypt_snapshot(&moved, &new_key).unwrap(),
            *codec.decrypt_snapshot(&snapshot, &old_key).unwrap()
        );

        // wrong old key
        assert!(matches!(
            codec.reencrypt_snapshot(&snapshot, &new_key, &old_key, 5),
            Err(SnapshotError::Decryption(_))
        ));
    }

    #[test]
    fn test_shallow_snapshot_drops_history() {
        let codec = SnapshotCodec::new();
        let key = DocumentKey::generate();
        let mut doc = MemoryReplica::new("alice");
        doc.insert("a");
        doc.insert("b");

        let full = codec.create_encrypted_snapshot(&doc, &key, 1).unwrap();
        let shallow = codec.create_encrypted_shallow_snapshot(&doc, &key, 1).unwrap();
        assert!(shallow.data.len() <= full.data.len());

        let mut target = MemoryReplica::new("bob");
        codec.load_encrypted_snapshot(&mut target, &shallow, &key).unwrap();
        assert_eq!(target.entries(), doc.entries());
    }
}
