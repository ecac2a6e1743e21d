//! In-memory collaborators for tests
//!
//! Stand-ins for the CRDT engine and the relay server so the full identity,
//! sync and rekey flows can run in-process.
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testkit::{MemoryPublisher, MemoryReplica};
//!
//! let mut doc = MemoryReplica::new("alice");
//! doc.insert("groceries: 42.10");
//!
//! let publisher = MemoryPublisher::default();
//! publisher.fail_next(1);
//! // the first publish_rekey call fails, the next succeeds
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::crypto::IdentityHash;
use crate::identity::{IdentityRegistry, Registration, RegistryError};
use crate::membership::{PublishError, RekeyPublication, RekeyPublisher};
use crate::sync::{DocumentReplica, ReplicaError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Op {
    peer: String,
    seq: u64,
    value: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Export {
    ops: Vec<Op>,
    /// Order in which the exporting replica saw each op; full snapshots only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    history: Vec<(String, u64)>,
}

/// A grow-only set of entries, one op per insert
///
/// Each replica numbers its own ops; the version vector maps peer name to the
/// highest sequence number seen from that peer. Good enough to exercise
/// snapshots, deltas and out-of-order delivery.
#[derive(Debug, Clone)]
pub struct MemoryReplica {
    peer: String,
    ops: BTreeMap<(String, u64), String>,
    history: Vec<(String, u64)>,
    imports: usize,
}

impl MemoryReplica {
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            ops: BTreeMap::new(),
            history: Vec::new(),
            imports: 0,
        }
    }

    /// Record a local change
    pub fn insert(&mut self, value: impl Into<String>) {
        let seq = self.clock_for(&self.peer) + 1;
        let id = (self.peer.clone(), seq);
        self.history.push(id.clone());
        self.ops.insert(id, value.into());
    }

    /// All entries as `peer:value`, in (peer, seq) order
    pub fn entries(&self) -> Vec<String> {
        self.ops
            .iter()
            .map(|((peer, _), value)| format!("{peer}:{value}"))
            .collect()
    }

    /// How many successful imports this replica has done
    pub fn imports(&self) -> usize {
        self.imports
    }

    fn clock_for(&self, peer: &str) -> u64 {
        self.ops
            .keys()
            .filter(|(p, _)| p == peer)
            .map(|(_, seq)| *seq)
            .max()
            .unwrap_or(0)
    }

    fn vector(&self) -> BTreeMap<String, u64> {
        let mut vector = BTreeMap::new();
        for (peer, seq) in self.ops.keys() {
            let entry = vector.entry(peer.clone()).or_insert(0);
            *entry = (*entry).max(*seq);
        }
        vector
    }

    fn export(&self, ops: impl Iterator<Item = Op>, history: bool) -> Result<Vec<u8>, ReplicaError> {
        let export = Export {
            ops: ops.collect(),
            history: if history { self.history.clone() } else { Vec::new() },
        };
        serde_json::to_vec(&export).map_err(|e| ReplicaError::Default(e.into()))
    }

    fn all_ops(&self) -> impl Iterator<Item = Op> + '_ {
        self.ops.iter().map(|((peer, seq), value)| Op {
            peer: peer.clone(),
            seq: *seq,
            value: value.clone(),
        })
    }
}

impl DocumentReplica for MemoryReplica {
    fn export_snapshot(&self) -> Result<Vec<u8>, ReplicaError> {
        self.export(self.all_ops(), true)
    }

    fn export_shallow_snapshot(&self) -> Result<Vec<u8>, ReplicaError> {
        self.export(self.all_ops(), false)
    }

    fn export_updates(&self, since: &[u8]) -> Result<Vec<u8>, ReplicaError> {
        let since: BTreeMap<String, u64> = if since.is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_slice(since).map_err(anyhow::Error::from)?
        };
        let newer = self
            .all_ops()
            .filter(|op| op.seq > since.get(&op.peer).copied().unwrap_or(0));
        self.export(newer, false)
    }

    fn version_vector(&self) -> Vec<u8> {
        serde_json::to_vec(&self.vector()).unwrap_or_default()
    }

    fn import(&mut self, bytes: &[u8]) -> Result<(), ReplicaError> {
        let export: Export = serde_json::from_slice(bytes)
            .map_err(|e| anyhow!("malformed replica export: {e}"))?;
        for op in export.ops {
            let id = (op.peer, op.seq);
            if !self.ops.contains_key(&id) {
                self.history.push(id.clone());
                self.ops.insert(id, op.value);
            }
        }
        self.imports += 1;
        Ok(())
    }
}

/// Identity registry backed by a map, rejecting duplicate hashes
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    inner: Arc<Mutex<HashMap<IdentityHash, Registration>>>,
}

impl MemoryRegistry {
    pub fn get(&self, identity_hash: &IdentityHash) -> Option<Registration> {
        self.inner.lock().get(identity_hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[async_trait]
impl IdentityRegistry for MemoryRegistry {
    async fn register(&self, registration: &Registration) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        if inner.contains_key(&registration.identity_hash) {
            return Err(RegistryError::AlreadyRegistered(
                registration.identity_hash.clone(),
            ));
        }
        inner.insert(registration.identity_hash.clone(), registration.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PublisherInner {
    published: Vec<RekeyPublication>,
    attempts: usize,
    failures_left: usize,
}

/// Rekey publisher that records publications and can be told to fail
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    inner: Arc<Mutex<PublisherInner>>,
}

impl MemoryPublisher {
    /// Fail the next `count` publish calls
    pub fn fail_next(&self, count: usize) {
        self.inner.lock().failures_left = count;
    }

    /// Every publication accepted so far
    pub fn published(&self) -> Vec<RekeyPublication> {
        self.inner.lock().published.clone()
    }

    /// Number of publish calls, failed ones included
    pub fn attempts(&self) -> usize {
        self.inner.lock().attempts
    }
}

#[async_trait]
impl RekeyPublisher for MemoryPublisher {
    async fn publish_rekey(&self, publication: &RekeyPublication) -> Result<(), PublishError> {
        let mut inner = self.inner.lock();
        inner.attempts += 1;
        if inner.failures_left > 0 {
            inner.failures_left -= 1;
            return Err(anyhow!("injected publish failure").into());
        }
        inner.published.push(publication.clone());
        Ok(())
    }
}
