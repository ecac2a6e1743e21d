//! JSON records exchanged with the relay server

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use super::clock::OrderingTimestamp;
use super::{EncryptedSnapshot, EncryptedUpdate};
use crate::crypto::EncryptedBlob;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub version: u64,
    #[serde_as(as = "Base64")]
    pub version_vector: Vec<u8>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub encrypted_data: EncryptedBlob,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    pub encrypted_data: EncryptedBlob,
    pub base_snapshot_version: u64,
    pub ordering_timestamp: OrderingTimestamp,
}

impl From<EncryptedSnapshot> for SnapshotRecord {
    fn from(snapshot: EncryptedSnapshot) -> Self {
        Self {
            encrypted_data: snapshot.data,
            metadata: SnapshotMetadata {
                version: snapshot.version,
                version_vector: snapshot.version_vector,
                created_at: snapshot.created_at,
            },
        }
    }
}

impl From<SnapshotRecord> for EncryptedSnapshot {
    fn from(record: SnapshotRecord) -> Self {
        Self {
            data: record.encrypted_data,
            version: record.metadata.version,
            version_vector: record.metadata.version_vector,
            created_at: record.metadata.created_at,
        }
    }
}

impl From<EncryptedUpdate> for UpdateRecord {
    fn from(update: EncryptedUpdate) -> Self {
        Self {
            encrypted_data: update.data,
            base_snapshot_version: update.base_snapshot_version,
            ordering_timestamp: update.ordering_timestamp,
        }
    }
}

impl From<UpdateRecord> for EncryptedUpdate {
    fn from(record: UpdateRecord) -> Self {
        Self {
            data: record.encrypted_data,
            base_snapshot_version: record.base_snapshot_version,
            ordering_timestamp: record.ordering_timestamp,
        }
    }
}
