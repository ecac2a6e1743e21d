//! Cryptographic primitives for Hearth
//!
//! This module provides the cryptographic foundation for Hearth's security model:
//!
//! - **Recovery**: a 12-word BIP-39 phrase is the single root of a member's keys
//! - **Identity & Authentication**: Ed25519 keypairs sign outgoing API requests
//! - **Encryption**: XChaCha20-Poly1305 protects document snapshots and updates
//! - **Key Sharing**: X25519 boxes wrap the document key for each member
//!
//! # Key Hierarchy
//!
//! ```text
//! RecoveryPhrase (12 words)
//!         │
//!         ▼
//! BIP-39 seed stretching → MasterSeed [u8; 64]
//!         │
//!         ▼
//! HKDF-SHA256(salt = "hearth/keys/v1")
//!         │
//!         ├─► expand("hearth/signing/v1")    → Ed25519 signing keypair
//!         └─► expand("hearth/encryption/v1") → X25519 encryption keypair
//! ```
//!
//! The identity hash the relay server stores is `sha256(signing public key)`.
//! It is never derived from the encryption key.
//!
//! # Document Keys
//!
//! Every shared document has its own random 256-bit [`DocumentKey`]. The key
//! is distributed to members as a [`WrappedDocumentKey`], either boxed from a
//! known sender or sealed anonymously. When a member leaves, the key is rotated
//! (see [`crate::membership::Rekeyer`]).
//!
//! # Readiness
//!
//! [`ready`] must resolve before the first primitive is used. It runs a small
//! self-test exactly once per process, no matter how many tasks await it.

mod key_wrap;
mod keys;
mod ready;
mod secret;
mod seed;

pub use ed25519_dalek::Signature;
pub use key_wrap::{
    seal, unseal, unwrap, wrap, KeyWrapError, WrapMode, WrappedDocumentKey,
};
pub use keys::{
    derive_keys, derive_keys_with, DerivedKeys, DomainLabels, EncryptionKeypair,
    EncryptionPublicKey, IdentityHash, KeyError, SigningKeypair, SigningPublicKey,
    PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
};
pub use ready::{is_ready, ready, CryptoError};
pub use secret::{
    decrypt, encrypt, DecryptionFailure, DocumentKey, EncryptedBlob, NONCE_SIZE,
    SECRET_SIZE, TAG_SIZE,
};
pub use seed::{normalize, validate, MasterSeed, RecoveryPhrase, SeedError, MASTER_SEED_SIZE};
