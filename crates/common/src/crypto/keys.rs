use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use hkdf::Hkdf;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::seed::MasterSeed;

/// Size of Ed25519 / X25519 private keys in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 / X25519 public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// HKDF extract salt shared by both keypairs
const KEY_SALT: &[u8] = b"hearth/keys/v1";

/// Errors that can occur during key operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// Malformed key material handed in by the caller
    #[error("key length mismatch: expected {expected} bytes, got {actual}")]
    KeyLengthMismatch { expected: usize, actual: usize },
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("key decode error: {0}")]
    Decode(String),
}

/// HKDF `info` labels separating the signing and encryption keypairs.
///
/// These are part of the account format. Changing a label changes every
/// derived key and locks existing members out: a breaking migration, not a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainLabels {
    pub signing: &'static [u8],
    pub encryption: &'static [u8],
}

impl DomainLabels {
    pub const V1: Self = Self {
        signing: b"hearth/signing/v1",
        encryption: b"hearth/encryption/v1",
    };
}

impl Default for DomainLabels {
    fn default() -> Self {
        Self::V1
    }
}

/// Both keypairs of a member, derived from one master seed
#[derive(Clone)]
pub struct DerivedKeys {
    /// Ed25519 keypair used for request signatures
    pub signing: SigningKeypair,
    /// X25519 keypair used for document key wrapping
    pub encryption: EncryptionKeypair,
}

impl DerivedKeys {
    /// The identity hash of the signing public key
    pub fn identity_hash(&self) -> IdentityHash {
        IdentityHash::from_signing_key(&self.signing.public())
    }
}

impl fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeys")
            .field("signing", &self.signing.public())
            .field("encryption", &self.encryption.public())
            .finish()
    }
}

/// Derive both keypairs with the production labels
pub fn derive_keys(seed: &MasterSeed) -> DerivedKeys {
    derive_keys_with(seed, &DomainLabels::V1)
}

/// Derive both keypairs with explicit domain labels.
///
/// One HKDF-SHA256 extract over the master seed, then one 32-byte expand per
/// label. Each output only depends on its own label.
pub fn derive_keys_with(seed: &MasterSeed, labels: &DomainLabels) -> DerivedKeys {
    let hkdf = Hkdf::<Sha256>::new(Some(KEY_SALT), seed.as_bytes());

    let signing_seed = expand(&hkdf, labels.signing);
    let encryption_seed = expand(&hkdf, labels.encryption);

    DerivedKeys {
        signing: SigningKeypair::from_seed(&signing_seed),
        encryption: EncryptionKeypair::from_bytes(*encryption_seed),
    }
}

fn expand(hkdf: &Hkdf<Sha256>, label: &[u8]) -> Zeroizing<[u8; PRIVATE_KEY_SIZE]> {
    let mut okm = Zeroizing::new([0u8; PRIVATE_KEY_SIZE]);
    let Ok(()) = hkdf.expand(label, okm.as_mut()) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    okm
}

fn to_array(bytes: &[u8]) -> Result<[u8; PUBLIC_KEY_SIZE], KeyError> {
    bytes
        .try_into()
        .map_err(|_| KeyError::KeyLengthMismatch {
            expected: PUBLIC_KEY_SIZE,
            actual: bytes.len(),
        })
}

/// Ed25519 keypair for request authentication
#[derive(Clone)]
pub struct SigningKeypair(SigningKey);

impl SigningKeypair {
    /// Build the keypair from its 32-byte secret seed
    pub fn from_seed(seed: &[u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(SigningKey::from_bytes(seed))
    }

    /// Build the keypair from a byte slice
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::KeyLengthMismatch`] unless exactly 32 bytes are given.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let seed = Zeroizing::new(to_array(bytes)?);
        Ok(Self::from_seed(&seed))
    }

    pub fn public(&self) -> SigningPublicKey {
        SigningPublicKey(self.0.verifying_key())
    }

    /// The 32-byte secret seed
    pub fn to_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_SIZE]> {
        Zeroizing::new(self.0.to_bytes())
    }

    /// Produce a detached signature. Deterministic for identical input.
    pub fn sign(&self, msg: &[u8]) -> ed25519_dalek::Signature {
        self.0.sign(msg)
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SigningKeypair").field(&self.public()).finish()
    }
}

/// Ed25519 public key; the relay server only ever sees its hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct SigningPublicKey(VerifyingKey);

impl SigningPublicKey {
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidPublicKey`] if the bytes are not a valid
    /// Edwards point.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| KeyError::InvalidPublicKey)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| KeyError::Decode(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Strict Ed25519 verification of a detached signature
    pub fn verify(
        &self,
        msg: &[u8],
        signature: &ed25519_dalek::Signature,
    ) -> Result<(), ed25519_dalek::SignatureError> {
        self.0.verify_strict(msg, signature)
    }

    pub fn identity_hash(&self) -> IdentityHash {
        IdentityHash::from_signing_key(self)
    }
}

impl TryFrom<&[u8]> for SigningPublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(&to_array(bytes)?)
    }
}

impl fmt::Display for SigningPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for SigningPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningPublicKey({})", self.to_hex())
    }
}

impl FromStr for SigningPublicKey {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

/// X25519 keypair for wrapping document keys
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKeypair {
    secret: [u8; PRIVATE_KEY_SIZE],
    #[zeroize(skip)]
    public: EncryptionPublicKey,
}

impl EncryptionKeypair {
    /// Build the keypair from 32 secret bytes (clamped by X25519 on use)
    pub fn from_bytes(secret: [u8; PRIVATE_KEY_SIZE]) -> Self {
        let box_secret = crypto_box::SecretKey::from(secret);
        let public = EncryptionPublicKey(*box_secret.public_key().as_bytes());
        Self { secret, public }
    }

    /// # Errors
    ///
    /// Returns [`KeyError::KeyLengthMismatch`] unless exactly 32 bytes are given.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let secret = Zeroizing::new(to_array(bytes)?);
        Ok(Self::from_bytes(*secret))
    }

    pub fn public(&self) -> EncryptionPublicKey {
        self.public
    }

    pub fn to_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_SIZE]> {
        Zeroizing::new(self.secret)
    }

    pub(crate) fn box_secret(&self) -> crypto_box::SecretKey {
        crypto_box::SecretKey::from(self.secret)
    }
}

impl fmt::Debug for EncryptionKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EncryptionKeypair").field(&self.public).finish()
    }
}

/// X25519 public key other members wrap document keys for
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub struct EncryptionPublicKey([u8; PUBLIC_KEY_SIZE]);

impl From<[u8; PUBLIC_KEY_SIZE]> for EncryptionPublicKey {
    fn from(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for EncryptionPublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(to_array(bytes)?))
    }
}

impl EncryptionPublicKey {
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| KeyError::Decode(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }

    pub(crate) fn box_public(&self) -> crypto_box::PublicKey {
        crypto_box::PublicKey::from(self.0)
    }
}

impl fmt::Display for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionPublicKey({})", hex::encode(self.0))
    }
}

impl FromStr for EncryptionPublicKey {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

/// Lowercase hex SHA-256 of the raw 32 signing public key bytes.
///
/// The only identifier the relay server keeps for a member. Registration and
/// request verification both go through [`IdentityHash::from_signing_key`];
/// there is no other way to build one from a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub struct IdentityHash(String);

impl IdentityHash {
    pub fn from_signing_key(key: &SigningPublicKey) -> Self {
        Self(hex::encode(Sha256::digest(key.to_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for IdentityHash {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let well_formed = s.len() == 64
            && s.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(KeyError::Decode(format!("malformed identity hash: {s}")));
        }
        Ok(Self(s.to_string()))
    }
}
