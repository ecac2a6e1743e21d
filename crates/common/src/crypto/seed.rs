//! Recovery phrases and the master seed derived from them
//!
//! A [`RecoveryPhrase`] is a 12-word BIP-39 English mnemonic carrying 128 bits
//! of entropy plus a 4-bit checksum. It is shown to the user once at
//! registration and never persisted. Every unlock re-derives the
//! [`MasterSeed`] from it with the standard BIP-39 stretching function
//! (PBKDF2-HMAC-SHA512, 2048 rounds, empty passphrase).
//!
//! Phrases typed by hand or pasted from a password manager are run through
//! [`normalize`] before anything else looks at them, so `"  Abandon\tabandon…"`
//! and `"abandon abandon…"` are the same phrase.

use std::fmt;
use std::str::FromStr;

use bip39::{Language, Mnemonic};
use chacha20poly1305::aead::{rand_core::RngCore, OsRng};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Number of words in a recovery phrase
pub const WORD_COUNT: usize = 12;
/// Bytes of entropy encoded by a recovery phrase (128 bits)
pub const ENTROPY_SIZE: usize = 16;
/// Size of the stretched BIP-39 seed in bytes
pub const MASTER_SEED_SIZE: usize = 64;

/// Errors that can occur while handling recovery phrases
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeedError {
    /// Unknown word, wrong word count, or failed checksum. Carries no detail;
    /// the UI only ever says "invalid recovery phrase".
    #[error("invalid recovery phrase")]
    InvalidPhrase,
}

/// Trim, lowercase and collapse all whitespace runs to a single space.
pub fn normalize(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check word list membership, word count and checksum.
///
/// Never fails on malformed input; callers decide how to surface `false`.
pub fn validate(phrase: &str) -> bool {
    RecoveryPhrase::parse(phrase).is_ok()
}

/// A validated, normalized 12-word recovery phrase
///
/// The inner string is zeroized on drop and never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RecoveryPhrase(String);

impl RecoveryPhrase {
    /// Generate a fresh phrase from the OS random source
    pub fn generate() -> Self {
        let mut entropy = Zeroizing::new([0u8; ENTROPY_SIZE]);
        OsRng.fill_bytes(entropy.as_mut());
        let Ok(mnemonic) = Mnemonic::from_entropy_in(Language::English, entropy.as_ref()) else {
            unreachable!("16 bytes is valid BIP-39 entropy");
        };
        Self(mnemonic.to_string())
    }

    /// Normalize and validate a user supplied phrase
    ///
    /// # Errors
    ///
    /// Returns [`SeedError::InvalidPhrase`] if any word is not in the English
    /// word list, the phrase is not exactly 12 words, or the checksum fails.
    pub fn parse(phrase: &str) -> Result<Self, SeedError> {
        let normalized = Zeroizing::new(normalize(phrase));
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|_| SeedError::InvalidPhrase)?;
        if mnemonic.word_count() != WORD_COUNT {
            return Err(SeedError::InvalidPhrase);
        }
        Ok(Self(mnemonic.to_string()))
    }

    /// The normalized phrase, words separated by single spaces
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate the words of the phrase in order
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ')
    }

    /// Stretch the phrase into the 64-byte master seed.
    ///
    /// Pure and deterministic: the same phrase always yields the same seed.
    pub fn to_master_seed(&self) -> MasterSeed {
        let Ok(mnemonic) = Mnemonic::parse_in_normalized(Language::English, &self.0) else {
            unreachable!("recovery phrases are validated on construction");
        };
        MasterSeed(mnemonic.to_seed_normalized(""))
    }
}

impl FromStr for RecoveryPhrase {
    type Err = SeedError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for RecoveryPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecoveryPhrase(<redacted>)")
    }
}

/// The stretched seed all of a member's keys are derived from.
///
/// Ephemeral: recomputed on every unlock, zeroized on drop, never stored.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSeed([u8; MASTER_SEED_SIZE]);

impl MasterSeed {
    /// Wrap raw seed bytes
    pub fn from_bytes(bytes: [u8; MASTER_SEED_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get a reference to the seed bytes
    pub fn as_bytes(&self) -> &[u8; MASTER_SEED_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MasterSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSeed(<redacted>)")
    }
}
