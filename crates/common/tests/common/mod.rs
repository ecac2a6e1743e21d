//! Shared test utilities for identity, sync and rekey integration tests
#![allow(dead_code)]

use common::crypto::{derive_keys, DerivedKeys, RecoveryPhrase};
use common::identity::IdentityService;
use common::membership::Member;
use common::testkit::MemoryRegistry;

/// The all-zero-entropy BIP-39 phrase, used for fixed vectors
pub const TEST_PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub const TEST_SIGNING_PUBLIC_HEX: &str =
    "b34aa88c0cb1df60ee2f0e2a71cee389ef45ff63310b80ea839f1eae145ed4a4";
pub const TEST_ENCRYPTION_PUBLIC_HEX: &str =
    "524a95251a1203f934c45bfe41377bec27da83721b22c33449deb7d22a8fe30a";
pub const TEST_IDENTITY_HASH: &str =
    "93a3f05678d9f2a9f6b74b8fa84d49dd9b2a694d1926fb23f3e6f5e8a05797da";

/// Install a test subscriber once; RUST_LOG controls the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Derive keys for a phrase string
pub fn keys_for(phrase: &str) -> DerivedKeys {
    let phrase = RecoveryPhrase::parse(phrase).unwrap();
    derive_keys(&phrase.to_master_seed())
}

/// Create, confirm and register a fresh identity. Returns the unlocked
/// service and the phrase it was created from.
pub async fn registered_member(registry: &MemoryRegistry) -> (IdentityService, RecoveryPhrase) {
    let service = IdentityService::new();
    let pending = service.generate_new();
    let phrase = pending.phrase().clone();
    service
        .register_identity(registry, pending.confirm())
        .await
        .unwrap();
    (service, phrase)
}

/// The member record for an unlocked service
pub fn member_of(service: &IdentityService) -> Member {
    Member::from_session(&service.session().require().unwrap())
}
