//! Integration tests for creating, registering and unlocking identities

mod common;

use ::common::crypto::{is_ready, ready};
use ::common::identity::{IdentityError, IdentityRegistry, IdentityService, RegistryError};
use ::common::testkit::MemoryRegistry;

#[tokio::test]
async fn test_fixed_phrase_vector() {
    common::init_tracing();
    let keys = common::keys_for(common::TEST_PHRASE);

    assert_eq!(keys.signing.public().to_hex(), common::TEST_SIGNING_PUBLIC_HEX);
    assert_eq!(
        hex::encode(keys.encryption.public().to_bytes()),
        common::TEST_ENCRYPTION_PUBLIC_HEX
    );
    assert_eq!(keys.identity_hash().as_str(), common::TEST_IDENTITY_HASH);

    let service = IdentityService::new();
    let hash = service.unlock_with_seed(common::TEST_PHRASE).await.unwrap();
    assert_eq!(hash.as_str(), common::TEST_IDENTITY_HASH);
}

#[tokio::test]
async fn test_create_register_then_restore_on_another_device() {
    let registry = MemoryRegistry::default();
    let (laptop, phrase) = common::registered_member(&registry).await;
    assert!(laptop.is_unlocked());
    assert_eq!(registry.len(), 1);

    let laptop_hash = laptop.session().require().unwrap().identity_hash().clone();
    let registered = registry.get(&laptop_hash).unwrap();

    // a second device with only the phrase recovers the same keys
    let phone = IdentityService::new();
    let phone_hash = phone.unlock_with_seed(phrase.as_str()).await.unwrap();
    assert_eq!(phone_hash, laptop_hash);

    let session = phone.session().require().unwrap();
    assert_eq!(session.signing_public_key(), registered.signing_public_key);
    assert_eq!(session.encryption_public_key(), registered.encryption_public_key);
}

#[tokio::test]
async fn test_rejected_registration_leaves_session_locked() {
    let registry = MemoryRegistry::default();
    let service = IdentityService::new();
    let confirmed = service.generate_new().confirm();

    // someone got there first
    registry.register(&confirmed.registration()).await.unwrap();

    let err = service
        .register_identity(&registry, confirmed)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IdentityError::Registration(RegistryError::AlreadyRegistered(_))
    ));
    assert!(!service.is_unlocked());
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_confirm_by_typing_the_phrase_back() {
    let registry = MemoryRegistry::default();
    let service = IdentityService::new();
    let pending = service.generate_new();
    let expected = pending.identity_hash();
    let typed = pending.phrase().as_str().to_uppercase();

    // a typo hands the pending identity back
    let pending = pending.confirm_with_phrase(common::TEST_PHRASE).err().unwrap();
    let confirmed = pending.confirm_with_phrase(&typed).ok().unwrap();

    let hash = service.register_identity(&registry, confirmed).await.unwrap();
    assert_eq!(hash, expected);
    assert!(registry.get(&hash).is_some());
}

#[tokio::test]
async fn test_unlock_rejects_invalid_phrases() {
    let service = IdentityService::new();

    let mut words: Vec<&str> = common::TEST_PHRASE.split(' ').collect();
    words[11] = "abandon";
    let bad_checksum = words.join(" ");
    let cases = [
        "",
        "abandon abandon abandon",
        "correct horse battery staple correct horse battery staple correct horse battery staple",
        bad_checksum.as_str(),
    ];

    for phrase in cases {
        assert!(
            matches!(
                service.unlock_with_seed(phrase).await,
                Err(IdentityError::InvalidMnemonic)
            ),
            "accepted {phrase:?}"
        );
        assert!(!service.is_unlocked());
    }
}

#[tokio::test]
async fn test_phrase_normalization_on_unlock() {
    let service = IdentityService::new();
    let messy = format!("  {}  ", common::TEST_PHRASE.to_uppercase().replace(' ', "   "));
    let hash = service.unlock_with_seed(&messy).await.unwrap();
    assert_eq!(hash.as_str(), common::TEST_IDENTITY_HASH);
}

#[tokio::test]
async fn test_lock_clears_session() {
    let service = IdentityService::new();
    service.unlock_with_seed(common::TEST_PHRASE).await.unwrap();
    assert!(service.is_unlocked());

    service.lock();
    assert!(!service.is_unlocked());
    assert!(service.session().get().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ready_callers() {
    let results = futures::future::join_all((0..32).map(|_| ready())).await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert!(is_ready());
}
