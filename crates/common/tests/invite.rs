//! Integration tests for joining a household through an invite link

mod common;

use ::common::crypto::DocumentKey;
use ::common::membership::{Invite, InviteError, InviteLink, InviteRecord};
use ::common::sync::SnapshotCodec;
use ::common::testkit::{MemoryRegistry, MemoryReplica};

#[tokio::test]
async fn test_invitee_joins_and_reads_the_ledger() {
    common::init_tracing();
    let registry = MemoryRegistry::default();
    let (_alice, _) = common::registered_member(&registry).await;

    let key = DocumentKey::generate();
    let mut doc = MemoryReplica::new("alice");
    doc.insert("rent: 1500.00");
    let snapshot = SnapshotCodec::new()
        .create_encrypted_snapshot(&doc, &key, 1)
        .unwrap();

    let invite = Invite::create(&key, "hearth.example");
    let uploaded = serde_json::to_string(&invite.server_payload()).unwrap();
    let link = invite.link();
    drop(invite);

    // the invitee has only the link, and fetches the record by its id
    let parsed = InviteLink::parse(&link).unwrap();
    let record: InviteRecord = serde_json::from_str(&uploaded).unwrap();
    assert_eq!(record.invite_id, parsed.invite_id());

    let joined_key = parsed.accept(&record).await.unwrap();
    let mut dan = MemoryReplica::new("dan");
    SnapshotCodec::new()
        .load_encrypted_snapshot(&mut dan, &snapshot, &joined_key)
        .unwrap();
    assert_eq!(dan.entries(), doc.entries());

    // once registered, dan gets a regular membership record
    let (dan_service, _) = common::registered_member(&registry).await;
    let membership = common::member_of(&dan_service).seal_key(&joined_key);
    let dan_keys = dan_service.session().require().unwrap().encryption_keypair();
    assert!(membership.open(&dan_keys).unwrap() == key);
}

#[tokio::test]
async fn test_server_payload_never_contains_the_secret() {
    let invite = Invite::create(&DocumentKey::generate(), "hearth.example");
    let link = invite.link();
    let (_, secret) = link.split_once('#').unwrap();

    let payload = serde_json::to_string(&invite.server_payload()).unwrap();
    assert!(!payload.contains(secret));
    assert!(!format!("{invite:?}").contains(secret));
}

#[tokio::test]
async fn test_link_for_another_invite_is_rejected() {
    let key = DocumentKey::generate();
    let first = Invite::create(&key, "hearth.example");
    let second = Invite::create(&key, "hearth.example");

    let link = InviteLink::parse(&first.link()).unwrap();
    assert!(matches!(
        link.accept(&second.server_payload()).await,
        Err(InviteError::KeyMismatch)
    ));

    // same id, but the record was swapped for another invite's key
    let mut forged = second.server_payload();
    forged.invite_id = first.id();
    assert!(matches!(
        link.accept(&forged).await,
        Err(InviteError::KeyMismatch)
    ));
}

#[tokio::test]
async fn test_truncated_links_are_malformed() {
    let invite = Invite::create(&DocumentKey::generate(), "hearth.example");
    let link = invite.link();
    let without_secret = link.split_once('#').unwrap().0.to_string();
    let short_secret = format!("{without_secret}#AAAA");

    for bad in [without_secret, short_secret, "not a link".to_string()] {
        assert!(
            matches!(InviteLink::parse(&bad), Err(InviteError::MalformedLink(_))),
            "parsed {bad}"
        );
    }
}
