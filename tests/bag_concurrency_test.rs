//! Bag/message protocol scenarios: FIFO is explicitly not guaranteed,
//! borrow/return lease semantics, and at-most-once delivery under
//! concurrent borrowers (invariant 5).

use nebula_repository::driver::local::LocalDriver;
use nebula_repository::facade::StorageFacade;
use nebula_repository::notary::InMemoryNotary;
use nebula_repository::{Bag, Citation, Digest, ExceptionKind, Tag, Version};
use std::collections::HashSet;
use std::sync::Arc;

fn facade(root: &std::path::Path) -> Arc<StorageFacade> {
    let driver = Arc::new(LocalDriver::new(root));
    let notary = Arc::new(InMemoryNotary::new(b"test-secret".to_vec()));
    Arc::new(StorageFacade::new(driver, notary, 256))
}

fn test_bag() -> Bag {
    Bag::new(Citation::new(Tag::generate(), Version::initial(), Digest::of(b"bag")))
}

#[tokio::test]
async fn s4_bag_delivers_each_payload_exactly_once_in_some_order() {
    let dir = tempfile::tempdir().unwrap();
    let facade = facade(dir.path());
    let bag = test_bag();

    facade.add_message(&bag, 10, serde_json::json!({"name": "first"})).await.unwrap();
    facade.add_message(&bag, 10, serde_json::json!({"name": "second"})).await.unwrap();
    facade.add_message(&bag, 10, serde_json::json!({"name": "third"})).await.unwrap();

    let mut seen = HashSet::new();
    for _ in 0..3 {
        let message = facade.borrow_message(&bag).await.unwrap().expect("message expected");
        let name = message.content["name"].as_str().unwrap().to_string();
        assert!(seen.insert(name), "payload delivered more than once");
    }
    assert_eq!(seen, HashSet::from(["first".to_string(), "second".to_string(), "third".to_string()]));

    assert_eq!(facade.borrow_message(&bag).await.unwrap(), None);
}

#[tokio::test]
async fn s5_borrow_then_return_reversions_and_is_borrowable_again() {
    let dir = tempfile::tempdir().unwrap();
    let facade = facade(dir.path());
    let bag = test_bag();

    facade.add_message(&bag, 10, serde_json::json!({"name": "m"})).await.unwrap();
    let borrowed = facade.borrow_message(&bag).await.unwrap().unwrap();
    assert_eq!(facade.message_count(&bag).await.unwrap(), 0);

    let original_version = borrowed.citation.version.clone();
    facade.return_message(&bag, borrowed).await.unwrap();
    assert_eq!(facade.message_count(&bag).await.unwrap(), 1);

    let second_borrow = facade.borrow_message(&bag).await.unwrap().unwrap();
    assert_ne!(second_borrow.citation.version, original_version);
    assert_eq!(second_borrow.content["name"], "m");
}

#[tokio::test]
async fn return_after_delete_reports_lease_expired() {
    let dir = tempfile::tempdir().unwrap();
    let facade = facade(dir.path());
    let bag = test_bag();

    facade.add_message(&bag, 10, serde_json::json!({"name": "m"})).await.unwrap();
    let borrowed = facade.borrow_message(&bag).await.unwrap().unwrap();
    let consumed = facade.delete_message(&bag, &borrowed.citation).await.unwrap();
    assert_eq!(consumed.content["name"], "m");

    let err = facade.return_message(&bag, borrowed).await.unwrap_err();
    assert_eq!(err.kind, ExceptionKind::LeaseExpired);
}

#[tokio::test]
async fn invariant_5_concurrent_borrowers_never_duplicate_a_payload() {
    let dir = tempfile::tempdir().unwrap();
    let facade = facade(dir.path());
    let bag = test_bag();

    const MESSAGE_COUNT: usize = 8;
    const BORROWER_COUNT: usize = 20;

    for i in 0..MESSAGE_COUNT {
        facade.add_message(&bag, MESSAGE_COUNT as u64, serde_json::json!({"n": i})).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..BORROWER_COUNT {
        let facade = facade.clone();
        let bag = bag.clone();
        handles.push(tokio::spawn(async move { facade.borrow_message(&bag).await.unwrap() }));
    }

    let mut delivered = Vec::new();
    for handle in handles {
        if let Some(message) = handle.await.unwrap() {
            delivered.push(message.content["n"].as_u64().unwrap());
        }
    }

    assert_eq!(delivered.len(), MESSAGE_COUNT, "every message must be delivered to exactly one borrower");
    let unique: HashSet<_> = delivered.iter().collect();
    assert_eq!(unique.len(), MESSAGE_COUNT, "no message may be delivered twice");
}
