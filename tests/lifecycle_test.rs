//! End-to-end lifecycle scenarios against the local filesystem driver:
//! name/citation binding, draft editing, document commit and bag capacity.

use nebula_repository::driver::local::LocalDriver;
use nebula_repository::facade::StorageFacade;
use nebula_repository::notary::InMemoryNotary;
use nebula_repository::repository::Repository;
use nebula_repository::{Digest, ExceptionKind, Name, Tag, Version};
use std::sync::Arc;

fn repository(root: &std::path::Path) -> Repository {
    let driver = Arc::new(LocalDriver::new(root));
    let notary = Arc::new(InMemoryNotary::new(b"test-secret".to_vec()));
    let facade = Arc::new(StorageFacade::new(driver, notary, 256));
    Repository::new(facade)
}

#[tokio::test]
async fn s1_citation_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repository(dir.path());
    let name = Name::new("/examples/name/v1.2.3");
    let citation = nebula_repository::Citation::new(Tag::generate(), Version::parse("1.2.3").unwrap(), Digest::of(b"payload"));

    assert_eq!(repo.facade().name_exists(&name).await.unwrap(), false);
    repo.facade().write_name(&name, &citation).await.unwrap();
    assert_eq!(repo.facade().name_exists(&name).await.unwrap(), true);
    assert_eq!(repo.facade().read_name(&name).await.unwrap(), Some(citation.clone()));

    let second = repo.facade().write_name(&name, &citation).await;
    let err = second.unwrap_err();
    assert_eq!(err.kind, ExceptionKind::Conflict);
}

#[tokio::test]
async fn s2_draft_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repository(dir.path());
    let tag = Tag::generate();
    let version = Version::initial();
    let content = serde_json::json!({"shape": "circle"});

    let citation = repo.save_document(tag.clone(), version.clone(), content.clone()).await.unwrap();

    assert_eq!(repo.facade().draft_exists(&citation).await.unwrap(), true);
    assert_eq!(repo.facade().document_exists(&citation).await.unwrap(), false);
    assert_eq!(repo.retrieve_document(&citation).await.unwrap(), Some(content));

    assert_eq!(repo.discard_document(&citation).await.unwrap(), true);
    assert_eq!(repo.facade().draft_exists(&citation).await.unwrap(), false);
    assert_eq!(repo.discard_document(&citation).await.unwrap(), false);
}

#[tokio::test]
async fn s3_commit_then_contract_promotion_rejects_second_write_under_same_key() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repository(dir.path());
    let tag = Tag::generate();
    let version = Version::parse("3.4").unwrap();
    let content = serde_json::json!({"shape": "square"});

    let citation = repo.facade().write_document(tag.clone(), version.clone(), content.clone()).await.unwrap();
    assert_eq!(repo.facade().draft_exists(&citation).await.unwrap(), false);
    assert_eq!(repo.facade().document_exists(&citation).await.unwrap(), true);
    assert_eq!(repo.facade().read_document(&citation).await.unwrap().unwrap().content, content);

    // Promote to a contract, then a subsequent contract write under the
    // same key must be rejected.
    let promoted = repo.facade().write_contract(citation.clone(), content.clone()).await.unwrap();
    assert_eq!(promoted, citation);
    let conflict = repo.facade().write_contract(citation.clone(), content.clone()).await;
    assert_eq!(conflict.unwrap_err().kind, ExceptionKind::Conflict);

    // Promotion removes the staging document (invariant 2).
    assert_eq!(repo.facade().read_document(&citation).await.unwrap(), None);
}

#[tokio::test]
async fn s3_document_rewrite_with_different_content_under_same_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repository(dir.path());
    let tag = Tag::generate();
    let version = Version::parse("3.4").unwrap();
    let content = serde_json::json!({"shape": "square"});

    let citation = repo.facade().write_document(tag.clone(), version.clone(), content.clone()).await.unwrap();

    // `doc_key` is derived from (tag, version) alone, so different content
    // under the same key must be rejected rather than silently overwritten
    // (invariant 2), even though the driver write itself allows overwrite.
    let different = serde_json::json!({"shape": "triangle"});
    let err = repo
        .facade()
        .write_document(tag.clone(), version.clone(), different)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ExceptionKind::Conflict);
    assert_eq!(repo.facade().read_document(&citation).await.unwrap().unwrap().content, content);

    // Byte-identical rewrites remain permitted: documents are a staging slot.
    let idempotent = repo.facade().write_document(tag, version, content).await.unwrap();
    assert_eq!(idempotent, citation);
}

#[tokio::test]
async fn s6_bag_capacity_blocks_third_add() {
    let dir = tempfile::tempdir().unwrap();
    let repo = repository(dir.path());
    let bag_name = Name::new("/examples/bags/overflow");
    let bag = repo.create_bag(&bag_name, 2).await.unwrap();

    repo.add_message(&bag, serde_json::json!({"n": 1})).await.unwrap();
    repo.add_message(&bag, serde_json::json!({"n": 2})).await.unwrap();
    let third = repo.add_message(&bag, serde_json::json!({"n": 3})).await;
    assert_eq!(third.unwrap_err().kind, ExceptionKind::BagFull);
}

#[tokio::test]
async fn cache_never_exceeds_capacity() {
    let cache: nebula_repository::cache::Cache<String, u32> = nebula_repository::cache::Cache::new(4);
    for i in 0..10u32 {
        cache.put(format!("k{i}"), i).await;
    }
    assert!(cache.len().await <= 4);
}
