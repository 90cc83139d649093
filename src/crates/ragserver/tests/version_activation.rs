//! Version-activation atomicity (spec.md §8 seed scenario 4, §4.7): exactly
//! one build version is ever active for a tenant, the previous active
//! version is archived in the same transaction, and activation only
//! happens once every document in the version has completed.

use std::sync::Arc;
use storage::{DocumentStatus, GraphStore, MetaStore, VectorStore};

async fn manager() -> (ragserver::version_manager::VersionManager, MetaStore) {
    let meta = MetaStore::connect("sqlite::memory:").await.unwrap();
    let graph = GraphStore::new(meta.connection());
    let vectors = Arc::new(VectorStore::new("http://localhost:6334", 8).unwrap());
    (ragserver::version_manager::VersionManager::new(meta.clone(), graph, vectors, "./data".to_string()), meta)
}

#[tokio::test]
async fn activating_a_new_version_archives_the_previous_one() {
    let (manager, meta) = manager().await;
    let tenant = meta.create_tenant("Acme", None, None, None, None, None, "acme").await.unwrap();

    let v1 = meta.open_build_version(&tenant.id).await.unwrap();
    let doc1 = meta.create_document(&tenant.id, "a.pdf", "loc", 10, v1).await.unwrap();
    meta.advance_document_stage(&doc1.id, DocumentStatus::Completed, None).await.unwrap();
    manager.try_activate(&tenant.id, v1).await.unwrap();

    let v2 = meta.open_build_version(&tenant.id).await.unwrap();
    let doc2 = meta.create_document(&tenant.id, "b.pdf", "loc", 10, v2).await.unwrap();
    meta.advance_document_stage(&doc2.id, DocumentStatus::Completed, None).await.unwrap();
    manager.try_activate(&tenant.id, v2).await.unwrap();

    let tenant = meta.get_tenant(&tenant.id).await.unwrap().unwrap();
    assert_eq!(tenant.active_version, v2);

    let versions = meta.list_build_versions(&tenant.id).await.unwrap();
    let active_count = versions.iter().filter(|v| v.status == "active").count();
    assert_eq!(active_count, 1, "exactly one build version must be active");
    let v1_row = versions.iter().find(|v| v.version == v1).unwrap();
    assert_eq!(v1_row.status, "archived");
}

#[tokio::test]
async fn activation_is_withheld_until_every_document_in_the_version_completes() {
    let (manager, meta) = manager().await;
    let tenant = meta.create_tenant("Acme", None, None, None, None, None, "acme").await.unwrap();
    let version = meta.open_build_version(&tenant.id).await.unwrap();

    let done = meta.create_document(&tenant.id, "a.pdf", "loc", 10, version).await.unwrap();
    let pending = meta.create_document(&tenant.id, "b.pdf", "loc", 10, version).await.unwrap();
    meta.advance_document_stage(&done.id, DocumentStatus::Completed, None).await.unwrap();
    let _ = pending;

    manager.try_activate(&tenant.id, version).await.unwrap();

    let tenant = meta.get_tenant(&tenant.id).await.unwrap().unwrap();
    assert_eq!(tenant.active_version, 0, "activation must wait for every document in the version");
}
