//! Duplicate-slug conflict (spec.md §8 seed scenario 5): two chatbots
//! cannot share an `access_url`. `tenants.access_slug` carries a `UNIQUE`
//! constraint, and `storage::error::map_sqlx` maps the resulting sqlx
//! unique-violation onto `CoreError::Conflict` without any application-level
//! locking.

use ragcore::error::CoreError;
use storage::MetaStore;

async fn store() -> MetaStore {
    MetaStore::connect("sqlite::memory:").await.unwrap()
}

#[tokio::test]
async fn creating_a_second_chatbot_with_the_same_slug_conflicts() {
    let meta = store().await;
    meta.create_tenant("Acme Support", None, None, None, None, None, "acme").await.unwrap();

    let err = meta
        .create_tenant("Acme Sales", None, None, None, None, None, "acme")
        .await
        .expect_err("duplicate access_slug must be rejected");

    assert!(matches!(err, CoreError::Conflict(_)), "expected Conflict, got {err:?}");
}

#[tokio::test]
async fn distinct_slugs_do_not_conflict() {
    let meta = store().await;
    meta.create_tenant("Acme", None, None, None, None, None, "acme").await.unwrap();
    let second = meta.create_tenant("Bolt", None, None, None, None, None, "bolt").await;
    assert!(second.is_ok());
}
