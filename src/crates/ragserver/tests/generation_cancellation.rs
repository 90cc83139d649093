//! Generation cancellation (spec.md §8 seed scenario 2, §4.5 step 9, §4.8,
//! §7): a user-requested stop signal published on the session's
//! `CancellationBus` key is observed by a poller, and the resulting turn is
//! persisted as a partial assistant message (`cancelled = true`), not as an
//! error (`failed = true`).

use ragserver::bus::new_cancellation_bus;
use storage::MetaStore;

#[tokio::test]
async fn a_published_cancellation_is_observed_by_a_poller() {
    let bus = new_cancellation_bus();
    assert_eq!(bus.poll("session-1"), None);

    bus.publish("session-1", true);

    assert_eq!(bus.poll("session-1"), Some(true));
    assert_eq!(bus.poll("session-2"), None, "cancellation on one session must not leak to another");
}

#[tokio::test]
async fn a_cancelled_turn_is_persisted_as_partial_not_as_an_error() {
    let meta = MetaStore::connect("sqlite::memory:").await.unwrap();
    let tenant = meta.create_tenant("Acme", None, None, None, None, None, "acme").await.unwrap();
    let session = meta.create_session(&tenant.id, 30).await.unwrap();
    meta.persist_user_message(&session, "tell me everything").await.unwrap();

    let message = meta
        .persist_assistant_message(&session.id, &tenant.id, "partial answer before stop", None, 120, 10, 4, 1, 50, true, false)
        .await
        .unwrap();

    assert!(message.cancelled, "a user-requested stop must be recorded as cancelled");
    assert!(!message.failed, "a cancellation is not an error");
    assert_eq!(message.content, "partial answer before stop");
}
