//! Exercises the outbound message lifecycle against a real Postgres
//! instance: idempotent sends, lease-then-dispatch, and the backoff/
//! terminal-failure split in `mark_failed`.

use common::DEFAULT_MAX_ATTEMPTS;
use server::store::{Store, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_tenant(store: &Store) -> Uuid {
    let tenant = store
        .create_tenant(&format!("tenant-{}", Uuid::new_v4()), "Test Tenant", "standard")
        .await
        .unwrap();
    tenant.id
}

#[sqlx::test]
async fn create_outbound_with_same_idempotency_key_returns_original(pool: PgPool) {
    let store = Store::from_pool(pool);
    let tenant_id = seed_tenant(&store).await;

    let first = store
        .create_outbound(
            tenant_id,
            "+15551234567",
            "hello",
            None,
            Some("req-1"),
            DEFAULT_MAX_ATTEMPTS,
            serde_json::json!({}),
        )
        .await
        .unwrap();
    assert!(!first.idempotent);

    let second = store
        .create_outbound(
            tenant_id,
            "+15551234567",
            "hello",
            None,
            Some("req-1"),
            DEFAULT_MAX_ATTEMPTS,
            serde_json::json!({}),
        )
        .await
        .unwrap();
    assert!(second.idempotent);
    assert_eq!(first.message.id, second.message.id);

    let (all, total) = store.list_outbound(tenant_id, None, 10, 0).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(all.len(), 1);
}

#[sqlx::test]
async fn create_outbound_with_same_idempotency_key_but_different_body_conflicts(pool: PgPool) {
    let store = Store::from_pool(pool);
    let tenant_id = seed_tenant(&store).await;

    store
        .create_outbound(
            tenant_id,
            "+15551234567",
            "hello",
            None,
            Some("req-1"),
            DEFAULT_MAX_ATTEMPTS,
            serde_json::json!({}),
        )
        .await
        .unwrap();

    let result = store
        .create_outbound(
            tenant_id,
            "+15551234567",
            "a different message",
            None,
            Some("req-1"),
            DEFAULT_MAX_ATTEMPTS,
            serde_json::json!({}),
        )
        .await;
    assert!(matches!(result, Err(StoreError::Conflict(_))));
}

#[sqlx::test]
async fn lease_queued_messages_only_picks_up_due_queued_rows(pool: PgPool) {
    let store = Store::from_pool(pool);
    let tenant_id = seed_tenant(&store).await;

    store
        .create_outbound(tenant_id, "+15551234567", "a", None, None, DEFAULT_MAX_ATTEMPTS, serde_json::json!({}))
        .await
        .unwrap();
    store
        .create_outbound(tenant_id, "+15551234568", "b", None, None, DEFAULT_MAX_ATTEMPTS, serde_json::json!({}))
        .await
        .unwrap();

    let leased = store.lease_queued_messages(10).await.unwrap();
    assert_eq!(leased.len(), 2);
    assert!(leased.iter().all(|m| m.status == common::OutboundStatus::Processing));

    // Already leased, so a second lease attempt finds nothing due.
    let leased_again = store.lease_queued_messages(10).await.unwrap();
    assert!(leased_again.is_empty());
}

#[sqlx::test]
async fn mark_failed_requeues_transient_and_terminates_after_max_attempts(pool: PgPool) {
    let store = Store::from_pool(pool);
    let tenant_id = seed_tenant(&store).await;

    let created = store
        .create_outbound(tenant_id, "+15551234567", "a", None, None, 2, serde_json::json!({}))
        .await
        .unwrap();
    let id = created.message.id;

    let after_first = store.mark_failed(id, "timeout", Some("TIMEOUT"), false).await.unwrap();
    assert_eq!(after_first.status, common::OutboundStatus::Queued);
    assert_eq!(after_first.attempts, 1);

    let after_second = store.mark_failed(id, "timeout", Some("TIMEOUT"), false).await.unwrap();
    assert_eq!(after_second.status, common::OutboundStatus::Failed);
    assert_eq!(after_second.attempts, 2);
}

#[sqlx::test]
async fn mark_failed_with_permanent_error_terminates_on_first_attempt(pool: PgPool) {
    let store = Store::from_pool(pool);
    let tenant_id = seed_tenant(&store).await;

    let created = store
        .create_outbound(tenant_id, "+15551234567", "a", None, None, DEFAULT_MAX_ATTEMPTS, serde_json::json!({}))
        .await
        .unwrap();

    let updated = store
        .mark_failed(created.message.id, "bad number", Some("INVALID_NUMBER"), true)
        .await
        .unwrap();
    assert_eq!(updated.status, common::OutboundStatus::Failed);
    assert_eq!(updated.attempts, 1);
}

#[sqlx::test]
async fn mark_delivered_from_non_sent_state_is_idempotent_no_op(pool: PgPool) {
    let store = Store::from_pool(pool);
    let tenant_id = seed_tenant(&store).await;

    let created = store
        .create_outbound(tenant_id, "+15551234567", "a", None, None, DEFAULT_MAX_ATTEMPTS, serde_json::json!({}))
        .await
        .unwrap();

    // Still queued, never sent; delivery report arrives out of order.
    let result = store.mark_delivered(created.message.id).await.unwrap();
    assert!(!result.delivered);
    assert_eq!(result.message.status, common::OutboundStatus::Queued);
    assert!(result.message.delivered_at.is_none());
}

#[sqlx::test]
async fn duplicate_sent_ack_does_not_revert_an_already_delivered_message(pool: PgPool) {
    let store = Store::from_pool(pool);
    let tenant_id = seed_tenant(&store).await;
    let device = store.create_device(None, "phone-1", None, "seed-token", true).await.unwrap();

    let created = store
        .create_outbound(tenant_id, "+15551234567", "a", None, None, DEFAULT_MAX_ATTEMPTS, serde_json::json!({}))
        .await
        .unwrap();
    let id = created.message.id;

    store.lease_queued_messages(10).await.unwrap();
    store.mark_sent(id, Some("carrier-ref"), device.id).await.unwrap();
    store.mark_delivered(id).await.unwrap();

    // A retried "sent" ack for the same lease arrives after delivery; it must not
    // revert the message back to `sent`.
    let after_duplicate_ack = store.mark_sent(id, Some("carrier-ref"), device.id).await.unwrap();
    assert_eq!(after_duplicate_ack.status, common::OutboundStatus::Delivered);

    let final_state = store.get_outbound(tenant_id, id).await.unwrap();
    assert_eq!(final_state.status, common::OutboundStatus::Delivered);
}

#[sqlx::test]
async fn failed_ack_after_delivery_is_a_no_op(pool: PgPool) {
    let store = Store::from_pool(pool);
    let tenant_id = seed_tenant(&store).await;
    let device = store.create_device(None, "phone-1", None, "seed-token", true).await.unwrap();

    let created = store
        .create_outbound(tenant_id, "+15551234567", "a", None, None, DEFAULT_MAX_ATTEMPTS, serde_json::json!({}))
        .await
        .unwrap();
    let id = created.message.id;

    store.lease_queued_messages(10).await.unwrap();
    store.mark_sent(id, Some("carrier-ref"), device.id).await.unwrap();
    store.mark_delivered(id).await.unwrap();

    let after_stray_failure = store.mark_failed(id, "stray failure", Some("TIMEOUT"), false).await.unwrap();
    assert_eq!(after_stray_failure.status, common::OutboundStatus::Delivered);
    // mark_sent already bumped attempts to 1; the stray failure must not bump it again.
    assert_eq!(after_stray_failure.attempts, 1);
}
