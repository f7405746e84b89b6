//! Inbound ingestion dedup and webhook-trigger fan-out rules.

use server::store::Store;
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_tenant(store: &Store) -> Uuid {
    store
        .create_tenant(&format!("tenant-{}", Uuid::new_v4()), "Test Tenant", "standard")
        .await
        .unwrap()
        .id
}

#[sqlx::test]
async fn create_inbound_with_same_external_id_is_not_duplicated(pool: PgPool) {
    let store = Store::from_pool(pool);
    let tenant_id = seed_tenant(&store).await;

    let first = store
        .create_inbound(tenant_id, None, "+15557654321", None, "hi", Some("carrier-ref-1"), serde_json::json!({}))
        .await
        .unwrap();
    assert!(first.fresh);

    let second = store
        .create_inbound(tenant_id, None, "+15557654321", None, "hi", Some("carrier-ref-1"), serde_json::json!({}))
        .await
        .unwrap();
    assert!(!second.fresh);
    assert_eq!(first.message.id, second.message.id);

    let (all, total) = store.list_inbound(tenant_id, 10, 0).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(all.len(), 1);
}

#[sqlx::test]
async fn create_inbound_without_external_id_never_dedups(pool: PgPool) {
    let store = Store::from_pool(pool);
    let tenant_id = seed_tenant(&store).await;

    let first = store
        .create_inbound(tenant_id, None, "+15557654321", None, "hi", None, serde_json::json!({}))
        .await
        .unwrap();
    let second = store
        .create_inbound(tenant_id, None, "+15557654321", None, "hi", None, serde_json::json!({}))
        .await
        .unwrap();

    assert!(first.fresh && second.fresh);
    assert_ne!(first.message.id, second.message.id);
}
