//! Pairing and device-identity lifecycle against a real Postgres instance.

use server::background::BackgroundTasks;
use server::store::Store;
use sqlx::PgPool;

async fn background_tasks(store: &Store) -> BackgroundTasks {
    BackgroundTasks::spawn(store.clone(), reqwest::Client::new(), 16)
}

#[sqlx::test]
async fn pair_code_redemption_is_at_most_once(pool: PgPool) {
    let store = Store::from_pool(pool);
    let background = background_tasks(&store).await;

    let device = store
        .create_device(None, "phone-1", None, "seed-token", true)
        .await
        .unwrap();

    let minted = server::pairing::mint_pair_code(&store, device.id, "admin@example.com", 30, "https://gw.example.com")
        .await
        .unwrap();

    let first = server::pairing::redeem_by_code(
        &store,
        &background,
        &minted.raw_code,
        None,
        Some("10.0.0.1"),
        10,
    )
    .await
    .unwrap();
    assert_eq!(first.device_id, device.id);

    let second = server::pairing::redeem_by_code(&store, &background, &minted.raw_code, None, Some("10.0.0.1"), 10).await;
    assert!(second.is_err());
}

#[sqlx::test]
async fn rotate_device_token_changes_the_token(pool: PgPool) {
    let store = Store::from_pool(pool);

    let device = store
        .create_device(None, "phone-1", None, "seed-token", true)
        .await
        .unwrap();

    let rotated = server::pairing::rotate_device_token(&store, device.id).await.unwrap();
    assert_ne!(rotated.raw_token, "seed-token");

    let found = store.get_device_by_token(&rotated.raw_token).await.unwrap();
    assert_eq!(found.id, device.id);
}
