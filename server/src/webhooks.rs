//! Event-typed, HMAC-signed webhook delivery with bounded in-process retry
//! (spec.md §4.6). No durable retry queue; an accepted liveness limitation
//! documented in SPEC_FULL.md §9.

use std::time::Duration;

use common::{hmac_sha256_hex, WebhookEventType, WebhookPayload};
use uuid::Uuid;

use crate::background::{BackgroundJob, BackgroundTasks};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct WebhookJob {
    pub webhook_id: Uuid,
    pub url: String,
    pub signing_secret: String,
    pub max_retries: i32,
    pub backoff_ms: i64,
    pub payload: WebhookPayload,
}

/// Looks up every active webhook subscribed to `event_type` for the tenant
/// and enqueues one delivery job per match. Called right after the status
/// transition that triggered the event commits.
pub async fn trigger(
    store: &Store,
    background: &BackgroundTasks,
    tenant_id: Uuid,
    event_type: WebhookEventType,
    payload: WebhookPayload,
) {
    let webhooks = match store
        .list_active_webhooks_for_event(tenant_id, event_type)
        .await
    {
        Ok(webhooks) => webhooks,
        Err(err) => {
            tracing::warn!(error = %err, "failed to load webhooks for event");
            return;
        }
    };

    for webhook in webhooks {
        background.submit(BackgroundJob::FireWebhook(WebhookJob {
            webhook_id: webhook.id,
            url: webhook.url,
            signing_secret: webhook.signing_secret,
            max_retries: webhook.retry_policy.max_retries,
            backoff_ms: webhook.retry_policy.backoff_ms,
            payload: payload.clone(),
        }));
    }
}

/// Runs on the single background drain worker. Retries in-process up to
/// `max_retries` with the fixed `backoff_ms` delay, then gives up silently;
/// the caller's request was never blocked on this.
pub async fn deliver(store: &Store, http_client: &reqwest::Client, job: WebhookJob) {
    let body = match serde_json::to_vec(&job.payload) {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize webhook payload");
            return;
        }
    };
    let signature = format!("sha256={}", hmac_sha256_hex(job.signing_secret.as_bytes(), &body));
    let delivery_id = Uuid::new_v4();

    let mut attempt = 0;
    let last_status = loop {
        let result = http_client
            .post(&job.url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", &signature)
            .header("X-Webhook-Event", job.payload.event.to_string())
            .header("X-Webhook-Id", delivery_id.to_string())
            .timeout(Duration::from_secs(10))
            .body(body.clone())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                break "delivered".to_string();
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), webhook_id = %job.webhook_id, "webhook delivery rejected");
            }
            Err(err) => {
                tracing::warn!(error = %err, webhook_id = %job.webhook_id, "webhook delivery failed");
            }
        }

        attempt += 1;
        if attempt > job.max_retries {
            break "failed".to_string();
        }
        tokio::time::sleep(Duration::from_millis(job.backoff_ms as u64)).await;
    };

    if let Err(err) = store.record_webhook_attempt(job.webhook_id, &last_status).await {
        tracing::warn!(error = %err, "failed to record webhook attempt");
    }
}
