//! Fire-and-forget task discipline (SPEC_FULL.md §9 / spec.md §9): work that
//! must not block the request that triggered it (`last_used_at` bumps,
//! audit-log inserts, webhook delivery attempts) flows through one bounded
//! channel instead of a bare `tokio::spawn` per job.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::store::Store;
use crate::webhooks::WebhookJob;

#[derive(Debug)]
pub enum BackgroundJob {
    TouchApiKeyLastUsed {
        id: Uuid,
    },
    WriteAuditLog {
        tenant_id: Option<Uuid>,
        actor: String,
        action: String,
        resource: Option<String>,
        resource_id: Option<String>,
        details: serde_json::Value,
        ip_address: Option<String>,
    },
    FireWebhook(WebhookJob),
}

#[derive(Clone)]
pub struct BackgroundTasks {
    sender: mpsc::Sender<BackgroundJob>,
    dropped: Arc<AtomicU64>,
}

impl BackgroundTasks {
    /// Spawns the single drain worker and returns the handle callers submit
    /// jobs through.
    pub fn spawn(store: Store, http_client: reqwest::Client, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel(capacity);
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                run_job(&store, &http_client, job).await;
            }
        });

        Self { sender, dropped }
    }

    /// Never blocks: a full channel drops the job and counts it, matching
    /// the "count drops as an exposed metric" discipline.
    pub fn submit(&self, job: BackgroundJob) {
        if self.sender.try_send(job).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("background task queue full, dropping job");
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn run_job(store: &Store, http_client: &reqwest::Client, job: BackgroundJob) {
    match job {
        BackgroundJob::TouchApiKeyLastUsed { id } => {
            if let Err(err) = store.touch_api_key_last_used(id).await {
                tracing::warn!(error = %err, "failed to bump api key last_used_at");
            }
        }
        BackgroundJob::WriteAuditLog {
            tenant_id,
            actor,
            action,
            resource,
            resource_id,
            details,
            ip_address,
        } => {
            if let Err(err) = store
                .write_audit_log(
                    tenant_id,
                    &actor,
                    &action,
                    resource.as_deref(),
                    resource_id.as_deref(),
                    details,
                    ip_address.as_deref(),
                )
                .await
            {
                tracing::warn!(error = %err, "failed to write audit log entry");
            }
        }
        BackgroundJob::FireWebhook(job) => {
            crate::webhooks::deliver(store, http_client, job).await;
        }
    }
}
