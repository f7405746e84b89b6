//! Background worker loop (spec.md §4.4). In push-mode deployments it
//! leases queued messages and delivers them through the Android adapter
//! client; in pull-mode-only deployments it just runs the stale-processing
//! reaper and heartbeat, since leasing happens in the device pull-outbound
//! handler instead.

mod adapter;

pub use adapter::AdapterClient;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adapter::AdapterOutcome;
use common::WebhookEventType;
use futures::stream::{self, StreamExt};

use crate::background::BackgroundTasks;
use crate::router;
use crate::store::Store;
use crate::webhooks;

/// `Arc<AtomicBool>` test-and-set re-entrancy guard for the dispatcher loop.
pub type RunFlag = Arc<AtomicBool>;

pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub stale_processing_threshold_ms: i64,
}

pub struct Dispatcher {
    store: Store,
    background: BackgroundTasks,
    adapter: Option<Arc<AdapterClient>>,
    config: DispatcherConfig,
    running: RunFlag,
}

impl Dispatcher {
    pub fn new(
        store: Store,
        background: BackgroundTasks,
        adapter: Option<Arc<AdapterClient>>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            background,
            adapter,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            ticker.tick().await;

            if self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                tracing::debug!("dispatcher batch already in flight, skipping tick");
                continue;
            }

            let processed = self.run_batch().await;

            if let Err(err) = self
                .store
                .reap_stale_processing(self.config.stale_processing_threshold_ms)
                .await
            {
                tracing::warn!(error = %err, "stale processing reaper failed");
            }
            if let Err(err) = self.store.bump_worker_heartbeat(processed).await {
                tracing::warn!(error = %err, "failed to bump worker heartbeat");
            }

            self.running.store(false, Ordering::SeqCst);
        }
    }

    async fn run_batch(&self) -> i64 {
        let Some(adapter) = self.adapter.as_ref() else {
            // Pull-mode-only deployment: nothing to lease, the device
            // pull-outbound endpoint performs its own leasing.
            return 0;
        };

        let messages = match self.store.lease_queued_messages(self.config.batch_size).await {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(error = %err, "failed to lease queued messages");
                return 0;
            }
        };
        if messages.is_empty() {
            return 0;
        }

        let results: Vec<bool> = stream::iter(messages)
            .map(|message| self.dispatch_one(adapter, message))
            .buffer_unordered(self.config.batch_size.max(1) as usize)
            .collect()
            .await;

        results.into_iter().filter(|succeeded| *succeeded).count() as i64
    }

    async fn dispatch_one(&self, adapter: &AdapterClient, message: common::OutboundMessage) -> bool {
        let device = match router::pick_device(&self.store, message.tenant_id, message.preferred_device_id).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                if let Err(err) = self
                    .store
                    .mark_failed(message.id, "No online device", Some("NO_DEVICE"), false)
                    .await
                {
                    tracing::warn!(error = %err, "failed to mark NO_DEVICE failure");
                }
                return false;
            }
            Err(err) => {
                tracing::warn!(error = %err, "pick_device query failed");
                return false;
            }
        };

        match adapter.send(&device, &message).await {
            AdapterOutcome::Sent { external_id } => {
                match self
                    .store
                    .mark_sent(message.id, external_id.as_deref(), device.id)
                    .await
                {
                    Ok(sent) => {
                        webhooks::trigger(
                            &self.store,
                            &self.background,
                            sent.tenant_id,
                            WebhookEventType::SmsSent,
                            sent_payload(&sent),
                        )
                        .await;
                        true
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to mark message sent");
                        false
                    }
                }
            }
            AdapterOutcome::Failed {
                error_code,
                message: error_message,
                permanent,
            } => {
                match self
                    .store
                    .mark_failed(message.id, &error_message, error_code.as_deref(), permanent)
                    .await
                {
                    Ok(updated) if updated.status == common::OutboundStatus::Failed => {
                        webhooks::trigger(
                            &self.store,
                            &self.background,
                            updated.tenant_id,
                            WebhookEventType::SmsFailed,
                            failed_payload(&updated),
                        )
                        .await;
                        false
                    }
                    Ok(_) => false,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to mark message failed");
                        false
                    }
                }
            }
        }
    }
}

fn sent_payload(message: &common::OutboundMessage) -> common::WebhookPayload {
    common::WebhookPayload {
        event: WebhookEventType::SmsSent,
        message_id: message.id,
        tenant_id: message.tenant_id,
        to_number: Some(message.to_number.clone()),
        from_number: None,
        status: Some(message.status.to_string()),
        error_code: None,
        occurred_at: chrono::Utc::now(),
    }
}

fn failed_payload(message: &common::OutboundMessage) -> common::WebhookPayload {
    common::WebhookPayload {
        event: WebhookEventType::SmsFailed,
        message_id: message.id,
        tenant_id: message.tenant_id,
        to_number: Some(message.to_number.clone()),
        from_number: None,
        status: Some(message.status.to_string()),
        error_code: message.error_code.clone(),
        occurred_at: chrono::Utc::now(),
    }
}
