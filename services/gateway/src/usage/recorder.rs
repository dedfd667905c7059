use crate::model::{MetricType, UsageMetric};
use crate::store::UsageStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Something worth counting against a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageEvent {
    /// One admitted API request.
    ApiRequest,
    /// Bytes accepted by an upload.
    Upload { bytes: u64 },
}

impl UsageEvent {
    fn metric(self) -> (MetricType, u64) {
        match self {
            UsageEvent::ApiRequest => (MetricType::ApiRequests, 1),
            UsageEvent::Upload { bytes } => (MetricType::StorageUsage, bytes),
        }
    }
}

#[derive(Debug)]
struct UsageJob {
    tenant_id: String,
    user_id: String,
    event: UsageEvent,
    at: DateTime<Utc>,
}

/// Non-blocking handle for recording usage.
///
/// Cloned into request handlers; the paired worker owns the store.
#[derive(Clone)]
pub struct UsageRecorder {
    tx: mpsc::Sender<UsageJob>,
}

impl UsageRecorder {
    /// Start the background writer. The task ends once every recorder clone
    /// has been dropped and the queue drained.
    pub fn spawn(
        store: Arc<dyn UsageStore>,
        capacity: usize,
        retention: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(store, rx, retention));
        (Self { tx }, worker)
    }

    /// Queue `event` and return immediately. Never fails; a full or closed
    /// queue drops the event.
    pub fn record(&self, tenant_id: &str, user_id: &str, event: UsageEvent) {
        let job = UsageJob {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            event,
            at: Utc::now(),
        };
        let reason = match self.tx.try_send(job) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => "queue full",
            Err(TrySendError::Closed(_)) => "recorder stopped",
        };
        metrics::counter!("tenantgate_usage_dropped_total").increment(1);
        tracing::warn!(tenant_id, user_id, ?event, reason, "usage event dropped");
    }
}

async fn run_worker(
    store: Arc<dyn UsageStore>,
    mut rx: mpsc::Receiver<UsageJob>,
    retention: Duration,
) {
    while let Some(job) = rx.recv().await {
        let (metric_type, value) = job.event.metric();
        let metric = UsageMetric::new(
            &job.tenant_id,
            &job.user_id,
            metric_type,
            value,
            job.at,
            retention,
        );
        // Each write stands alone; a slow or failing one never holds up the queue.
        let store = store.clone();
        tokio::spawn(async move {
            let tenant_id = metric.tenant_id.clone();
            match store.append_usage(metric).await {
                Ok(()) => {
                    metrics::counter!("tenantgate_usage_writes_total", "result" => "ok")
                        .increment(1);
                }
                Err(err) => {
                    metrics::counter!("tenantgate_usage_writes_total", "result" => "error")
                        .increment(1);
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        metric = %metric_type,
                        error = %err,
                        "usage write failed"
                    );
                }
            }
        });
    }
    tracing::debug!("usage recorder stopped");
}
