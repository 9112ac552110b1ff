//! Batching queue in front of a [`MetricsSink`].
//!
//! Samples are appended in call order. A push that brings the queue to
//! `batch_size` flushes inline; otherwise a single timer is armed to flush
//! after `flush_interval`. A flush sends the first `min(len, batch_size)`
//! samples and only removes them once the sink accepts the batch, so a failed
//! delivery is retried by the next flush (at-least-once).

use crate::sink::{FlushScope, MetricsSink};
use bandit_core::{ClientConfig, MetricsSample};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Per-client metrics queue. Cloning shares the same queue.
#[derive(Clone)]
pub struct MetricsQueue {
    inner: Arc<Inner>,
}

struct Inner {
    sink: Arc<dyn MetricsSink>,
    enabled: bool,
    batch_size: usize,
    flush_interval: Duration,
    samples: Mutex<VecDeque<MetricsSample>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    scope: RwLock<FlushScope>,
    /// Serializes flushes so two deliveries never claim the same prefix.
    flush_gate: tokio::sync::Mutex<()>,
}

impl MetricsQueue {
    pub fn new(config: &ClientConfig, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                enabled: config.metrics_enabled(),
                batch_size: config.batch_size(),
                flush_interval: config.flush_interval(),
                samples: Mutex::new(VecDeque::new()),
                timer: Mutex::new(None),
                scope: RwLock::new(FlushScope::default()),
                flush_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Queue a sample. No-op when no collection endpoint is configured.
    pub async fn push(&self, sample: MetricsSample) {
        if !self.inner.enabled {
            return;
        }

        let len = {
            let mut samples = self.inner.samples.lock();
            samples.push_back(sample);
            samples.len()
        };
        metrics::counter!("bandit.metrics.queued").increment(1);

        if len >= self.inner.batch_size {
            self.inner.flush().await;
        } else {
            self.inner.schedule();
        }
    }

    /// Deliver the next batch now.
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    /// Tag subsequent deliveries with this site and variant.
    pub fn set_scope(&self, site: impl Into<String>, variant: impl Into<String>) {
        *self.inner.scope.write() = FlushScope {
            site: site.into(),
            variant: variant.into(),
        };
    }

    pub fn scope(&self) -> FlushScope {
        self.inner.scope.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.lock().is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    pub fn has_pending_flush(&self) -> bool {
        self.inner.timer.lock().is_some()
    }

    /// Snapshot of queued samples in delivery order.
    pub fn pending(&self) -> Vec<MetricsSample> {
        self.inner.samples.lock().iter().cloned().collect()
    }
}

impl Inner {
    fn schedule(self: &Arc<Self>) {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }
        let inner = Arc::clone(self);
        let delay = self.flush_interval;
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.flush().await;
        }));
    }

    async fn flush(&self) {
        if !self.enabled {
            return;
        }

        let _gate = self.flush_gate.lock().await;

        let batch: Vec<MetricsSample> = {
            let samples = self.samples.lock();
            let count = samples.len().min(self.batch_size);
            samples.iter().take(count).cloned().collect()
        };

        if !batch.is_empty() {
            let scope = self.scope.read().clone();
            let count = batch.len();
            debug!(count = count, site = %scope.site, "Flushing metrics batch");

            match self.sink.deliver(&batch, &scope).await {
                Ok(()) => {
                    let mut samples = self.samples.lock();
                    let drained = count.min(samples.len());
                    samples.drain(..drained);
                    metrics::counter!("bandit.metrics.flushed").increment(drained as u64);
                    info!(count = drained, remaining = samples.len(), "Flushed metrics");
                }
                Err(e) => {
                    metrics::counter!("bandit.metrics.flush_errors").increment(1);
                    error!(error = %e, count = count, "Failed to send metrics, batch stays queued");
                }
            }
        }

        // Nothing awaits past this point, so aborting the timer from inside
        // its own task is harmless.
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
    }
}
