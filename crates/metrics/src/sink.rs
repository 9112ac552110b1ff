//! Delivery targets for metrics batches.

use bandit_core::constants::{DEFAULT_SITE_NAME, DEFAULT_VARIANT_NAME, PARAM_SITE, PARAM_VARIANT};
use bandit_core::{BanditError, BanditResult, ClientConfig, MetricsSample};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use url::Url;

pub type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Site and variant a batch is tagged with on delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushScope {
    pub site: String,
    pub variant: String,
}

impl Default for FlushScope {
    fn default() -> Self {
        Self {
            site: DEFAULT_SITE_NAME.to_string(),
            variant: DEFAULT_VARIANT_NAME.to_string(),
        }
    }
}

/// Delivers one batch. `Ok` means the batch may be dropped from the queue.
pub trait MetricsSink: Send + Sync {
    fn deliver<'a>(
        &'a self,
        batch: &'a [MetricsSample],
        scope: &'a FlushScope,
    ) -> BoxFut<'a, BanditResult<()>>;
}

/// `POST <base_url><metrics_path>?site=..&variant=..` with a JSON array body.
/// A base URL that does not resolve fails the delivery, leaving the batch queued.
pub struct HttpMetricsSink {
    client: reqwest::Client,
    base_url: String,
    metrics_path: String,
}

impl HttpMetricsSink {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            metrics_path: config.metrics_path.clone(),
        }
    }

    pub fn url_for(&self, scope: &FlushScope) -> BanditResult<Url> {
        let mut url = Url::parse(&self.base_url)?.join(&self.metrics_path)?;
        url.query_pairs_mut()
            .append_pair(PARAM_SITE, &scope.site)
            .append_pair(PARAM_VARIANT, &scope.variant);
        Ok(url)
    }
}

impl MetricsSink for HttpMetricsSink {
    fn deliver<'a>(
        &'a self,
        batch: &'a [MetricsSample],
        scope: &'a FlushScope,
    ) -> BoxFut<'a, BanditResult<()>> {
        Box::pin(async move {
            let url = self.url_for(scope)?;
            let resp = self
                .client
                .post(url.clone())
                .header(reqwest::header::ACCEPT, "application/json")
                .json(batch)
                .send()
                .await
                .map_err(|e| BanditError::Transport(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(BanditError::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            Ok(())
        })
    }
}

/// In-memory sink that records every delivery attempt. Useful for tests and
/// for embedders that forward metrics themselves.
#[derive(Default)]
pub struct CaptureSink {
    delivered: Mutex<Vec<(FlushScope, Vec<MetricsSample>)>>,
    attempts: Mutex<usize>,
    failing: Mutex<bool>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent deliveries fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }

    pub fn batches(&self) -> Vec<(FlushScope, Vec<MetricsSample>)> {
        self.delivered.lock().clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().iter().map(|(_, b)| b.len()).sum()
    }
}

impl MetricsSink for CaptureSink {
    fn deliver<'a>(
        &'a self,
        batch: &'a [MetricsSample],
        scope: &'a FlushScope,
    ) -> BoxFut<'a, BanditResult<()>> {
        Box::pin(async move {
            *self.attempts.lock() += 1;
            if *self.failing.lock() {
                return Err(BanditError::Transport("capture sink is failing".into()));
            }
            self.delivered.lock().push((scope.clone(), batch.to_vec()));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_http_sink_url_carries_scope() {
        let config = ClientConfig {
            base_url: "https://bandit.example".into(),
            ..Default::default()
        };
        let sink = HttpMetricsSink::new(&config);
        let url = sink
            .url_for(&FlushScope {
                site: "test-ab".into(),
                variant: "B".into(),
            })
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://bandit.example/api/metrics?site=test-ab&variant=B"
        );
    }

    #[tokio::test]
    async fn test_unresolvable_base_url_fails_delivery() {
        let sink = HttpMetricsSink::new(&ClientConfig {
            base_url: "localhost:3000/".into(),
            ..Default::default()
        });
        let result = sink.deliver(&[], &FlushScope::default()).await;
        assert!(matches!(result, Err(BanditError::InvalidUrl(_))));
    }
}
