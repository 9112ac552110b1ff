use crate::constants::{
    DEFAULT_NAME, DEFAULT_ORIGIN, DEFAULT_SITE_NAME, METRIC_CLICKS, METRIC_CONVERSIONS,
    METRIC_EXPOSURES,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated metrics for a single variant, keyed by metric name.
pub type MetricsBucket = BTreeMap<String, f64>;

/// One concrete alternative under test (an "arm").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsBucket>,
}

impl Variant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsBucket) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The invariant variant used whenever nothing better can be selected.
    pub fn invariant() -> Self {
        Self::new(DEFAULT_NAME).with_metrics(MetricsBucket::from([
            (METRIC_EXPOSURES.to_string(), 0.0),
            (METRIC_CLICKS.to_string(), 0.0),
        ]))
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.as_ref().and_then(|m| m.get(name).copied())
    }

    /// Observed conversions per exposure, if any exposures have been recorded.
    /// Buckets that count `clicks` instead of `conversions` are scored by clicks.
    pub fn conversion_rate(&self) -> Option<f64> {
        let exposures = self.metric(METRIC_EXPOSURES)?;
        if exposures <= 0.0 {
            return None;
        }
        let conversions = self
            .metric(METRIC_CONVERSIONS)
            .or_else(|| self.metric(METRIC_CLICKS))
            .unwrap_or(0.0);
        Some(conversions / exposures)
    }
}

/// A named experiment surface and its variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Older documents call this list `experiments`.
    #[serde(default, alias = "experiments")]
    pub variants: Vec<Variant>,
}

impl Site {
    pub fn new(name: impl Into<String>, variants: Vec<Variant>) -> Self {
        Self {
            name: name.into(),
            select: None,
            session: None,
            variants,
        }
    }

    /// Site used when no remote document can be retrieved.
    pub fn fallback() -> Self {
        Self {
            name: DEFAULT_SITE_NAME.to_string(),
            select: Some(DEFAULT_NAME.to_string()),
            session: None,
            variants: vec![Variant::invariant()],
        }
    }

    /// Exact-match lookup by variant name.
    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn is_usable(&self) -> bool {
        !self.variants.is_empty()
    }
}

/// Lifecycle of a client instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    #[default]
    Preload,
    Wait,
    Selecting,
    Ready,
}

/// One observation queued for delivery to the metrics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    #[serde(rename = "ts", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub origin: String,
    pub session: String,
    pub site: String,
    pub variant: String,
    pub metric: String,
    pub value: f64,
}

/// Client-local identity record, persisted per origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub origin: String,
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub variant: String,
}

impl SessionDescriptor {
    /// A fresh descriptor for an origin. Identifiers are issued server-side.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            sid: String::new(),
            uid: String::new(),
            site: DEFAULT_SITE_NAME.to_string(),
            variant: DEFAULT_NAME.to_string(),
        }
    }

    pub fn apply(mut self, patch: &SessionPatch) -> Self {
        if let Some(origin) = &patch.origin {
            self.origin = origin.clone();
        }
        if let Some(sid) = &patch.sid {
            self.sid = sid.clone();
        }
        if let Some(uid) = &patch.uid {
            self.uid = uid.clone();
        }
        if let Some(site) = &patch.site {
            self.site = site.clone();
        }
        if let Some(variant) = &patch.variant {
            self.variant = variant.clone();
        }
        self
    }
}

/// Partial update applied over a stored [`SessionDescriptor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub origin: Option<String>,
    pub sid: Option<String>,
    pub uid: Option<String>,
    pub site: Option<String>,
    pub variant: Option<String>,
}

impl SessionPatch {
    pub fn origin(&self) -> &str {
        self.origin.as_deref().unwrap_or(DEFAULT_ORIGIN)
    }
}
