//! Bandit client runtime: loads a site document, selects a variant per
//! visitor, records the choice in the session store and batches outcome
//! metrics for delivery. Each load selects afresh; the stored session id goes
//! out with the site fetch so a server can keep a visitor on the same variant.
//!
//! # Modules
//!
//! - [`client`]: the [`BanditClient`] orchestrator and its lifecycle
//! - [`source`]: where site documents come from (HTTP endpoint or in-memory)
//! - [`state`]: the read-only [`ClientState`] snapshot exposed to callers

pub mod client;
pub mod source;
pub mod state;

pub use client::{BanditClient, BanditClientBuilder, ErrorCallback, ReadyCallback};
pub use source::{HttpSiteSource, SiteRequest, SiteSource, StaticSiteSource};
pub use state::{ClientState, SelectionSource};

pub use bandit_algorithms::{AlgorithmRegistry, SelectionAlgorithm};
pub use bandit_core::{BanditError, ClientConfig, LoadState, MetricsSample, Site, Variant};
pub use bandit_metrics::{CaptureSink, MetricsSink};
pub use bandit_session::SessionStore;
