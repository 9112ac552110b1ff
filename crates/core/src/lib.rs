pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use crate::config::ClientConfig;
pub use crate::error::{BanditError, BanditResult};
pub use crate::types::{
    LoadState, MetricsBucket, MetricsSample, SessionDescriptor, SessionPatch, Site, Variant,
};
