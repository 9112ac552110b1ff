//! Outcome metrics pipeline: an in-memory FIFO of [`MetricsSample`]s that is
//! flushed to a collection endpoint in batches, on a size threshold or a timer.
//!
//! [`MetricsSample`]: bandit_core::MetricsSample

#![warn(clippy::unwrap_used)]

pub mod queue;
pub mod sink;

pub use queue::MetricsQueue;
pub use sink::{BoxFut, CaptureSink, FlushScope, HttpMetricsSink, MetricsSink};
