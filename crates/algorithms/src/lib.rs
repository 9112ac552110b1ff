//! Variant selection strategies: uniform random and epsilon-greedy bandit,
//! behind a single [`SelectionAlgorithm`] trait, plus the name→factory
//! [`AlgorithmRegistry`] the client resolves its default strategy from.

pub mod epsilon_greedy;
pub mod random;
pub mod registry;
pub mod rng;

pub use epsilon_greedy::EpsilonGreedy;
pub use random::RandomSelection;
pub use registry::{AlgorithmFactory, AlgorithmRegistry};
pub use rng::{FixedRandom, RandomSource, SeededRandom, ThreadRandom};

use bandit_core::{BanditResult, MetricsBucket, Variant};
use serde::{Deserialize, Serialize};

/// Optional per-call arguments. Unset fields fall back to the strategy's own defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionArgs {
    pub epsilon: Option<f64>,
}

/// Outcome of a single selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub winner: Variant,
    pub metrics: MetricsBucket,
    /// Not computed by the bundled strategies; always 0.
    pub p_value: f64,
}

/// A variant selection strategy.
///
/// Implementations are pure over their inputs apart from the random source
/// and must return [`BanditError::EmptyVariants`](bandit_core::BanditError::EmptyVariants)
/// rather than panic when handed an empty slice.
pub trait SelectionAlgorithm: Send + Sync {
    fn name(&self) -> &str;

    fn select(&self, variants: &[Variant], args: &SelectionArgs) -> BanditResult<SelectionResult>;
}

/// Maps a unit draw in `[0, 1)` onto `[0, len)`.
///
/// The draw is clamped so a source returning exactly 1.0 still lands on the
/// last index rather than one past it.
pub(crate) fn index_for(draw: f64, len: usize) -> usize {
    debug_assert!(len > 0);
    let ix = (draw.clamp(0.0, 1.0) * len as f64).floor() as usize;
    ix.min(len - 1)
}
