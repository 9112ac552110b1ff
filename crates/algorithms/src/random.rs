//! Uniform-random selection.

use crate::{index_for, RandomSource, SelectionAlgorithm, SelectionArgs, SelectionResult};
use bandit_core::constants::ALGO_RANDOM;
use bandit_core::{BanditError, BanditResult, MetricsBucket, Variant};
use std::sync::Arc;

pub struct RandomSelection {
    rng: Arc<dyn RandomSource>,
}

impl RandomSelection {
    pub fn new(rng: Arc<dyn RandomSource>) -> Self {
        Self { rng }
    }
}

impl Default for RandomSelection {
    fn default() -> Self {
        Self::new(Arc::new(crate::ThreadRandom))
    }
}

impl SelectionAlgorithm for RandomSelection {
    fn name(&self) -> &str {
        ALGO_RANDOM
    }

    fn select(&self, variants: &[Variant], _args: &SelectionArgs) -> BanditResult<SelectionResult> {
        if variants.is_empty() {
            return Err(BanditError::EmptyVariants);
        }
        let ix = index_for(self.rng.next_f64(), variants.len());
        Ok(SelectionResult {
            winner: variants[ix].clone(),
            metrics: MetricsBucket::new(),
            p_value: 0.0,
        })
    }
}
