//! Epsilon-greedy bandit: explore uniformly with probability `epsilon`,
//! otherwise exploit the variant with the best observed conversion rate.

use crate::{index_for, RandomSource, SelectionAlgorithm, SelectionArgs, SelectionResult};
use bandit_core::constants::{ALGO_EPSILON_GREEDY, DEFAULT_EPSILON};
use bandit_core::{BanditError, BanditResult, MetricsBucket, Variant};
use std::sync::Arc;
use tracing::debug;

pub struct EpsilonGreedy {
    epsilon: f64,
    rng: Arc<dyn RandomSource>,
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64, rng: Arc<dyn RandomSource>) -> Self {
        Self {
            epsilon: epsilon.clamp(0.0, 1.0),
            rng,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Index of the best-converting variant; ties go to the first declared.
    /// `None` when no variant has recorded exposures yet.
    fn best(variants: &[Variant]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (ix, variant) in variants.iter().enumerate() {
            let Some(rate) = variant.conversion_rate() else {
                continue;
            };
            match best {
                Some((_, best_rate)) if rate <= best_rate => {}
                _ => best = Some((ix, rate)),
            }
        }
        best.map(|(ix, _)| ix)
    }
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self::new(DEFAULT_EPSILON, Arc::new(crate::ThreadRandom))
    }
}

impl SelectionAlgorithm for EpsilonGreedy {
    fn name(&self) -> &str {
        ALGO_EPSILON_GREEDY
    }

    fn select(&self, variants: &[Variant], args: &SelectionArgs) -> BanditResult<SelectionResult> {
        if variants.is_empty() {
            return Err(BanditError::EmptyVariants);
        }

        let epsilon = args.epsilon.map_or(self.epsilon, |e| e.clamp(0.0, 1.0));
        let explore = self.rng.next_f64() < epsilon;

        let ix = match (explore, Self::best(variants)) {
            (false, Some(ix)) => ix,
            _ => index_for(self.rng.next_f64(), variants.len()),
        };

        debug!(
            epsilon = epsilon,
            explore = explore,
            winner = %variants[ix].name,
            "epsilon-greedy selection"
        );

        let metrics: MetricsBucket = variants
            .iter()
            .filter_map(|v| v.conversion_rate().map(|rate| (v.name.clone(), rate)))
            .collect();

        Ok(SelectionResult {
            winner: variants[ix].clone(),
            metrics,
            p_value: 0.0,
        })
    }
}
