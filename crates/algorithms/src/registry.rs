//! Name→factory registry of selection strategies.

use crate::{EpsilonGreedy, RandomSelection, RandomSource, SelectionAlgorithm, ThreadRandom};
use bandit_core::constants::{ALGO_EPSILON_GREEDY, ALGO_RANDOM, DEFAULT_EPSILON};
use bandit_core::{BanditError, BanditResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a fresh strategy instance.
pub type AlgorithmFactory = Arc<dyn Fn() -> Box<dyn SelectionAlgorithm> + Send + Sync>;

/// Open registry of strategies. New strategies are added with
/// [`register`](AlgorithmRegistry::register) without touching the client.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    factories: HashMap<String, AlgorithmFactory>,
}

impl AlgorithmRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with `random` and `epsilon-greedy-mab` backed by the thread RNG.
    pub fn with_defaults() -> Self {
        Self::with_random_source(Arc::new(ThreadRandom), DEFAULT_EPSILON)
    }

    /// Registry with the bundled strategies drawing from `rng`.
    pub fn with_random_source(rng: Arc<dyn RandomSource>, epsilon: f64) -> Self {
        let random_rng = rng.clone();
        Self::empty()
            .register(ALGO_RANDOM, move || {
                Box::new(RandomSelection::new(random_rng.clone())) as Box<dyn SelectionAlgorithm>
            })
            .register(ALGO_EPSILON_GREEDY, move || {
                Box::new(EpsilonGreedy::new(epsilon, rng.clone())) as Box<dyn SelectionAlgorithm>
            })
    }

    /// Add or replace the factory registered under `name`.
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn SelectionAlgorithm> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn create(&self, name: &str) -> BanditResult<Box<dyn SelectionAlgorithm>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| BanditError::UnknownAlgorithm(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("algorithms", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SelectionArgs, SelectionResult};
    use bandit_core::{MetricsBucket, Variant};

    struct AlwaysLast;

    impl SelectionAlgorithm for AlwaysLast {
        fn name(&self) -> &str {
            "always-last"
        }

        fn select(
            &self,
            variants: &[Variant],
            _args: &SelectionArgs,
        ) -> BanditResult<SelectionResult> {
            let winner = variants.last().cloned().ok_or(BanditError::EmptyVariants)?;
            Ok(SelectionResult {
                winner,
                metrics: MetricsBucket::new(),
                p_value: 0.0,
            })
        }
    }

    #[test]
    fn test_defaults_are_registered() {
        let registry = AlgorithmRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["epsilon-greedy-mab", "random"]);
        assert_eq!(registry.create("random").unwrap().name(), "random");
        assert_eq!(
            registry.create("epsilon-greedy-mab").unwrap().name(),
            "epsilon-greedy-mab"
        );
    }

    #[test]
    fn test_unknown_algorithm() {
        let registry = AlgorithmRegistry::with_defaults();
        let err = registry.create("thompson").err().unwrap();
        assert!(matches!(err, BanditError::UnknownAlgorithm(name) if name == "thompson"));
    }

    #[test]
    fn test_custom_algorithm_can_be_registered() {
        let registry = AlgorithmRegistry::with_defaults().register("always-last", || {
            Box::new(AlwaysLast) as Box<dyn SelectionAlgorithm>
        });
        let algo = registry.create("always-last").unwrap();
        let variants = vec![Variant::new("A"), Variant::new("B")];
        let result = algo.select(&variants, &SelectionArgs::default()).unwrap();
        assert_eq!(result.winner.name, "B");
    }
}
