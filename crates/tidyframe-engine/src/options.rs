/// Evaluation settings for a [`crate::VerbEngine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    /// Evaluate partitions on the engine thread pool (no effect without the `parallel` feature).
    pub parallel: bool,
    /// Fewer groups than this are always evaluated sequentially.
    pub parallel_min_groups: usize,
}

impl EngineOptions {
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub(crate) fn parallel_for(&self, groups: usize) -> bool {
        self.parallel && groups >= self.parallel_min_groups
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            parallel: cfg!(feature = "parallel"),
            parallel_min_groups: 64,
        }
    }
}
