use candle_core::{Result, Tensor};

/// Prior over the number of steps {0, 1, ..., N}.
pub trait NumStepsPrior {
    /// Maximum number of steps N
    fn max_steps(&self) -> usize;

    /// Categorical probabilities over the number of steps.
    ///
    /// # Returns
    /// Probability vector, shape (N + 1,), summing to one
    fn probs(&self) -> Result<Tensor>;
}
