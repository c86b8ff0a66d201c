use candle_core::{Result, Tensor, D};
use log::debug;

use super::presence::presence_prob_table;
use super::sampling::tabular_kl_sampling;
use super::tabular_kl::tabular_kl;
use super::traits::NumStepsPrior;

/// How KL(posterior || prior) over the number of steps is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KLEstimator {
    /// sum over the full table
    #[default]
    Tabular,
    /// log-ratio at the realized number of steps
    Sampling,
}

/// Configuration for the number-of-steps KL term.
#[derive(Debug, Clone)]
pub struct NumStepsKLConfig {
    /// Smoothing mass added to every category of the tabular KL
    pub epsilon: f64,
    pub estimator: KLEstimator,
}

impl Default for NumStepsKLConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.,
            estimator: KLEstimator::Tabular,
        }
    }
}

impl NumStepsKLConfig {
    pub fn new(epsilon: f64, estimator: KLEstimator) -> Self {
        Self { epsilon, estimator }
    }
}

/// KL divergence between the posterior and prior over the number of steps
///
/// The posterior is the presence table induced by `continue_probs`.
///
/// # Arguments
/// * `continue_probs` - `[..., N]` per-step continue probabilities
/// * `prior` - prior over {0, ..., N}
/// * `samples` - realized number of steps, one per example (sampling only)
/// * `config` - estimator and numerical offset
///
/// # Returns
/// Per-example KL, shape `[...]`
pub fn num_steps_kl<P>(
    continue_probs: &Tensor,
    prior: &P,
    samples: Option<&Tensor>,
    config: &NumStepsKLConfig,
) -> Result<Tensor>
where
    P: NumStepsPrior,
{
    let n_steps = continue_probs.dim(D::Minus1)?;
    if prior.max_steps() != n_steps {
        candle_core::bail!(
            "prior covers {} steps but the posterior has {}",
            prior.max_steps(),
            n_steps
        );
    }

    let posterior = presence_prob_table(continue_probs)?;
    let prior_probs = prior.probs()?.to_dtype(posterior.dtype())?;

    match config.estimator {
        KLEstimator::Tabular => {
            debug!("tabular KL over {} categories", n_steps + 1);
            tabular_kl(&posterior, &prior_probs, config.epsilon)?.sum(D::Minus1)
        }
        KLEstimator::Sampling => {
            let Some(samples) = samples else {
                candle_core::bail!("sampling KL needs the realized number of steps");
            };
            let mut dims = posterior.dims().to_vec();
            dims.pop();
            tabular_kl_sampling(&posterior, &prior_probs, samples)?.reshape(dims)
        }
    }
}
