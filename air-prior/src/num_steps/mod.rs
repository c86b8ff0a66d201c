//! Priors, posteriors and KL terms over the number of inference steps.
//!
//! In Attend-Infer-Repeat style models each example takes a learned,
//! variable number of steps. The encoder emits one "continue" probability
//! per step; the induced stopping-time distribution is regularized towards
//! a truncated geometric prior.
//!
//! # Pipeline
//!
//! - `geometric_prior` (or a [`NumStepsPrior`]) gives the reference table
//! - `presence_prob_table` turns continue probabilities into the posterior
//! - `tabular_kl` / `tabular_kl_sampling` compare the two
//!
//! # Example
//!
//! ```ignore
//! use air_prior::num_steps::{num_steps_kl, FixedGeometricPrior, NumStepsKLConfig};
//!
//! let prior = FixedGeometricPrior::new(0.5, 3, DType::F32, &device)?;
//! let continue_probs = candle_nn::ops::sigmoid(&logits_n3)?;
//!
//! let kl_n = num_steps_kl(&continue_probs, &prior, None, &NumStepsKLConfig::default())?;
//! let loss = (neg_llik_n + kl_n)?.mean_all()?;
//! // optimizer.backward_step(&loss)?;
//! ```

mod geometric_prior;
mod num_steps_kl;
mod presence;
mod sampling;
mod tabular_kl;
mod traits;

pub use geometric_prior::{
    geometric_prior, geometric_prior_from_logit, FixedGeometricPrior, LearnableGeometricPrior,
};
pub use num_steps_kl::{num_steps_kl, KLEstimator, NumStepsKLConfig};
pub use presence::presence_prob_table;
pub use sampling::{
    sample_from_1d_tensor, sample_from_tensor, sample_num_steps, tabular_kl_sampling,
};
pub use tabular_kl::tabular_kl;
pub use traits::NumStepsPrior;
