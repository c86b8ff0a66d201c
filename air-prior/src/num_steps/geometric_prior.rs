use candle_core::{DType, Device, Result, Tensor};
use candle_nn::VarBuilder;

use super::traits::NumStepsPrior;
use crate::candle_safe_ops::log_sigmoid;

/// Keep the learnable success probability inside [sigmoid(-12), sigmoid(12)]
const MAX_ABS_LOGIT: f64 = 12.0;

/// Truncated geometric distribution over {0, 1, ..., n}
///
/// pr(k) = p * (1 - p)^k    for k < n
/// pr(n) = (1 - p)^n        (tail mass folded into the last bucket)
///
/// Computed on CPU in f64, then converted to `dtype` and moved to `device`.
///
/// * `success_prob` - probability of stopping at each step, in [0, 1]
/// * `n_steps` - truncation point
///
pub fn geometric_prior(
    success_prob: f64,
    n_steps: usize,
    dtype: DType,
    device: &Device,
) -> Result<Tensor> {
    if !success_prob.is_finite() || !(0.0..=1.0).contains(&success_prob) {
        candle_core::bail!("success probability must be in [0, 1], got {}", success_prob);
    }

    let fail_prob = 1.0 - success_prob;
    let mut probs: Vec<f64> = (0..n_steps)
        .map(|k| success_prob * fail_prob.powi(k as i32))
        .collect();
    probs.push(fail_prob.powi(n_steps as i32));

    // Metal doesn't support F64, so convert on CPU first
    Tensor::from_vec(probs, n_steps + 1, &Device::Cpu)?
        .to_dtype(dtype)?
        .to_device(device)
}

/// Differentiable truncated geometric prior parameterized by logit(p)
///
/// log pr(k) = log p + k * log(1 - p)   for k < n
/// log pr(n) = n * log(1 - p)
///
/// with log p = log_sigmoid(logit) and log(1 - p) = log_sigmoid(-logit),
/// so neither the values nor the gradients blow up near p = 0 or p = 1.
///
/// * `logit` - scalar (or single element) tensor
/// * `n_steps` - truncation point
///
pub fn geometric_prior_from_logit(logit: &Tensor, n_steps: usize) -> Result<Tensor> {
    let dtype = logit.dtype();
    let device = logit.device();
    let logit = logit.flatten_all()?;

    let log_success = log_sigmoid(&logit)?;
    let log_fail = log_sigmoid(&logit.neg()?)?;

    let steps = Tensor::arange(0u32, n_steps as u32 + 1, device)?.to_dtype(dtype)?;
    let mut stops = vec![1f32; n_steps];
    stops.push(0.);
    let stops = Tensor::from_vec(stops, n_steps + 1, device)?.to_dtype(dtype)?;

    steps
        .broadcast_mul(&log_fail)?
        .add(&stops.broadcast_mul(&log_success)?)?
        .exp()
}

/// Fixed (non-learnable) truncated geometric prior
pub struct FixedGeometricPrior {
    success_prob: f64,
    max_steps: usize,
    probs: Tensor,
}

impl FixedGeometricPrior {
    /// Create a new fixed prior.
    ///
    /// # Arguments
    /// * `success_prob` - stopping probability p
    /// * `max_steps` - maximum number of steps N (prior has N+1 entries)
    pub fn new(
        success_prob: f64,
        max_steps: usize,
        dtype: DType,
        device: &Device,
    ) -> Result<Self> {
        let probs = geometric_prior(success_prob, max_steps, dtype, device)?;
        Ok(Self {
            success_prob,
            max_steps,
            probs,
        })
    }

    pub fn success_prob(&self) -> f64 {
        self.success_prob
    }
}

impl NumStepsPrior for FixedGeometricPrior {
    fn max_steps(&self) -> usize {
        self.max_steps
    }

    fn probs(&self) -> Result<Tensor> {
        Ok(self.probs.clone())
    }
}

/// Learnable truncated geometric prior
///
/// The stopping probability is a trainable parameter stored as its logit,
/// clamped to ±MAX_ABS_LOGIT before use.
pub struct LearnableGeometricPrior {
    logit_success: Tensor,
    max_steps: usize,
}

impl LearnableGeometricPrior {
    /// Create a new learnable prior.
    ///
    /// # Arguments
    /// * `vb` - VarBuilder for creating trainable parameters
    /// * `init_success_prob` - initial p, strictly inside (0, 1)
    /// * `max_steps` - maximum number of steps N
    pub fn new(vb: VarBuilder, init_success_prob: f64, max_steps: usize) -> Result<Self> {
        if !(init_success_prob > 0.0 && init_success_prob < 1.0) {
            candle_core::bail!(
                "initial success probability must be in (0, 1), got {}",
                init_success_prob
            );
        }
        let init_logit = (init_success_prob / (1.0 - init_success_prob)).ln();
        let logit_success =
            vb.get_with_hints((), "logit_success", candle_nn::Init::Const(init_logit))?;
        Ok(Self {
            logit_success,
            max_steps,
        })
    }

    fn clamped_logit(&self) -> Result<Tensor> {
        self.logit_success.clamp(-MAX_ABS_LOGIT, MAX_ABS_LOGIT)
    }

    /// Current stopping probability p = sigmoid(logit)
    pub fn success_prob(&self) -> Result<f32> {
        // Move to CPU for dtype conversion (Metal doesn't support F64)
        candle_nn::ops::sigmoid(&self.clamped_logit()?)?
            .to_device(&Device::Cpu)?
            .to_dtype(DType::F32)?
            .to_scalar()
    }

    pub fn device(&self) -> &Device {
        self.logit_success.device()
    }

    pub fn dtype(&self) -> DType {
        self.logit_success.dtype()
    }
}

impl NumStepsPrior for LearnableGeometricPrior {
    fn max_steps(&self) -> usize {
        self.max_steps
    }

    fn probs(&self) -> Result<Tensor> {
        geometric_prior_from_logit(&self.clamped_logit()?, self.max_steps)
    }
}
