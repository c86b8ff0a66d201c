use candle_core::{Result, Tensor};

/// log(y) on the support of `x`, zero elsewhere
///
/// log(y(i)) if x(i) > 0 else log(1) = 0
///
/// The mask is taken from a detached copy of `x`, and `y` is swapped
/// for ones before the log, so the gradient through masked entries is
/// exactly zero instead of `0 * inf`.
///
/// * `x` - support tensor (e.g., probabilities that may hit zero)
/// * `y` - argument of the log, same shape as `x`
///
pub fn masked_log(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    let support = x.detach().gt(0.0)?;
    support.where_cond(y, &y.ones_like()?)?.log()
}

/// x * log(y) with the convention 0 * log(y) = 0 for any y
///
/// * `x` - weights (probabilities)
/// * `y` - argument of the log, same shape as `x`
///
pub fn xlogy(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    x.mul(&masked_log(x, y)?)
}

/// log(1 + exp(x)) without overflow
///
/// softplus(x) = max(x, 0) + log(1 + exp(-|x|))
///
pub fn softplus(x: &Tensor) -> Result<Tensor> {
    let tail = (x.abs()?.neg()?.exp()? + 1.0)?.log()?;
    x.relu()?.add(&tail)
}

/// log sigmoid(x) = -softplus(-x)
pub fn log_sigmoid(x: &Tensor) -> Result<Tensor> {
    softplus(&x.neg()?)?.neg()
}
