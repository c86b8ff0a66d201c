use candle_core::{Result, Tensor, D};

use crate::candle_safe_ops::{masked_log, xlogy};

/// Elementwise KL divergence between two categorical tables
///
/// eps = 0:
///   kl(i,k) = p(i,k) * [ log p(i,k) - log q(i,k) ],  with 0 * log(0) = 0
///
/// eps > 0, both tables are smoothed into proper distributions first:
///   p'(i,k) = (p(i,k) + eps) / sum_k (p(i,k) + eps)
///   q'(i,k) = (q(i,k) + eps) / sum_k (q(i,k) + eps)
///   kl(i,k) = p'(i,k) * [ log p'(i,k) - log q'(i,k) ]
///
/// Sum over the last axis for KL(p || q). Either way the sum is a true KL
/// divergence (non-negative), and `p == q` gives exactly zero. With
/// `eps = 0` zero-probability entries of `p` contribute zero value and zero
/// gradient; with `eps > 0` entries where `q = 0` stay finite.
///
/// * `p` - posterior probabilities `[..., K]`
/// * `q` - prior probabilities, broadcastable against `p` (e.g. `[K]`)
/// * `eps` - non-negative smoothing mass added to every category
///
pub fn tabular_kl(p: &Tensor, q: &Tensor, eps: f64) -> Result<Tensor> {
    if !eps.is_finite() || eps < 0.0 {
        candle_core::bail!("KL offset must be finite and non-negative, got {}", eps);
    }

    let shape = p.shape().broadcast_shape_binary_op(q.shape(), "tabular_kl")?;
    let p = p.broadcast_as(shape.clone())?;
    let q = q.broadcast_as(shape)?;

    if eps == 0.0 {
        let log_p = masked_log(&p, &p)?;
        let log_q = masked_log(&p, &q)?;
        return p.mul(&log_p.sub(&log_q)?);
    }

    let p = smooth(&p, eps)?;
    let q = smooth(&q, eps)?;
    xlogy(&p, &p)?.sub(&xlogy(&p, &q)?)
}

/// (x + eps) renormalized over the last axis
fn smooth(x: &Tensor, eps: f64) -> Result<Tensor> {
    let x = (x + eps)?;
    x.broadcast_div(&x.sum_keepdim(D::Minus1)?)
}
