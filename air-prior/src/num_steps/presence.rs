use candle_core::{Result, Tensor, D};

/// Distribution over the number of steps taken by a chain of "continue" coins
///
/// pr(k) = x(0) * ... * x(k-1) * (1 - x(k))   for k < N
/// pr(N) = x(0) * ... * x(N-1)
///
/// The running product is unrolled over the (short) step axis instead of
/// going through exp(cumsum(log x)), so a zero continue probability zeroes
/// the later entries and their gradients instead of producing NaN.
///
/// * `continue_probs` - `[..., N]` P(continue at step i | reached step i)
///
/// # Returns
/// `[..., N + 1]` categorical distribution over the number of steps
pub fn presence_prob_table(continue_probs: &Tensor) -> Result<Tensor> {
    if continue_probs.rank() == 0 {
        candle_core::bail!("continue probabilities need at least one axis");
    }

    let last = continue_probs.rank() - 1;
    let n_steps = continue_probs.dim(D::Minus1)?;

    let mut dims = continue_probs.dims().to_vec();
    dims[last] = 1;
    let mut reached = Tensor::ones(
        dims,
        continue_probs.dtype(),
        continue_probs.device(),
    )?;

    let mut table = Vec::with_capacity(n_steps + 1);
    for k in 0..n_steps {
        let x_k = continue_probs.narrow(last, k, 1)?;
        table.push(reached.mul(&x_k.affine(-1., 1.)?)?);
        reached = reached.mul(&x_k)?;
    }
    table.push(reached);

    Tensor::cat(&table, last)
}
