use candle_core::{DType, Device, Result, Tensor, D};
use rand::Rng;
use rand_distr::{weighted::WeightedIndex, Distribution};

/// Gather `vector[indices[i]]` for every index, sharing one vector
///
/// * `vector` - `[K]`, e.g. a prior over the number of steps
/// * `indices` - integer tensor of any shape (u8, u32 or i64)
///
/// # Returns
/// Tensor with the shape of `indices`
pub fn sample_from_1d_tensor(vector: &Tensor, indices: &Tensor) -> Result<Tensor> {
    if vector.rank() != 1 {
        candle_core::bail!("expected a 1D tensor, got shape {:?}", vector.dims());
    }
    vector
        .index_select(&indices.flatten_all()?, 0)?
        .reshape(indices.dims())
}

/// Gather `matrix[i, indices[i]]` row by row
///
/// Leading axes of `matrix` are flattened into rows, so `[..., K]` works
/// as long as `indices` holds one index per row (`[...]` or `[..., 1]`).
///
/// * `matrix` - `[..., K]` one distribution per example
/// * `indices` - integer tensor with one entry per row
///
/// # Returns
/// Tensor with the shape of `indices`
pub fn sample_from_tensor(matrix: &Tensor, indices: &Tensor) -> Result<Tensor> {
    let ncol = matrix.dim(D::Minus1)?;
    if ncol == 0 {
        candle_core::bail!("cannot sample from an empty last axis");
    }
    let nrow = matrix.elem_count() / ncol;

    let idx = indices.flatten_all()?;
    if idx.dim(0)? != nrow {
        candle_core::bail!(
            "need one index per row: {} rows, {} indices",
            nrow,
            idx.dim(0)?
        );
    }

    matrix
        .reshape((nrow, ncol))?
        .gather(&idx.unsqueeze(1)?.contiguous()?, 1)?
        .reshape(indices.dims())
}

/// Single-sample Monte Carlo estimate of KL(p || q)
///
/// kl(i) = log p(i, s(i)) - log q(i, s(i)),    s(i) ~ p(i, .)
///
/// Rank-1 `p` or `q` is shared across the batch. Sampling an index with
/// zero probability under either table gives an infinite estimate.
///
/// * `p` - `[K]` or `[..., K]`
/// * `q` - `[K]` or `[..., K]`
/// * `samples` - realized indices, one per example
///
pub fn tabular_kl_sampling(p: &Tensor, q: &Tensor, samples: &Tensor) -> Result<Tensor> {
    let gather = |probs: &Tensor| -> Result<Tensor> {
        if probs.rank() == 1 {
            sample_from_1d_tensor(probs, samples)
        } else {
            sample_from_tensor(probs, samples)
        }
    };

    gather(p)?.log()?.sub(&gather(q)?.log()?)
}

/// Draw the number of steps for every example
///
/// * `probs` - `[..., K]` categorical probabilities (need not be normalized)
/// * `rng` - random number generator
///
/// # Returns
/// `u32` tensor of shape `[...]` on the same device as `probs`
pub fn sample_num_steps<R: Rng + ?Sized>(probs: &Tensor, rng: &mut R) -> Result<Tensor> {
    let ncol = probs.dim(D::Minus1)?;
    if ncol == 0 {
        candle_core::bail!("cannot sample from an empty last axis");
    }
    let nrow = probs.elem_count() / ncol;

    // Move to CPU for dtype conversion (Metal doesn't support F64)
    let rows: Vec<Vec<f32>> = probs
        .detach()
        .to_device(&Device::Cpu)?
        .to_dtype(DType::F32)?
        .reshape((nrow, ncol))?
        .to_vec2()?;

    let mut draws = Vec::with_capacity(nrow);
    for row in rows.iter() {
        let dist = WeightedIndex::new(row).map_err(|e| {
            candle_core::Error::Msg(format!("invalid step table {:?}: {}", row, e))
        })?;
        draws.push(dist.sample(rng) as u32);
    }

    let mut dims = probs.dims().to_vec();
    dims.pop();
    Tensor::from_vec(draws, dims, probs.device())
}
