use air_prior::num_steps::*;
use approx::assert_abs_diff_eq;
use candle_core::{DType, Device, Result, Tensor, Var};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N_STRESS_ITER: usize = 100;

fn random_table(rng: &mut StdRng, nrow: usize, ncol: usize) -> Vec<f32> {
    let mut table: Vec<f32> = (0..(nrow * ncol))
        .map(|_| rng.random_range(1e-3f32..1.0))
        .collect();
    for row in table.chunks_mut(ncol) {
        let total: f32 = row.iter().sum();
        row.iter_mut().for_each(|x| *x /= total);
    }
    table
}

fn all_finite(x: &Tensor) -> Result<bool> {
    let x: Vec<f32> = x.flatten_all()?.to_vec1()?;
    Ok(x.iter().all(|x| x.is_finite()))
}

#[test]
fn geometric_prior_sums_to_one() -> Result<()> {
    for &p in [0.005, 0.25, 0.5, 0.99].iter() {
        for n in 0..6 {
            let prior: Vec<f32> = geometric_prior(p, n, DType::F32, &Device::Cpu)?.to_vec1()?;
            assert_eq!(prior.len(), n + 1);
            assert!(prior.iter().all(|&x| x > 0.));
            assert_abs_diff_eq!(prior.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
            for (k, &pr) in prior.iter().take(n).enumerate() {
                let expected = (p * (1. - p).powi(k as i32)) as f32;
                assert_abs_diff_eq!(pr, expected, epsilon = 1e-6);
            }
            assert_abs_diff_eq!(prior[n], (1. - p).powi(n as i32) as f32, epsilon = 1e-6);
        }
    }
    Ok(())
}

#[test]
fn tabular_kl_same() -> Result<()> {
    let p = Tensor::new(&[[0.25f32; 4]], &Device::Cpu)?;
    let kl = tabular_kl(&p, &p, 0.)?;
    assert_eq!(kl.dims(), &[1, 4]);
    assert_eq!(kl.sum_all()?.to_scalar::<f32>()?, 0.);
    Ok(())
}

#[test]
fn tabular_kl_zero_in_p() -> Result<()> {
    let p = Tensor::new(&[[0f32, 0.25, 0.25, 0.5]], &Device::Cpu)?;
    let q = Tensor::new(&[[0.25f32; 4]], &Device::Cpu)?;
    let kl = tabular_kl(&p, &q, 0.)?.sum_all()?.to_scalar::<f32>()?;
    assert!(kl > 0.);
    Ok(())
}

#[test]
fn tabular_kl_near_degenerate() -> Result<()> {
    let p = Var::new(&[[0f32, 1., 0., 0.]], &Device::Cpu)?;
    let q = Var::new(&[[1. - 1e-7f32, 1e-7, 0., 0.]], &Device::Cpu)?;

    for eps in [0., 0.1] {
        let kl = tabular_kl(p.as_tensor(), q.as_tensor(), eps)?;
        assert!(all_finite(&kl)?);
        assert!(kl.sum_all()?.to_scalar::<f32>()? > 0.);

        let grads = kl.sum_all()?.backward()?;
        assert!(all_finite(grads.get(p.as_tensor()).unwrap())?);
        assert!(all_finite(grads.get(q.as_tensor()).unwrap())?);
    }
    Ok(())
}

#[test]
fn tabular_kl_always_positive_on_random() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..N_STRESS_ITER {
        let p = Tensor::from_vec(random_table(&mut rng, 1, 4), (1, 4), &Device::Cpu)?;
        let q = Tensor::from_vec(random_table(&mut rng, 1, 4), (1, 4), &Device::Cpu)?;
        let kl = tabular_kl(&p, &q, 0.)?.sum_all()?.to_scalar::<f32>()?;
        assert!(kl > 0., "kl = {}", kl);
    }
    Ok(())
}

#[test]
fn presence_table_shapes() -> Result<()> {
    let dev = Device::Cpu;
    let x = Tensor::zeros(3, DType::F32, &dev)?;
    assert_eq!(presence_prob_table(&x)?.dims(), &[4]);

    let x = Tensor::zeros((7, 3), DType::F32, &dev)?;
    assert_eq!(presence_prob_table(&x)?.dims(), &[7, 4]);

    let x = Tensor::zeros((7, 11, 3), DType::F32, &dev)?;
    assert_eq!(presence_prob_table(&x)?.dims(), &[7, 11, 4]);
    Ok(())
}

#[test]
fn presence_table_obvious() -> Result<()> {
    let cases: [([f32; 3], [f32; 4]); 4] = [
        ([0., 0., 0.], [1., 0., 0., 0.]),
        ([1., 0., 0.], [0., 1., 0., 0.]),
        ([1., 1., 0.], [0., 0., 1., 0.]),
        ([1., 1., 1.], [0., 0., 0., 1.]),
    ];
    for (x, expected) in cases.iter() {
        let x = Tensor::new(x, &Device::Cpu)?;
        let probs: Vec<f32> = presence_prob_table(&x)?.to_vec1()?;
        assert_eq!(probs, expected.to_vec());
    }
    Ok(())
}

#[test]
fn presence_table_geometric() -> Result<()> {
    let x = Tensor::new(&[0.5f32, 0.5, 0.5], &Device::Cpu)?;
    let probs: Vec<f32> = presence_prob_table(&x)?.to_vec1()?;
    assert_eq!(probs, vec![0.5, 0.25, 0.125, 0.125]);
    Ok(())
}

#[test]
fn free_kl_stress() -> Result<()> {
    let dev = Device::Cpu;
    let prior = geometric_prior(0.005, 3, DType::F32, &dev)?;
    let mut rng = StdRng::seed_from_u64(2);

    for _ in 0..N_STRESS_ITER {
        let x = Tensor::from_vec(random_table(&mut rng, 1, 4), (1, 4), &dev)?;
        let x = Var::from_tensor(&x)?;
        let kl = tabular_kl(x.as_tensor(), &prior, 0.)?;

        assert!(kl.sum_all()?.to_scalar::<f32>()? > 0.);
        assert!(all_finite(&kl)?);

        let grads = kl.sum_all()?.backward()?;
        assert!(all_finite(grads.get(x.as_tensor()).unwrap())?);
    }
    Ok(())
}

#[test]
fn posterior_kl_stress() -> Result<()> {
    let dev = Device::Cpu;
    let prior = geometric_prior(0.005, 3, DType::F32, &dev)?;
    let mut rng = StdRng::seed_from_u64(3);

    for _ in 0..N_STRESS_ITER {
        let x: Vec<f32> = (0..3).map(|_| rng.random::<f32>()).collect();
        let x = Var::from_tensor(&Tensor::from_vec(x, (1, 3), &dev)?)?;

        let posterior = presence_prob_table(x.as_tensor())?;
        let kl = tabular_kl(&posterior, &prior, 0.)?;

        assert!(kl.sum_all()?.to_scalar::<f32>()? > 0., "{}", kl);
        assert!(all_finite(&kl)?);

        let grads = kl.sum_all()?.backward()?;
        assert!(all_finite(grads.get(x.as_tensor()).unwrap())?);
    }
    Ok(())
}

#[test]
fn posterior_kl_with_zero_continue_probs() -> Result<()> {
    let dev = Device::Cpu;
    let prior = geometric_prior(0.005, 3, DType::F32, &dev)?;
    let x = Var::new(&[[0.5f32, 0., 0.]], &dev)?;

    let posterior = presence_prob_table(x.as_tensor())?;
    let probs: Vec<Vec<f32>> = posterior.to_vec2()?;
    assert_eq!(probs, vec![vec![0.5, 0.5, 0., 0.]]);

    let grads = posterior.sum_all()?.backward()?;
    assert!(all_finite(grads.get(x.as_tensor()).unwrap())?);

    let kl = tabular_kl(&posterior, &prior, 0.)?;
    assert!(kl.sum_all()?.to_scalar::<f32>()? > 0.);
    assert!(all_finite(&kl)?);

    let grads = kl.sum_all()?.backward()?;
    assert!(all_finite(grads.get(x.as_tensor()).unwrap())?);
    Ok(())
}

#[test]
fn sample_from_list() -> Result<()> {
    let dev = Device::Cpu;
    let prior = geometric_prior(0.5, 3, DType::F32, &dev)?;
    let prior_vec: Vec<f32> = prior.to_vec1()?;

    let mut rng = StdRng::seed_from_u64(4);
    let samples: Vec<u32> = (0..10).map(|_| rng.random_range(0..4u32)).collect();
    let idx = Tensor::from_vec(samples.clone(), (10, 1), &dev)?;

    let res: Vec<f32> = sample_from_1d_tensor(&prior, &idx)?.flatten_all()?.to_vec1()?;
    for (r, &s) in res.iter().zip(samples.iter()) {
        assert_eq!(*r, prior_vec[s as usize]);
    }
    Ok(())
}

#[test]
fn sample_from_matrix() -> Result<()> {
    let dev = Device::Cpu;
    let mut rng = StdRng::seed_from_u64(5);

    let samples: Vec<u32> = (0..10).map(|_| rng.random_range(0..4u32)).collect();
    let matrix: Vec<f32> = (0..40).map(|_| rng.random::<f32>()).collect();

    let idx = Tensor::from_vec(samples.clone(), (10, 1), &dev)?;
    let mat = Tensor::from_vec(matrix.clone(), (10, 4), &dev)?;

    let res: Vec<f32> = sample_from_tensor(&mat, &idx)?.flatten_all()?.to_vec1()?;
    for (i, (r, &s)) in res.iter().zip(samples.iter()).enumerate() {
        assert_eq!(*r, matrix[i * 4 + s as usize]);
    }
    Ok(())
}

#[test]
fn sampling_kl_stress() -> Result<()> {
    let dev = Device::Cpu;
    let batch_size = 1024;
    let prior = geometric_prior(0.5, 3, DType::F32, &dev)?;
    let mut rng = StdRng::seed_from_u64(6);

    for _ in 0..N_STRESS_ITER {
        let p = random_table(&mut rng, batch_size, 4);
        let p = Tensor::from_vec(p, (batch_size, 4), &dev)?;
        let samples = sample_num_steps(&p, &mut rng)?;

        let kl = tabular_kl_sampling(&p, &prior, &samples)?;
        assert_eq!(kl.dims(), &[batch_size]);
        assert!(all_finite(&kl)?);
        assert!(kl.sum_all()?.to_scalar::<f32>()? > 0.);
    }
    Ok(())
}

#[test]
fn sampling_kl_matches_tabular_on_average() -> Result<()> {
    let dev = Device::Cpu;
    let batch_size = 20_000;
    let prior = FixedGeometricPrior::new(0.5, 3, DType::F32, &dev)?;
    let x = Tensor::new(&[0.9f32, 0.6, 0.3], &dev)?
        .unsqueeze(0)?
        .repeat((batch_size, 1))?;

    let tabular: Vec<f32> =
        num_steps_kl(&x, &prior, None, &NumStepsKLConfig::default())?.to_vec1()?;

    let mut rng = StdRng::seed_from_u64(8);
    let samples = sample_num_steps(&presence_prob_table(&x)?, &mut rng)?;
    let config = NumStepsKLConfig::new(0., KLEstimator::Sampling);
    let sampled = num_steps_kl(&x, &prior, Some(&samples), &config)?
        .mean_all()?
        .to_scalar::<f32>()?;

    assert_abs_diff_eq!(sampled, tabular[0], epsilon = 0.05);
    Ok(())
}

#[test]
fn learnable_prior_gradients() -> Result<()> {
    let dev = Device::Cpu;
    let varmap = candle_nn::VarMap::new();
    let vb = candle_nn::VarBuilder::from_varmap(&varmap, DType::F32, &dev);
    let prior = LearnableGeometricPrior::new(vb, 0.3, 3)?;

    let x = Var::new(&[[0.7f32, 0.2, 0.], [0.99, 0.99, 0.99]], &dev)?;
    let kl = num_steps_kl(x.as_tensor(), &prior, None, &NumStepsKLConfig::default())?;
    assert_eq!(kl.dims(), &[2]);

    let grads = kl.sum_all()?.backward()?;
    assert!(all_finite(grads.get(x.as_tensor()).unwrap())?);
    for var in varmap.all_vars() {
        assert!(all_finite(grads.get(var.as_tensor()).unwrap())?);
    }
    Ok(())
}
