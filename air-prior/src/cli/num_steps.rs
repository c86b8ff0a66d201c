use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use clap::{Args, ValueEnum};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::num_steps::{
    geometric_prior, num_steps_kl, presence_prob_table, sample_num_steps, FixedGeometricPrior,
    KLEstimator, NumStepsKLConfig, NumStepsPrior,
};

//
// CLI types
//

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EstimatorType {
    /// Sum over the full table
    Tabular,
    /// Average of log-ratios at sampled numbers of steps
    Sampling,
}

impl From<EstimatorType> for KLEstimator {
    fn from(value: EstimatorType) -> Self {
        match value {
            EstimatorType::Tabular => KLEstimator::Tabular,
            EstimatorType::Sampling => KLEstimator::Sampling,
        }
    }
}

#[derive(Args, Debug)]
pub struct GeometricArgs {
    #[arg(short = 'p', long, help = "Probability of stopping at each step")]
    pub success_prob: f64,

    #[arg(short = 'n', long, help = "Maximum number of steps")]
    pub max_steps: usize,
}

#[derive(Args, Debug)]
pub struct PresenceArgs {
    #[arg(
        short = 'x',
        long,
        value_delimiter = ',',
        required = true,
        help = "Comma-separated continue probabilities, one per step"
    )]
    pub continue_probs: Vec<f32>,
}

#[derive(Args, Debug)]
pub struct KlArgs {
    #[arg(
        short = 'x',
        long,
        value_delimiter = ',',
        required = true,
        help = "Comma-separated continue probabilities, one per step"
    )]
    pub continue_probs: Vec<f32>,

    #[arg(short = 'p', long, help = "Stopping probability of the geometric prior")]
    pub success_prob: f64,

    #[arg(
        long,
        default_value = "0",
        help = "Smoothing mass added to every category of the tabular KL"
    )]
    pub epsilon: f64,

    #[arg(short, long, default_value = "tabular")]
    pub estimator: EstimatorType,

    #[arg(long, default_value = "1000", help = "Number of sampled step counts")]
    pub num_samples: usize,

    #[arg(long, default_value = "42")]
    pub seed: u64,

    #[arg(long)]
    pub gpu: bool,
}

//
// Reports
//

#[derive(Debug, Serialize)]
pub struct TableReport {
    pub probs: Vec<f32>,
}

#[derive(Debug, Serialize)]
pub struct KlReport {
    pub posterior: Vec<f32>,
    pub prior: Vec<f32>,
    pub kl: f32,
}

fn check_probs(probs: &[f32]) -> Result<()> {
    if let Some(bad) = probs.iter().find(|x| !(0.0..=1.0).contains(*x)) {
        anyhow::bail!("continue probabilities must be in [0, 1], got {}", bad);
    }
    Ok(())
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

pub fn geometric_report(args: &GeometricArgs) -> Result<TableReport> {
    let probs = geometric_prior(args.success_prob, args.max_steps, DType::F32, &Device::Cpu)?;
    Ok(TableReport {
        probs: probs.to_vec1()?,
    })
}

pub fn presence_report(args: &PresenceArgs) -> Result<TableReport> {
    check_probs(&args.continue_probs)?;
    let x = Tensor::new(args.continue_probs.as_slice(), &Device::Cpu)?;
    Ok(TableReport {
        probs: presence_prob_table(&x)?.to_vec1()?,
    })
}

pub fn kl_report(args: &KlArgs) -> Result<KlReport> {
    check_probs(&args.continue_probs)?;

    let device = if args.gpu {
        Device::cuda_if_available(0)?
    } else {
        Device::Cpu
    };
    info!("Using device {:?}", device);

    let n_steps = args.continue_probs.len();
    let prior = FixedGeometricPrior::new(args.success_prob, n_steps, DType::F32, &device)?;
    let config = NumStepsKLConfig::new(args.epsilon, args.estimator.into());

    let x = Tensor::new(args.continue_probs.as_slice(), &device)?;
    let posterior = presence_prob_table(&x)?;

    let kl = match config.estimator {
        KLEstimator::Tabular => num_steps_kl(&x, &prior, None, &config)?,
        KLEstimator::Sampling => {
            if args.num_samples == 0 {
                anyhow::bail!("need at least one sample");
            }
            info!("Drawing {} step counts (seed {})", args.num_samples, args.seed);
            let mut rng = StdRng::seed_from_u64(args.seed);
            let x_batch = x.unsqueeze(0)?.repeat((args.num_samples, 1))?;
            let samples = sample_num_steps(&presence_prob_table(&x_batch)?, &mut rng)?;
            num_steps_kl(&x_batch, &prior, Some(&samples), &config)?.mean_all()?
        }
    };

    Ok(KlReport {
        posterior: posterior.to_device(&Device::Cpu)?.to_vec1()?,
        prior: prior.probs()?.to_device(&Device::Cpu)?.to_vec1()?,
        kl: kl.to_device(&Device::Cpu)?.to_scalar()?,
    })
}

pub fn run_geometric(args: &GeometricArgs) -> Result<()> {
    info!(
        "Geometric prior with p = {} over {} steps",
        args.success_prob, args.max_steps
    );
    print_json(&geometric_report(args)?)
}

pub fn run_presence(args: &PresenceArgs) -> Result<()> {
    info!("Presence table over {} steps", args.continue_probs.len());
    print_json(&presence_report(args)?)
}

pub fn run_kl(args: &KlArgs) -> Result<()> {
    info!("KL estimator: {:?}", args.estimator);
    let report = kl_report(args)?;
    info!("KL = {:.6}", report.kl);
    print_json(&report)
}
