pub mod num_steps;

use clap::{Parser, Subcommand};

pub use num_steps::{EstimatorType, GeometricArgs, KlArgs, PresenceArgs};

#[derive(Parser)]
#[command(name = "air-prior")]
#[command(about = "Number-of-steps priors and KL terms for Attend-Infer-Repeat models")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Truncated geometric prior over the number of steps
    Geometric(GeometricArgs),
    /// Number-of-steps distribution from continue probabilities
    Presence(PresenceArgs),
    /// KL divergence between the presence table and a geometric prior
    Kl(KlArgs),
}
