use air_prior::cli::{num_steps, Cli, Commands};
use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Geometric(args) => {
            num_steps::run_geometric(args)?;
        }
        Commands::Presence(args) => {
            num_steps::run_presence(args)?;
        }
        Commands::Kl(args) => {
            num_steps::run_kl(args)?;
        }
    }

    Ok(())
}
