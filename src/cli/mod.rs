// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`   — fits and exports one model, or all of them
//   2. `score`   — applies an exported model to a new CSV file
//   3. `profile` — prints column summaries for a dataset
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use anyhow::{bail, Result};
use clap::Parser;
use commands::{Commands, ProfileArgs, ScoreArgs, TrainArgs};

use crate::application::train_use_case::PipelineConfig;
use crate::domain::fleet::Domain;

/// Top-level parser for the `fleet-analytics` binary.
#[derive(Parser, Debug)]
#[command(
    name = "fleet-analytics",
    version = "0.1.0",
    about = "Train fleet maintenance, CO2 and logistics models from CSV files and export them as ONNX."
)]
pub struct Cli {
    /// The subcommand to run (train, score or profile)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Score(args)   => run_score(args),
            Commands::Profile(args) => run_profile(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = PipelineConfig::from(&args);
    tracing::info!(
        "Training {:?} (seed {}, {} trees, reference {})",
        args.target,
        config.seed,
        config.n_estimators,
        config.reference_time
    );

    let mut use_case = TrainUseCase::new(config);
    match args.target.domain() {
        Some(domain) => {
            if let Some(input) = args.input {
                use_case = use_case.with_input(input);
            }
            use_case.execute(domain)?;
        }
        None => {
            if args.input.is_some() {
                bail!("--input names one dataset; pick a single domain instead of 'all'");
            }
            let written = use_case.execute_all()?;
            println!("\nTrained {} of {} models.", written.len(), Domain::TRAINABLE.len());
        }
    }
    Ok(())
}

fn run_score(args: ScoreArgs) -> Result<()> {
    use crate::application::score_use_case::ScoreUseCase;

    let use_case = ScoreUseCase::new(PipelineConfig::from(&args));
    use_case.execute(args.domain, &args.input, &args.output)?;
    Ok(())
}

fn run_profile(args: ProfileArgs) -> Result<()> {
    use crate::application::profile_use_case::ProfileUseCase;

    let use_case = ProfileUseCase::new(PipelineConfig::from(&args));
    use_case.execute(args.domain, args.input, &args.columns)?;
    Ok(())
}
