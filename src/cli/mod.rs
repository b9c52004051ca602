// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses command line arguments with `clap` and routes each
// subcommand to its use case in Layer 2. Results are printed
// here; failures bubble up to main, which maps them to an
// exit code.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, CountTokensArgs, LatestCheckpointArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "qa-finetune",
    version = "0.1.0",
    about = "Fine-tune an extractive Q&A model with crash-resumable training."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)            => run_train(args),
            Commands::CountTokens(args)      => run_count_tokens(args),
            Commands::LatestCheckpoint(args) => run_latest_checkpoint(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let output_dir = args.output_dir.clone();
    let report = TrainUseCase::new(args.into()).execute()?;

    println!(
        "Training complete after {} attempt(s): step {}, train loss {:.4}",
        report.attempts, report.outcome.global_step, report.outcome.train_loss,
    );
    if let Some(resumed) = &report.resumed_from {
        println!("Resumed from {}", resumed.path.display());
    }
    println!("Model saved to {}", output_dir.display());
    Ok(())
}

fn run_count_tokens(args: CountTokensArgs) -> Result<()> {
    use crate::application::count_tokens::CountTokensUseCase;

    let count = CountTokensUseCase::new(args.data_path, args.model_path).execute()?;
    println!("Examples: {}", count.examples);
    println!("Total tokens: {}", count.tokens);
    Ok(())
}

fn run_latest_checkpoint(args: LatestCheckpointArgs) -> Result<()> {
    use crate::infra::checkpoint::discover_latest_checkpoint;

    match discover_latest_checkpoint(&args.output_dir) {
        Some(c) => println!("{} (step {})", c.path.display(), c.step),
        None    => println!("none"),
    }
    Ok(())
}
