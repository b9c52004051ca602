// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands and their flags:
//
//   train             — fine-tune with crash-resume
//   count-tokens      — size a dataset with the model tokenizer
//   latest-checkpoint — show where a run would resume from
//
// Hyperparameters are not flags: they live in the JSON
// config passed with --config-path.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::{driver::DEFAULT_PROGRESS_LOG, train_use_case::TrainRequest};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_OUTPUT_DIR:  &str = "./model_output";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune the Q&A model, resuming from the newest checkpoint
    Train(TrainArgs),

    /// Count question + context tokens in a dataset
    CountTokens(CountTokensArgs),

    /// Print the checkpoint a training run would resume from
    LatestCheckpoint(LatestCheckpointArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Dataset directory (train.json[l], validation/test) or a single file
    #[arg(long)]
    pub data_path: PathBuf,

    /// Directory with tokenizer.json and optionally model_config.json + weights
    #[arg(long)]
    pub model_path: PathBuf,

    /// JSON file with training hyperparameters
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: PathBuf,

    /// Where checkpoints and the final model are written
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Append-only progress log
    #[arg(long, default_value = DEFAULT_PROGRESS_LOG)]
    pub progress_log: PathBuf,
}

/// The application layer never sees clap types
impl From<TrainArgs> for TrainRequest {
    fn from(a: TrainArgs) -> Self {
        TrainRequest {
            data_path:    a.data_path,
            model_path:   a.model_path,
            config_path:  a.config_path,
            output_dir:   a.output_dir,
            progress_log: a.progress_log,
        }
    }
}

#[derive(Args, Debug)]
pub struct CountTokensArgs {
    #[arg(long)]
    pub data_path: PathBuf,

    #[arg(long)]
    pub model_path: PathBuf,
}

#[derive(Args, Debug)]
pub struct LatestCheckpointArgs {
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,
}
