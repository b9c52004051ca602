#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod errors;
mod ml;
mod infra;

#[cfg(test)]
mod testing;

use clap::Parser;
use cli::Cli;
use errors::FinetuneError;

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("qa_finetune=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    if let Err(err) = cli.run() {
        tracing::error!("{err:#}");
        eprintln!("Error: {err:#}");
        let code = err
            .downcast_ref::<FinetuneError>()
            .map_or(1, FinetuneError::exit_code);
        std::process::exit(code);
    }
}
