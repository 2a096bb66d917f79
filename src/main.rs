//! Housecast CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use housecast::cli::{run_predict, run_serve, run_train, Cli, Commands};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match &cli.command {
        Commands::Train(args) => run_train(args, &cli.tracking_root),
        Commands::Predict(args) => run_predict(args, &cli.tracking_root),
        Commands::Serve(args) => run_serve(args, &cli.tracking_root),
    }
}
