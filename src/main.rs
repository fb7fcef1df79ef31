mod cli;
mod commands;
mod error;
mod lookup;
mod model;
mod tsv;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(error::exit_code_for(&err));
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Combine(args) => commands::combine::run(args),
        Commands::Rank(args) => commands::rank::run(args),
        Commands::FirstHit(args) => commands::first_hit::run(args),
        Commands::PrCurve(args) => commands::pr_curve::run(args),
        Commands::Top1(args) => commands::reduce::run_top1(args),
        Commands::PrAuc(args) => commands::reduce::run_pr_auc(args),
        Commands::Summarize(args) => commands::summary::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::Status(args) => commands::status::run(args),
        Commands::MotifInput(args) => commands::motif_input::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
