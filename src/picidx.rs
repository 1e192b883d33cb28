mod commands;
mod config;
mod logging;
mod util;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "picidx", about = "Image similarity indexer and duplicate finder")]
struct Cli {
    #[arg(short, long, default_value = "picidx.toml")]
    config: PathBuf,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bucket pool administration.
    Bucket {
        #[command(subcommand)]
        cmd: commands::bucket::BucketCommand,
    },
    /// Scan a directory of cards, extract signatures, build the index.
    Index(commands::index::IndexArgs),
    /// Pass 1: Hilbert-ordered nearest-neighbor duplicate search.
    Dup(commands::dup::DupArgs),
    /// Pass 2: random-BSP cluster pass over the signature set.
    Cluster(commands::cluster::ClusterArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sample count for the color grid's startup accuracy self-check, per
/// `original_source/images/color.c`'s `test_grid()`.
const COLOR_GRID_SELF_CHECK_SAMPLES: u32 = 100_000;

fn run(cli: &Cli) -> anyhow::Result<()> {
    picidx_core::color::self_check(COLOR_GRID_SELF_CHECK_SAMPLES)
        .map_err(|e| anyhow::anyhow!(e))?;
    let cfg = Config::load(&cli.config)?;
    match &cli.command {
        Command::Bucket { cmd } => commands::bucket::run(cmd, &cfg),
        Command::Index(args) => commands::index::run(args, &cfg),
        Command::Dup(args) => commands::dup::run(args, &cfg),
        Command::Cluster(args) => commands::cluster::run(args, &cfg),
    }
}
