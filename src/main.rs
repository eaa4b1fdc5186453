//! imgshrink - shrink a raw disk image to its minimum size.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use imgshrink::config::Config;
use imgshrink::report::ConsoleReporter;
use imgshrink::tools::HostTools;
use imgshrink::{logging, preflight, Shrinker};

#[derive(Parser)]
#[command(name = "imgshrink")]
#[command(version, about = "Shrink a raw disk image to the minimum size its filesystem needs")]
struct Cli {
    /// Raw disk image with a single ext2/3/4 partition
    image: PathBuf,
}

fn main() -> Result<()> {
    // Usage errors are validation failures like any other: exit 1, not clap's 2.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            e.print()?;
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };
    logging::initialize_tracing();

    let base_dir = std::env::current_dir().context("Cannot determine working directory")?;
    let config = Config::load(&base_dir);
    for (tool, program) in config.overrides() {
        tracing::debug!("using {} for {}", program, tool);
    }

    preflight::run_preflight_or_fail(&config)?;

    println!("Shrinking {}\n", cli.image.display());
    let mut shrinker = Shrinker::open(HostTools::new(config), ConsoleReporter::new(), &cli.image)?;
    shrinker.run()?;

    Ok(())
}
