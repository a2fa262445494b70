//! Interactive shell over a FAT volume image.
//!
//! Usage:
//!   fatsh volume.img                      # open, formatting a blank image with defaults
//!   fatsh volume.img --cluster-size 512   # geometry used only when formatting
//!   fatsh -vv volume.img                  # debug logging on stderr

mod logger;
mod shell;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use fatstore::{FatFs, FileStorage, FormatOptions, DEFAULT_CLUSTER_COUNT, DEFAULT_CLUSTER_SIZE};
use log::info;

use crate::shell::{Flow, Shell, HELP_TEXT};

#[derive(Parser)]
#[command(name = "fatsh")]
#[command(about = "Interactive shell over a single-file FAT volume")]
struct Cli {
    /// Volume image; created and formatted when missing or blank
    image: PathBuf,

    /// Cluster count used when formatting a blank image
    #[arg(long, default_value_t = DEFAULT_CLUSTER_COUNT)]
    cluster_count: u32,

    /// Cluster size in bytes used when formatting a blank image
    #[arg(long, default_value_t = DEFAULT_CLUSTER_SIZE)]
    cluster_size: u32,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(logger::level_for(cli.verbose)).context("installing logger")?;

    let storage = FileStorage::open(&cli.image)
        .with_context(|| format!("opening {}", cli.image.display()))?;
    let options = FormatOptions::new()
        .cluster_count(cli.cluster_count)
        .cluster_size(cli.cluster_size);
    let mut fs = FatFs::open_or_format(storage, options)
        .with_context(|| format!("mounting {}", cli.image.display()))?;
    info!("session on {}", cli.image.display());

    let mut shell = Shell::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    stdout.write_all(HELP_TEXT.as_bytes())?;
    write!(stdout, "{}", shell.prompt())?;
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        if shell.run_line(&mut fs, &line, &mut stdout)? == Flow::Exit {
            break;
        }
        write!(stdout, "{}", shell.prompt())?;
        stdout.flush()?;
    }

    info!("leaving shell in {}", shell.cwd());
    fs.close().context("closing volume")?;
    Ok(())
}
