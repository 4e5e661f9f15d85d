use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, warn};

use chctime::mutator::Mutator;
use chctime::timestamp::{self, TimeSource};

/// Change files' last-inode-change times (ctime).
///
/// Sets the system clock to the desired ctime, rewrites each file's mode bits
/// to force an inode update, then restores the clock. Requires the privilege
/// to set the host clock.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Use each file's last-access time
    #[arg(short = 'a', conflicts_with = "modification_time")]
    access_time: bool,
    /// Use each file's last-modification time
    #[arg(short = 'm')]
    modification_time: bool,
    /// Use this file's time instead of the current time
    #[arg(short = 'r', value_name = "FILE")]
    reference: Option<PathBuf>,
    /// Use this timestamp instead of the current time:
    /// [[[YYYY:]MM:]DD:]hh:mm:ss[.uuuuuu]
    #[arg(short = 't', value_name = "TIMESTAMP")]
    timestamp: Option<String>,
    /// Report what would change without touching the clock or any file
    #[arg(short = 'n', long)]
    dry_run: bool,
    /// Target files
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let source = if args.access_time {
        TimeSource::AccessTime
    } else if args.modification_time {
        TimeSource::ModificationTime
    } else {
        TimeSource::None
    };

    // resolved once, before any file is touched; conflicts and bad literals
    // die here
    let target = timestamp::resolve(
        args.timestamp.as_deref(),
        source,
        args.reference.as_deref(),
    )
    .context("resolving target timestamp")?;

    let mutator = Mutator::new(source, args.dry_run);

    for file in &args.files {
        if let Err(err) = mutator.apply(file, target) {
            if err.is_fatal() {
                return Err(err.into());
            }

            // per-file failure: report and move on to the next file
            warn!("{err}");
        }
    }

    Ok(())
}
