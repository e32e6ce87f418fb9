//! Command-line argument handling.
//!
//! Flags override configuration-file keys; the merged result goes through
//! the same validation as a pure file-based setup, so there is exactly one
//! place where paths and bounds are checked.

use std::path::PathBuf;

use clap::builder::PathBufValueParser;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use snapsend_core::size::parse_gib_argument;
use snapsend_core::{BackupConfig, BackupError, ConfigFile, ErrorKind};

/// Console verbosity selected by `-v`/`-q`.
#[derive(Debug, Clone, Copy)]
pub struct Verbosity {
    pub quiet: bool,
    pub verbose: u8,
}

/// Everything `main` needs from the command line.
#[derive(Debug)]
pub struct Invocation {
    pub config: BackupConfig,
    pub verbosity: Verbosity,
}

/// Builds the clap command for the `snapsend` binary.
pub fn command() -> Command {
    Command::new("snapsend")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Snapshot-based btrfs backups over send/receive")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(PathBufValueParser::new())
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("source")
                .long("source")
                .value_name("PATH")
                .value_parser(PathBufValueParser::new())
                .help("Subvolume to back up"),
        )
        .arg(
            Arg::new("snapshot-dir")
                .long("snapshot-dir")
                .value_name("PATH")
                .value_parser(PathBufValueParser::new())
                .help("Directory holding source-side snapshots [default: <source>/.snapshots]"),
        )
        .arg(
            Arg::new("destination")
                .long("destination")
                .value_name("PATH")
                .value_parser(PathBufValueParser::new())
                .help("Mount point of the destination filesystem"),
        )
        .arg(
            Arg::new("lock-file")
                .long("lock-file")
                .value_name("PATH")
                .value_parser(PathBufValueParser::new())
                .help("Single-instance lock file"),
        )
        .arg(
            Arg::new("min-free-gb")
                .long("min-free-gb")
                .value_name("SIZE")
                .help("Safety buffer kept free on the destination (bare numbers are GiB; suffixes like 512MiB work too)"),
        )
        .arg(
            Arg::new("retention-days")
                .long("retention-days")
                .value_name("DAYS")
                .value_parser(value_parser!(u32))
                .help("Prune snapshots older than this many days (0 disables)"),
        )
        .arg(
            Arg::new("keep-minimum")
                .long("keep-minimum")
                .value_name("COUNT")
                .value_parser(value_parser!(usize))
                .help("Never prune a side below this many snapshots"),
        )
        .arg(
            Arg::new("progress")
                .long("progress")
                .action(ArgAction::SetTrue)
                .overrides_with("no-progress")
                .help("Render a progress line during the transfer"),
        )
        .arg(
            Arg::new("no-progress")
                .long("no-progress")
                .action(ArgAction::SetTrue)
                .overrides_with("progress")
                .help("Suppress the progress line"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Only report errors"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log detail (repeatable)"),
        )
}

/// Merges the config file (when given) with flag overrides and validates.
///
/// # Errors
///
/// [`ErrorKind::InvalidInput`] for unreadable or invalid configuration and
/// for malformed `--min-free-gb` values.
pub fn resolve(matches: &ArgMatches) -> Result<Invocation, BackupError> {
    let mut file = match matches.get_one::<PathBuf>("config") {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };

    if let Some(source) = matches.get_one::<PathBuf>("source") {
        file.source_volume = Some(source.clone());
    }
    if let Some(dir) = matches.get_one::<PathBuf>("snapshot-dir") {
        file.snapshot_dir = Some(dir.clone());
    }
    if let Some(destination) = matches.get_one::<PathBuf>("destination") {
        file.destination_mount = Some(destination.clone());
    }
    if let Some(lock) = matches.get_one::<PathBuf>("lock-file") {
        file.lock_file = Some(lock.clone());
    }
    if let Some(buffer) = matches.get_one::<String>("min-free-gb") {
        let bytes = parse_gib_argument(buffer).map_err(|error| {
            BackupError::new(
                ErrorKind::InvalidInput,
                format!("--min-free-gb: {error}"),
            )
            .with_source(error)
        })?;
        file.min_free_bytes = Some(bytes);
    }
    if let Some(days) = matches.get_one::<u32>("retention-days") {
        file.retention_days = Some(*days);
    }
    if let Some(keep) = matches.get_one::<usize>("keep-minimum") {
        file.keep_minimum = Some(*keep);
    }
    if matches.get_flag("progress") {
        file.show_progress = Some(true);
    }
    if matches.get_flag("no-progress") {
        file.show_progress = Some(false);
    }

    Ok(Invocation {
        config: file.into_config()?,
        verbosity: Verbosity {
            quiet: matches.get_flag("quiet"),
            verbose: matches.get_count("verbose"),
        },
    })
}
