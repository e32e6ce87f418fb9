//! The `snapsend` binary: argument handling, logging setup, signal
//! installation, and the closing report around one engine run.

mod arguments;
mod observer;
mod preflight;
mod progress;
mod signals;

use snapsend_core::size::format_bytes;
use snapsend_core::{BackupError, CancelToken, ExitCode};
use snapsend_engine::{BackupKind, run_backup};
use tracing_subscriber::EnvFilter;

use crate::arguments::Verbosity;
use crate::observer::ConsoleObserver;

fn main() -> std::process::ExitCode {
    let matches = arguments::command().get_matches();

    let invocation = match arguments::resolve(&matches) {
        Ok(invocation) => invocation,
        Err(error) => {
            report_error(&error);
            return ExitCode::Failure.into();
        }
    };

    init_tracing(invocation.verbosity);

    let cancel = CancelToken::new();
    signals::install(cancel.clone());

    if let Err(error) = preflight::check_dependencies() {
        report_error(&error);
        return ExitCode::Failure.into();
    }

    let observer = ConsoleObserver::new(invocation.config.show_progress);
    match run_backup(&invocation.config, &observer, &cancel) {
        Ok(summary) => {
            observer.finish();
            let kind = match &summary.kind {
                BackupKind::Full => "full".to_string(),
                BackupKind::Incremental { parent } => format!("incremental against {parent}"),
            };
            if !invocation.verbosity.quiet {
                println!(
                    "backup complete: {} ({kind}, {} estimated, pruned {}/{})",
                    summary.snapshot_name,
                    format_bytes(summary.estimated_bytes),
                    summary.pruned_source,
                    summary.pruned_destination,
                );
            }
            ExitCode::Ok.into()
        }
        Err(error) => {
            observer.finish();
            report_error(&error);
            ExitCode::Failure.into()
        }
    }
}

fn init_tracing(verbosity: Verbosity) {
    let level = if verbosity.quiet {
        "error"
    } else {
        match verbosity.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("snapsend={level},snapsend_engine={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report_error(error: &BackupError) {
    eprintln!("error: {error}");
    if let Some(stderr) = error.context().stderr()
        && !stderr.is_empty()
    {
        eprintln!("  tool output: {stderr}");
    }
    for suppressed in error.suppressed() {
        eprintln!("  while cleaning up: {suppressed}");
    }
}
