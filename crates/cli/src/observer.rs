//! Terminal observer: the engine's callback surface rendered for humans.
//!
//! Informational lines go to stdout, warnings and errors to stderr. The
//! progress line lives on stderr and is rewritten in place; any other
//! output first closes the line so messages never land mid-line.

use std::io::{IsTerminal, Write};
use std::sync::Mutex;

use snapsend_core::{Observer, ProgressUpdate};

use crate::progress::render_progress;

/// [`Observer`] implementation for interactive and scripted console use.
pub struct ConsoleObserver {
    render_progress: bool,
    line_open: Mutex<bool>,
}

impl ConsoleObserver {
    /// Creates an observer; progress rendering additionally requires
    /// stderr to be a terminal, so cron logs stay clean.
    #[must_use]
    pub fn new(show_progress: bool) -> Self {
        Self {
            render_progress: show_progress && std::io::stderr().is_terminal(),
            line_open: Mutex::new(false),
        }
    }

    /// Terminates a dangling progress line, if one is on screen.
    pub fn finish(&self) {
        let mut line_open = self.line_open.lock().unwrap_or_else(|e| e.into_inner());
        if *line_open {
            eprintln!();
            *line_open = false;
        }
    }
}

impl Observer for ConsoleObserver {
    fn on_info(&self, message: &str) {
        self.finish();
        println!("{message}");
    }

    fn on_warn(&self, message: &str) {
        self.finish();
        eprintln!("warning: {message}");
    }

    fn on_error(&self, message: &str) {
        self.finish();
        eprintln!("error: {message}");
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        if !self.render_progress {
            return;
        }
        let mut line_open = self.line_open.lock().unwrap_or_else(|e| e.into_inner());
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[K{}", render_progress(update));
        let _ = stderr.flush();
        *line_open = true;
    }
}

impl Drop for ConsoleObserver {
    fn drop(&mut self) {
        self.finish();
    }
}
