//! Allow-listed external tool execution.
//!
//! The engine only ever runs tools from a fixed allow-list, resolved at the
//! fixed path `/usr/bin/<tool>`, with arguments restricted to a conservative
//! character set. An argument that the filter would alter is rejected
//! outright rather than silently rewritten.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use snapsend_core::{BackupError, BackupResult, CancelToken, ErrorKind};
use tracing::debug;

/// Tools the engine is permitted to execute.
pub const ALLOWED_TOOLS: [&str; 8] = [
    "btrfs",
    "mount",
    "mountpoint",
    "find",
    "pv",
    "du",
    "lsblk",
    "blkid",
];

/// Fixed directory from which every tool is resolved.
pub const TOOL_DIR: &str = "/usr/bin";

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_EXCERPT_LIMIT: usize = 2048;

/// A single external tool invocation, built up argument by argument.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    tool: String,
    args: Vec<String>,
}

/// Captured result of a completed tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    /// The tool's exit code; signal deaths are reported as `128 + signal`.
    pub exit_code: i32,
    /// Everything the tool wrote to stdout.
    pub stdout: Vec<u8>,
    /// Everything the tool wrote to stderr.
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    /// Whether the tool exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout as text, with invalid UTF-8 replaced.
    #[must_use]
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// A bounded tail of stderr, suitable for error context.
    #[must_use]
    pub fn stderr_excerpt(&self) -> String {
        stderr_excerpt(&self.stderr)
    }
}

impl ToolInvocation {
    /// Starts building an invocation of the named tool.
    #[must_use]
    pub fn new(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a path argument.
    #[must_use]
    pub fn path_arg(self, path: impl AsRef<Path>) -> Self {
        self.arg(path.as_ref().to_string_lossy().into_owned())
    }

    /// The rendered command line, for diagnostics only.
    #[must_use]
    pub fn argv_line(&self) -> String {
        let mut line = format!("{TOOL_DIR}/{}", self.tool);
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Spawns the tool with the given stdio wiring.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::InvalidInput`] when the tool is not allow-listed or an
    ///   argument fails the character filter.
    /// - [`ErrorKind::DependencyMissing`] when `/usr/bin/<tool>` does not
    ///   exist.
    /// - [`ErrorKind::InvalidInput`] when the OS refuses execution with a
    ///   permission error.
    pub fn spawn(&self, stdin: Stdio, stdout: Stdio, stderr: Stdio) -> BackupResult<Child> {
        let program = self.resolve_program()?;
        self.check_arguments()?;

        debug!(command = %self.argv_line(), "spawning external tool");
        Command::new(&program)
            .args(&self.args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|error| {
                let kind = match error.kind() {
                    std::io::ErrorKind::NotFound => ErrorKind::DependencyMissing,
                    std::io::ErrorKind::PermissionDenied => ErrorKind::InvalidInput,
                    _ => ErrorKind::CommandFailed,
                };
                BackupError::new(kind, format!("failed to spawn {}: {error}", self.tool))
                    .with_argv(self.argv_line())
                    .with_source(error)
            })
    }

    /// Runs the tool to completion, capturing stdout and stderr, and
    /// reports a non-zero exit as [`ErrorKind::CommandFailed`].
    ///
    /// # Errors
    ///
    /// Everything [`ToolInvocation::spawn`] can raise, plus
    /// [`ErrorKind::CommandFailed`] for a non-zero exit and
    /// [`ErrorKind::Timeout`] when the deadline expires or the cancel token
    /// trips while waiting.
    pub fn run(&self, deadline: Duration, cancel: &CancelToken) -> BackupResult<ToolOutput> {
        let output = self.run_unchecked(deadline, cancel)?;
        if output.success() {
            return Ok(output);
        }
        Err(BackupError::new(
            ErrorKind::CommandFailed,
            format!("{} exited with status {}", self.tool, output.exit_code),
        )
        .with_argv(self.argv_line())
        .with_exit_code(output.exit_code)
        .with_stderr(output.stderr_excerpt()))
    }

    /// Runs the tool to completion without judging its exit status.
    ///
    /// # Errors
    ///
    /// Spawn failures, deadline expiry, and cancellation, as for
    /// [`ToolInvocation::run`].
    pub fn run_unchecked(
        &self,
        deadline: Duration,
        cancel: &CancelToken,
    ) -> BackupResult<ToolOutput> {
        let mut child = self.spawn(Stdio::null(), Stdio::piped(), Stdio::piped())?;
        let stdout_drain = child.stdout.take().map(spawn_drain);
        let stderr_drain = child.stderr.take().map(spawn_drain);

        let waited = wait_with_deadline(&mut child, deadline, cancel, &self.tool);
        let stdout = join_drain(stdout_drain);
        let stderr = join_drain(stderr_drain);

        match waited {
            Ok(status) => Ok(ToolOutput {
                exit_code: exit_code_of(status),
                stdout,
                stderr,
            }),
            Err(error) => Err(error
                .with_argv(self.argv_line())
                .with_stderr(stderr_excerpt(&stderr))),
        }
    }

    fn resolve_program(&self) -> BackupResult<PathBuf> {
        if !ALLOWED_TOOLS.contains(&self.tool.as_str()) {
            return Err(BackupError::new(
                ErrorKind::InvalidInput,
                format!("tool '{}' is not on the allow-list", self.tool),
            ));
        }
        let program = Path::new(TOOL_DIR).join(&self.tool);
        if !program.exists() {
            return Err(BackupError::new(
                ErrorKind::DependencyMissing,
                format!("required tool '{}' is not installed", self.tool),
            )
            .with_path(&program)
            .with_suggestion(format!("install the package providing {}", self.tool)));
        }
        Ok(program)
    }

    fn check_arguments(&self) -> BackupResult<()> {
        for arg in &self.args {
            if !argument_is_clean(arg) {
                return Err(BackupError::new(
                    ErrorKind::InvalidInput,
                    format!("argument '{arg}' contains characters outside the permitted set"),
                )
                .with_argv(self.argv_line()));
            }
        }
        Ok(())
    }
}

/// Whether an argument survives the `[A-Za-z0-9_/\-=.:\s]` filter unchanged.
fn argument_is_clean(arg: &str) -> bool {
    arg.chars().all(|c| {
        c.is_ascii_alphanumeric()
            || c.is_ascii_whitespace()
            || matches!(c, '_' | '/' | '-' | '=' | '.' | ':')
    })
}

/// Waits for a child with a deadline, observing the cancel token.
///
/// On expiry or cancellation the child is killed and reaped before the
/// error is returned, so callers never leak a zombie.
///
/// # Errors
///
/// [`ErrorKind::Timeout`] in both the expiry and the cancellation case; the
/// message distinguishes them.
pub fn wait_with_deadline(
    child: &mut Child,
    deadline: Duration,
    cancel: &CancelToken,
    what: &str,
) -> BackupResult<ExitStatus> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(|error| {
            BackupError::new(ErrorKind::CommandFailed, format!("cannot wait for {what}: {error}"))
                .with_source(error)
        })? {
            return Ok(status);
        }
        if cancel.is_cancelled() {
            kill_and_reap(child);
            return Err(interrupted(what));
        }
        if started.elapsed() >= deadline {
            kill_and_reap(child);
            return Err(BackupError::new(
                ErrorKind::Timeout,
                format!("{what} did not finish within {}s", deadline.as_secs()),
            ));
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

/// Kills a child and waits for it, ignoring errors on both steps.
pub(crate) fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// The error reported when the cancel token trips during a blocking wait.
pub(crate) fn interrupted(what: &str) -> BackupError {
    BackupError::new(
        ErrorKind::Timeout,
        format!("{what} interrupted by cancellation request"),
    )
}

/// Sleeps in short slices so a tripped cancel token cuts the pause short.
///
/// # Errors
///
/// The interruption error when the token trips mid-pause.
pub(crate) fn cancellable_pause(
    duration: Duration,
    cancel: &CancelToken,
    what: &str,
) -> BackupResult<()> {
    let started = Instant::now();
    while started.elapsed() < duration {
        if cancel.is_cancelled() {
            return Err(interrupted(what));
        }
        thread::sleep(WAIT_POLL_INTERVAL.min(duration - started.elapsed()));
    }
    Ok(())
}

/// Maps an exit status to a code, reporting signal deaths as `128 + signal`.
pub(crate) fn exit_code_of(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(-1)
    }
}

/// Bounded tail of captured stderr; failures usually report last.
pub(crate) fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_EXCERPT_LIMIT {
        return trimmed.to_string();
    }
    let tail_start = trimmed.len() - STDERR_EXCERPT_LIMIT;
    let boundary = trimmed
        .char_indices()
        .map(|(index, _)| index)
        .find(|&index| index >= tail_start)
        .unwrap_or(tail_start);
    format!("...{}", &trimmed[boundary..])
}

/// Reads a child's pipe to the end on a dedicated thread.
pub(crate) fn spawn_drain(mut reader: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer);
        buffer
    })
}

/// Collects a drain thread's buffer; a panicked drain yields empty output.
pub(crate) fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
