//! Process execution capability.
//!
//! Every external tool (git, flutter, melos, pod, xcodebuild, fastlane) is run
//! through [`ProcessRunner`] with an explicit working directory. The process
//! working directory of launchpad itself is never changed.

use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::error::StepError;

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 4_000_000;

/// A single command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// `None` blocks until the tool exits.
    pub timeout: Option<Duration>,
}

impl ProcessRequest {
    pub fn new(program: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Display for ProcessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished (or killed) command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }

    /// Raw tool output: stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut buf = String::with_capacity(self.stdout.len() + self.stderr.len());
        buf.push_str(&self.stdout);
        buf.push_str(&self.stderr);
        buf
    }
}

/// Abstraction over running external tools.
///
/// `Err` means the command could not be run at all (e.g. the program is not
/// installed). A non-zero exit is an `Ok` output with `success() == false`.
pub trait ProcessRunner {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput>;
}

/// Runner that spawns real child processes.
#[derive(Debug, Clone)]
pub struct SystemProcessRunner {
    output_limit_bytes: usize,
}

impl SystemProcessRunner {
    pub fn new(output_limit_bytes: usize) -> Self {
        Self { output_limit_bytes }
    }
}

impl Default for SystemProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_LIMIT_BYTES)
    }
}

impl ProcessRunner for SystemProcessRunner {
    #[instrument(
        skip_all,
        fields(program = %request.program, workdir = %request.workdir.display())
    )]
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args).current_dir(&request.workdir);
        let output = run_command(cmd, request.timeout, self.output_limit_bytes)
            .with_context(|| format!("run {request}"))?;
        let truncated = output.stdout_truncated + output.stderr_truncated;
        if truncated > 0 {
            warn!(truncated, "tool output truncated");
        }
        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: output.timed_out,
        })
    }
}

/// True if `err` was caused by a program that does not exist.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|io_err| io_err.kind() == io::ErrorKind::NotFound)
    })
}

/// Run a pipeline tool and classify every failure as a [`StepError`].
///
/// Exit status is the only success signal; output is returned untouched for
/// artifact extraction.
pub fn run_tool<R: ProcessRunner>(
    runner: &R,
    request: &ProcessRequest,
) -> Result<ProcessOutput, StepError> {
    debug!(command = %request, "running tool");
    let output = runner.run(request).map_err(|err| {
        if is_not_found(&err) {
            StepError::Environment {
                tool: request.program.clone(),
                hint: format!("install {} and make sure it is on PATH", request.program),
            }
        } else {
            StepError::Unexpected(format!("{err:#}"))
        }
    })?;
    if output.timed_out {
        return Err(StepError::Timeout {
            command: request.to_string(),
            secs: request.timeout.map_or(0, |t| t.as_secs()),
        });
    }
    if !output.success() {
        return Err(exit_error(request, &output));
    }
    Ok(output)
}

/// Map a non-zero exit to [`StepError::Exit`].
pub fn exit_error(request: &ProcessRequest, output: &ProcessOutput) -> StepError {
    StepError::Exit {
        command: request.to_string(),
        code: output.code,
        stderr: output.stderr.trim().to_string(),
    }
}

/// Raw captured child output.
#[derive(Debug)]
struct CommandOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    stdout_truncated: usize,
    stderr_truncated: usize,
    timed_out: bool,
}

/// Run a command, optionally bounded by `timeout`, and capture stdout/stderr
/// without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
fn run_command(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match timeout {
        None => child.wait().context("wait for command")?,
        Some(timeout) => match child.wait_timeout(timeout).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "command timed out, killing"
                );
                timed_out = true;
                child.kill().context("kill command")?;
                child.wait().context("wait command after kill")?
            }
        },
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
