//! Blocking execution of the external engine with a timeout.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// One command line to hand to the external engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Append a bare argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append `--name value`.
    pub fn flag(mut self, name: &str, value: impl ToString) -> Self {
        self.args.push(format!("--{name}"));
        self.args.push(value.to_string());
        self
    }

    /// Append `--name <path>`.
    pub fn path_flag(self, name: &str, path: &Path) -> Self {
        let value = path.to_string_lossy().into_owned();
        self.flag(name, value)
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// First argument, which is the engine subcommand for stage invocations.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Human-readable command line for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output of a process that exited on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Exit code; `None` when terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("program not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {:.1}s", .elapsed.as_secs_f64())]
    Timeout { elapsed: Duration },

    #[error("failed waiting for process: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs an invocation to completion or until the timeout expires.
///
/// Implementations must terminate the process on timeout before returning.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation, timeout: Duration) -> Result<RunOutput, RunError>;
}

/// [`CommandRunner`] backed by `std::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    poll_interval: Duration,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

// Pipes are drained on their own threads so a chatty process never blocks
// on a full pipe while we poll for exit.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Kill and reap, ignoring a child that already exited.
fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation, timeout: Duration) -> Result<RunOutput, RunError> {
        debug!("Running: {}", invocation.command_line());

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                RunError::NotFound(invocation.program.clone())
            } else {
                RunError::Spawn {
                    program: invocation.program.to_string_lossy().into_owned(),
                    source,
                }
            }
        })?;
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    terminate(&mut child);
                    return Err(RunError::Io(e));
                }
            }
            if start.elapsed() >= timeout {
                warn!(
                    "Terminating {} after {:.1}s",
                    invocation.command_line(),
                    timeout.as_secs_f64()
                );
                terminate(&mut child);
                // Reader threads are left detached: a grandchild may still
                // hold the pipes open.
                return Err(RunError::Timeout {
                    elapsed: start.elapsed(),
                });
            }
            thread::sleep(self.poll_interval.min(timeout.saturating_sub(start.elapsed())));
        };

        Ok(RunOutput {
            status: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}
