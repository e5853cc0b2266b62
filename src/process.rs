//! Child process handle: one externally started tool server.
//!
//! The handle owns the process exclusively. Its stdin and buffered stdout
//! live together behind one lock so that a request line and its reply line
//! are always exchanged as a unit; the `Child` itself sits behind a second
//! lock so liveness checks and shutdown never wait on a blocked read.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::codec::{read_line_limited, MAX_LINE_BYTES};
use crate::error::{AssistantError, AssistantResult};

/// How often `shutdown` polls for exit while waiting out the grace period.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Program and arguments used to launch a tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn new(
        program: impl Into<PathBuf>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a whitespace-separated command line into program and arguments.
    ///
    /// Returns `None` for a blank command line. No shell quoting is applied.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts))
    }
}

impl std::fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// The request/reply channel of a child: its stdin and buffered stdout.
pub struct Channel {
    name: String,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Channel {
    /// Append `\n` to `text`, write it and flush immediately.
    pub fn write_line(&mut self, text: &str) -> AssistantResult<()> {
        let io_err = |source: std::io::Error| AssistantError::Io {
            name: self.name.clone(),
            source,
        };
        self.stdin.write_all(text.as_bytes()).map_err(io_err)?;
        if !text.ends_with('\n') {
            self.stdin.write_all(b"\n").map_err(io_err)?;
        }
        self.stdin.flush().map_err(io_err)
    }

    /// Block until one line arrives. Returns `""` once the stream is closed.
    pub fn read_line(&mut self) -> AssistantResult<String> {
        let mut line = String::new();
        read_line_limited(&mut self.stdout, &mut line, MAX_LINE_BYTES).map_err(|source| {
            AssistantError::Io {
                name: self.name.clone(),
                source,
            }
        })?;
        Ok(line)
    }
}

/// Exclusive owner of one running tool-server process.
pub struct ChildHandle {
    name: String,
    pid: u32,
    started_at: DateTime<Utc>,
    process: Mutex<Child>,
    channel: Mutex<Channel>,
}

impl std::fmt::Debug for ChildHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildHandle")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl ChildHandle {
    /// Launch `spec` with stdin, stdout and stderr all piped.
    ///
    /// Stderr is drained on a background thread into `tracing` so the child
    /// never stalls on a full pipe.
    pub fn spawn(name: &str, spec: &LaunchSpec) -> AssistantResult<Self> {
        let spawn_err = |reason: String| AssistantError::Spawn {
            name: name.to_owned(),
            reason,
        };

        let program = which::which(&spec.program).map_err(|e| {
            spawn_err(format!("{} not found: {e}", spec.program.display()))
        })?;

        let mut child = Command::new(&program)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_err(format!("{spec}: {e}")))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(spawn_err("failed to capture stdio".to_owned()));
        };

        if let Some(stderr) = child.stderr.take() {
            let server = name.to_owned();
            let drain = std::thread::Builder::new()
                .name(format!("{name}-stderr"))
                .spawn(move || {
                    for line in BufReader::new(stderr).lines() {
                        match line {
                            Ok(line) => debug!(server = %server, "{line}"),
                            Err(_) => break,
                        }
                    }
                });
            if let Err(e) = drain {
                warn!(server = name, error = %e, "failed to start stderr drain thread");
            }
        }

        let pid = child.id();
        info!(server = name, pid, command = %spec, "started tool server");

        Ok(Self {
            name: name.to_owned(),
            pid,
            started_at: Utc::now(),
            process: Mutex::new(child),
            channel: Mutex::new(Channel {
                name: name.to_owned(),
                stdin,
                stdout: BufReader::new(stdout),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn pid(&self) -> u32 {
        self.pid
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Lock the request/reply channel for one exchange.
    ///
    /// Holding the guard keeps every other caller off this child's streams.
    pub fn channel(&self) -> MutexGuard<'_, Channel> {
        self.channel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Write one line to the child. See [`Channel::write_line`].
    pub fn write_line(&self, text: &str) -> AssistantResult<()> {
        self.channel().write_line(text)
    }

    /// Read one line from the child. See [`Channel::read_line`].
    pub fn read_line(&self) -> AssistantResult<String> {
        self.channel().read_line()
    }

    /// Non-blocking liveness poll.
    pub fn is_alive(&self) -> bool {
        matches!(self.process().try_wait(), Ok(None))
    }

    /// Ask the child to terminate, wait up to `grace`, then kill it.
    ///
    /// Never fails: every error is logged and the child is reaped if at all
    /// possible.
    pub fn shutdown(&self, grace: Duration) {
        let mut child = self.process();

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(server = %self.name, %status, "tool server already exited");
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(server = %self.name, error = %e, "failed to poll tool server"),
        }

        request_termination(&mut child, &self.name);

        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!(server = %self.name, %status, "stopped tool server");
                    return;
                }
                Ok(None) if start.elapsed() >= grace => break,
                Ok(None) => std::thread::sleep(EXIT_POLL_INTERVAL),
                Err(e) => {
                    warn!(server = %self.name, error = %e, "failed to poll tool server");
                    break;
                }
            }
        }

        warn!(server = %self.name, ?grace, "tool server did not exit in time, killing");
        if let Err(e) = child.kill() {
            error!(server = %self.name, error = %e, "failed to kill tool server");
        }
        match child.wait() {
            Ok(status) => info!(server = %self.name, %status, "force killed tool server"),
            Err(e) => error!(server = %self.name, error = %e, "failed to reap tool server"),
        }
    }

    fn process(&self) -> MutexGuard<'_, Child> {
        self.process
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child, name: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match i32::try_from(child.id()) {
        Ok(pid) => {
            debug!(server = name, pid, "sending SIGTERM");
            if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
                warn!(server = name, pid, error = %e, "SIGTERM failed");
            }
        }
        Err(e) => warn!(server = name, error = %e, "pid out of range for SIGTERM"),
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child, name: &str) {
    if let Err(e) = child.kill() {
        warn!(server = name, error = %e, "terminate failed");
    }
}
