//! External command execution with timeouts.
//!
//! Collectors never spawn processes directly; they go through a
//! [`CommandRunner`], which has two separate entry points:
//!
//! - [`CommandRunner::run_argv`] runs an exact program with an argument list,
//!   no shell involved.
//! - [`CommandRunner::run_shell`] hands a pre-formed line to `/bin/sh -c`, for
//!   the rare probe that needs a pipe or redirection.
//!
//! The caller always picks one explicitly. Nothing inspects the command text to
//! decide whether a shell is needed.

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::debug;

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exit status POSIX shells use for "command not found".
const SHELL_NOT_FOUND: i32 = 127;

/// Captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code, or -1 when the child was terminated by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Why a command did not produce a successful [`CommandResult`].
#[derive(Debug, thiserror::Error)]
pub enum CommandFailure {
    #[error("executable not found")]
    NotFound,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The command ran to completion but reported failure. The captured
    /// output is kept because many diagnostic tools use exit codes for
    /// non-error states.
    #[error("exited with code {code}")]
    NonZeroExit { code: i32, result: CommandResult },

    #[error("spawn failed: {0}")]
    Spawn(#[source] io::Error),
}

/// Runs external programs on behalf of collectors.
pub trait CommandRunner {
    /// Run `program` with `args` directly (no shell interpretation).
    fn run_argv(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandResult, CommandFailure>;

    /// Run a complete shell line through `/bin/sh -c`.
    fn run_shell(&self, line: &str, timeout: Duration) -> Result<CommandResult, CommandFailure>;
}

/// Render an argument vector for log lines.
pub fn describe_argv(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

/// [`CommandRunner`] that spawns real processes.
///
/// Children inherit the environment with `LC_ALL=C` forced, so numbers and
/// dates come out in the format the parsers expect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run_argv(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandResult, CommandFailure> {
        let mut command = Command::new(program);
        command.args(args);
        execute(command, &describe_argv(program, args), timeout)
    }

    fn run_shell(&self, line: &str, timeout: Duration) -> Result<CommandResult, CommandFailure> {
        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(line);
        match execute(command, line, timeout) {
            Err(CommandFailure::NonZeroExit { code, .. }) if code == SHELL_NOT_FOUND => {
                Err(CommandFailure::NotFound)
            }
            other => other,
        }
    }
}

fn execute(
    mut command: Command,
    label: &str,
    timeout: Duration,
) -> Result<CommandResult, CommandFailure> {
    command
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start = Instant::now();
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{label}: not found");
            return Err(CommandFailure::NotFound);
        }
        Err(e) => {
            debug!("{label}: spawn failed: {e}");
            return Err(CommandFailure::Spawn(e));
        }
    };

    // Drain both pipes concurrently so a chatty child cannot block on a full
    // pipe buffer while we wait for it.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    debug!("{label}: killed after {timeout:?}");
                    return Err(CommandFailure::Timeout(timeout));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CommandFailure::Spawn(e));
            }
        }
    };

    let result = CommandResult {
        code: status.code().unwrap_or(-1),
        stdout: collect(stdout),
        stderr: collect(stderr),
        elapsed: start.elapsed(),
    };
    debug!(
        "{label}: exit {} in {:.2}s ({} bytes stdout)",
        result.code,
        result.elapsed.as_secs_f64(),
        result.stdout.len()
    );

    if status.success() {
        Ok(result)
    } else {
        Err(CommandFailure::NonZeroExit {
            code: result.code,
            result,
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Deterministic runner for unit tests: canned responses keyed by the exact
/// command line, plus a log of every call made.
#[cfg(test)]
pub(crate) mod scripted {
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;

    use super::{CommandFailure, CommandResult, CommandRunner, describe_argv};

    #[derive(Debug, Clone)]
    pub(crate) enum Reply {
        Stdout(String),
        Exit(i32, String),
        Timeout,
    }

    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        replies: RefCell<HashMap<String, VecDeque<Reply>>>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queue a reply for `key`. The last queued reply repeats forever.
        pub(crate) fn on(self, key: &str, reply: Reply) -> Self {
            self.replies
                .borrow_mut()
                .entry(key.to_string())
                .or_default()
                .push_back(reply);
            self
        }

        pub(crate) fn ok(self, key: &str, stdout: &str) -> Self {
            self.on(key, Reply::Stdout(stdout.to_string()))
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        pub(crate) fn count(&self, key: &str) -> usize {
            self.calls.borrow().iter().filter(|c| *c == key).count()
        }

        fn reply(&self, key: String) -> Result<CommandResult, CommandFailure> {
            self.calls.borrow_mut().push(key.clone());
            let mut replies = self.replies.borrow_mut();
            let Some(queue) = replies.get_mut(&key) else {
                return Err(CommandFailure::NotFound);
            };
            let reply = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            match reply {
                Some(Reply::Stdout(stdout)) => Ok(CommandResult {
                    code: 0,
                    stdout,
                    stderr: String::new(),
                    elapsed: Duration::ZERO,
                }),
                Some(Reply::Exit(code, stderr)) => Err(CommandFailure::NonZeroExit {
                    code,
                    result: CommandResult {
                        code,
                        stdout: String::new(),
                        stderr,
                        elapsed: Duration::ZERO,
                    },
                }),
                Some(Reply::Timeout) => Err(CommandFailure::Timeout(Duration::from_secs(1))),
                None => Err(CommandFailure::NotFound),
            }
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run_argv(
            &self,
            program: &str,
            args: &[&str],
            _timeout: Duration,
        ) -> Result<CommandResult, CommandFailure> {
            self.reply(describe_argv(program, args))
        }

        fn run_shell(
            &self,
            line: &str,
            _timeout: Duration,
        ) -> Result<CommandResult, CommandFailure> {
            self.reply(line.to_string())
        }
    }
}
