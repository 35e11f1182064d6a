//! Line-oriented RPC with a long-lived child shell.
//!
//! Each command is written to the child's stdin followed by
//! `echo "##RESULT:$?"`; output is read line by line until the sentinel shows
//! up. The child is spawned once and reused for every command.
//!
//! Known limitation: a command whose own output contains a line with the
//! sentinel marker ends the read early and yields a wrong exit code. The wire
//! format is kept as-is for compatibility with existing host setups.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::error::ShellError;

use super::CommandResult;

/// Marker echoed after every command, followed by the exit code.
pub const SENTINEL: &str = "##RESULT:";

/// What a read from the child produced.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Transcript {
    /// Sentinel seen: exit code plus the lines before it.
    Completed { exit_code: i32, lines: Vec<String> },
    /// Stream closed before the sentinel arrived.
    Closed { lines: Vec<String> },
}

/// Read lines until one carries the sentinel or the stream ends.
///
/// Lines are split on raw bytes and decoded lossily, so output that is not
/// UTF-8 never leaves the rest of the transcript unread in the pipe.
pub(crate) fn read_transcript<R: BufRead>(reader: &mut R) -> std::io::Result<Transcript> {
    let mut lines = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(Transcript::Closed { lines });
        }
        let decoded = String::from_utf8_lossy(&buf);
        let line = decoded.trim_end_matches(['\n', '\r']);

        if let Some(pos) = line.find(SENTINEL) {
            // Output without a trailing newline lands in front of the marker
            let head = &line[..pos];
            if !head.is_empty() {
                lines.push(head.to_string());
            }
            let code = line[pos + SENTINEL.len()..].trim();
            let exit_code = code.parse::<i32>().unwrap_or_else(|_| {
                tracing::warn!(code, "could not parse exit code from sentinel line");
                1
            });
            return Ok(Transcript::Completed { exit_code, lines });
        }
        lines.push(line.to_string());
    }
}

/// Command string actually written to the child's stdin.
pub(crate) fn wire_command(prepared: &str) -> String {
    format!("{}; echo \"{}$?\"\n", prepared, SENTINEL)
}

/// A spawned child shell with piped stdin/stdout.
pub(crate) struct PersistentProcess {
    provider: &'static str,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl std::fmt::Debug for PersistentProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentProcess")
            .field("provider", &self.provider)
            .field("pid", &self.child.id())
            .finish()
    }
}

impl PersistentProcess {
    /// Spawn `program args…`; stderr goes to the operator's terminal.
    pub(crate) fn spawn(
        provider: &'static str,
        program: &str,
        args: &[String],
    ) -> Result<Self, ShellError> {
        tracing::debug!(provider, program, ?args, "spawning persistent shell");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ShellError::transport(provider, format!("{}: {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ShellError::transport(provider, "child stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ShellError::transport(provider, "child stdout not captured"))?;

        Ok(Self {
            provider,
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Send one prepared command and block until its sentinel line.
    ///
    /// A child that dies mid-command is reported as a result carrying the
    /// child's own exit code and no output.
    pub(crate) fn execute(&mut self, prepared: &str) -> Result<CommandResult, ShellError> {
        let wire = wire_command(prepared);
        let written = self
            .stdin
            .write_all(wire.as_bytes())
            .and_then(|_| self.stdin.flush());

        let transcript = match written {
            Ok(()) => read_transcript(&mut self.stdout)?,
            Err(err) => {
                tracing::debug!(provider = self.provider, error = %err, "write to shell failed");
                Transcript::Closed { lines: Vec::new() }
            }
        };

        match transcript {
            Transcript::Completed { exit_code, lines } => Ok(CommandResult::new(exit_code, lines)),
            Transcript::Closed { .. } => {
                let exit_code = self.child.wait().ok().and_then(|s| s.code()).unwrap_or(-1);
                tracing::warn!(
                    provider = self.provider,
                    exit_code,
                    command = prepared,
                    "shell terminated before reporting a result"
                );
                Ok(CommandResult::new(exit_code, Vec::new()))
            }
        }
    }

    pub(crate) fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub(crate) fn terminate(&mut self) {
        if self.is_running() {
            let _ = self.stdin.write_all(b"exit\n");
            let _ = self.stdin.flush();
            if let Err(err) = self.child.kill() {
                tracing::debug!(provider = self.provider, error = %err, "kill after exit failed");
            }
        }
        let _ = self.child.wait();
    }
}

impl Drop for PersistentProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}
