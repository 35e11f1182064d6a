//! Outcome of a single command execution.

use serde::Serialize;

use crate::error::ShellError;

/// Exit code plus captured output lines. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    exit_code: i32,
    output: Vec<String>,
}

impl CommandResult {
    pub fn new(exit_code: i32, output: Vec<String>) -> Self {
        Self { exit_code, output }
    }

    /// A successful result with no output, as produced by dry runs.
    pub fn ok() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn into_output(self) -> Vec<String> {
        self.output
    }

    /// First non-empty output line, trimmed.
    pub fn first_line(&self) -> Option<&str> {
        self.output
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
    }

    /// Turn a failed result into [`ShellError::FailedCommand`].
    pub fn ensure_success(self, command: &str) -> Result<Self, ShellError> {
        if self.succeeded() {
            Ok(self)
        } else {
            Err(ShellError::FailedCommand {
                command: command.to_string(),
                exit_code: self.exit_code,
                output: self.output,
            })
        }
    }
}
