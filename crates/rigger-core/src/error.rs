//! Error taxonomy for task dispatch and shell sessions.

use std::time::Duration;

/// Errors raised by shell sessions.
///
/// None of these poison the session itself: capability code decides whether
/// to abort the pipeline or carry on.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// A command exited non-zero and the caller asked for an error.
    #[error("command failed with exit code {exit_code}: {command}\n{}", .output.join("\n"))]
    FailedCommand {
        command: String,
        exit_code: i32,
        output: Vec<String>,
    },

    /// The shell variant has no meaningful implementation of a primitive.
    #[error("{provider} shell does not support {operation}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
    },

    /// The child process or remote connection could not be established.
    #[error("could not set up {provider} transport: {reason}")]
    TransportSetup {
        provider: &'static str,
        reason: String,
    },

    /// `pop_working_dir` was called more often than `push_working_dir`.
    #[error("working directory stack of {provider} shell is empty")]
    WorkingDirectoryImbalance { provider: &'static str },

    /// An interactive process exceeded its caller-supplied timeout and was killed.
    #[error("interactive process killed after {after:?}")]
    InteractiveTimeout { after: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShellError {
    pub(crate) fn transport(provider: &'static str, reason: impl Into<String>) -> Self {
        Self::TransportSetup {
            provider,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(provider: &'static str, operation: &'static str) -> Self {
        Self::Unsupported {
            provider,
            operation,
        }
    }
}

/// Errors surfaced by [`CapabilityRegistry::run_task`](crate::capability::CapabilityRegistry::run_task).
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// No registered capability supports the requested name. Always fatal.
    #[error("capability '{0}' not found")]
    CapabilityNotFound(String),

    /// A capability handler failed; the original error is kept as-is.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl From<ShellError> for TaskError {
    fn from(err: ShellError) -> Self {
        Self::Failed(err.into())
    }
}

impl TaskError {
    /// Look for a shell error anywhere in the handler's error chain.
    pub fn shell_error(&self) -> Option<&ShellError> {
        match self {
            Self::CapabilityNotFound(_) => None,
            Self::Failed(err) => err.chain().find_map(|e| e.downcast_ref::<ShellError>()),
        }
    }
}
