//! Shell sessions: the transport-agnostic command execution layer.
//!
//! Every variant binds to exactly one target environment and shares the same
//! working-directory discipline through [`ShellState`]:
//! - [`LocalShell`]: persistent child shell on this machine
//! - [`SshShell`]: persistent shell over one long-lived `ssh` connection
//! - [`DockerExecShell`]: one `docker exec` per command
//! - [`DockerSshShell`]: `docker exec` nested inside the SSH session
//! - [`KubectlShell`]: one `kubectl exec` per command against a selected pod
//! - [`DryRunShell`]: records commands without executing anything
//! - [`SubShell`]: borrows a parent's channel with its own directory stack
//!
//! A session is not re-entrant. Exactly one caller may drive it at a time;
//! concurrent `run` calls on one instance are a caller bug.

pub mod docker;
pub mod docker_ssh;
pub mod dry_run;
mod exec;
pub mod factory;
pub mod interactive;
pub mod kubectl;
pub mod local;
pub mod persistent;
pub mod result;
pub mod ssh;
pub mod state;
pub mod sub;

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub use docker::DockerExecShell;
pub use docker_ssh::DockerSshShell;
pub use dry_run::DryRunShell;
pub use factory::ShellFactory;
pub use kubectl::KubectlShell;
pub use local::LocalShell;
pub use persistent::SENTINEL;
pub use result::CommandResult;
pub use ssh::SshShell;
pub use state::{ShellState, join_quoted, shell_quote};
pub use sub::SubShell;

use crate::error::ShellError;

/// How a single `run` treats output and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Keep output to the caller instead of echoing it
    pub capture: bool,
    /// Turn a non-zero exit into [`ShellError::FailedCommand`] (ignored when capturing)
    pub throw_on_error: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            capture: false,
            throw_on_error: true,
        }
    }
}

impl RunOptions {
    pub fn captured() -> Self {
        Self {
            capture: true,
            throw_on_error: false,
        }
    }

    pub fn lenient() -> Self {
        Self {
            capture: false,
            throw_on_error: false,
        }
    }
}

/// Settings for interactive (TTY) sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractiveOptions {
    /// Allocate a pseudo terminal on the remote side
    pub tty: bool,
    /// Kill the process after this long
    pub timeout: Option<Duration>,
}

impl InteractiveOptions {
    pub fn tty() -> Self {
        Self {
            tty: true,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Command execution against one target environment.
///
/// One caller drives a session at a time. Shared sessions go through
/// [`SharedShell`]; concurrent `run` calls on one instance are not supported.
pub trait Shell: Send + std::fmt::Debug {
    /// Transport identifier used in logs and errors.
    fn provider(&self) -> &'static str;

    fn state(&self) -> &ShellState;

    fn state_mut(&mut self) -> &mut ShellState;

    /// Run `command` in the current working directory.
    fn run_with(&mut self, command: &str, options: RunOptions)
    -> Result<CommandResult, ShellError>;

    /// Whether `path` exists on the target.
    fn exists(&mut self, path: &str) -> Result<bool, ShellError>;

    fn get_file(&mut self, remote: &str, local: &Path) -> Result<bool, ShellError>;

    fn put_file(&mut self, local: &Path, remote: &str) -> Result<bool, ShellError>;

    /// Export variables into the session.
    fn apply_environment(&mut self, env: &BTreeMap<String, String>) -> Result<(), ShellError>;

    /// argv that opens `program` interactively on the target.
    fn build_interactive_command(
        &self,
        program: &[String],
        options: &InteractiveOptions,
    ) -> Result<Vec<String>, ShellError>;

    /// Start an argv built by [`Shell::build_interactive_command`] and wait for it.
    fn start_interactive_process(
        &mut self,
        argv: &[String],
        options: &InteractiveOptions,
    ) -> Result<i32, ShellError> {
        interactive::run_interactive(argv, options)
    }

    /// Tear down any persistent channel. Later calls may re-establish it.
    fn terminate(&mut self) {}

    /// Commands recorded instead of executed; only dry runs return `Some`.
    fn recorded_commands(&self) -> Option<&[String]> {
        None
    }

    /// Run with output echoed and failures raised.
    fn run(&mut self, command: &str) -> Result<CommandResult, ShellError> {
        self.run_with(command, RunOptions::default())
    }

    /// Run and hand the output back without raising on failure.
    fn capture(&mut self, command: &str) -> Result<CommandResult, ShellError> {
        self.run_with(command, RunOptions::captured())
    }

    fn working_dir(&self) -> &str {
        self.state().working_dir()
    }

    fn cd(&mut self, dir: &str) {
        self.state_mut().cd(dir);
    }

    fn push_working_dir(&mut self, dir: &str) {
        self.state_mut().push(dir);
    }

    fn pop_working_dir(&mut self) -> Result<(), ShellError> {
        if self.state_mut().pop() {
            Ok(())
        } else {
            Err(ShellError::WorkingDirectoryImbalance {
                provider: self.provider(),
            })
        }
    }
}

/// Finish a raw result: echo output when not capturing, raise when asked.
pub(crate) fn finish(
    state: &ShellState,
    command: &str,
    result: CommandResult,
    options: RunOptions,
) -> Result<CommandResult, ShellError> {
    if !options.capture {
        state.output().write_lines(result.output());
    }
    if options.throw_on_error && !options.capture && !result.succeeded() {
        tracing::debug!(command, exit_code = result.exit_code(), "command failed");
        return result.ensure_success(command);
    }
    Ok(result)
}

/// Scoped working directory: pops on drop, on every exit path.
pub struct WorkingDirGuard<'a> {
    shell: &'a mut dyn Shell,
}

impl<'a> WorkingDirGuard<'a> {
    pub fn new(shell: &'a mut dyn Shell, dir: &str) -> Self {
        shell.push_working_dir(dir);
        Self { shell }
    }
}

impl<'a> Deref for WorkingDirGuard<'a> {
    type Target = dyn Shell + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.shell
    }
}

impl DerefMut for WorkingDirGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.shell
    }
}

impl Drop for WorkingDirGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.shell.pop_working_dir() {
            tracing::warn!(error = %err, "working directory stack out of balance");
        }
    }
}

/// Push `dir` for the lifetime of the returned guard.
pub fn in_dir<'a>(shell: &'a mut dyn Shell, dir: &str) -> WorkingDirGuard<'a> {
    WorkingDirGuard::new(shell, dir)
}

/// A session shared between the task context and capability handlers.
pub type SharedShell = Arc<Mutex<Box<dyn Shell>>>;

pub fn share(shell: Box<dyn Shell>) -> SharedShell {
    Arc::new(Mutex::new(shell))
}

/// Lock a shared session, recovering the shell from a poisoned lock.
pub fn lock_shell(shell: &SharedShell) -> MutexGuard<'_, Box<dyn Shell>> {
    shell.lock().unwrap_or_else(|e| e.into_inner())
}
