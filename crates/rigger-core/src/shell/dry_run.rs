//! A session that records commands instead of running them.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::HostConfig;
use crate::error::ShellError;
use crate::output::Output;

use super::state::shell_quote;
use super::{CommandResult, InteractiveOptions, RunOptions, Shell, ShellState, finish};

const PROVIDER: &str = "dry-run";

#[derive(Debug, Clone)]
pub struct DryRunShell {
    state: ShellState,
    recorded: Vec<String>,
    echo: bool,
}

impl DryRunShell {
    pub fn new(state: ShellState) -> Self {
        Self {
            state,
            recorded: Vec::new(),
            echo: false,
        }
    }

    pub fn for_host(host: &HostConfig, output: Output) -> Self {
        Self::new(ShellState::for_host(host, output)).with_echo(true)
    }

    /// Echo each recorded command to the attached output.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn commands(&self) -> &[String] {
        &self.recorded
    }
}

impl Shell for DryRunShell {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn state(&self) -> &ShellState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ShellState {
        &mut self.state
    }

    fn run_with(
        &mut self,
        command: &str,
        options: RunOptions,
    ) -> Result<CommandResult, ShellError> {
        let prepared = self.state.prepare(command);
        tracing::debug!(provider = PROVIDER, command = %prepared, "record");
        if self.echo {
            self.state.output().writeln(&prepared);
        }
        self.recorded.push(prepared.clone());
        finish(&self.state, &prepared, CommandResult::ok(), options)
    }

    fn exists(&mut self, path: &str) -> Result<bool, ShellError> {
        let probe = format!("stat {} > /dev/null 2>&1", shell_quote(path));
        Ok(self.capture(&probe)?.succeeded())
    }

    fn get_file(&mut self, _remote: &str, _local: &Path) -> Result<bool, ShellError> {
        Err(ShellError::unsupported(PROVIDER, "get_file"))
    }

    fn put_file(&mut self, _local: &Path, _remote: &str) -> Result<bool, ShellError> {
        Err(ShellError::unsupported(PROVIDER, "put_file"))
    }

    fn apply_environment(&mut self, env: &BTreeMap<String, String>) -> Result<(), ShellError> {
        self.state.merge_environment(env);
        Ok(())
    }

    fn build_interactive_command(
        &self,
        _program: &[String],
        _options: &InteractiveOptions,
    ) -> Result<Vec<String>, ShellError> {
        Err(ShellError::unsupported(PROVIDER, "interactive commands"))
    }

    fn start_interactive_process(
        &mut self,
        _argv: &[String],
        _options: &InteractiveOptions,
    ) -> Result<i32, ShellError> {
        Err(ShellError::unsupported(PROVIDER, "interactive processes"))
    }

    fn recorded_commands(&self) -> Option<&[String]> {
        Some(&self.recorded)
    }
}
