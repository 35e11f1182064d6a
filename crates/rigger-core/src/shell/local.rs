//! Persistent shell on the local machine.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::HostConfig;
use crate::error::ShellError;
use crate::output::Output;

use super::persistent::PersistentProcess;
use super::state::{export_statements, shell_quote};
use super::{CommandResult, InteractiveOptions, RunOptions, Shell, ShellState, finish};

const PROVIDER: &str = "local";

/// Runs commands through one long-lived child shell, spawned on first use.
#[derive(Debug)]
pub struct LocalShell {
    state: ShellState,
    program: String,
    process: Option<PersistentProcess>,
}

impl LocalShell {
    pub fn new(program: impl Into<String>, state: ShellState) -> Self {
        Self {
            state,
            program: program.into(),
            process: None,
        }
    }

    pub fn for_host(host: &HostConfig, output: Output) -> Self {
        Self::new(host.shell(), ShellState::for_host(host, output))
    }

    fn process(&mut self) -> Result<&mut PersistentProcess, ShellError> {
        let alive = match self.process.as_mut() {
            Some(process) => process.is_running(),
            None => false,
        };
        if !alive {
            let mut process = PersistentProcess::spawn(PROVIDER, &self.program, &[])?;
            for export in export_statements(self.state.environment()) {
                process.execute(&export)?;
            }
            self.process = Some(process);
        }
        self.process
            .as_mut()
            .ok_or_else(|| ShellError::transport(PROVIDER, "shell process unavailable"))
    }
}

impl Shell for LocalShell {
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
        tracing::debug!(provider = PROVIDER, command = %prepared, "run");
        let result = self.process()?.execute(&prepared)?;
        finish(&self.state, &prepared, result, options)
    }

    fn exists(&mut self, path: &str) -> Result<bool, ShellError> {
        let probe = format!("stat {} > /dev/null 2>&1", shell_quote(path));
        Ok(self.capture(&probe)?.succeeded())
    }

    fn get_file(&mut self, remote: &str, local: &Path) -> Result<bool, ShellError> {
        let source = resolve(self.state.working_dir(), remote);
        match std::fs::copy(&source, local) {
            Ok(_) => Ok(true),
            Err(err) => {
                tracing::warn!(from = %source, to = %local.display(), error = %err, "copy failed");
                Ok(false)
            }
        }
    }

    fn put_file(&mut self, local: &Path, remote: &str) -> Result<bool, ShellError> {
        let target = resolve(self.state.working_dir(), remote);
        match std::fs::copy(local, &target) {
            Ok(_) => Ok(true),
            Err(err) => {
                tracing::warn!(from = %local.display(), to = %target, error = %err, "copy failed");
                Ok(false)
            }
        }
    }

    fn apply_environment(&mut self, env: &BTreeMap<String, String>) -> Result<(), ShellError> {
        self.state.merge_environment(env);
        if let Some(process) = self.process.as_mut()
            && process.is_running()
        {
            for export in export_statements(env) {
                process.execute(&export)?;
            }
        }
        Ok(())
    }

    fn build_interactive_command(
        &self,
        program: &[String],
        _options: &InteractiveOptions,
    ) -> Result<Vec<String>, ShellError> {
        let mut script = export_statements(self.state.environment());
        script.push(self.state.prepare(&super::join_quoted(program)));
        Ok(vec![
            self.program.clone(),
            "-c".to_string(),
            script.join(" && "),
        ])
    }

    fn terminate(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.terminate();
        }
    }
}

fn resolve(working_dir: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", working_dir.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactive_command_runs_in_working_dir() {
        let mut env = BTreeMap::new();
        env.insert("APP_ENV".to_string(), "dev".to_string());
        let mut state = ShellState::new("/srv/app");
        state.merge_environment(&env);
        let shell = LocalShell::new("/bin/bash", state);

        let argv = shell
            .build_interactive_command(&["mysql".to_string()], &InteractiveOptions::tty())
            .unwrap();
        assert_eq!(
            argv,
            vec!["/bin/bash", "-c", "export APP_ENV=dev && cd /srv/app && mysql"]
        );
    }

    #[test]
    fn test_resolve_relative_paths() {
        assert_eq!(resolve("/srv/app/", "dump.sql"), "/srv/app/dump.sql");
        assert_eq!(resolve("/srv/app", "/tmp/x"), "/tmp/x");
    }
}
