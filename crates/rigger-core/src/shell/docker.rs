//! `docker exec` against a running container, one invocation per command.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::HostConfig;
use crate::error::ShellError;
use crate::output::Output;

use super::exec::{run_argv, run_status};
use super::state::{join_quoted, shell_quote};
use super::{CommandResult, InteractiveOptions, RunOptions, Shell, ShellState, finish};

const PROVIDER: &str = "docker-exec";

#[derive(Debug, Clone)]
pub struct DockerExecShell {
    state: ShellState,
    container: String,
    shell: String,
}

impl DockerExecShell {
    pub fn new(container: impl Into<String>, shell: impl Into<String>, state: ShellState) -> Self {
        Self {
            state,
            container: container.into(),
            shell: shell.into(),
        }
    }

    pub fn for_host(host: &HostConfig, output: Output) -> Result<Self, ShellError> {
        let docker = host
            .docker
            .as_ref()
            .ok_or_else(|| ShellError::transport(PROVIDER, "host has no [docker] settings"))?;
        Ok(Self::new(
            docker.name.clone(),
            docker.shell.clone(),
            ShellState::for_host(host, output),
        ))
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// `docker exec [-i [-t]] -e K=V… <container> <shell> -c <prepared>`
    pub fn exec_argv(&self, prepared: &str, interactive: Option<&InteractiveOptions>) -> Vec<String> {
        let mut argv = vec![self.state.executable("docker").to_string(), "exec".to_string()];
        if let Some(options) = interactive {
            argv.push("-i".to_string());
            if options.tty {
                argv.push("-t".to_string());
            }
        }
        for (key, value) in self.state.environment() {
            argv.push("-e".to_string());
            argv.push(format!("{}={}", key, value));
        }
        argv.push(self.container.clone());
        argv.push(self.shell.clone());
        argv.push("-c".to_string());
        argv.push(prepared.to_string());
        argv
    }

    /// `<container>:<absolute path>` as understood by `docker cp`.
    pub fn container_path(&self, path: &str) -> String {
        let absolute = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", self.state.working_dir().trim_end_matches('/'), path)
        };
        format!("{}:{}", self.container, absolute)
    }

    /// `docker cp <from> <to>`
    pub fn copy_argv(&self, from: &str, to: &str) -> Vec<String> {
        vec![
            self.state.executable("docker").to_string(),
            "cp".to_string(),
            from.to_string(),
            to.to_string(),
        ]
    }
}

impl Shell for DockerExecShell {
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
        tracing::debug!(provider = PROVIDER, container = %self.container, command = %prepared, "run");
        let result = run_argv(PROVIDER, &self.exec_argv(&prepared, None))?;
        finish(&self.state, &prepared, result, options)
    }

    fn exists(&mut self, path: &str) -> Result<bool, ShellError> {
        let probe = format!("stat {} > /dev/null 2>&1", shell_quote(path));
        Ok(self.capture(&probe)?.succeeded())
    }

    fn get_file(&mut self, remote: &str, local: &Path) -> Result<bool, ShellError> {
        let argv = self.copy_argv(&self.container_path(remote), &local.to_string_lossy());
        run_status(PROVIDER, &argv)
    }

    fn put_file(&mut self, local: &Path, remote: &str) -> Result<bool, ShellError> {
        let argv = self.copy_argv(&local.to_string_lossy(), &self.container_path(remote));
        run_status(PROVIDER, &argv)
    }

    fn apply_environment(&mut self, env: &BTreeMap<String, String>) -> Result<(), ShellError> {
        self.state.merge_environment(env);
        Ok(())
    }

    fn build_interactive_command(
        &self,
        program: &[String],
        options: &InteractiveOptions,
    ) -> Result<Vec<String>, ShellError> {
        let prepared = self.state.prepare(&join_quoted(program));
        Ok(self.exec_argv(&prepared, Some(options)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> DockerExecShell {
        let mut env = BTreeMap::new();
        env.insert("APP_ENV".to_string(), "dev".to_string());
        let mut state = ShellState::new("/var/www");
        state.merge_environment(&env);
        DockerExecShell::new("web-1", "sh", state)
    }

    #[test]
    fn test_exec_argv_passes_environment() {
        let argv = shell().exec_argv("cd /var/www && ls", None);
        assert_eq!(
            argv,
            vec![
                "docker",
                "exec",
                "-e",
                "APP_ENV=dev",
                "web-1",
                "sh",
                "-c",
                "cd /var/www && ls"
            ]
        );
    }

    #[test]
    fn test_interactive_argv_allocates_tty() {
        let argv = shell()
            .build_interactive_command(&["bash".to_string()], &InteractiveOptions::tty())
            .unwrap();
        assert_eq!(argv[..4], ["docker", "exec", "-i", "-t"]);
        assert_eq!(argv.last().unwrap(), "cd /var/www && bash");
    }

    #[test]
    fn test_container_path_resolves_relative() {
        let shell = shell();
        assert_eq!(shell.container_path("dump.sql"), "web-1:/var/www/dump.sql");
        assert_eq!(shell.container_path("/etc/hosts"), "web-1:/etc/hosts");
    }
}
