//! `docker exec` on a remote host, tunnelled through the SSH session.
//!
//! The SSH session carries every command; the docker session only builds
//! argv and owns the container-side working directory.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::HostConfig;
use crate::error::ShellError;
use crate::output::Output;

use super::state::{join_quoted, shell_quote};
use super::{
    CommandResult, DockerExecShell, InteractiveOptions, RunOptions, Shell, ShellState, SshShell,
    finish,
};

const PROVIDER: &str = "docker-exec-over-ssh";

#[derive(Debug)]
pub struct DockerSshShell {
    ssh: SshShell,
    docker: DockerExecShell,
    tmp_folder: String,
}

impl DockerSshShell {
    pub fn new(ssh: SshShell, docker: DockerExecShell, tmp_folder: impl Into<String>) -> Self {
        Self {
            ssh,
            docker,
            tmp_folder: tmp_folder.into(),
        }
    }

    pub fn for_host(host: &HostConfig, output: Output) -> Result<Self, ShellError> {
        let ssh_config = host
            .ssh
            .clone()
            .ok_or_else(|| ShellError::transport(PROVIDER, "host has no [ssh] settings"))?;
        // The outer session only needs a directory that exists on the remote host
        let ssh_state = ShellState::new(host.tmp_folder.clone())
            .with_executables(host.executables.clone())
            .with_output(output.clone());
        let ssh = SshShell::new(ssh_config, host.shell(), ssh_state);
        let docker = DockerExecShell::for_host(host, output)?;
        Ok(Self::new(ssh, docker, host.tmp_folder.clone()))
    }

    /// Remote staging path for two-hop transfers.
    fn staging_path(&self, path: &str) -> String {
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "transfer".to_string());
        format!(
            "{}/rigger-{}-{}",
            self.tmp_folder.trim_end_matches('/'),
            self.docker.container(),
            name
        )
    }

    fn remote_run(&mut self, argv: &[String]) -> Result<bool, ShellError> {
        Ok(self.ssh.capture(&join_quoted(argv))?.succeeded())
    }

    fn remove_staging(&mut self, staging: &str) {
        let cleanup = format!("rm -f {}", shell_quote(staging));
        if let Err(err) = self.ssh.capture(&cleanup) {
            tracing::warn!(path = staging, error = %err, "could not remove staging file");
        }
    }
}

impl Shell for DockerSshShell {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn state(&self) -> &ShellState {
        self.docker.state()
    }

    fn state_mut(&mut self) -> &mut ShellState {
        self.docker.state_mut()
    }

    fn run_with(
        &mut self,
        command: &str,
        options: RunOptions,
    ) -> Result<CommandResult, ShellError> {
        let prepared = self.docker.state().prepare(command);
        tracing::debug!(provider = PROVIDER, container = %self.docker.container(), command = %prepared, "run");
        let remote = join_quoted(&self.docker.exec_argv(&prepared, None));
        let result = self.ssh.capture(&remote)?;
        finish(self.docker.state(), &prepared, result, options)
    }

    fn exists(&mut self, path: &str) -> Result<bool, ShellError> {
        let probe = format!("stat {} > /dev/null 2>&1", shell_quote(path));
        Ok(self.capture(&probe)?.succeeded())
    }

    fn get_file(&mut self, remote: &str, local: &Path) -> Result<bool, ShellError> {
        let staging = self.staging_path(remote);
        let copy_out = self
            .docker
            .copy_argv(&self.docker.container_path(remote), &staging);

        let fetched = self.remote_run(&copy_out)? && self.ssh.get_file(&staging, local)?;
        self.remove_staging(&staging);
        Ok(fetched)
    }

    fn put_file(&mut self, local: &Path, remote: &str) -> Result<bool, ShellError> {
        let staging = self.staging_path(remote);
        let copy_in = self
            .docker
            .copy_argv(&staging, &self.docker.container_path(remote));

        let stored = self.ssh.put_file(local, &staging)? && self.remote_run(&copy_in)?;
        self.remove_staging(&staging);
        Ok(stored)
    }

    fn apply_environment(&mut self, env: &BTreeMap<String, String>) -> Result<(), ShellError> {
        self.docker.apply_environment(env)
    }

    fn build_interactive_command(
        &self,
        program: &[String],
        options: &InteractiveOptions,
    ) -> Result<Vec<String>, ShellError> {
        let inner = self.docker.build_interactive_command(program, options)?;
        Ok(self.ssh.remote_argv(&join_quoted(&inner), options.tty))
    }

    fn terminate(&mut self) {
        self.ssh.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SshConfig;

    fn shell() -> DockerSshShell {
        let ssh = SshShell::new(
            SshConfig {
                host: "docker.example.com".to_string(),
                port: 22,
                user: "ops".to_string(),
                disable_known_hosts: false,
            },
            "/bin/bash",
            ShellState::new("/tmp"),
        );
        let docker = DockerExecShell::new("web-1", "sh", ShellState::new("/app"));
        DockerSshShell::new(ssh, docker, "/tmp")
    }

    #[test]
    fn test_interactive_argv_nests_docker_in_ssh() {
        let argv = shell()
            .build_interactive_command(&["bash".to_string()], &InteractiveOptions::tty())
            .unwrap();
        assert_eq!(
            argv,
            vec![
                "ssh",
                "-t",
                "-A",
                "-p",
                "22",
                "ops@docker.example.com",
                "docker exec -i -t web-1 sh -c 'cd /app && bash'"
            ]
        );
    }

    #[test]
    fn test_staging_path_uses_tmp_folder() {
        assert_eq!(
            shell().staging_path("/app/dump.sql"),
            "/tmp/rigger-web-1-dump.sql"
        );
    }

    #[test]
    fn test_state_is_container_side() {
        let mut shell = shell();
        shell.cd("web");
        assert_eq!(shell.working_dir(), "/app/web");
    }
}
