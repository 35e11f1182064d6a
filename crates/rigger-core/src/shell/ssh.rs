//! Persistent shell over a single long-lived SSH connection.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::{HostConfig, SshConfig};
use crate::error::ShellError;
use crate::output::Output;

use super::persistent::PersistentProcess;
use super::state::{export_statements, join_quoted, shell_quote};
use super::{CommandResult, InteractiveOptions, RunOptions, Shell, ShellState, finish};

const PROVIDER: &str = "ssh";

/// Same sentinel protocol as [`LocalShell`](super::LocalShell), but the child
/// is an `ssh` client running the remote shell.
#[derive(Debug)]
pub struct SshShell {
    state: ShellState,
    ssh: SshConfig,
    remote_shell: String,
    process: Option<PersistentProcess>,
}

impl SshShell {
    pub fn new(ssh: SshConfig, remote_shell: impl Into<String>, state: ShellState) -> Self {
        Self {
            state,
            ssh,
            remote_shell: remote_shell.into(),
            process: None,
        }
    }

    pub fn for_host(host: &HostConfig, output: Output) -> Result<Self, ShellError> {
        let ssh = host
            .ssh
            .clone()
            .ok_or_else(|| ShellError::transport(PROVIDER, "host has no [ssh] settings"))?;
        Ok(Self::new(ssh, host.shell(), ShellState::for_host(host, output)))
    }

    fn target(&self) -> String {
        format!("{}@{}", self.ssh.user, self.ssh.host)
    }

    fn known_hosts_options(&self) -> Vec<String> {
        if !self.ssh.disable_known_hosts {
            return Vec::new();
        }
        [
            "StrictHostKeyChecking=no",
            "UserKnownHostsFile=/dev/null",
            "LogLevel=ERROR",
        ]
        .iter()
        .flat_map(|opt| ["-o".to_string(), opt.to_string()])
        .collect()
    }

    /// `-A -p <port> [known-hosts options] user@host`
    pub fn connection_args(&self) -> Vec<String> {
        let mut args = vec!["-A".to_string(), "-p".to_string(), self.ssh.port.to_string()];
        args.extend(self.known_hosts_options());
        args.push(self.target());
        args
    }

    /// Full argv running `remote_command` on the host in one shot.
    pub fn remote_argv(&self, remote_command: &str, tty: bool) -> Vec<String> {
        let mut argv = vec![self.state.executable("ssh").to_string()];
        if tty {
            argv.push("-t".to_string());
        }
        argv.extend(self.connection_args());
        argv.push(remote_command.to_string());
        argv
    }

    fn scp(&self, from: &str, to: &str) -> Result<bool, ShellError> {
        let program = self.state.executable("scp");
        let mut args = vec!["-P".to_string(), self.ssh.port.to_string()];
        args.extend(self.known_hosts_options());
        args.push(from.to_string());
        args.push(to.to_string());

        tracing::debug!(provider = PROVIDER, program, ?args, "scp");
        let status = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| ShellError::transport(PROVIDER, format!("{}: {}", program, e)))?;
        Ok(status.success())
    }

    fn remote_path(&self, path: &str) -> String {
        let absolute = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", self.state.working_dir().trim_end_matches('/'), path)
        };
        format!("{}:{}", self.target(), absolute)
    }

    fn process(&mut self) -> Result<&mut PersistentProcess, ShellError> {
        let alive = match self.process.as_mut() {
            Some(process) => process.is_running(),
            None => false,
        };
        if !alive {
            let mut args = self.connection_args();
            args.push(self.remote_shell.clone());
            let program = self.state.executable("ssh").to_string();
            let mut process = PersistentProcess::spawn(PROVIDER, &program, &args)?;
            for export in export_statements(self.state.environment()) {
                process.execute(&export)?;
            }
            self.process = Some(process);
        }
        self.process
            .as_mut()
            .ok_or_else(|| ShellError::transport(PROVIDER, "ssh connection unavailable"))
    }
}

impl Shell for SshShell {
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
        tracing::debug!(provider = PROVIDER, host = %self.ssh.host, command = %prepared, "run");
        let result = self.process()?.execute(&prepared)?;
        finish(&self.state, &prepared, result, options)
    }

    fn exists(&mut self, path: &str) -> Result<bool, ShellError> {
        let probe = format!("stat {} > /dev/null 2>&1", shell_quote(path));
        Ok(self.capture(&probe)?.succeeded())
    }

    fn get_file(&mut self, remote: &str, local: &Path) -> Result<bool, ShellError> {
        let from = self.remote_path(remote);
        self.scp(&from, &local.to_string_lossy())
    }

    fn put_file(&mut self, local: &Path, remote: &str) -> Result<bool, ShellError> {
        let to = self.remote_path(remote);
        self.scp(&local.to_string_lossy(), &to)
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
        options: &InteractiveOptions,
    ) -> Result<Vec<String>, ShellError> {
        let mut script = export_statements(self.state.environment());
        script.push(self.state.prepare(&join_quoted(program)));
        Ok(self.remote_argv(&script.join(" && "), options.tty))
    }

    fn terminate(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.terminate();
        }
    }
}
