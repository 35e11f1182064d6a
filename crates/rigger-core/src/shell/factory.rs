//! Builds shell sessions from host descriptors and caches them per host.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::{HostConfig, ShellProviderKind};
use crate::error::ShellError;
use crate::output::Output;

use super::{
    DockerExecShell, DockerSshShell, DryRunShell, KubectlShell, LocalShell, SharedShell, Shell,
    SshShell, lock_shell, share,
};

/// Session cache owned by one invocation; nothing here is process-wide.
#[derive(Debug)]
pub struct ShellFactory {
    output: Output,
    dry_run: bool,
    sessions: Mutex<HashMap<String, SharedShell>>,
}

impl ShellFactory {
    pub fn new(output: Output) -> Self {
        Self {
            output,
            dry_run: false,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Force every session to be a dry run, whatever the host selects.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Build a fresh, uncached session for `host`.
    pub fn create(&self, host: &HostConfig) -> Result<Box<dyn Shell>, ShellError> {
        let kind = if self.dry_run {
            ShellProviderKind::DryRun
        } else {
            host.shell_provider
        };
        tracing::debug!(host = %host.config_name, provider = kind.as_str(), "creating shell session");

        let output = self.output.clone();
        let shell: Box<dyn Shell> = match kind {
            ShellProviderKind::Local => Box::new(LocalShell::for_host(host, output)),
            ShellProviderKind::Ssh => Box::new(SshShell::for_host(host, output)?),
            ShellProviderKind::DockerExec => Box::new(DockerExecShell::for_host(host, output)?),
            ShellProviderKind::DockerExecOverSsh => {
                Box::new(DockerSshShell::for_host(host, output)?)
            }
            ShellProviderKind::Kubectl => Box::new(KubectlShell::for_host(host, output)?),
            ShellProviderKind::DryRun => Box::new(DryRunShell::for_host(host, output)),
        };
        Ok(shell)
    }

    /// The cached session for `host`, created on first request.
    pub fn session_for(&self, host: &HostConfig) -> Result<SharedShell, ShellError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(shell) = sessions.get(&host.config_name) {
            return Ok(shell.clone());
        }
        let shell = share(self.create(host)?);
        sessions.insert(host.config_name.clone(), shell.clone());
        Ok(shell)
    }

    /// Tear down every cached session.
    pub fn terminate_all(&self) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        for (name, shell) in sessions.drain() {
            tracing::debug!(host = %name, "terminating shell session");
            lock_shell(&shell).terminate();
        }
    }
}
