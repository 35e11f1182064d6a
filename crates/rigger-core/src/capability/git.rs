//! Git checkout handling on the target host.

use anyhow::Context;

use crate::config::HostConfig;
use crate::context::TaskContext;
use crate::shell::shell_quote;

use super::support::{run_lines, with_shell_in};
use super::{Capability, TaskTable};

const DEFAULT_BRANCH: &str = "main";

#[derive(Debug)]
pub struct GitCapability {
    tasks: TaskTable<GitCapability>,
}

impl Default for GitCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCapability {
    pub fn new() -> Self {
        Self {
            tasks: TaskTable::<GitCapability>::new()
                .with("version", Self::version)
                .with("deployPrepare", Self::ensure_clean)
                .with("deploy", Self::deploy),
        }
    }

    fn repository(host: &HostConfig) -> &str {
        host.git
            .as_ref()
            .and_then(|g| g.root_folder.as_deref())
            .unwrap_or(&host.root_folder)
    }

    fn branch(host: &HostConfig) -> &str {
        host.git
            .as_ref()
            .and_then(|g| g.branch.as_deref())
            .unwrap_or(DEFAULT_BRANCH)
    }

    /// Publish `git describe` of the checkout as result `version`.
    fn version(&self, host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        let result = with_shell_in(host, ctx, Self::repository(host), |shell| {
            Ok(shell.capture("#!git describe --always --tags")?)
        })?;
        if !result.succeeded() {
            anyhow::bail!(
                "Could not determine version in {}: {}",
                Self::repository(host),
                result.output().join("\n")
            );
        }
        let version = result.first_line().unwrap_or_default().to_string();
        tracing::info!(host = %host.config_name, %version, "current version");
        ctx.set_result("version", version);
        Ok(())
    }

    /// Refuse to deploy over uncommitted changes.
    fn ensure_clean(&self, host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        let result = with_shell_in(host, ctx, Self::repository(host), |shell| {
            Ok(shell.capture("#!git status --porcelain --untracked-files=no")?)
        })?;
        let dirty: Vec<&String> = result.output().iter().filter(|l| !l.trim().is_empty()).collect();
        if !dirty.is_empty() {
            anyhow::bail!(
                "Working copy of {} has uncommitted changes:\n{}",
                host.config_name,
                dirty
                    .iter()
                    .map(|l| l.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            );
        }
        Ok(())
    }

    fn deploy(&self, host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        let branch = shell_quote(Self::branch(host));
        let steps = [
            "#!git fetch --all --prune".to_string(),
            format!("#!git checkout {}", branch),
            format!("#!git pull origin {}", branch),
        ];
        run_lines(host, ctx, Self::repository(host), &steps)
            .with_context(|| format!("Failed to update checkout on {}", host.config_name))
    }
}

impl Capability for GitCapability {
    fn name(&self) -> &str {
        "git"
    }

    fn description(&self) -> &str {
        "Updates the git checkout and reports its version"
    }

    fn handles(&self, task: &str) -> bool {
        self.tasks.contains(task)
    }

    fn handle(&self, task: &str, host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        self.tasks.call(self, task, host, ctx)
    }

    fn task_names(&self) -> Vec<String> {
        self.tasks.names()
    }
}
