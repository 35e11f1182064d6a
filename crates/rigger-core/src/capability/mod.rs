//! Capabilities: named units that implement task handlers for hosts.
//!
//! A host lists the capabilities it needs; the [`CapabilityRegistry`] resolves
//! them and drives each task through its lifecycle phases. Handlers are
//! looked up in an explicit [`TaskTable`] built when the capability is
//! constructed.

pub mod files;
pub mod git;
pub mod mysql;
pub mod registry;
pub mod script;

use std::collections::BTreeMap;
use std::fmt;

use crate::config::HostConfig;
use crate::context::TaskContext;

pub use files::FilesCapability;
pub use git::GitCapability;
pub use mysql::MysqlCapability;
pub use registry::CapabilityRegistry;
pub use script::ScriptCapability;

/// Handler signature for one task of capability `C`.
pub type TaskHandler<C> = fn(&C, &HostConfig, &mut TaskContext) -> anyhow::Result<()>;

/// Task name to handler map for one capability type.
pub struct TaskTable<C> {
    handlers: BTreeMap<&'static str, TaskHandler<C>>,
}

impl<C> Default for TaskTable<C> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<C> fmt::Debug for TaskTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl<C> TaskTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, task: &'static str, handler: TaskHandler<C>) -> Self {
        self.handlers.insert(task, handler);
        self
    }

    pub fn contains(&self, task: &str) -> bool {
        self.handlers.contains_key(task)
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().map(|k| k.to_string()).collect()
    }

    /// Run the handler registered for `task` on `owner`.
    pub fn call(
        &self,
        owner: &C,
        task: &str,
        host: &HostConfig,
        ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        match self.handlers.get(task) {
            Some(handler) => handler(owner, host, ctx),
            None => anyhow::bail!("no handler for task '{}'", task),
        }
    }
}

/// A named, pluggable unit of task handlers.
///
/// Capabilities are registered once and shared across tasks; any cache they
/// keep must live in the instance.
pub trait Capability: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Whether this capability answers to `name` in a needs list.
    fn supports(&self, name: &str) -> bool {
        name == self.name()
    }

    /// Name of the capability whose identically named handlers this one replaces.
    fn overrides(&self) -> Option<&str> {
        None
    }

    /// One-line summary for listings.
    fn description(&self) -> &str {
        ""
    }

    fn handles(&self, task: &str) -> bool;

    fn handle(&self, task: &str, host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()>;

    fn task_names(&self) -> Vec<String>;

    fn preflight(
        &self,
        _task: &str,
        _host: &HostConfig,
        _ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn postflight(
        &self,
        _task: &str,
        _host: &HostConfig,
        _ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Invoked when no needed capability handled a task's primary phase.
    fn fallback(
        &self,
        _task: &str,
        _host: &HostConfig,
        _ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Shared helpers for the built-in capabilities.
pub(crate) mod support {
    use anyhow::Context;
    use chrono::Local;

    use crate::config::HostConfig;
    use crate::context::TaskContext;
    use crate::shell::{Shell, in_dir, lock_shell};

    /// Run `lines` one after another in `dir`, stopping at the first failure.
    pub(crate) fn run_lines(
        host: &HostConfig,
        ctx: &TaskContext,
        dir: &str,
        lines: &[String],
    ) -> anyhow::Result<()> {
        with_shell_in(host, ctx, dir, |shell| {
            for line in lines {
                shell
                    .run(line)
                    .with_context(|| format!("'{}' failed on {}", line, host.config_name))?;
            }
            Ok(())
        })
    }

    /// Lock the host's session and run `f` with `dir` pushed.
    pub(crate) fn with_shell_in<T>(
        host: &HostConfig,
        ctx: &TaskContext,
        dir: &str,
        f: impl FnOnce(&mut dyn Shell) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let shared = ctx
            .shell_for(host)
            .with_context(|| format!("Failed to open a shell on {}", host.config_name))?;
        let mut shell = lock_shell(&shared);
        let mut scoped = in_dir(&mut **shell, dir);
        f(&mut *scoped)
    }

    /// Timestamp used in artifact file names.
    pub(crate) fn timestamp() -> String {
        Local::now().format("%Y-%m-%d--%H-%M-%S").to_string()
    }

    pub(crate) fn tmp_path(host: &HostConfig, suffix: &str) -> String {
        format!(
            "{}/{}--{}",
            host.tmp_folder.trim_end_matches('/'),
            host.config_name,
            suffix
        )
    }
}
