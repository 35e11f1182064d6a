//! Runs the per-task command lists from a host's `scripts` table.

use anyhow::Context;

use crate::config::HostConfig;
use crate::context::TaskContext;

use super::support::run_lines;
use super::{Capability, TaskTable};

#[derive(Debug)]
pub struct ScriptCapability {
    tasks: TaskTable<ScriptCapability>,
}

impl Default for ScriptCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptCapability {
    pub fn new() -> Self {
        Self {
            tasks: TaskTable::<ScriptCapability>::new()
                .with("deploy", |c, host, ctx| c.run_named("deploy", host, ctx))
                .with("install", |c, host, ctx| c.run_named("install", host, ctx))
                .with("reset", |c, host, ctx| c.run_named("reset", host, ctx))
                .with("runScript", Self::run_script),
        }
    }

    /// Run `scripts[task]` if the host defines it.
    fn run_named(
        &self,
        task: &str,
        host: &HostConfig,
        ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        match host.scripts.get(task) {
            Some(lines) => self.execute(task, lines, host, ctx),
            None => {
                tracing::debug!(task, host = %host.config_name, "no script defined");
                Ok(())
            }
        }
    }

    fn run_script(&self, host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        let name = ctx
            .get_str("script")
            .context("runScript needs the script name in context data 'script'")?
            .to_string();
        let lines = host.scripts.get(&name).with_context(|| {
            format!("Script '{}' is not defined for host {}", name, host.config_name)
        })?;
        self.execute(&name, lines, host, ctx)
    }

    fn execute(
        &self,
        name: &str,
        lines: &[String],
        host: &HostConfig,
        ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        tracing::info!(script = name, host = %host.config_name, steps = lines.len(), "running script");
        let expanded: Vec<String> = lines.iter().map(|l| expand_line(l, host, ctx)).collect();
        run_lines(host, ctx, &host.root_folder, &expanded)
            .with_context(|| format!("Script '{}' failed", name))
    }
}

/// Substitute `%host.config_name%`, `%host.root_folder%` and `%<key>%` for
/// string-valued context data. Unknown placeholders are left alone.
pub fn expand_line(line: &str, host: &HostConfig, ctx: &TaskContext) -> String {
    let mut expanded = line
        .replace("%host.config_name%", &host.config_name)
        .replace("%host.root_folder%", &host.root_folder)
        .replace("%host.tmp_folder%", &host.tmp_folder);
    for (key, value) in ctx.data() {
        if let Some(value) = value.as_str() {
            expanded = expanded.replace(&format!("%{}%", key), value);
        }
    }
    expanded
}

impl Capability for ScriptCapability {
    fn name(&self) -> &str {
        "script"
    }

    fn description(&self) -> &str {
        "Runs the host's scripts table"
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

    /// Lets a host define tasks purely in its scripts table.
    fn fallback(
        &self,
        task: &str,
        host: &HostConfig,
        ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        match host.scripts.get(task) {
            Some(lines) => self.execute(task, lines, host, ctx),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{DryRunShell, ShellState, lock_shell, share};

    fn dry_context(root: &str) -> TaskContext {
        let mut ctx = TaskContext::default();
        ctx.set_shell(share(Box::new(DryRunShell::new(ShellState::new(root)))));
        ctx
    }

    fn recorded(ctx: &TaskContext) -> Vec<String> {
        let shell = ctx.shell().unwrap();
        let guard = lock_shell(&shell);
        guard.recorded_commands().unwrap().to_vec()
    }

    #[test]
    fn test_expand_line_placeholders() {
        let host = HostConfig::new("stage", &[]).with_root_folder("/srv/app");
        let mut ctx = TaskContext::default();
        ctx.set("branch", "release");
        ctx.set("count", 3);
        let line = "echo %host.config_name% %branch% %count% %host.root_folder%";
        assert_eq!(
            expand_line(line, &host, &ctx),
            "echo stage release %count% /srv/app"
        );
    }

    #[test]
    fn test_deploy_runs_script_lines_in_root() {
        let host = HostConfig::new("stage", &["script"])
            .with_root_folder("/srv/app")
            .with_script("deploy", &["composer install", "echo %host.config_name%"]);
        let mut ctx = dry_context("/");

        ScriptCapability::new().handle("deploy", &host, &mut ctx).unwrap();
        assert_eq!(
            recorded(&ctx),
            ["cd /srv/app && composer install", "cd /srv/app && echo stage"]
        );
    }

    #[test]
    fn test_missing_script_is_noop() {
        let host = HostConfig::new("stage", &["script"]);
        let mut ctx = dry_context("/");
        ScriptCapability::new().handle("reset", &host, &mut ctx).unwrap();
        assert!(recorded(&ctx).is_empty());
    }

    #[test]
    fn test_run_script_requires_name() {
        let host = HostConfig::new("stage", &["script"])
            .with_root_folder("/srv/app")
            .with_script("cache", &["rm -rf var/cache"]);
        let mut ctx = dry_context("/");
        let script = ScriptCapability::new();

        assert!(script.handle("runScript", &host, &mut ctx).is_err());

        ctx.set("script", "cache");
        script.handle("runScript", &host, &mut ctx).unwrap();
        assert_eq!(recorded(&ctx), ["cd /srv/app && rm -rf var/cache"]);
    }

    #[test]
    fn test_fallback_runs_matching_script() {
        let host = HostConfig::new("stage", &["script"])
            .with_root_folder("/srv/app")
            .with_script("warmup", &["curl -s localhost"]);
        let mut ctx = dry_context("/");
        let script = ScriptCapability::new();

        script.fallback("warmup", &host, &mut ctx).unwrap();
        script.fallback("unknown", &host, &mut ctx).unwrap();
        assert_eq!(recorded(&ctx), ["cd /srv/app && curl -s localhost"]);
    }
}
