//! Task lifecycle ordering, overrides and fallback broadcast.

use rigger_core::capability::{Capability, CapabilityRegistry};
use rigger_core::config::HostConfig;
use rigger_core::context::TaskContext;
use rigger_core::error::TaskError;
use serde_json::Value;

/// Logs every call into result `log` as `name:event`.
#[derive(Debug)]
struct Recorder {
    name: &'static str,
    tasks: &'static [&'static str],
    overrides: Option<&'static str>,
    fail_on: Option<&'static str>,
}

impl Recorder {
    fn new(name: &'static str, tasks: &'static [&'static str]) -> Self {
        Self {
            name,
            tasks,
            overrides: None,
            fail_on: None,
        }
    }

    fn overriding(mut self, name: &'static str) -> Self {
        self.overrides = Some(name);
        self
    }

    fn failing_on(mut self, task: &'static str) -> Self {
        self.fail_on = Some(task);
        self
    }

    fn log(&self, ctx: &mut TaskContext, event: &str) {
        ctx.add_result("log", format!("{}:{}", self.name, event));
    }
}

impl Capability for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn overrides(&self) -> Option<&str> {
        self.overrides
    }

    fn handles(&self, task: &str) -> bool {
        self.tasks.contains(&task)
    }

    fn handle(&self, task: &str, _host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        self.log(ctx, task);
        if self.fail_on == Some(task) {
            anyhow::bail!("{} refused {}", self.name, task);
        }
        Ok(())
    }

    fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.to_string()).collect()
    }

    fn preflight(&self, task: &str, _host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        self.log(ctx, &format!("preflight({})", task));
        Ok(())
    }

    fn postflight(&self, task: &str, _host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        self.log(ctx, &format!("postflight({})", task));
        Ok(())
    }

    fn fallback(&self, task: &str, _host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        self.log(ctx, &format!("fallback({})", task));
        Ok(())
    }
}

fn log(ctx: &TaskContext) -> Vec<String> {
    match ctx.get_result("log") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

#[test]
fn test_phases_run_in_order_across_needs() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Recorder::new("a", &["deployPrepare", "deploy", "deployFinished"]));
    registry.register(Recorder::new("b", &["deploy", "warmup"]));
    let host = HostConfig::new("stage", &["a", "b"]);
    let mut ctx = TaskContext::default();

    registry
        .run_task("deploy", &host, &mut ctx, &["warmup".to_string()])
        .unwrap();

    assert_eq!(
        log(&ctx),
        [
            "a:preflight(deploy)",
            "b:preflight(deploy)",
            "a:deployPrepare",
            "a:deploy",
            "b:deploy",
            "a:preflight(warmup)",
            "b:preflight(warmup)",
            "b:warmup",
            "a:postflight(warmup)",
            "b:postflight(warmup)",
            "a:deployFinished",
            "a:postflight(deploy)",
            "b:postflight(deploy)",
        ]
    );
}

#[test]
fn test_needs_order_decides_invocation_order() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Recorder::new("a", &["deploy"]));
    registry.register(Recorder::new("b", &["deploy"]));
    let host = HostConfig::new("stage", &["b", "a"]);
    let mut ctx = TaskContext::default();

    registry.run_task("deploy", &host, &mut ctx, &[]).unwrap();

    let handlers: Vec<String> = log(&ctx)
        .into_iter()
        .filter(|l| l.ends_with(":deploy"))
        .collect();
    assert_eq!(handlers, ["b:deploy", "a:deploy"]);
}

#[test]
fn test_override_replaces_handler() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Recorder::new("database", &["backup", "restore"]));
    registry.register(Recorder::new("custom", &["backup"]).overriding("database"));
    let host = HostConfig::new("stage", &["database", "custom"]);
    let mut ctx = TaskContext::default();

    registry.run_task("backup", &host, &mut ctx, &[]).unwrap();
    let handlers: Vec<String> = log(&ctx)
        .into_iter()
        .filter(|l| l.ends_with(":backup"))
        .collect();
    // custom runs once in place of database and once for itself
    assert_eq!(handlers, ["custom:backup", "custom:backup"]);

    ctx.clear_results();
    registry.run_task("restore", &host, &mut ctx, &[]).unwrap();
    assert!(log(&ctx).contains(&"database:restore".to_string()));
}

#[test]
fn test_fallback_is_broadcast_when_unhandled() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Recorder::new("a", &["deploy"]));
    registry.register(Recorder::new("b", &[]));
    let host = HostConfig::new("stage", &["a", "b"]);
    let mut ctx = TaskContext::default();

    registry.run_task("cacheClear", &host, &mut ctx, &[]).unwrap();

    assert_eq!(
        log(&ctx),
        [
            "a:preflight(cacheClear)",
            "b:preflight(cacheClear)",
            "a:fallback(cacheClear)",
            "b:fallback(cacheClear)",
            "a:postflight(cacheClear)",
            "b:postflight(cacheClear)",
        ]
    );
}

#[test]
fn test_prepare_and_finished_never_fall_back() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Recorder::new("a", &["deploy"]));
    let host = HostConfig::new("stage", &["a"]);
    let mut ctx = TaskContext::default();

    registry.run_task("deploy", &host, &mut ctx, &[]).unwrap();
    assert!(!log(&ctx).iter().any(|l| l.contains("fallback")));
}

#[test]
fn test_unknown_capability_aborts_before_preflight() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Recorder::new("a", &["deploy"]));
    let host = HostConfig::new("stage", &["a", "drush"]);
    let mut ctx = TaskContext::default();

    let err = registry.run_task("deploy", &host, &mut ctx, &[]).unwrap_err();
    assert!(matches!(err, TaskError::CapabilityNotFound(ref name) if name == "drush"));
    assert!(log(&ctx).is_empty());
}

#[test]
fn test_handler_error_stops_pipeline() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Recorder::new("a", &["deploy"]).failing_on("deploy"));
    registry.register(Recorder::new("b", &["deploy"]));
    let host = HostConfig::new("stage", &["a", "b"]);
    let mut ctx = TaskContext::default();

    let err = registry.run_task("deploy", &host, &mut ctx, &[]).unwrap_err();
    assert!(matches!(err, TaskError::Failed(_)));
    assert!(err.to_string().contains("a refused deploy"));

    let entries = log(&ctx);
    assert_eq!(entries.last().unwrap(), "a:deploy");
    assert!(!entries.iter().any(|l| l.starts_with("b:deploy")));
    assert!(!entries.iter().any(|l| l.contains("postflight")));
}
