//! Per-invocation state threaded through every capability handler.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{HostConfig, Settings};
use crate::error::ShellError;
use crate::output::Output;
use crate::shell::{SharedShell, ShellFactory};

/// Source of credentials referenced by name from host descriptors.
pub trait SecretResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Reads `RIGGER_SECRET_<NAME>` from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl EnvSecrets {
    pub fn variable_name(name: &str) -> String {
        let normalized: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("RIGGER_SECRET_{}", normalized)
    }
}

impl SecretResolver for EnvSecrets {
    fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(Self::variable_name(name)).ok()
    }
}

/// Fixed secrets, mostly for tests.
#[derive(Debug, Default, Clone)]
pub struct StaticSecrets {
    values: BTreeMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl SecretResolver for StaticSecrets {
    fn resolve(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Two tiers of state plus the collaborators handlers need.
///
/// `data` is scratch space, last write wins. `results` are published
/// outcomes: they survive nested `run_task` calls until cleared, and
/// [`TaskContext::add_result`] appends instead of overwriting.
///
/// Cloning is shallow: collaborators are shared, the maps are copied, so a
/// clone's later writes stay local until merged back with
/// [`TaskContext::merge_results`].
#[derive(Debug, Clone)]
pub struct TaskContext {
    data: BTreeMap<String, Value>,
    results: BTreeMap<String, Value>,
    output: Output,
    shell: Option<SharedShell>,
    shells: Arc<ShellFactory>,
    secrets: Arc<dyn SecretResolver>,
    settings: Arc<Settings>,
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new(Output::quiet())
    }
}

impl TaskContext {
    pub fn new(output: Output) -> Self {
        Self {
            data: BTreeMap::new(),
            results: BTreeMap::new(),
            shells: Arc::new(ShellFactory::new(output.clone())),
            output,
            shell: None,
            secrets: Arc::new(EnvSecrets),
            settings: Arc::new(Settings::default()),
        }
    }

    pub fn with_shell_factory(mut self, shells: Arc<ShellFactory>) -> Self {
        self.shells = shells;
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretResolver>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    // Data tier

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// String value of a data key, if it holds one.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    // Results tier

    pub fn get_result(&self, key: &str) -> Option<&Value> {
        self.results.get(key)
    }

    pub fn set_result(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.results.insert(key.into(), value.into());
    }

    /// Append `value` under `key`; a scalar already stored there becomes the
    /// first element of the array.
    pub fn add_result(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        match self.results.entry(key.into()) {
            Entry::Vacant(slot) => {
                slot.insert(Value::Array(vec![value]));
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(items) => items.push(value),
                existing => {
                    let old = existing.take();
                    *existing = Value::Array(vec![old, value]);
                }
            },
        }
    }

    pub fn results(&self) -> &BTreeMap<String, Value> {
        &self.results
    }

    pub fn clear_results(&mut self) {
        self.results.clear();
    }

    /// Fold a clone's results back in.
    ///
    /// Arrays append the entries the clone added after it was taken (or all of
    /// them when the histories diverged); other values overwrite.
    pub fn merge_results(&mut self, other: &TaskContext) {
        for (key, theirs) in &other.results {
            let mut slot = match self.results.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(theirs.clone());
                    continue;
                }
                Entry::Occupied(slot) => slot,
            };
            match (slot.get_mut(), theirs) {
                (Value::Array(ours), Value::Array(items)) => {
                    let skip = if items.starts_with(ours) { ours.len() } else { 0 };
                    ours.extend(items[skip..].iter().cloned());
                }
                (ours, Value::Array(items)) => {
                    let mut merged = vec![ours.take()];
                    merged.extend(items.iter().cloned());
                    *ours = Value::Array(merged);
                }
                (ours, value) => *ours = value.clone(),
            }
        }
    }

    // Collaborators

    pub fn output(&self) -> &Output {
        &self.output
    }

    /// The session explicitly attached to this context, if any.
    pub fn shell(&self) -> Option<SharedShell> {
        self.shell.clone()
    }

    pub fn set_shell(&mut self, shell: SharedShell) {
        self.shell = Some(shell);
    }

    pub fn clear_shell(&mut self) {
        self.shell = None;
    }

    /// The attached session, or the factory's cached one for `host`.
    pub fn shell_for(&self, host: &HostConfig) -> Result<SharedShell, ShellError> {
        match &self.shell {
            Some(shell) => Ok(shell.clone()),
            None => self.shells.session_for(host),
        }
    }

    pub fn shells(&self) -> &ShellFactory {
        &self.shells
    }

    pub fn secrets(&self) -> &dyn SecretResolver {
        self.secrets.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{DryRunShell, ShellState, lock_shell, share};
    use serde_json::json;

    #[test]
    fn test_data_is_last_write_wins() {
        let mut ctx = TaskContext::default();
        ctx.set("branch", "main");
        ctx.set("branch", "release");
        assert_eq!(ctx.get_str("branch"), Some("release"));
        assert!(ctx.get("missing").is_none());
    }

    #[test]
    fn test_add_result_appends() {
        let mut ctx = TaskContext::default();
        ctx.add_result("files", json!({"type": "database"}));
        ctx.add_result("files", json!({"type": "files"}));
        assert_eq!(
            ctx.get_result("files"),
            Some(&json!([{"type": "database"}, {"type": "files"}]))
        );
    }

    #[test]
    fn test_add_result_wraps_existing_scalar() {
        let mut ctx = TaskContext::default();
        ctx.set_result("exit_code", 0);
        ctx.add_result("exit_code", 2);
        assert_eq!(ctx.get_result("exit_code"), Some(&json!([0, 2])));
    }

    #[test]
    fn test_clear_results_keeps_data() {
        let mut ctx = TaskContext::default();
        ctx.set("file", "dump.sql");
        ctx.set_result("version", "1.0");
        ctx.clear_results();
        assert!(ctx.results().is_empty());
        assert_eq!(ctx.get_str("file"), Some("dump.sql"));
    }

    #[test]
    fn test_clone_isolates_until_merged() {
        let mut ctx = TaskContext::default();
        ctx.add_result("files", "a.sql");

        let mut nested = ctx.clone();
        nested.add_result("files", "b.tgz");
        nested.set_result("version", "2.0");
        nested.set("scratch", true);
        assert_eq!(ctx.get_result("files"), Some(&json!(["a.sql"])));

        ctx.merge_results(&nested);
        assert_eq!(ctx.get_result("files"), Some(&json!(["a.sql", "b.tgz"])));
        assert_eq!(ctx.get_result("version"), Some(&json!("2.0")));
        assert!(ctx.get("scratch").is_none());
    }

    #[test]
    fn test_clone_shares_attached_shell() {
        let mut ctx = TaskContext::default();
        ctx.set_shell(share(Box::new(DryRunShell::new(ShellState::new("/")))));

        let nested = ctx.clone();
        if let Some(shell) = nested.shell() {
            lock_shell(&shell).run("ls").unwrap();
        }
        let shell = ctx.shell().unwrap();
        assert_eq!(lock_shell(&shell).recorded_commands().unwrap().len(), 1);
    }

    #[test]
    fn test_shell_for_falls_back_to_factory() {
        let ctx = TaskContext::default()
            .with_shell_factory(Arc::new(ShellFactory::new(Output::quiet()).with_dry_run(true)));
        let host = HostConfig::new("dev", &[]);
        let shell = ctx.shell_for(&host).unwrap();
        assert_eq!(lock_shell(&shell).provider(), "dry-run");
    }

    #[test]
    fn test_secret_resolvers() {
        assert_eq!(EnvSecrets::variable_name("db.prod-pass"), "RIGGER_SECRET_DB_PROD_PASS");

        let ctx = TaskContext::default()
            .with_secrets(Arc::new(StaticSecrets::new().with("db", "hunter2")));
        assert_eq!(ctx.secrets().resolve("db").as_deref(), Some("hunter2"));
        assert!(ctx.secrets().resolve("other").is_none());
    }
}
