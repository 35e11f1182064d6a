//! Task command implementation.
//!
//! Loads rigger.toml, builds the registry, shell factory and context for one
//! invocation and runs a task with its follow-up tasks.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;

use crate::capability::CapabilityRegistry;
use crate::config::{ConfigStore, HostConfig, HostType, RiggerConfig};
use crate::context::{EnvSecrets, SecretResolver, TaskContext};
use crate::output::Output;
use crate::shell::{InteractiveOptions, ShellFactory, lock_shell};

/// Options for running a task
#[derive(Debug, Clone)]
pub struct TaskOptions {
    /// Host config name
    pub host: String,
    /// Task name, e.g. `deploy`
    pub task: String,
    /// Tasks run between the task's execute and finish phases
    pub next_tasks: Vec<String>,
    /// Record commands instead of running them
    pub dry_run: bool,
    /// Initial context data
    pub data: BTreeMap<String, Value>,
}

impl TaskOptions {
    pub fn new(host: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            task: task.into(),
            next_tasks: Vec::new(),
            dry_run: false,
            data: BTreeMap::new(),
        }
    }

    pub fn with_next(mut self, task: impl Into<String>) -> Self {
        self.next_tasks.push(task.into());
        self
    }

    pub fn with_next_tasks(mut self, tasks: Vec<String>) -> Self {
        self.next_tasks = tasks;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Result of a task run
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub host: String,
    pub task: String,
    /// Results published by the capabilities
    pub results: BTreeMap<String, Value>,
    /// Commands a dry run would have executed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recorded_commands: Vec<String>,
}

impl TaskReport {
    /// argv published by a capability for an interactive follow-up.
    pub fn interactive_command(&self) -> Option<Vec<String>> {
        let argv = self.results.get("interactive_command")?.as_array()?;
        argv.iter()
            .map(|a| a.as_str().map(str::to_string))
            .collect()
    }
}

/// Listed host entry
#[derive(Debug, Clone, Serialize)]
pub struct HostSummary {
    pub name: String,
    pub provider: &'static str,
    pub host_type: HostType,
    pub needs: Vec<String>,
}

/// Listed capability entry
#[derive(Debug, Clone, Serialize)]
pub struct CapabilitySummary {
    pub name: String,
    pub description: String,
    pub tasks: Vec<String>,
}

/// Task command orchestrator
#[derive(Debug)]
pub struct TaskCommand {
    store: ConfigStore,
    registry: CapabilityRegistry,
    output: Output,
    secrets: Arc<dyn SecretResolver>,
}

impl TaskCommand {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store,
            registry: CapabilityRegistry::with_default_capabilities(),
            output: Output::stdout(),
            secrets: Arc::new(EnvSecrets),
        }
    }

    /// Create a task command using the discovered rigger.toml
    pub fn with_defaults() -> anyhow::Result<Self> {
        Ok(Self::new(ConfigStore::discover()?))
    }

    pub fn with_registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretResolver>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn config(&self) -> anyhow::Result<RiggerConfig> {
        self.store.load()
    }

    pub fn host(&self, name: &str) -> anyhow::Result<HostConfig> {
        Ok(self.config()?.host(name)?.clone())
    }

    /// Run a task and collect what it published.
    pub fn run(&self, options: &TaskOptions) -> anyhow::Result<TaskReport> {
        let config = self.config()?;
        let host = config.host(&options.host)?;

        let shells = Arc::new(ShellFactory::new(self.output.clone()).with_dry_run(options.dry_run));
        let mut ctx = TaskContext::new(self.output.clone())
            .with_shell_factory(shells.clone())
            .with_secrets(self.secrets.clone())
            .with_settings(config.settings.clone());
        for (key, value) in &options.data {
            ctx.set(key.clone(), value.clone());
        }

        let outcome = self
            .registry
            .run_task(&options.task, host, &mut ctx, &options.next_tasks)
            .with_context(|| format!("Task '{}' failed on {}", options.task, host.config_name));

        let recorded_commands = if options.dry_run {
            let shell = shells.session_for(host)?;
            let guard = lock_shell(&shell);
            guard.recorded_commands().map(<[String]>::to_vec).unwrap_or_default()
        } else {
            Vec::new()
        };
        shells.terminate_all();
        outcome?;

        Ok(TaskReport {
            host: host.config_name.clone(),
            task: options.task.clone(),
            results: ctx.results().clone(),
            recorded_commands,
        })
    }

    /// Run `argv` interactively on `host` and return its exit code.
    pub fn start_interactive(&self, host: &str, argv: &[String]) -> anyhow::Result<i32> {
        let host = self.host(host)?;
        let mut shell = ShellFactory::new(self.output.clone())
            .create(&host)
            .with_context(|| format!("Failed to open a shell on {}", host.config_name))?;
        let code = shell.start_interactive_process(argv, &InteractiveOptions::tty())?;
        shell.terminate();
        Ok(code)
    }

    /// Open the host's login shell interactively.
    pub fn open_shell(&self, host: &str) -> anyhow::Result<i32> {
        let config = self.host(host)?;
        let shell = ShellFactory::new(self.output.clone()).create(&config)?;
        let argv = shell
            .build_interactive_command(&[config.shell().to_string()], &InteractiveOptions::tty())
            .with_context(|| format!("Cannot open an interactive shell on {}", config.config_name))?;
        self.start_interactive(host, &argv)
    }

    pub fn hosts(&self) -> anyhow::Result<Vec<HostSummary>> {
        let config = self.config()?;
        Ok(config
            .hosts
            .values()
            .map(|h| HostSummary {
                name: h.config_name.clone(),
                provider: h.shell_provider.as_str(),
                host_type: h.host_type,
                needs: h.needs.clone(),
            })
            .collect())
    }

    pub fn capabilities(&self) -> Vec<CapabilitySummary> {
        self.registry
            .all()
            .iter()
            .map(|c| CapabilitySummary {
                name: c.name().to_string(),
                description: c.description().to_string(),
                tasks: c.task_names(),
            })
            .collect()
    }
}
