//! Capability registry and the task lifecycle runner.
//!
//! `run_task` drives one task through six phases, each walking the host's
//! needs list in declared order:
//!
//! 1. preflight on every capability
//! 2. `<task>Prepare`
//! 3. `<task>`, with fallback broadcast when nothing handles it
//! 4. each next task as its own full lifecycle
//! 5. `<task>Finished`
//! 6. postflight on every capability

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::HostConfig;
use crate::context::TaskContext;
use crate::error::TaskError;

use super::{Capability, FilesCapability, GitCapability, MysqlCapability, ScriptCapability};

/// Registry of available capabilities.
///
/// Name resolution is cached per registry instance. The cache is not
/// synchronized; a registry is driven from one thread.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    capabilities: Vec<Arc<dyn Capability>>,
    resolved: RefCell<HashMap<String, Arc<dyn Capability>>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in capabilities.
    pub fn with_default_capabilities() -> Self {
        let mut registry = Self::new();
        registry.register(ScriptCapability::new());
        registry.register(GitCapability::new());
        registry.register(MysqlCapability::new());
        registry.register(FilesCapability::new());
        registry
    }

    /// Register a capability. Earlier registrations win on name clashes.
    pub fn register(&mut self, capability: impl Capability + 'static) {
        self.register_arc(Arc::new(capability));
    }

    pub fn register_arc(&mut self, capability: Arc<dyn Capability>) {
        tracing::debug!(capability = capability.name(), "registering capability");
        self.capabilities.push(capability);
        self.resolved.borrow_mut().clear();
    }

    /// All registered capabilities, in registration order.
    pub fn all(&self) -> &[Arc<dyn Capability>] {
        &self.capabilities
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    /// Find the capability answering to `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Capability>, TaskError> {
        if let Some(capability) = self.resolved.borrow().get(name) {
            return Ok(capability.clone());
        }

        let capability = self
            .capabilities
            .iter()
            .find(|c| c.supports(name))
            .cloned()
            .ok_or_else(|| TaskError::CapabilityNotFound(name.to_string()))?;

        self.resolved
            .borrow_mut()
            .insert(name.to_string(), capability.clone());
        Ok(capability)
    }

    /// Run `task` and its `next_tasks` on `host`.
    ///
    /// Every needed capability is resolved before the first phase, so an
    /// unknown name aborts before anything runs. Handler errors are returned
    /// as-is in [`TaskError::Failed`].
    pub fn run_task(
        &self,
        task: &str,
        host: &HostConfig,
        ctx: &mut TaskContext,
        next_tasks: &[String],
    ) -> Result<(), TaskError> {
        tracing::info!(task, host = %host.config_name, "running task");

        let needs = host
            .needs
            .iter()
            .map(|name| self.resolve(name))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(task, phase = "preflight", "phase");
        for capability in &needs {
            capability.preflight(task, host, ctx)?;
        }

        self.dispatch(&format!("{}Prepare", task), host, ctx, &needs, false)?;
        self.dispatch(task, host, ctx, &needs, true)?;

        for next in next_tasks {
            self.run_task(next, host, ctx, &[])?;
        }

        self.dispatch(&format!("{}Finished", task), host, ctx, &needs, false)?;

        tracing::debug!(task, phase = "postflight", "phase");
        for capability in &needs {
            capability.postflight(task, host, ctx)?;
        }

        tracing::info!(task, host = %host.config_name, "task finished");
        Ok(())
    }

    /// Run handler `phase` on every capability that has one.
    ///
    /// Returns whether any capability handled it. With `fallback_allowed`, an
    /// unhandled phase is broadcast to every capability's fallback.
    fn dispatch(
        &self,
        phase: &str,
        host: &HostConfig,
        ctx: &mut TaskContext,
        needs: &[Arc<dyn Capability>],
        fallback_allowed: bool,
    ) -> Result<bool, TaskError> {
        tracing::debug!(phase, "dispatch");
        let overrides = override_map(needs);
        let mut handled = false;

        for capability in needs {
            if !capability.handles(phase) {
                continue;
            }
            handled = true;

            let target = match overrides.get(capability.name()) {
                Some(&replacement) if replacement.handles(phase) => {
                    tracing::debug!(
                        phase,
                        original = capability.name(),
                        replacement = replacement.name(),
                        "handler overridden"
                    );
                    replacement
                }
                Some(&replacement) => {
                    tracing::debug!(
                        phase,
                        original = capability.name(),
                        replacement = replacement.name(),
                        "overriding capability has no handler, keeping original"
                    );
                    capability
                }
                None => capability,
            };
            target.handle(phase, host, ctx)?;
        }

        if !handled && fallback_allowed {
            tracing::debug!(phase, "no handler, broadcasting fallback");
            for capability in needs {
                capability.fallback(phase, host, ctx)?;
            }
        }
        Ok(handled)
    }
}

/// overridden name -> overriding capability, over the needed capabilities.
fn override_map(needs: &[Arc<dyn Capability>]) -> HashMap<&str, &Arc<dyn Capability>> {
    needs
        .iter()
        .filter_map(|c| {
            c.overrides()
                .filter(|overridden| *overridden != c.name())
                .map(|overridden| (overridden, c))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::TaskTable;

    #[derive(Debug)]
    struct Named {
        name: &'static str,
        aliases: &'static [&'static str],
        tasks: TaskTable<Named>,
    }

    impl Named {
        fn new(name: &'static str, aliases: &'static [&'static str]) -> Self {
            Self {
                name,
                aliases,
                tasks: TaskTable::new(),
            }
        }
    }

    impl Capability for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn supports(&self, name: &str) -> bool {
            name == self.name || self.aliases.contains(&name)
        }

        fn handles(&self, task: &str) -> bool {
            self.tasks.contains(task)
        }

        fn handle(
            &self,
            task: &str,
            host: &HostConfig,
            ctx: &mut TaskContext,
        ) -> anyhow::Result<()> {
            self.tasks.call(self, task, host, ctx)
        }

        fn task_names(&self) -> Vec<String> {
            self.tasks.names()
        }
    }

    #[test]
    fn test_default_capabilities_registered() {
        let registry = CapabilityRegistry::with_default_capabilities();
        let names = registry.names();
        assert!(names.contains(&"script"));
        assert!(names.contains(&"git"));
        assert!(names.contains(&"mysql"));
        assert!(names.contains(&"files"));
    }

    #[test]
    fn test_resolve_by_alias_is_cached() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Named::new("mysql", &["mariadb"]));

        let first = registry.resolve("mariadb").unwrap();
        let second = registry.resolve("mariadb").unwrap();
        assert_eq!(first.name(), "mysql");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.resolved.borrow().len(), 1);
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = CapabilityRegistry::new();
        let err = registry.resolve("drush").unwrap_err();
        assert!(matches!(err, TaskError::CapabilityNotFound(name) if name == "drush"));
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Named::new("db", &[]));
        registry.register(Named::new("db-alt", &["db"]));
        assert_eq!(registry.resolve("db").unwrap().name(), "db");
    }

    #[test]
    fn test_override_map_ignores_self_override() {
        #[derive(Debug)]
        struct SelfOverride;

        impl Capability for SelfOverride {
            fn name(&self) -> &str {
                "loop"
            }
            fn overrides(&self) -> Option<&str> {
                Some("loop")
            }
            fn handles(&self, _task: &str) -> bool {
                false
            }
            fn handle(&self, _: &str, _: &HostConfig, _: &mut TaskContext) -> anyhow::Result<()> {
                Ok(())
            }
            fn task_names(&self) -> Vec<String> {
                Vec::new()
            }
        }

        let needs: Vec<Arc<dyn Capability>> = vec![Arc::new(SelfOverride)];
        assert!(override_map(&needs).is_empty());
    }
}
