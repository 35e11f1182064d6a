//! `kubectl exec` against one pod of a namespace.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::{HostConfig, KubeConfig};
use crate::error::ShellError;
use crate::output::Output;

use super::exec::{run_argv, run_status};
use super::state::{join_quoted, shell_quote};
use super::{CommandResult, InteractiveOptions, RunOptions, Shell, ShellState, finish};

const PROVIDER: &str = "kubectl";

/// Pods are picked by explicit name or by label selector; a selector lookup
/// happens once per session and is cached.
#[derive(Debug)]
pub struct KubectlShell {
    state: ShellState,
    kube: KubeConfig,
    pod: OnceCell<String>,
}

impl KubectlShell {
    pub fn new(kube: KubeConfig, state: ShellState) -> Self {
        let pod = OnceCell::new();
        if let Some(name) = &kube.pod {
            let _ = pod.set(name.clone());
        }
        Self { state, kube, pod }
    }

    pub fn for_host(host: &HostConfig, output: Output) -> Result<Self, ShellError> {
        let kube = host
            .kube
            .clone()
            .ok_or_else(|| ShellError::transport(PROVIDER, "host has no [kube] settings"))?;
        Ok(Self::new(kube, ShellState::for_host(host, output)))
    }

    /// `kubectl [--context <ctx>] -n <namespace>`
    fn base_argv(&self) -> Vec<String> {
        let mut argv = vec![self.state.executable("kubectl").to_string()];
        if let Some(context) = &self.kube.context {
            argv.push("--context".to_string());
            argv.push(context.clone());
        }
        argv.push("-n".to_string());
        argv.push(self.kube.namespace.clone());
        argv
    }

    pub fn pod_lookup_argv(&self) -> Vec<String> {
        let mut argv = self.base_argv();
        argv.extend([
            "get".to_string(),
            "pods".to_string(),
            "-l".to_string(),
            self.kube.selector.join(","),
            "-o".to_string(),
            "jsonpath={.items[0].metadata.name}".to_string(),
        ]);
        argv
    }

    /// Name of the pod commands are sent to.
    pub fn pod(&self) -> Result<&str, ShellError> {
        if let Some(pod) = self.pod.get() {
            return Ok(pod.as_str());
        }

        let result = run_argv(PROVIDER, &self.pod_lookup_argv())?;
        let name = result
            .first_line()
            .map(str::trim)
            .filter(|name| result.succeeded() && !name.is_empty())
            .ok_or_else(|| {
                ShellError::transport(
                    PROVIDER,
                    format!(
                        "no pod in namespace '{}' matches selector '{}'",
                        self.kube.namespace,
                        self.kube.selector.join(",")
                    ),
                )
            })?
            .to_string();

        tracing::debug!(provider = PROVIDER, pod = %name, "selected pod");
        Ok(self.pod.get_or_init(|| name).as_str())
    }

    /// `kubectl … exec [-i [-t]] <pod> [-c <container>] -- [env K=V…] <shell> -c <prepared>`
    pub fn exec_argv(
        &self,
        prepared: &str,
        interactive: Option<&InteractiveOptions>,
    ) -> Result<Vec<String>, ShellError> {
        let mut argv = self.base_argv();
        argv.push("exec".to_string());
        if let Some(options) = interactive {
            argv.push("-i".to_string());
            if options.tty {
                argv.push("-t".to_string());
            }
        }
        argv.push(self.pod()?.to_string());
        if let Some(container) = &self.kube.container {
            argv.push("-c".to_string());
            argv.push(container.clone());
        }
        argv.push("--".to_string());
        if !self.state.environment().is_empty() {
            argv.push("env".to_string());
            for (key, value) in self.state.environment() {
                argv.push(format!("{}={}", key, value));
            }
        }
        argv.push(self.kube.shell.clone());
        argv.push("-c".to_string());
        argv.push(prepared.to_string());
        Ok(argv)
    }

    fn copy_argv(&self, from: &str, to: &str) -> Vec<String> {
        let mut argv = self.base_argv();
        argv.extend(["cp".to_string(), from.to_string(), to.to_string()]);
        if let Some(container) = &self.kube.container {
            argv.push("-c".to_string());
            argv.push(container.clone());
        }
        argv
    }

    fn pod_path(&self, path: &str) -> Result<String, ShellError> {
        let absolute = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", self.state.working_dir().trim_end_matches('/'), path)
        };
        Ok(format!("{}:{}", self.pod()?, absolute))
    }
}

impl Shell for KubectlShell {
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
        tracing::debug!(provider = PROVIDER, namespace = %self.kube.namespace, command = %prepared, "run");
        let result = run_argv(PROVIDER, &self.exec_argv(&prepared, None)?)?;
        finish(&self.state, &prepared, result, options)
    }

    fn exists(&mut self, path: &str) -> Result<bool, ShellError> {
        let probe = format!("stat {} > /dev/null 2>&1", shell_quote(path));
        Ok(self.capture(&probe)?.succeeded())
    }

    fn get_file(&mut self, remote: &str, local: &Path) -> Result<bool, ShellError> {
        let argv = self.copy_argv(&self.pod_path(remote)?, &local.to_string_lossy());
        run_status(PROVIDER, &argv)
    }

    fn put_file(&mut self, local: &Path, remote: &str) -> Result<bool, ShellError> {
        let argv = self.copy_argv(&local.to_string_lossy(), &self.pod_path(remote)?);
        run_status(PROVIDER, &argv)
    }

    fn apply_environment(&mut self, env: &BTreeMap<String, String>) -> Result<(), ShellError> {
        self.state.merge_environment(env);
        Ok(())
    }

    fn build_interactive_command(
        &self,
        program: &[String],
        options: &InteractiveOptions,
    ) -> Result<Vec<String>, ShellError> {
        let prepared = self.state.prepare(&join_quoted(program));
        self.exec_argv(&prepared, Some(options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kube() -> KubeConfig {
        KubeConfig {
            namespace: "shop".to_string(),
            context: Some("prod-eu".to_string()),
            pod: Some("web-7f9c".to_string()),
            selector: vec!["app=web".to_string(), "tier=php".to_string()],
            container: Some("php".to_string()),
            shell: "sh".to_string(),
        }
    }

    #[test]
    fn test_exec_argv_with_explicit_pod() {
        let shell = KubectlShell::new(kube(), ShellState::new("/var/www"));
        let argv = shell.exec_argv("cd /var/www && ls", None).unwrap();
        assert_eq!(
            argv,
            vec![
                "kubectl",
                "--context",
                "prod-eu",
                "-n",
                "shop",
                "exec",
                "web-7f9c",
                "-c",
                "php",
                "--",
                "sh",
                "-c",
                "cd /var/www && ls"
            ]
        );
    }

    #[test]
    fn test_exec_argv_exports_environment_via_env() {
        let mut env = BTreeMap::new();
        env.insert("APP_ENV".to_string(), "prod".to_string());
        let mut shell = KubectlShell::new(kube(), ShellState::new("/"));
        shell.apply_environment(&env).unwrap();

        let argv = shell
            .build_interactive_command(&["bash".to_string()], &InteractiveOptions::tty())
            .unwrap();
        let dashes = argv.iter().position(|a| a == "--").unwrap();
        assert_eq!(argv[dashes + 1..dashes + 3], ["env", "APP_ENV=prod"]);
        assert!(argv.contains(&"-t".to_string()));
    }

    #[test]
    fn test_pod_lookup_joins_selectors() {
        let shell = KubectlShell::new(
            KubeConfig {
                pod: None,
                ..kube()
            },
            ShellState::new("/"),
        );
        let argv = shell.pod_lookup_argv();
        assert!(argv.windows(2).any(|w| w == ["-l", "app=web,tier=php"]));
        assert_eq!(argv.last().unwrap(), "jsonpath={.items[0].metadata.name}");
    }

    #[test]
    fn test_pod_path_uses_pod_name() {
        let shell = KubectlShell::new(kube(), ShellState::new("/var/www"));
        assert_eq!(shell.pod_path("dump.sql").unwrap(), "web-7f9c:/var/www/dump.sql");
    }
}
