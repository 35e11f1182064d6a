//! Configuration schema for rigger.toml
//!
//! A file holds global `[settings]` and any number of `[hosts.<name>]`
//! descriptors. Hosts are consumed read-only by the dispatch engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration structure for rigger.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RiggerConfig {
    /// Settings shared by every host
    #[serde(default)]
    pub settings: Settings,

    /// Host descriptors keyed by config name
    #[serde(default)]
    pub hosts: BTreeMap<String, HostConfig>,
}

impl RiggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill derived fields after deserialization.
    ///
    /// Copies each table key into `config_name` and merges the default
    /// executables table under every host's own table.
    pub fn normalize(&mut self) {
        for (name, host) in self.hosts.iter_mut() {
            host.config_name = name.clone();
            for (logical, path) in &self.settings.executables {
                host.executables
                    .entry(logical.clone())
                    .or_insert_with(|| path.clone());
            }
            if host.shell_executable.is_none() {
                host.shell_executable = self.settings.shell_executable.clone();
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for host in self.hosts.values() {
            host.validate()?;
        }
        Ok(())
    }

    /// Look up a host by config name.
    pub fn host(&self, name: &str) -> anyhow::Result<&HostConfig> {
        self.hosts.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.hosts.keys().map(|k| k.as_str()).collect();
            anyhow::anyhow!(
                "Host '{}' not found. Known hosts: {}",
                name,
                if known.is_empty() {
                    "(none)".to_string()
                } else {
                    known.join(", ")
                }
            )
        })
    }
}

/// Settings shared by all hosts
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Default logical-name -> path table, host tables win on conflict
    #[serde(default)]
    pub executables: BTreeMap<String, String>,

    /// Default shell for hosts that do not set one
    #[serde(default)]
    pub shell_executable: Option<String>,
}

/// Transport used to reach a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ShellProviderKind {
    #[default]
    Local,
    Ssh,
    DockerExec,
    DockerExecOverSsh,
    Kubectl,
    DryRun,
}

impl ShellProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Ssh => "ssh",
            Self::DockerExec => "docker-exec",
            Self::DockerExecOverSsh => "docker-exec-over-ssh",
            Self::Kubectl => "kubectl",
            Self::DryRun => "dry-run",
        }
    }
}

/// Environment class of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HostType {
    #[default]
    Dev,
    Stage,
    Prod,
}

/// Declarative description of one target environment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Filled from the `[hosts.<name>]` key
    #[serde(skip)]
    pub config_name: String,

    /// Ordered capability names; order decides invocation order
    #[serde(default)]
    pub needs: Vec<String>,

    #[serde(default)]
    pub shell_provider: ShellProviderKind,

    #[serde(default)]
    pub host_type: HostType,

    /// Starting working directory for every shell session
    #[serde(default = "default_root_folder")]
    pub root_folder: String,

    #[serde(default = "default_tmp_folder")]
    pub tmp_folder: String,

    /// Shell program spawned by persistent sessions
    #[serde(default)]
    pub shell_executable: Option<String>,

    /// Logical name -> path for `#!name` expansion
    #[serde(default)]
    pub executables: BTreeMap<String, String>,

    /// Variables exported into every shell session
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Task name -> commands, run by the script capability
    #[serde(default)]
    pub scripts: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub files_folder: Option<String>,

    #[serde(default)]
    pub ssh: Option<SshConfig>,

    #[serde(default)]
    pub docker: Option<DockerConfig>,

    #[serde(default)]
    pub kube: Option<KubeConfig>,

    #[serde(default)]
    pub git: Option<GitConfig>,

    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

fn default_root_folder() -> String {
    ".".to_string()
}

fn default_tmp_folder() -> String {
    "/tmp".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            config_name: String::new(),
            needs: Vec::new(),
            shell_provider: ShellProviderKind::default(),
            host_type: HostType::default(),
            root_folder: default_root_folder(),
            tmp_folder: default_tmp_folder(),
            shell_executable: None,
            executables: BTreeMap::new(),
            environment: BTreeMap::new(),
            scripts: BTreeMap::new(),
            files_folder: None,
            ssh: None,
            docker: None,
            kube: None,
            git: None,
            database: None,
        }
    }
}

impl HostConfig {
    /// Create a local host with the given name and needs list.
    pub fn new(config_name: impl Into<String>, needs: &[&str]) -> Self {
        Self {
            config_name: config_name.into(),
            needs: needs.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_provider(mut self, provider: ShellProviderKind) -> Self {
        self.shell_provider = provider;
        self
    }

    pub fn with_root_folder(mut self, root: impl Into<String>) -> Self {
        self.root_folder = root.into();
        self
    }

    pub fn with_executable(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.executables.insert(name.into(), path.into());
        self
    }

    pub fn with_script(mut self, task: impl Into<String>, lines: &[&str]) -> Self {
        self.scripts
            .insert(task.into(), lines.iter().map(|l| l.to_string()).collect());
        self
    }

    /// Shell program used by local and remote persistent sessions.
    pub fn shell(&self) -> &str {
        self.shell_executable.as_deref().unwrap_or("/bin/bash")
    }

    /// Resolve a logical executable name, falling back to the bare name.
    pub fn executable<'a>(&'a self, name: &'a str) -> &'a str {
        self.executables
            .get(name)
            .map(|p| p.as_str())
            .unwrap_or(name)
    }

    pub fn is_prod(&self) -> bool {
        self.host_type == HostType::Prod
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let name = &self.config_name;
        match self.shell_provider {
            ShellProviderKind::Ssh | ShellProviderKind::DockerExecOverSsh if self.ssh.is_none() => {
                anyhow::bail!(
                    "Host '{}' uses shell_provider = \"{}\" but has no [ssh] table",
                    name,
                    self.shell_provider.as_str()
                );
            }
            _ => {}
        }
        if matches!(
            self.shell_provider,
            ShellProviderKind::DockerExec | ShellProviderKind::DockerExecOverSsh
        ) && self.docker.as_ref().is_none_or(|d| d.name.is_empty())
        {
            anyhow::bail!("Host '{}' needs docker.name for container exec", name);
        }
        if self.shell_provider == ShellProviderKind::Kubectl {
            let kube = self
                .kube
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Host '{}' needs a [kube] table", name))?;
            if kube.namespace.is_empty() {
                anyhow::bail!("Host '{}' needs kube.namespace", name);
            }
            if kube.pod.is_none() && kube.selector.is_empty() {
                anyhow::bail!("Host '{}' needs kube.pod or kube.selector", name);
            }
        }
        Ok(())
    }
}

/// Connection settings for SSH based transports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SshConfig {
    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    pub user: String,

    /// Skip known-hosts verification (throwaway environments only)
    #[serde(default)]
    pub disable_known_hosts: bool,
}

fn default_ssh_port() -> u16 {
    22
}

/// Target container for docker exec transports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DockerConfig {
    pub name: String,

    /// Shell used inside the container
    #[serde(default = "default_container_shell")]
    pub shell: String,
}

fn default_container_shell() -> String {
    "sh".to_string()
}

/// Pod selection for the kubectl transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct KubeConfig {
    pub namespace: String,

    #[serde(default)]
    pub context: Option<String>,

    /// Explicit pod name; wins over `selector`
    #[serde(default)]
    pub pod: Option<String>,

    /// Label selectors, e.g. `["app=web", "tier=frontend"]`
    #[serde(default)]
    pub selector: Vec<String>,

    #[serde(default)]
    pub container: Option<String>,

    #[serde(default = "default_container_shell")]
    pub shell: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GitConfig {
    #[serde(default)]
    pub branch: Option<String>,

    /// Repository checkout; defaults to the host's root folder
    #[serde(default)]
    pub root_folder: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub name: String,

    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    pub user: String,

    /// Secret name resolved through the task context's secret resolver
    #[serde(default)]
    pub password_secret: Option<String>,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    3306
}
