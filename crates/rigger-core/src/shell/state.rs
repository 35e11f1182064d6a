//! Working-directory and environment bookkeeping shared by every shell variant.

use std::collections::BTreeMap;

use crate::config::HostConfig;
use crate::output::Output;

/// Prefix that marks a logical executable name inside a command.
pub const EXECUTABLE_TOKEN: &str = "#!";

/// Session-local state: current directory, directory stack, environment
/// overlay and executables table.
#[derive(Debug, Clone)]
pub struct ShellState {
    working_dir: String,
    dir_stack: Vec<String>,
    environment: BTreeMap<String, String>,
    executables: BTreeMap<String, String>,
    output: Output,
}

impl ShellState {
    pub fn new(working_dir: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            dir_stack: Vec::new(),
            environment: BTreeMap::new(),
            executables: BTreeMap::new(),
            output: Output::quiet(),
        }
    }

    /// State rooted at the host's root folder with its executables and environment.
    pub fn for_host(host: &HostConfig, output: Output) -> Self {
        Self {
            working_dir: host.root_folder.clone(),
            dir_stack: Vec::new(),
            environment: host.environment.clone(),
            executables: host.executables.clone(),
            output,
        }
    }

    pub fn with_executables(mut self, executables: BTreeMap<String, String>) -> Self {
        self.executables = executables;
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    /// Copy of this state with an empty directory stack.
    pub fn fork(&self) -> Self {
        Self {
            dir_stack: Vec::new(),
            ..self.clone()
        }
    }

    pub fn working_dir(&self) -> &str {
        &self.working_dir
    }

    /// Change directory. Relative paths resolve against the current one.
    pub fn cd(&mut self, dir: &str) {
        if dir.is_empty() || dir == "." {
            return;
        }
        self.working_dir = if dir.starts_with('/') || self.working_dir.is_empty() {
            dir.to_string()
        } else {
            format!("{}/{}", self.working_dir.trim_end_matches('/'), dir)
        };
    }

    pub fn push(&mut self, dir: &str) {
        self.dir_stack.push(self.working_dir.clone());
        self.cd(dir);
    }

    /// Restore the directory saved by the matching `push`.
    pub fn pop(&mut self) -> bool {
        match self.dir_stack.pop() {
            Some(dir) => {
                self.working_dir = dir;
                true
            }
            None => false,
        }
    }

    pub fn depth(&self) -> usize {
        self.dir_stack.len()
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn merge_environment(&mut self, env: &BTreeMap<String, String>) {
        for (key, value) in env {
            self.environment.insert(key.clone(), value.clone());
        }
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Resolve a logical executable name, falling back to the bare name.
    pub fn executable<'a>(&'a self, name: &'a str) -> &'a str {
        self.executables
            .get(name)
            .map(|p| p.as_str())
            .unwrap_or(name)
    }

    /// Replace every `#!name` token with its path from the executables table.
    pub fn expand_command(&self, command: &str) -> String {
        let mut expanded = String::with_capacity(command.len());
        let mut rest = command;

        while let Some(pos) = rest.find(EXECUTABLE_TOKEN) {
            expanded.push_str(&rest[..pos]);
            let after = &rest[pos + EXECUTABLE_TOKEN.len()..];
            let name_len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'))
                .unwrap_or(after.len());
            let name = &after[..name_len];

            if name.is_empty() {
                expanded.push_str(EXECUTABLE_TOKEN);
            } else {
                match self.executables.get(name) {
                    Some(path) => expanded.push_str(path),
                    None => {
                        tracing::debug!(executable = name, "no executable mapping, using bare name");
                        expanded.push_str(name);
                    }
                }
            }
            rest = &after[name_len..];
        }
        expanded.push_str(rest);
        expanded
    }

    /// `cd <dir> && <expanded command>`, the string every variant dispatches.
    pub fn prepare(&self, command: &str) -> String {
        format!(
            "cd {} && {}",
            shell_quote(&self.working_dir),
            self.expand_command(command)
        )
    }
}

/// Quote a single shell argument, leaving plain words untouched.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '%' | ':' | '=' | '@' | '+' | ',')
    }) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Quote every element and join with spaces.
pub fn join_quoted(argv: &[String]) -> String {
    argv.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `export K=V` statements for an environment overlay.
pub fn export_statements(env: &BTreeMap<String, String>) -> Vec<String> {
    env.iter()
        .map(|(k, v)| format!("export {}={}", k, shell_quote(v)))
        .collect()
}
