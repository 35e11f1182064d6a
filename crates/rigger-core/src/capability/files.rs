//! Archives the host's user-files folder.

use anyhow::Context;
use serde_json::json;

use crate::config::HostConfig;
use crate::context::TaskContext;
use crate::shell::shell_quote;

use super::support::{run_lines, timestamp, tmp_path};
use super::{Capability, TaskTable};

#[derive(Debug)]
pub struct FilesCapability {
    tasks: TaskTable<FilesCapability>,
}

impl Default for FilesCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl FilesCapability {
    pub fn new() -> Self {
        Self {
            tasks: TaskTable::<FilesCapability>::new().with("backup", Self::backup),
        }
    }

    fn backup(&self, host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        let folder = host
            .files_folder
            .as_deref()
            .with_context(|| format!("Host '{}' has no files_folder", host.config_name))?;
        let file = tmp_path(host, &format!("files--{}.tgz", timestamp()));
        let command = format!("#!tar -czf {} .", shell_quote(&file));

        tracing::info!(host = %host.config_name, folder, file = %file, "archiving files");
        run_lines(host, ctx, folder, &[command])
            .with_context(|| format!("Failed to archive {}", folder))?;
        ctx.add_result("files", json!({"type": "files", "file": file}));
        Ok(())
    }
}

impl Capability for FilesCapability {
    fn name(&self) -> &str {
        "files"
    }

    fn description(&self) -> &str {
        "Archives the host's files folder"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{DryRunShell, ShellState, lock_shell, share};

    #[test]
    fn test_backup_archives_files_folder() {
        let mut host = HostConfig::new("stage", &["files"]).with_root_folder("/srv/app");
        host.files_folder = Some("/srv/app/uploads".to_string());
        let mut ctx = TaskContext::default();
        ctx.add_result("files", json!({"type": "database", "file": "/tmp/db.sql.gz"}));
        ctx.set_shell(share(Box::new(DryRunShell::new(ShellState::new("/")))));

        FilesCapability::new().handle("backup", &host, &mut ctx).unwrap();

        let files = ctx.get_result("files").unwrap().as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1]["type"], "files");
        let archive = files[1]["file"].as_str().unwrap();
        assert!(archive.starts_with("/tmp/stage--files--"));

        let shell = ctx.shell().unwrap();
        let guard = lock_shell(&shell);
        assert_eq!(
            guard.recorded_commands().unwrap(),
            [format!("cd /srv/app/uploads && tar -czf {} .", archive)]
        );
    }

    #[test]
    fn test_backup_without_folder_fails() {
        let host = HostConfig::new("stage", &["files"]);
        let mut ctx = TaskContext::default();
        ctx.set_shell(share(Box::new(DryRunShell::new(ShellState::new("/")))));
        assert!(FilesCapability::new().handle("backup", &host, &mut ctx).is_err());
    }
}
