//! MySQL database backup, restore and console access.

use std::collections::BTreeMap;

use anyhow::Context;
use serde_json::json;

use crate::config::{DatabaseConfig, HostConfig};
use crate::context::TaskContext;
use crate::shell::{InteractiveOptions, join_quoted, shell_quote};

use super::support::{run_lines, timestamp, tmp_path, with_shell_in};
use super::{Capability, TaskTable};

/// Read by the mysql client tools in place of `--password`.
const PASSWORD_ENV: &str = "MYSQL_PWD";

#[derive(Debug)]
pub struct MysqlCapability {
    tasks: TaskTable<MysqlCapability>,
}

impl Default for MysqlCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl MysqlCapability {
    pub fn new() -> Self {
        Self {
            tasks: TaskTable::<MysqlCapability>::new()
                .with("backup", Self::backup)
                .with("restore", Self::restore)
                .with("dbShell", Self::db_shell),
        }
    }

    fn database(host: &HostConfig) -> anyhow::Result<&DatabaseConfig> {
        host.database
            .as_ref()
            .with_context(|| format!("Host '{}' has no [database] table", host.config_name))
    }

    /// `-h <host> -P <port> -u <user>`
    fn connection_args(db: &DatabaseConfig) -> Vec<String> {
        vec![
            "-h".to_string(),
            db.host.clone(),
            "-P".to_string(),
            db.port.to_string(),
            "-u".to_string(),
            db.user.clone(),
        ]
    }

    /// Export the resolved password as `MYSQL_PWD` so it never shows up in a
    /// command line.
    fn export_password(
        host: &HostConfig,
        db: &DatabaseConfig,
        ctx: &TaskContext,
    ) -> anyhow::Result<()> {
        let Some(secret) = &db.password_secret else {
            return Ok(());
        };
        let password = ctx.secrets().resolve(secret).with_context(|| {
            format!(
                "Database password secret '{}' could not be resolved",
                secret
            )
        })?;
        let env = BTreeMap::from([(PASSWORD_ENV.to_string(), password)]);
        with_shell_in(host, ctx, &host.root_folder, |shell| {
            Ok(shell.apply_environment(&env)?)
        })
    }

    fn backup(&self, host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        let db = Self::database(host)?;
        let file = tmp_path(host, &format!("{}.sql.gz", timestamp()));
        Self::export_password(host, db, ctx)?;
        let command = format!(
            "#!mysqldump {} {} | #!gzip > {}",
            join_quoted(&Self::connection_args(db)),
            shell_quote(&db.name),
            shell_quote(&file)
        );

        tracing::info!(host = %host.config_name, database = %db.name, file = %file, "backing up database");
        run_lines(host, ctx, &host.tmp_folder, &[command])
            .with_context(|| format!("Failed to back up database {}", db.name))?;
        ctx.add_result("files", json!({"type": "database", "file": file}));
        Ok(())
    }

    fn restore(&self, host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        let db = Self::database(host)?;
        let file = ctx
            .get_str("file")
            .context("restore needs the dump path in context data 'file'")?
            .to_string();
        Self::export_password(host, db, ctx)?;
        let connection = join_quoted(&Self::connection_args(db));
        let command = if file.ends_with(".gz") {
            format!(
                "#!gunzip -c {} | #!mysql {} {}",
                shell_quote(&file),
                connection,
                shell_quote(&db.name)
            )
        } else {
            format!(
                "#!mysql {} {} < {}",
                connection,
                shell_quote(&db.name),
                shell_quote(&file)
            )
        };

        tracing::info!(host = %host.config_name, database = %db.name, file = %file, "restoring database");
        run_lines(host, ctx, &host.tmp_folder, &[command])
            .with_context(|| format!("Failed to restore {} into {}", file, db.name))
    }

    /// Publish the argv of an interactive console as `interactive_command`.
    ///
    /// The argv ends up in reports, so a protected database gets a bare
    /// `--password` and the client prompts for it.
    fn db_shell(&self, host: &HostConfig, ctx: &mut TaskContext) -> anyhow::Result<()> {
        let db = Self::database(host)?;
        let mut program = vec![host.executable("mysql").to_string()];
        program.extend(Self::connection_args(db));
        if db.password_secret.is_some() {
            program.push("--password".to_string());
        }
        program.push(db.name.clone());

        let argv = with_shell_in(host, ctx, &host.root_folder, |shell| {
            Ok(shell.build_interactive_command(&program, &InteractiveOptions::tty())?)
        })?;
        ctx.set_result("interactive_command", json!(argv));
        Ok(())
    }
}

impl Capability for MysqlCapability {
    fn name(&self) -> &str {
        "mysql"
    }

    fn supports(&self, name: &str) -> bool {
        matches!(name, "mysql" | "mariadb")
    }

    fn description(&self) -> &str {
        "Backs up, restores and opens MySQL databases"
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
    use crate::context::StaticSecrets;
    use crate::shell::{DryRunShell, LocalShell, ShellState, lock_shell, share};
    use std::sync::Arc;

    fn host() -> HostConfig {
        let mut host = HostConfig::new("stage", &["mysql"])
            .with_root_folder("/srv/app")
            .with_executable("mysqldump", "/usr/local/bin/mysqldump");
        host.tmp_folder = "/var/tmp".to_string();
        host.database = Some(DatabaseConfig {
            name: "shop".to_string(),
            host: "db".to_string(),
            port: 3306,
            user: "app".to_string(),
            password_secret: Some("shop-db".to_string()),
        });
        host
    }

    fn context() -> TaskContext {
        let mut ctx = TaskContext::default()
            .with_secrets(Arc::new(StaticSecrets::new().with("shop-db", "s3cret")));
        let executables = host().executables;
        let state = ShellState::new("/").with_executables(executables);
        ctx.set_shell(share(Box::new(DryRunShell::new(state))));
        ctx
    }

    #[test]
    fn test_backup_publishes_file() {
        let mut ctx = context();
        MysqlCapability::new().handle("backup", &host(), &mut ctx).unwrap();

        let files = ctx.get_result("files").unwrap().as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["type"], "database");
        let file = files[0]["file"].as_str().unwrap();
        assert!(file.starts_with("/var/tmp/stage--"));
        assert!(file.ends_with(".sql.gz"));

        let shell = ctx.shell().unwrap();
        let guard = lock_shell(&shell);
        let command = &guard.recorded_commands().unwrap()[0];
        assert!(command.starts_with("cd /var/tmp && /usr/local/bin/mysqldump -h db"));
        assert!(command.contains("-u app shop | gzip > /var/tmp/stage--"));
        assert!(!command.contains("s3cret"));
        assert_eq!(
            guard.state().environment().get("MYSQL_PWD").map(String::as_str),
            Some("s3cret")
        );
    }

    #[test]
    fn test_missing_secret_fails() {
        let mut ctx = TaskContext::default()
            .with_secrets(Arc::new(StaticSecrets::new()));
        ctx.set_shell(share(Box::new(DryRunShell::new(ShellState::new("/")))));
        let err = MysqlCapability::new()
            .handle("backup", &host(), &mut ctx)
            .unwrap_err();
        assert!(err.to_string().contains("shop-db"));
    }

    #[test]
    fn test_restore_requires_file() {
        let mut ctx = context();
        let mysql = MysqlCapability::new();
        assert!(mysql.handle("restore", &host(), &mut ctx).is_err());

        ctx.set("file", "/var/tmp/dump.sql");
        mysql.handle("restore", &host(), &mut ctx).unwrap();
        let shell = ctx.shell().unwrap();
        let guard = lock_shell(&shell);
        assert_eq!(
            guard.recorded_commands().unwrap(),
            ["cd /var/tmp && mysql -h db -P 3306 -u app shop < /var/tmp/dump.sql"]
        );
    }

    #[test]
    fn test_db_shell_publishes_interactive_command() {
        let mut ctx = TaskContext::default()
            .with_secrets(Arc::new(StaticSecrets::new().with("shop-db", "s3cret")));
        let shell = LocalShell::new("/bin/sh", ShellState::new("/"));
        ctx.set_shell(share(Box::new(shell)));

        MysqlCapability::new().handle("dbShell", &host(), &mut ctx).unwrap();
        assert_eq!(
            ctx.get_result("interactive_command"),
            Some(&json!([
                "/bin/sh",
                "-c",
                "cd /srv/app && mysql -h db -P 3306 -u app --password shop"
            ]))
        );
    }

    #[test]
    fn test_db_shell_without_secret_has_no_password_flag() {
        let mut host = host();
        if let Some(db) = host.database.as_mut() {
            db.password_secret = None;
        }
        let mut ctx = TaskContext::default();
        ctx.set_shell(share(Box::new(LocalShell::new("/bin/sh", ShellState::new("/")))));

        MysqlCapability::new().handle("dbShell", &host, &mut ctx).unwrap();
        let argv = ctx.get_result("interactive_command").unwrap().to_string();
        assert!(!argv.contains("--password"));
    }

    #[test]
    fn test_supports_mariadb_alias() {
        let mysql = MysqlCapability::new();
        assert!(mysql.supports("mariadb"));
        assert!(!mysql.supports("postgres"));
    }
}
