//! Rigger - deployment task runner
//!
//! Usage:
//!   rigger run stage deploy        # Run a task on a host
//!   rigger run prod backup -n      # Show the commands without running them
//!   rigger shell stage             # Open a shell on a host
//!   rigger hosts                   # List configured hosts

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rigger_core::commands::{TaskCommand, TaskOptions, TaskReport};
use rigger_core::config::ConfigStore;
use rigger_core::output::Output;

/// Tasks that replace data and ask for confirmation on prod hosts.
const DESTRUCTIVE_TASKS: &[&str] = &["reset", "restore"];

#[derive(Parser)]
#[command(name = "rigger")]
#[command(about = "Deployment task runner", long_about = None)]
struct Cli {
    /// Path to rigger.toml (default: discovered from the current directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task on a host
    Run {
        /// Host config name
        host: String,
        /// Task name (deploy, backup, restore, reset, ...)
        task: String,
        /// Task to run after the main task's execute phase (repeatable)
        #[arg(long = "next", value_name = "TASK")]
        next: Vec<String>,
        /// Context data passed to capabilities
        #[arg(long = "set", value_name = "KEY=VALUE")]
        data: Vec<String>,
        /// Print the commands instead of running them
        #[arg(long, short = 'n')]
        dry_run: bool,
        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Open an interactive shell on a host
    Shell {
        /// Host config name
        host: String,
    },

    /// List configured hosts
    Hosts {
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List available capabilities and their tasks
    Capabilities {
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "rigger_core=debug,rigger=debug,info"
    } else {
        "rigger_core=info,rigger=info,warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!(config = ?cli.config, "starting rigger");
    let command = match &cli.config {
        Some(path) => TaskCommand::new(ConfigStore::from_path(path)),
        None => TaskCommand::with_defaults()?,
    };

    match cli.command {
        Commands::Run {
            host,
            task,
            next,
            data,
            dry_run,
            yes,
            format,
        } => {
            let mut options = TaskOptions::new(host, task)
                .with_next_tasks(next)
                .with_dry_run(dry_run);
            for pair in &data {
                let (key, value) = parse_key_value(pair)?;
                options = options.with_data(key, value);
            }
            // JSON output must stay parseable, so no live command echo
            let command = match format {
                OutputFormat::Json => command.with_output(Output::quiet()),
                OutputFormat::Table => command,
            };
            run_task(&command, &options, yes, format)?;
        }
        Commands::Shell { host } => {
            let code = command.open_shell(&host)?;
            std::process::exit(code);
        }
        Commands::Hosts { format } => print_hosts(&command, format)?,
        Commands::Capabilities { format } => print_capabilities(&command, format)?,
    }

    Ok(())
}

fn parse_key_value(pair: &str) -> Result<(String, String)> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Expected KEY=VALUE, got '{}'", pair))?;
    if key.is_empty() {
        anyhow::bail!("Empty key in '{}'", pair);
    }
    Ok((key.to_string(), value.to_string()))
}

fn run_task(
    command: &TaskCommand,
    options: &TaskOptions,
    yes: bool,
    format: OutputFormat,
) -> Result<()> {
    let host = command.host(&options.host)?;
    let destructive = std::iter::once(&options.task)
        .chain(&options.next_tasks)
        .any(|t| DESTRUCTIVE_TASKS.contains(&t.as_str()));

    if host.is_prod() && destructive && !options.dry_run && !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Run '{}' on production host {}?",
                options.task, host.config_name
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let report = command.run(options)?;
    print_report(&report, format)?;

    if let Some(argv) = report.interactive_command()
        && !options.dry_run
    {
        let code = command.start_interactive(&options.host, &argv)?;
        if code != 0 {
            std::process::exit(code);
        }
    }
    Ok(())
}

fn print_report(report: &TaskReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!(
                "{} {} on {}",
                style("✓").green(),
                style(&report.task).bold(),
                style(&report.host).cyan()
            );
            for (key, value) in &report.results {
                if key == "interactive_command" {
                    continue;
                }
                println!("  {}: {}", style(key).dim(), value);
            }
            if !report.recorded_commands.is_empty() {
                println!(
                    "  {} commands recorded (dry run)",
                    style(report.recorded_commands.len()).bold()
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}

fn print_hosts(command: &TaskCommand, format: OutputFormat) -> Result<()> {
    let hosts = command.hosts()?;
    match format {
        OutputFormat::Table => {
            if hosts.is_empty() {
                println!("No hosts configured.");
                return Ok(());
            }
            for host in &hosts {
                println!(
                    "{:<20} {:<22} {:<6} {}",
                    style(&host.name).bold(),
                    host.provider,
                    format!("{:?}", host.host_type).to_lowercase(),
                    host.needs.join(", ")
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&hosts)?);
        }
    }
    Ok(())
}

fn print_capabilities(command: &TaskCommand, format: OutputFormat) -> Result<()> {
    let capabilities = command.capabilities();
    match format {
        OutputFormat::Table => {
            for capability in &capabilities {
                println!(
                    "{:<10} {}",
                    style(&capability.name).bold(),
                    style(&capability.description).dim()
                );
                println!("           tasks: {}", capability.tasks.join(", "));
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&capabilities)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("file=/tmp/db.sql.gz").unwrap(),
            ("file".to_string(), "/tmp/db.sql.gz".to_string())
        );
        assert_eq!(
            parse_key_value("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::parse_from([
            "rigger", "run", "stage", "deploy", "--next", "reset", "-n", "--set", "file=x",
        ]);
        match cli.command {
            Commands::Run {
                host,
                task,
                next,
                data,
                dry_run,
                ..
            } => {
                assert_eq!(host, "stage");
                assert_eq!(task, "deploy");
                assert_eq!(next, vec!["reset"]);
                assert_eq!(data, vec!["file=x"]);
                assert!(dry_run);
            }
            _ => panic!("expected run"),
        }
    }
}
