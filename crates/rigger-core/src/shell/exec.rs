//! One-shot child processes for the exec-style transports.

use std::process::{Command, Stdio};

use crate::error::ShellError;

use super::CommandResult;

fn command(provider: &'static str, argv: &[String]) -> Result<Command, ShellError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ShellError::transport(provider, "empty command line"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null()).stderr(Stdio::inherit());
    Ok(cmd)
}

/// Run `argv` to completion, collecting stdout as lines.
///
/// Only the program is logged; the arguments can carry exported environment.
pub(crate) fn run_argv(provider: &'static str, argv: &[String]) -> Result<CommandResult, ShellError> {
    tracing::debug!(provider, program = argv.first().map(String::as_str), "exec");
    let output = command(provider, argv)?
        .output()
        .map_err(|e| ShellError::transport(provider, format!("{}: {}", argv[0], e)))?;

    let lines = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| l.trim_end_matches('\r').to_string())
        .collect();
    Ok(CommandResult::new(output.status.code().unwrap_or(-1), lines))
}

/// Run `argv` with stdout passed through; only success matters.
pub(crate) fn run_status(provider: &'static str, argv: &[String]) -> Result<bool, ShellError> {
    tracing::debug!(provider, ?argv, "exec");
    let status = command(provider, argv)?
        .stdout(Stdio::inherit())
        .status()
        .map_err(|e| ShellError::transport(provider, format!("{}: {}", argv[0], e)))?;
    Ok(status.success())
}
