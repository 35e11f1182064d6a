//! Foreground processes attached to the operator's terminal.

use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ShellError;

use super::InteractiveOptions;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spawn `argv` with inherited stdio and wait for it.
///
/// With a timeout the child is killed once it expires; this is the only
/// place a running command can be cancelled.
pub fn run_interactive(argv: &[String], options: &InteractiveOptions) -> Result<i32, ShellError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ShellError::transport("interactive", "empty command line"))?;

    tracing::debug!(program, ?args, timeout = ?options.timeout, "starting interactive process");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| ShellError::transport("interactive", format!("{}: {}", program, e)))?;

    let Some(timeout) = options.timeout else {
        let status = child.wait()?;
        return Ok(status.code().unwrap_or(-1));
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status.code().unwrap_or(-1));
        }
        if Instant::now() >= deadline {
            tracing::warn!(program, ?timeout, "interactive process timed out, killing it");
            child.kill()?;
            child.wait()?;
            return Err(ShellError::InteractiveTimeout { after: timeout });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_exit_code_is_returned() {
        let code = run_interactive(&argv(&["sh", "-c", "exit 5"]), &InteractiveOptions::default())
            .unwrap();
        assert_eq!(code, 5);
    }

    #[test]
    fn test_timeout_kills_process() {
        let options = InteractiveOptions::default().with_timeout(Duration::from_millis(100));
        let started = Instant::now();
        let err = run_interactive(&argv(&["sleep", "5"]), &options).unwrap_err();
        assert!(matches!(err, ShellError::InteractiveTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_empty_argv_is_rejected() {
        assert!(run_interactive(&[], &InteractiveOptions::default()).is_err());
    }
}
