//! A scoped view over another session's execution channel.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ShellError;

use super::{CommandResult, InteractiveOptions, RunOptions, Shell, ShellState};

/// Keeps its own directory stack but runs everything through `parent`,
/// moving the parent to the sub-session's directory before each call.
#[derive(Debug)]
pub struct SubShell<'a> {
    parent: &'a mut dyn Shell,
    state: ShellState,
}

impl<'a> SubShell<'a> {
    pub fn new(parent: &'a mut dyn Shell) -> Self {
        let state = parent.state().fork();
        Self { parent, state }
    }

    /// Start in `dir`, resolved against the parent's current directory.
    pub fn in_dir(parent: &'a mut dyn Shell, dir: &str) -> Self {
        let mut sub = Self::new(parent);
        sub.cd(dir);
        sub
    }

    fn sync_parent(&mut self) {
        let dir = self.state.working_dir().to_string();
        self.parent.cd(&dir);
    }
}

impl Shell for SubShell<'_> {
    fn provider(&self) -> &'static str {
        self.parent.provider()
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
        self.sync_parent();
        self.parent.run_with(command, options)
    }

    fn exists(&mut self, path: &str) -> Result<bool, ShellError> {
        self.sync_parent();
        self.parent.exists(path)
    }

    fn get_file(&mut self, remote: &str, local: &Path) -> Result<bool, ShellError> {
        self.sync_parent();
        self.parent.get_file(remote, local)
    }

    fn put_file(&mut self, local: &Path, remote: &str) -> Result<bool, ShellError> {
        self.sync_parent();
        self.parent.put_file(local, remote)
    }

    fn apply_environment(&mut self, env: &BTreeMap<String, String>) -> Result<(), ShellError> {
        self.state.merge_environment(env);
        self.parent.apply_environment(env)
    }

    // The parent follows every directory change, so it builds in the right place.
    fn build_interactive_command(
        &self,
        program: &[String],
        options: &InteractiveOptions,
    ) -> Result<Vec<String>, ShellError> {
        self.parent.build_interactive_command(program, options)
    }

    fn start_interactive_process(
        &mut self,
        argv: &[String],
        options: &InteractiveOptions,
    ) -> Result<i32, ShellError> {
        self.parent.start_interactive_process(argv, options)
    }

    fn recorded_commands(&self) -> Option<&[String]> {
        self.parent.recorded_commands()
    }

    fn cd(&mut self, dir: &str) {
        self.state.cd(dir);
        self.sync_parent();
    }

    fn push_working_dir(&mut self, dir: &str) {
        self.state.push(dir);
        self.sync_parent();
    }

    fn pop_working_dir(&mut self) -> Result<(), ShellError> {
        if !self.state.pop() {
            return Err(ShellError::WorkingDirectoryImbalance {
                provider: self.provider(),
            });
        }
        self.sync_parent();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::DryRunShell;

    #[test]
    fn test_parent_follows_sub_directory() {
        let mut parent = DryRunShell::new(ShellState::new("/srv/app"));
        {
            let mut sub = SubShell::in_dir(&mut parent, "web");
            sub.run("ls").unwrap();
            sub.push_working_dir("/tmp");
            sub.run("ls").unwrap();
            sub.pop_working_dir().unwrap();
            assert!(sub.pop_working_dir().is_err());
            sub.run("ls").unwrap();
        }
        assert_eq!(
            parent.commands(),
            [
                "cd /srv/app/web && ls",
                "cd /tmp && ls",
                "cd /srv/app/web && ls"
            ]
        );
    }

    #[test]
    fn test_sub_stack_is_independent() {
        let mut parent = DryRunShell::new(ShellState::new("/srv/app"));
        parent.push_working_dir("/opt");
        let sub = SubShell::new(&mut parent);
        assert_eq!(sub.state().depth(), 0);
        assert_eq!(sub.working_dir(), "/opt");
    }
}
