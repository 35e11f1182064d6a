//! Rigger Core Library
//!
//! Deployment task dispatch: hosts declare the capabilities they need, the
//! registry drives each task through its lifecycle, and capabilities run
//! commands through shell sessions on local, remote or containerised targets.

pub mod capability;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod output;
pub mod shell;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, HostConfig, HostType, RiggerConfig, ShellProviderKind};

    // Dispatch
    pub use crate::capability::{Capability, CapabilityRegistry, TaskTable};
    pub use crate::context::{SecretResolver, TaskContext};
    pub use crate::error::{ShellError, TaskError};

    // Shells
    pub use crate::shell::{
        CommandResult, InteractiveOptions, RunOptions, Shell, ShellFactory, ShellState,
        SharedShell,
    };

    pub use crate::output::Output;
}
