//! High-level commands for rigger operations.
//!
//! These wire the config store, capability registry and shell factory
//! together for one invocation and are what the CLI calls.

pub mod task;

pub use task::{CapabilitySummary, HostSummary, TaskCommand, TaskOptions, TaskReport};
