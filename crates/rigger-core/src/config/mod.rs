//! Host descriptors and their loading from rigger.toml
//!
//! The loader is deliberately flat: one file, one `[settings]` table and a
//! `[hosts.<name>]` table per target environment. The dispatch engine only
//! reads the resulting [`HostConfig`].

pub mod parser;
pub mod schema;
pub mod store;

pub use parser::{parse_rigger_toml, parse_rigger_toml_str, to_toml};
pub use schema::{
    DatabaseConfig, DockerConfig, GitConfig, HostConfig, HostType, KubeConfig, RiggerConfig,
    Settings, ShellProviderKind, SshConfig,
};
pub use store::{CONFIG_FILE_NAME, ConfigStore};
