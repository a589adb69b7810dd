//! Secure-shell transport for the Shishen breath bridge.
//!
//! Provides:
//! - `SshChannel` - `RemoteChannel` over `ssh`/`scp`
//! - `SshConfig` - Injected host, credential and policy settings
//! - Command building and program resolution utilities

pub mod channel;
pub mod command;
pub mod config;

pub use channel::SshChannel;
pub use command::{CommandBuildError, CommandBuilder, CommandParts, resolve_program};
pub use config::{HostKeyPolicy, SshConfig};
