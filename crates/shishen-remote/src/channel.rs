//! `RemoteChannel` over the system ssh/scp clients.

use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use shishen_core::traits::{RemoteChannel, TransportError, last_lines};
use tokio::process::Command;

use crate::{
    command::{CommandBuildError, CommandParts, cat_command, tail_command},
    config::SshConfig,
};

/// Exit status ssh and scp use for connection and authentication failures.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Lines read from the end of a file to find its last non-empty line.
const TAIL_WINDOW: usize = 16;

/// Secure-shell remote channel.
///
/// Every call is one ssh or scp process; nothing is kept open between
/// calls and nothing is retried.
#[derive(Debug, Clone)]
pub struct SshChannel {
    config: SshConfig,
}

impl SshChannel {
    /// Create a channel for the configured host.
    #[must_use]
    pub const fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Connection settings in use.
    #[must_use]
    pub const fn config(&self) -> &SshConfig {
        &self.config
    }

    async fn run(&self, parts: CommandParts) -> Result<Vec<u8>, TransportError> {
        let name = parts.program.clone();
        let (program, args) = parts.into_resolved().await.map_err(map_build_error)?;
        tracing::debug!(program = %program.display(), ?args, "Running remote command");

        let output = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(SSH_CONNECTION_FAILURE) => Err(TransportError::Connection {
                host: self.config.host.clone(),
                message: stderr,
            }),
            code => Err(TransportError::Remote {
                program: name,
                code,
                stderr,
            }),
        }
    }

    async fn run_remote(&self, remote_command: &str) -> Result<Vec<u8>, TransportError> {
        self.run(self.config.ssh_command(remote_command)).await
    }
}

fn map_build_error(err: CommandBuildError) -> TransportError {
    match err {
        CommandBuildError::ExecutableNotFound(program) => TransportError::ProgramNotFound(program),
        other => TransportError::InvalidPath(other.to_string()),
    }
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn deliver(&self, path: &str, payload: &[u8]) -> Result<(), TransportError> {
        let staged = tempfile::Builder::new()
            .prefix("breath-")
            .suffix(".json")
            .tempfile_in(self.config.staging_dir())?;
        tokio::fs::write(staged.path(), payload).await?;

        let parts = self
            .config
            .scp_command(staged.path(), path)
            .map_err(map_build_error)?;
        let result = self.run(parts).await.map(drop);

        // Dropping the handle on an early return removes the file as well.
        if let Err(e) = staged.close() {
            tracing::debug!("Failed to remove staged payload: {e}");
        }
        result
    }

    async fn tail_latest(&self, path: &str) -> Result<String, TransportError> {
        let command = tail_command(path, TAIL_WINDOW).map_err(map_build_error)?;
        let stdout = self.run_remote(&command).await?;
        Ok(last_lines(&stdout, 1).pop().unwrap_or_default())
    }

    async fn fetch_file(&self, path: &str) -> Result<Bytes, TransportError> {
        let command = cat_command(path).map_err(map_build_error)?;
        self.run_remote(&command).await.map(Bytes::from)
    }

    async fn tail_recent(&self, path: &str, lines: usize) -> Result<Vec<String>, TransportError> {
        let command = tail_command(path, lines).map_err(map_build_error)?;
        let stdout = self.run_remote(&command).await?;
        Ok(last_lines(&stdout, lines))
    }
}
