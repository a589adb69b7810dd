//! Command building for ssh/scp invocations.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::config::SshConfig;

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("Remote path is not usable: {0}")]
    InvalidPath(String),
    #[error("Failed to quote remote path: {0}")]
    QuoteError(#[from] shlex::QuoteError),
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns error if executable not found.
    pub async fn into_resolved(self) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable = resolve_program(&program)
            .await
            .ok_or_else(|| CommandBuildError::ExecutableNotFound(program.clone()))?;
        Ok((executable, args))
    }
}

/// Builder for ssh/scp command lines.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    /// Executable to run.
    pub base: String,
    /// Arguments in order.
    pub params: Vec<String>,
}

impl CommandBuilder {
    /// Create a new command builder.
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            params: Vec::new(),
        }
    }

    /// Extend parameters.
    #[must_use]
    pub fn extend_params<I>(mut self, more: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params.extend(more.into_iter().map(Into::into));
        self
    }

    /// Append `-o key=value` for each option.
    #[must_use]
    pub fn options<I>(mut self, opts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        for opt in opts {
            self.params.push("-o".to_string());
            self.params.push(opt.into());
        }
        self
    }

    /// Finish the command.
    #[must_use]
    pub fn build(self) -> CommandParts {
        CommandParts::new(self.base, self.params)
    }
}

impl SshConfig {
    /// Options shared by ssh and scp.
    fn common_options(&self) -> Vec<String> {
        let mut opts = vec![
            "BatchMode=yes".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ];
        opts.extend(self.host_key_policy.ssh_options());
        opts
    }

    fn identity_params(&self) -> Vec<String> {
        self.identity_file
            .as_ref()
            .map(|key| vec!["-i".to_string(), key.display().to_string()])
            .unwrap_or_default()
    }

    /// `scp <local> user@host:<remote>`.
    ///
    /// The remote path travels unquoted and legacy scp expands it in the
    /// remote shell, so paths that need quoting are rejected.
    ///
    /// # Errors
    /// Returns error if the remote path is unusable.
    pub fn scp_command(&self, local: &Path, remote_path: &str) -> Result<CommandParts, CommandBuildError> {
        check_remote_path(remote_path)?;
        if matches!(shlex::try_quote(remote_path)?, Cow::Owned(_)) {
            return Err(CommandBuildError::InvalidPath(format!(
                "{} needs shell quoting, which scp targets cannot carry",
                remote_path.escape_debug()
            )));
        }

        let mut builder = CommandBuilder::new(&self.scp_program)
            .extend_params(["-q".to_string()])
            .extend_params(self.identity_params());
        if let Some(port) = self.port {
            builder = builder.extend_params(["-P".to_string(), port.to_string()]);
        }

        Ok(builder
            .options(self.common_options())
            .extend_params([
                local.display().to_string(),
                format!("{}:{remote_path}", self.destination()),
            ])
            .build())
    }

    /// `ssh user@host <remote_command>`.
    #[must_use]
    pub fn ssh_command(&self, remote_command: &str) -> CommandParts {
        let mut builder = CommandBuilder::new(&self.ssh_program)
            .extend_params(["-T".to_string()])
            .extend_params(self.identity_params());
        if let Some(port) = self.port {
            builder = builder.extend_params(["-p".to_string(), port.to_string()]);
        }

        builder
            .options(self.common_options())
            .extend_params([self.destination(), remote_command.to_string()])
            .build()
    }
}

/// Remote shell command printing the last `lines` lines of `path`.
///
/// # Errors
/// Returns error if the path is unusable.
pub fn tail_command(path: &str, lines: usize) -> Result<String, CommandBuildError> {
    check_remote_path(path)?;
    let quoted = shlex::try_quote(path)?;
    Ok(format!("tail -n {lines} -- {quoted}"))
}

/// Remote shell command printing the whole of `path`.
///
/// # Errors
/// Returns error if the path is unusable.
pub fn cat_command(path: &str) -> Result<String, CommandBuildError> {
    check_remote_path(path)?;
    let quoted = shlex::try_quote(path)?;
    Ok(format!("cat -- {quoted}"))
}

fn check_remote_path(path: &str) -> Result<(), CommandBuildError> {
    if path.trim().is_empty() || path.chars().any(char::is_control) {
        return Err(CommandBuildError::InvalidPath(path.escape_debug().to_string()));
    }
    Ok(())
}

/// Resolve an executable by name.
///
/// Absolute paths are taken as-is when they point at a file; anything else
/// goes through `which`.
pub async fn resolve_program(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}
