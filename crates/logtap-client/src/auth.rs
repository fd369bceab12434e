//! Token refresh and app liveness collaborators.
//!
//! The stream client only depends on the two traits. The command-backed
//! implementations shell out to a user supplied command, the same way
//! kubeconfig exec plugins hand out cluster tokens.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::context::StreamContext;
use crate::error::BoxError;

/// Hands out a fresh bearer token
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn refresh(&self, ctx: &StreamContext) -> Result<String, BoxError>;
}

/// Confirms the app behind the stream still exists
#[async_trait]
pub trait AppStatusChecker: Send + Sync {
    async fn check(&self, ctx: &StreamContext) -> Result<(), BoxError>;
}

/// Failure running a collaborator command
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}{}", fmt_stderr(.stderr))]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("`{command}` printed no token")]
    EmptyToken { command: String },

    #[error("`{command}` interrupted: {reason}")]
    Interrupted { command: String, reason: String },
}

fn fmt_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Output of a finished command
struct CommandOutput {
    stdout: String,
}

/// Run a shell command, killing it if the context ends first
async fn run_shell(ctx: &StreamContext, command: &str) -> Result<CommandOutput, CommandError> {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(command = %command, "Running collaborator command");

    let output = tokio::select! {
        reason = ctx.done() => {
            return Err(CommandError::Interrupted {
                command: command.to_string(),
                reason: reason.to_string(),
            });
        }
        output = cmd.output() => output.map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?,
    };

    if !output.status.success() {
        return Err(CommandError::Failed {
            command: command.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    })
}

/// Pull a token out of command output.
///
/// Accepts `{"token": "..."}`, exec-credential style `{"status": {"token": "..."}}`,
/// or the bare token as text.
pub fn extract_token(stdout: &str) -> Option<String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(response) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(token) = response
            .get("token")
            .or_else(|| response.get("status").and_then(|s| s.get("token")))
            .and_then(|t| t.as_str())
        {
            return Some(token.trim().to_string()).filter(|t| !t.is_empty());
        }
    }

    Some(trimmed.to_string())
}

/// Gets tokens by running a shell command
#[derive(Clone, Debug)]
pub struct CommandTokenProvider {
    command: String,
}

impl CommandTokenProvider {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for CommandTokenProvider {
    async fn refresh(&self, ctx: &StreamContext) -> Result<String, BoxError> {
        let output = run_shell(ctx, &self.command).await?;
        let token = extract_token(&output.stdout).ok_or_else(|| CommandError::EmptyToken {
            command: self.command.clone(),
        })?;
        Ok(token)
    }
}

/// Checks liveness by running a shell command; a non-zero exit means gone
#[derive(Clone, Debug)]
pub struct CommandStatusChecker {
    command: String,
}

impl CommandStatusChecker {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl AppStatusChecker for CommandStatusChecker {
    async fn check(&self, ctx: &StreamContext) -> Result<(), BoxError> {
        run_shell(ctx, &self.command).await?;
        Ok(())
    }
}
