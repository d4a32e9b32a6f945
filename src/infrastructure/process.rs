use crate::domain::{CapturedOutput, Invocation, ProcessRunner};
use crate::errors::{Result, SshbookError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Runs invocations as local child processes on the tokio runtime
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(invocation.program());
        cmd.args(invocation.args());
        cmd
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run_interactive(&self, invocation: &Invocation) -> Result<i32> {
        tracing::debug!(command = %invocation.redacted(), "running interactive command");

        let status = Self::command(invocation)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| SshbookError::Exec(format!("failed to start {}: {}", invocation.program(), e)))?;

        Ok(status.code().unwrap_or(1))
    }

    async fn run_captured(&self, invocation: &Invocation) -> Result<CapturedOutput> {
        tracing::debug!(command = %invocation.redacted(), "running captured command");

        let output = Self::command(invocation)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SshbookError::Exec(format!("failed to start {}: {}", invocation.program(), e)))?;

        Ok(CapturedOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let runner = TokioProcessRunner::new();
        let output = runner
            .run_captured(&Invocation::new("printf out; printf err >&2; exit 3"))
            .await
            .unwrap();

        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }
}
