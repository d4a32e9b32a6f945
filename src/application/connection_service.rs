use crate::application::command_builder::{CommandBuilder, Direction};
use crate::domain::{CapturedOutput, CredentialRepository, HostRepository, Invocation, ProcessRunner};
use crate::errors::{Result, SshbookError};
use futures::future::join_all;

/// What happened on one host of a multi-host run
#[derive(Debug)]
pub struct HostOutcome {
    pub alias: String,
    pub result: Result<CapturedOutput>,
}

impl HostOutcome {
    /// Output collected from the host, also present when the command exited non-zero
    pub fn output(&self) -> Option<&CapturedOutput> {
        self.result.as_ref().ok()
    }

    /// The failure attributed to this host, if any
    pub fn error(&self) -> Option<SshbookError> {
        match &self.result {
            Err(e) => Some(e.clone()),
            Ok(output) if !output.success() => Some(SshbookError::Exec(exit_message(output.exit_code))),
            Ok(_) => None,
        }
    }
}

fn exit_message(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// ConnectionService runs ssh and scp against registered hosts
pub struct ConnectionService<'a> {
    hosts: &'a dyn HostRepository,
    credentials: &'a dyn CredentialRepository,
    builder: &'a CommandBuilder,
    runner: &'a dyn ProcessRunner,
}

impl<'a> ConnectionService<'a> {
    pub fn new(
        hosts: &'a dyn HostRepository,
        credentials: &'a dyn CredentialRepository,
        builder: &'a CommandBuilder,
        runner: &'a dyn ProcessRunner,
    ) -> Self {
        Self {
            hosts,
            credentials,
            builder,
            runner,
        }
    }

    /// Open a session on one host with the terminal attached
    pub async fn connect(&self, alias: &str, verbose: bool) -> Result<()> {
        let invocation = self
            .builder
            .build_connect(self.hosts, self.credentials, alias, None, verbose)?;
        self.run_interactive(&invocation).await
    }

    /// Copy a file to or from one host
    pub async fn transfer(
        &self,
        alias: &str,
        direction: Direction,
        source: &str,
        destination: &str,
    ) -> Result<()> {
        let invocation = self.builder.build_transfer(
            self.hosts,
            self.credentials,
            alias,
            direction,
            source,
            destination,
        )?;
        self.run_interactive(&invocation).await
    }

    /// Run `command` on every alias concurrently and wait for all of them.
    ///
    /// Outcomes come back in the order of `aliases`; a failure on one host
    /// never stops the others.
    pub async fn run_on_many(&self, aliases: &[String], command: &str, verbose: bool) -> Vec<HostOutcome> {
        let workers = aliases.iter().map(|alias| async move {
            let result = self.run_captured(alias, command, verbose).await;
            if let Err(e) = &result {
                tracing::debug!(alias = %alias, error = %e, "host failed");
            }
            HostOutcome {
                alias: alias.clone(),
                result,
            }
        });

        join_all(workers).await
    }

    async fn run_captured(&self, alias: &str, command: &str, verbose: bool) -> Result<CapturedOutput> {
        let invocation = self
            .builder
            .build_connect(self.hosts, self.credentials, alias, Some(command), verbose)?;
        // the invocation, and any key file it owns, lives until the process is done
        self.runner.run_captured(&invocation).await
    }

    async fn run_interactive(&self, invocation: &Invocation) -> Result<()> {
        let code = self.runner.run_interactive(invocation).await?;
        if code == 0 {
            Ok(())
        } else {
            Err(SshbookError::Exec(exit_message(Some(code))))
        }
    }
}
