use crate::domain::{CredentialRepository, Host, HostRepository, Invocation, Record};
use crate::errors::{ErrorContext, Result, SshbookError};
use crate::infrastructure::Settings;
use crate::utils::{escape_percent, quote, quote_path, shell_word};
use std::io::Write;
use std::path::Path;
use tempfile::TempPath;
use zeroize::Zeroize;

/// Which way a transfer goes, seen from the local machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

/// How the connection reaches a host configured with a jump host
enum JumpRoute {
    /// `ProxyCommand` running the password helper around an inner ssh
    Relay { proxy_command: String, secrets: Vec<String> },
    /// Plain alias-based proxy addressing
    Native(String),
}

/// CommandBuilder turns an alias into a ready-to-run, quoted shell line
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    ssh_bin: String,
    scp_bin: String,
    sshpass_bin: String,
    local_user: String,
}

impl CommandBuilder {
    pub fn new(
        ssh_bin: impl Into<String>,
        scp_bin: impl Into<String>,
        sshpass_bin: impl Into<String>,
    ) -> Self {
        Self {
            ssh_bin: ssh_bin.into(),
            scp_bin: scp_bin.into(),
            sshpass_bin: sshpass_bin.into(),
            local_user: whoami::username(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.ssh_bin, &settings.scp_bin, &settings.sshpass_bin)
    }

    /// Override the user assumed for hosts without a `User`
    pub fn with_local_user(mut self, user: impl Into<String>) -> Self {
        self.local_user = user.into();
        self
    }

    /// Build the interactive (or one-shot, when `command` is set) ssh invocation
    pub fn build_connect(
        &self,
        hosts: &dyn HostRepository,
        credentials: &dyn CredentialRepository,
        alias: &str,
        command: Option<&str>,
        verbose: bool,
    ) -> Result<Invocation> {
        let host = resolve(hosts, alias)?;
        let record = lookup_record(credentials, alias)?;
        let jump = self.jump_route(hosts, credentials, host)?;

        let mut parts = vec![
            shell_word(&self.ssh_bin),
            "-F".to_string(),
            quote_path(&hosts.path().to_string_lossy()),
            "-p".to_string(),
            shell_word(&host.port),
        ];

        let key_file = self.identity(host, &record, &mut parts)?;

        let mut secrets = Vec::new();
        match jump {
            Some(JumpRoute::Relay { proxy_command, secrets: relay }) => {
                parts.push("-o".to_string());
                parts.push(quote(&format!("ProxyCommand={}", proxy_command)));
                secrets.extend(relay);
            }
            Some(JumpRoute::Native(alias)) => {
                parts.push("-J".to_string());
                parts.push(shell_word(&alias));
            }
            None => {}
        }

        push_options(host, &mut parts);

        if verbose {
            parts.push("-v".to_string());
        }

        parts.push(shell_word(&self.destination(host)));

        if let Some(command) = command {
            parts.push(quote(command));
        }

        Ok(self.finish(parts, &record, secrets, key_file))
    }

    /// Build an scp invocation copying `source` to `destination`.
    ///
    /// The remote path is whichever side the direction makes remote; the
    /// local side has `~` expanded and, for uploads, must exist.
    pub fn build_transfer(
        &self,
        hosts: &dyn HostRepository,
        credentials: &dyn CredentialRepository,
        alias: &str,
        direction: Direction,
        source: &str,
        destination: &str,
    ) -> Result<Invocation> {
        let host = resolve(hosts, alias)?;
        let record = lookup_record(credentials, alias)?;
        let jump = self.jump_route(hosts, credentials, host)?;

        let remote = shell_word(&self.destination(host));
        let (from, to) = match direction {
            Direction::Upload => {
                let local = expand(source);
                if !Path::new(&local).exists() {
                    return Err(SshbookError::NotFound(format!(
                        "source file not found: {}",
                        source
                    )));
                }
                (quote_path(&local), format!("{}:{}", remote, quote_path(destination)))
            }
            Direction::Download => (
                format!("{}:{}", remote, quote_path(source)),
                quote_path(&expand(destination)),
            ),
        };

        let mut parts = vec![
            shell_word(&self.scp_bin),
            "-F".to_string(),
            quote_path(&hosts.path().to_string_lossy()),
        ];

        let key_file = self.identity(host, &record, &mut parts)?;

        parts.push("-P".to_string());
        parts.push(shell_word(&host.port));

        let mut secrets = Vec::new();
        match jump {
            Some(JumpRoute::Relay { proxy_command, secrets: relay }) => {
                parts.push("-o".to_string());
                parts.push(quote(&format!("ProxyCommand={}", proxy_command)));
                secrets.extend(relay);
            }
            Some(JumpRoute::Native(alias)) => {
                parts.push("-o".to_string());
                parts.push(quote(&format!("ProxyJump={}", alias)));
            }
            None => {}
        }

        push_options(host, &mut parts);
        parts.push(from);
        parts.push(to);

        Ok(self.finish(parts, &record, secrets, key_file))
    }

    fn destination(&self, host: &Host) -> String {
        format!(
            "{}@{}",
            host.effective_user(&self.local_user),
            host.effective_hostname()
        )
    }

    fn jump_route(
        &self,
        hosts: &dyn HostRepository,
        credentials: &dyn CredentialRepository,
        host: &Host,
    ) -> Result<Option<JumpRoute>> {
        let alias = match host.jump_host.as_deref() {
            Some(alias) if !alias.is_empty() => alias,
            _ => return Ok(None),
        };

        let jump = hosts
            .get(alias)
            .ok_or_else(|| SshbookError::NotFound("jumphost not found".to_string()))?;
        let record = lookup_record(credentials, alias)?;

        if !record.has_password() {
            return Ok(Some(JumpRoute::Native(alias.to_string())));
        }

        // ssh expands %-tokens in ProxyCommand, so literal text is escaped
        let password = escape_percent(&record.password);
        let quoted = quote(&password);
        let proxy_command = format!(
            "{} -p {} {} -W %h:%p -p {} {}",
            shell_word(&self.sshpass_bin),
            quoted,
            shell_word(&self.ssh_bin),
            shell_word(&jump.port),
            shell_word(&escape_percent(&self.destination(jump))),
        );

        // the password ends up quoted twice, once by itself and once inside ProxyCommand=
        let nested = quoted.replace('\'', r#"'"'"'"#);
        Ok(Some(JumpRoute::Relay {
            proxy_command,
            secrets: vec![nested, quoted, password, record.password.clone()],
        }))
    }

    /// Push `-i KEY`, materializing inline key content when no key path is set
    fn identity(
        &self,
        host: &Host,
        record: &Record,
        parts: &mut Vec<String>,
    ) -> Result<Option<TempPath>> {
        if let Some(path) = &host.identity_file {
            parts.push("-i".to_string());
            parts.push(quote_path(&expand(&path.to_string_lossy())));
            return Ok(None);
        }

        if !record.has_private_key() {
            return Ok(None);
        }

        let key_file = materialize_key(&record.private_key)?;
        parts.push("-i".to_string());
        parts.push(quote_path(&key_file.to_string_lossy()));
        Ok(Some(key_file))
    }

    fn finish(
        &self,
        mut parts: Vec<String>,
        record: &Record,
        secrets: Vec<String>,
        key_file: Option<TempPath>,
    ) -> Invocation {
        let mut line = Vec::with_capacity(parts.len() + 3);
        if record.has_password() {
            line.push(shell_word(&self.sshpass_bin));
            line.push("-p".to_string());
            line.push(quote(&record.password));
        }
        line.append(&mut parts);

        let mut invocation = Invocation::new(line.join(" "));
        for secret in secrets {
            invocation = invocation.with_secret(secret);
        }
        if record.has_password() {
            invocation = invocation
                .with_secret(quote(&record.password))
                .with_secret(record.password.clone());
        }
        if let Some(key_file) = key_file {
            invocation = invocation.with_key_file(key_file);
        }

        tracing::debug!(command = %invocation.redacted(), "built command");
        invocation
    }
}

fn resolve<'a>(hosts: &'a dyn HostRepository, alias: &str) -> Result<&'a Host> {
    hosts
        .get(alias)
        .ok_or_else(|| SshbookError::NotFound("host not found".to_string()))
}

/// A host without a keychain record simply has no secrets
fn lookup_record(credentials: &dyn CredentialRepository, alias: &str) -> Result<Record> {
    match credentials.get(alias) {
        Ok(record) => Ok(record),
        Err(SshbookError::NotFound(_)) => Ok(Record::default()),
        Err(e) => Err(e),
    }
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

fn push_options(host: &Host, parts: &mut Vec<String>) {
    for (key, value) in host.options.iter() {
        parts.push("-o".to_string());
        parts.push(quote(&format!("{}={}", key, value)));
    }
}

/// Write inline key content to an owner-only temporary file
fn materialize_key(content: &str) -> Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("sshbook-key-")
        .tempfile()
        .with_context(|| "creating temporary key file".to_string())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .with_context(|| "restricting temporary key file".to_string())?;
    }

    let mut content = content.to_string();
    // ssh rejects OpenSSH keys without a final newline
    if !content.ends_with('\n') {
        content.push('\n');
    }
    let written = file
        .write_all(content.as_bytes())
        .and_then(|_| file.as_file().sync_all());
    content.zeroize();
    written.with_context(|| "writing temporary key file".to_string())?;

    Ok(file.into_temp_path())
}
