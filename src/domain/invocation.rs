use std::fmt;
use std::path::Path;
use tempfile::TempPath;

const REDACTED: &str = "****";

/// A fully assembled local process invocation.
///
/// The command is kept as one shell line, run through `sh -c` (or `cmd /C`
/// on Windows). If the invocation owns a materialized key file, the file is
/// deleted when the invocation is dropped.
pub struct Invocation {
    line: String,
    secrets: Vec<String>,
    key_file: Option<TempPath>,
}

impl Invocation {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            secrets: Vec::new(),
            key_file: None,
        }
    }

    /// Register a fragment of the line that must never be logged.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// Hand over a temporary key file whose lifetime is tied to this invocation.
    pub fn with_key_file(mut self, key_file: TempPath) -> Self {
        self.key_file = Some(key_file);
        self
    }

    /// The shell line as it will be executed
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The shell line with registered secrets masked
    pub fn redacted(&self) -> String {
        self.secrets
            .iter()
            .fold(self.line.clone(), |line, secret| line.replace(secret.as_str(), REDACTED))
    }

    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    /// Program to spawn for this platform
    pub fn program(&self) -> &'static str {
        if cfg!(windows) {
            "cmd"
        } else {
            "sh"
        }
    }

    /// Arguments passed to [`Invocation::program`]
    pub fn args(&self) -> [&str; 2] {
        if cfg!(windows) {
            ["/C", self.line.as_str()]
        } else {
            ["-c", self.line.as_str()]
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("line", &self.redacted())
            .field("key_file", &self.key_file())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_masks_every_secret() {
        let inv = Invocation::new("sshpass -p 'pw1' ssh -o 'ProxyCommand=sshpass -p pw2 ssh'")
            .with_secret("pw1")
            .with_secret("pw2")
            .with_secret("");
        assert_eq!(
            inv.redacted(),
            "sshpass -p '****' ssh -o 'ProxyCommand=sshpass -p **** ssh'"
        );
    }

    #[test]
    fn key_file_is_removed_on_drop() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        let inv = Invocation::new("true").with_key_file(file.into_temp_path());
        assert!(path.exists());
        drop(inv);
        assert!(!path.exists());
    }
}
