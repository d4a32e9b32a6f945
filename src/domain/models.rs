use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroize;

/// Port used when a host block carries no `Port` directive.
pub const DEFAULT_PORT: &str = "22";

/// One `Host` block of the connection-profile file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Host {
    /// Unique name of the block (the pattern after `Host`)
    pub alias: String,
    /// Address to connect to (`HostName`)
    pub hostname: String,
    /// SSH port, kept as written; defaults to 22
    #[serde(default = "default_port")]
    pub port: String,
    /// Remote user; `None` means the local OS user at connect time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Path to a private key (`IdentityFile`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
    /// Alias of the host to relay through (`ProxyJump`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jump_host: Option<String>,
    /// Every other directive of the block, in file order
    #[serde(default, skip_serializing_if = "HostOptions::is_empty")]
    pub options: HostOptions,
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

impl Host {
    /// Create a host with the default port and no optional fields
    pub fn new(alias: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            hostname: hostname.into(),
            port: default_port(),
            user: None,
            identity_file: None,
            jump_host: None,
            options: HostOptions::default(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    pub fn with_jump_host(mut self, alias: impl Into<String>) -> Self {
        self.jump_host = Some(alias.into());
        self
    }

    /// Address to dial; a block without `HostName` resolves to its alias, as ssh does
    pub fn effective_hostname(&self) -> &str {
        if self.hostname.is_empty() {
            &self.alias
        } else {
            &self.hostname
        }
    }

    /// Remote user, falling back to `local_user` when none is configured
    pub fn effective_user<'a>(&'a self, local_user: &'a str) -> &'a str {
        match self.user.as_deref() {
            Some(user) if !user.is_empty() => user,
            _ => local_user,
        }
    }
}

/// Ordered `Key Value` directives passed through to ssh untouched.
///
/// Keys compare case-insensitively, as ssh does, but keep the spelling
/// they were first written with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct HostOptions(IndexMap<String, String>);

impl HostOptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.0.keys().position(|k| k.eq_ignore_ascii_case(key))
    }

    /// Insert or replace a directive; a replaced directive keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(idx) => {
                let (_, slot) = self.0.get_index_mut(idx)?;
                Some(std::mem::replace(slot, value))
            }
            None => {
                self.0.insert(key, value);
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key)
            .and_then(|idx| self.0.get_index(idx))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HostOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = HostOptions::new();
        for (k, v) in iter {
            options.insert(k, v);
        }
        options
    }
}

/// Secret material stored in the keychain under a host alias.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    /// Password for password authentication; empty when unused
    #[serde(default)]
    pub password: String,
    /// Inline private key; empty when the host uses a key file or no key
    #[serde(default)]
    pub private_key: String,
}

impl Record {
    pub fn new(password: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            private_key: private_key.into(),
        }
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    pub fn has_private_key(&self) -> bool {
        !self.private_key.is_empty()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |s: &str| if s.is_empty() { "" } else { "****" };
        f.debug_struct("Record")
            .field("password", &mask(&self.password))
            .field("private_key", &mask(&self.private_key))
            .finish()
    }
}

impl Drop for Record {
    fn drop(&mut self) {
        self.password.zeroize();
        self.private_key.zeroize();
    }
}

/// Output collected from one non-interactive run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
