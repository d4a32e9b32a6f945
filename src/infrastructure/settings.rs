//! Runtime settings
//!
//! Layered, lowest priority first: built-in defaults, the optional TOML
//! settings file (`~/.sshbook/config.toml`), `SSHBOOK_*` environment
//! variables, then command-line flags.

use crate::errors::{ErrorContext, Result};
use crate::utils::{ssh_config_dir, sshbook_config_dir};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Resolved locations and binaries used by every command
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// OpenSSH client config file holding the host blocks
    pub ssh_config: PathBuf,
    /// Keychain file with per-host secrets
    pub keychain: PathBuf,
    /// Where `backup` writes archives
    pub backup_dir: PathBuf,
    /// Connection program
    pub ssh_bin: String,
    /// Transfer program
    pub scp_bin: String,
    /// Password-feeding helper
    pub sshpass_bin: String,
}

/// Values given on the command line; they win over every other layer
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub ssh_config: Option<PathBuf>,
    pub keychain: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub ssh_bin: Option<String>,
    pub scp_bin: Option<String>,
    pub sshpass_bin: Option<String>,
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn expand(path: PathBuf) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path_str(&path)).into_owned())
}

impl Settings {
    /// Default location of the settings file
    pub fn default_file() -> Result<PathBuf> {
        Ok(sshbook_config_dir()?.join("config.toml"))
    }

    /// Resolve settings from every layer. A missing settings file is not an error.
    pub fn load(settings_file: Option<&Path>, overrides: SettingsOverrides) -> Result<Self> {
        let data_dir = sshbook_config_dir()?;
        let file = match settings_file {
            Some(path) => path.to_path_buf(),
            None => Self::default_file()?,
        };

        let config = Config::builder()
            .set_default("ssh_config", path_str(&ssh_config_dir()?.join("config")))?
            .set_default("keychain", path_str(&data_dir.join("keychain")))?
            .set_default("backup_dir", path_str(&data_dir.join("backup")))?
            .set_default("ssh_bin", "ssh")?
            .set_default("scp_bin", "scp")?
            .set_default("sshpass_bin", "sshpass")?
            .add_source(File::from(file.as_path()).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("SSHBOOK"))
            .build()
            .with_context(|| format!("loading settings from {}", file.display()))?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings.apply(overrides))
    }

    fn apply(self, overrides: SettingsOverrides) -> Self {
        Self {
            ssh_config: expand(overrides.ssh_config.unwrap_or(self.ssh_config)),
            keychain: expand(overrides.keychain.unwrap_or(self.keychain)),
            backup_dir: expand(overrides.backup_dir.unwrap_or(self.backup_dir)),
            ssh_bin: overrides.ssh_bin.unwrap_or(self.ssh_bin),
            scp_bin: overrides.scp_bin.unwrap_or(self.scp_bin),
            sshpass_bin: overrides.sshpass_bin.unwrap_or(self.sshpass_bin),
        }
    }
}
