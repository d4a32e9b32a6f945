use crate::application::Direction;
use crate::infrastructure::settings::SettingsOverrides;
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

/// sshbook - SSH connection manager with an encrypted keychain
#[derive(Parser)]
#[command(name = "sshbook")]
#[command(author = "Arash")]
#[command(version)]
#[command(about = "SSH connection manager with an encrypted keychain", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options accepted by every command
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// SSH config file holding the hosts
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Keychain file
    #[arg(long, global = true, value_name = "PATH")]
    pub keychain: Option<PathBuf>,

    /// Directory for backup archives
    #[arg(long, global = true, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// ssh binary
    #[arg(long, global = true, value_name = "BIN")]
    pub ssh_bin: Option<String>,

    /// scp binary
    #[arg(long, global = true, value_name = "BIN")]
    pub scp_bin: Option<String>,

    /// sshpass binary
    #[arg(long, global = true, value_name = "BIN")]
    pub sshpass_bin: Option<String>,

    /// Settings file (default: ~/.sshbook/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Debug logging, and verbose ssh output
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            ssh_config: self.config.clone(),
            keychain: self.keychain.clone(),
            backup_dir: self.backup_dir.clone(),
            ssh_bin: self.ssh_bin.clone(),
            scp_bin: self.scp_bin.clone(),
            sshpass_bin: self.sshpass_bin.clone(),
        }
    }
}

/// Supported commands
#[derive(Subcommand)]
pub enum Commands {
    /// Add a host, or edit an existing one
    Add(AddArgs),

    /// Remove a host and its keychain record
    Remove {
        /// Host alias
        alias: String,

        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },

    /// List all hosts
    List,

    /// Show one host
    Show {
        /// Host alias
        alias: String,
    },

    /// Connect to a host
    To {
        /// Host alias (asked for when omitted)
        alias: Option<String>,
    },

    /// Run a command on one or more hosts at once
    At {
        /// Host aliases (picked from a list when omitted)
        aliases: Vec<String>,

        /// Command to run, after `--` (asked for when omitted)
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Copy a file to or from a host
    Transfer(TransferArgs),

    /// Protect the keychain with a password
    Encrypt {
        /// Read the password from the first line of stdin
        #[arg(long)]
        password_stdin: bool,
    },

    /// Archive the SSH config and keychain into the backup directory
    Backup,

    /// Restore the SSH config and keychain from an archive
    Restore {
        /// Archive written by `backup`
        archive: PathBuf,
    },

    /// Print host aliases, one per line
    Completions,
}

/// Arguments for the 'add' command
#[derive(Args, Default)]
pub struct AddArgs {
    /// Host alias
    pub alias: Option<String>,

    /// Hostname or IP address
    #[arg(long)]
    pub hostname: Option<String>,

    /// SSH port
    #[arg(long, short)]
    pub port: Option<String>,

    /// Remote user
    #[arg(long, short)]
    pub user: Option<String>,

    /// Path to a private key
    #[arg(long, short)]
    pub identity_file: Option<PathBuf>,

    /// Store the content of this private key in the keychain
    #[arg(long, value_name = "PATH")]
    pub key_file_content_from: Option<PathBuf>,

    /// Alias of the host to jump through
    #[arg(long, short)]
    pub jump_host: Option<String>,

    /// Extra ssh option (Key=Value), repeatable
    #[arg(long = "option", short, value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Read the password from the first line of stdin
    #[arg(long)]
    pub password_stdin: bool,

    /// Never prompt
    #[arg(long, short)]
    pub non_interactive: bool,
}

/// Arguments for the 'transfer' command
#[derive(Args)]
#[command(group(ArgGroup::new("direction").required(true).args(["upload", "download"])))]
pub struct TransferArgs {
    /// Host alias
    pub alias: String,

    /// Source path (remote for downloads)
    pub source: String,

    /// Destination path (remote for uploads)
    pub destination: String,

    /// Copy a local file to the host
    #[arg(long)]
    pub upload: bool,

    /// Copy a remote file to this machine
    #[arg(long)]
    pub download: bool,
}

impl TransferArgs {
    pub fn direction(&self) -> Direction {
        if self.upload {
            Direction::Upload
        } else {
            Direction::Download
        }
    }
}

/// Split `Key=Value`; whitespace around the key and value is dropped
pub fn parse_option(raw: &str) -> Option<(String, String)> {
    let (key, value) = raw.split_once('=')?;
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn at_splits_aliases_and_command() {
        let cli = Cli::try_parse_from(["sshbook", "at", "web", "db", "--", "uptime", "-p"]).unwrap();
        match cli.command {
            Commands::At { aliases, command } => {
                assert_eq!(aliases, vec!["web", "db"]);
                assert_eq!(command, vec!["uptime", "-p"]);
            }
            _ => panic!("expected at"),
        }
    }

    #[test]
    fn to_and_at_accept_missing_targets() {
        let cli = Cli::try_parse_from(["sshbook", "to"]).unwrap();
        assert!(matches!(cli.command, Commands::To { alias: None }));

        let cli = Cli::try_parse_from(["sshbook", "at"]).unwrap();
        match cli.command {
            Commands::At { aliases, command } => {
                assert!(aliases.is_empty());
                assert!(command.is_empty());
            }
            _ => panic!("expected at"),
        }
    }

    #[test]
    fn transfer_needs_a_direction() {
        assert!(Cli::try_parse_from(["sshbook", "transfer", "web", "a", "b"]).is_err());
        assert!(Cli::try_parse_from(["sshbook", "transfer", "web", "a", "b", "--upload", "--download"]).is_err());

        let cli = Cli::try_parse_from(["sshbook", "transfer", "web", "a", "b", "--download"]).unwrap();
        match cli.command {
            Commands::Transfer(args) => assert_eq!(args.direction(), Direction::Download),
            _ => panic!("expected transfer"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["sshbook", "list", "--config", "/tmp/c", "-v"]).unwrap();
        assert!(cli.global.verbose);
        assert_eq!(cli.global.overrides().ssh_config, Some(PathBuf::from("/tmp/c")));
    }

    #[test]
    fn parse_option_requires_both_sides() {
        assert_eq!(
            parse_option("ServerAliveInterval = 30"),
            Some(("ServerAliveInterval".to_string(), "30".to_string()))
        );
        assert_eq!(parse_option("Compression"), None);
        assert_eq!(parse_option("=yes"), None);
    }
}
