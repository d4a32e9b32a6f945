pub mod application;
pub mod domain;
pub mod errors;
pub mod infrastructure;
pub mod interface;
pub mod utils;

/// Re-export common types
pub use domain::{CapturedOutput, Host, HostOptions, Invocation, Record};
pub use domain::{CredentialRepository, HostRepository, ProcessRunner};

pub use errors::{Result, SshbookError};

pub use application::{
    AppContext, BackupService, CommandBuilder, ConnectionService, Direction, HostOutcome,
    HostService,
};

pub use infrastructure::{
    FileCredentialStore, HostRegistry, Settings, SettingsOverrides, TokioProcessRunner,
};

pub use interface::{Cli, CommandHandler};
