use thiserror::Error;
use std::io;

/// Unified error type for sshbook
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SshbookError {
    /// Unknown alias, jump host or record. The message is shown as-is.
    #[error("{0}")]
    NotFound(String),

    #[error("keychain is encrypted: password required")]
    PasswordRequired,

    #[error("failed to decrypt keychain: wrong password or damaged data")]
    DecryptFailure,

    #[error("keychain is already encrypted")]
    AlreadyEncrypted,

    #[error("Corrupt data: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid value: {0}")]
    Validation(String),

    #[error("Command failed: {0}")]
    Exec(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<io::Error> for SshbookError {
    fn from(error: io::Error) -> Self {
        SshbookError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for SshbookError {
    fn from(error: serde_json::Error) -> Self {
        SshbookError::Corrupt(format!("JSON error: {}", error))
    }
}

impl From<config::ConfigError> for SshbookError {
    fn from(error: config::ConfigError) -> Self {
        SshbookError::Config(error.to_string())
    }
}

impl From<tempfile::PersistError> for SshbookError {
    fn from(error: tempfile::PersistError) -> Self {
        SshbookError::Io(format!("atomic rename failed: {}", error.error))
    }
}

/// Result type alias for sshbook
pub type Result<T> = std::result::Result<T, SshbookError>;

// Helper functions for error context
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T, E: Into<SshbookError>> ErrorContext<T> for std::result::Result<T, E> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| match err.into() {
            SshbookError::Io(msg) => SshbookError::Io(format!("{}: {}", context(), msg)),
            SshbookError::Corrupt(msg) => SshbookError::Corrupt(format!("{}: {}", context(), msg)),
            SshbookError::Config(msg) => SshbookError::Config(format!("{}: {}", context(), msg)),
            SshbookError::Exec(msg) => SshbookError::Exec(format!("{}: {}", context(), msg)),
            SshbookError::Validation(msg) => SshbookError::Validation(format!("{}: {}", context(), msg)),
            // Shown verbatim to the user.
            other @ (SshbookError::NotFound(_)
            | SshbookError::PasswordRequired
            | SshbookError::DecryptFailure
            | SshbookError::AlreadyEncrypted) => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_io_errors() {
        let err: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        let err = err.with_context(|| "writing /tmp/x".to_string()).unwrap_err();
        assert_eq!(err, SshbookError::Io("writing /tmp/x: denied".to_string()));
    }

    #[test]
    fn context_keeps_not_found_message() {
        let err: Result<()> = Err(SshbookError::NotFound("host not found".to_string()));
        let err = err.with_context(|| "connect".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "host not found");
    }
}
