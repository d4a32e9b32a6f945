pub mod invocation;
pub mod models;
pub mod services;

// Re-export common types
pub use invocation::Invocation;
pub use models::{CapturedOutput, Host, HostOptions, Record, DEFAULT_PORT};
pub use services::{CredentialRepository, HostRepository, ProcessRunner};
