use crate::domain::invocation::Invocation;
use crate::domain::models::{CapturedOutput, Host, Record};
use crate::errors::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::path::Path;

/// HostRepository defines the interface for the connection-profile registry
pub trait HostRepository: Send + Sync {
    /// Exact-match lookup; `None` when the alias is unknown
    fn get(&self, alias: &str) -> Option<&Host>;

    /// Replace the host with the same alias in place, or append it
    fn add(&mut self, host: Host) -> Result<()>;

    /// Drop a host block
    fn remove(&mut self, alias: &str) -> Option<Host>;

    /// All hosts keyed by alias, in file order
    fn get_all(&self) -> IndexMap<&str, &Host>;

    /// Identity-file paths referenced by any host
    fn keys(&self) -> &BTreeSet<String>;

    /// Persist the registry to its file
    fn save(&self) -> Result<()>;

    /// Location of the profile file
    fn path(&self) -> &Path;
}

/// CredentialRepository defines the interface for per-alias secret storage
pub trait CredentialRepository: Send + Sync {
    /// Fetch the record for an alias
    fn get(&self, alias: &str) -> Result<Record>;

    /// Insert or replace the record for an alias
    fn put(&mut self, alias: &str, record: Record) -> Result<()>;

    /// Delete the record for an alias
    fn remove(&mut self, alias: &str) -> Result<()>;
}

/// ProcessRunner executes built invocations
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run with the caller's stdin/stdout/stderr and return the exit code
    async fn run_interactive(&self, invocation: &Invocation) -> Result<i32>;

    /// Run with stdout and stderr collected
    async fn run_captured(&self, invocation: &Invocation) -> Result<CapturedOutput>;
}
