pub mod backup_service;
pub mod command_builder;
pub mod connection_service;
pub mod context;
pub mod host_service;

#[cfg(test)]
mod testing;

// Re-export application services
pub use backup_service::{BackupService, RestoreReport};
pub use command_builder::{CommandBuilder, Direction};
pub use connection_service::{ConnectionService, HostOutcome};
pub use context::AppContext;
pub use host_service::{HostDetails, HostService};
