pub mod ssh_config_repository;

pub use ssh_config_repository::{HostRegistry, ParseWarning};
