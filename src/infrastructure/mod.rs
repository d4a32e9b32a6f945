pub mod keychain;
pub mod process;
pub mod repositories;
pub mod settings;

pub use keychain::{FileCredentialStore, KdfParams};
pub use process::TokioProcessRunner;
pub use repositories::{HostRegistry, ParseWarning};
pub use settings::{Settings, SettingsOverrides};
