pub mod crypto;
pub mod store;

pub use crypto::KdfParams;
pub use store::FileCredentialStore;
