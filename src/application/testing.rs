//! In-memory fakes shared by the application tests.

use crate::domain::{CredentialRepository, Record};
use crate::errors::{Result, SshbookError};
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryCredentials {
    records: HashMap<String, Record>,
    pub locked: bool,
}

impl MemoryCredentials {
    pub fn with(mut self, alias: &str, password: &str, private_key: &str) -> Self {
        self.records
            .insert(alias.to_string(), Record::new(password, private_key));
        self
    }
}

impl CredentialRepository for MemoryCredentials {
    fn get(&self, alias: &str) -> Result<Record> {
        if self.locked {
            return Err(SshbookError::PasswordRequired);
        }
        self.records
            .get(alias)
            .cloned()
            .ok_or_else(|| SshbookError::NotFound(format!("no keychain record for {}", alias)))
    }

    fn put(&mut self, alias: &str, record: Record) -> Result<()> {
        self.records.insert(alias.to_string(), record);
        Ok(())
    }

    fn remove(&mut self, alias: &str) -> Result<()> {
        self.records
            .remove(alias)
            .map(|_| ())
            .ok_or_else(|| SshbookError::NotFound(format!("no keychain record for {}", alias)))
    }
}
