use crate::domain::{CredentialRepository, Host, HostRepository, Record};
use crate::errors::{Result, SshbookError};

/// A host together with what the keychain knows about it
#[derive(Debug, Clone)]
pub struct HostDetails {
    pub host: Host,
    /// `None` when the keychain is locked
    pub record: Option<Record>,
}

/// HostService manages host entries and their keychain records together
pub struct HostService<'a> {
    hosts: &'a mut dyn HostRepository,
    credentials: &'a mut dyn CredentialRepository,
}

impl<'a> HostService<'a> {
    pub fn new(
        hosts: &'a mut dyn HostRepository,
        credentials: &'a mut dyn CredentialRepository,
    ) -> Self {
        Self { hosts, credentials }
    }

    /// Add or replace a host. With `record` set, its secrets are stored
    /// first; without it, existing secrets are left alone.
    pub fn save_host(&mut self, host: Host, record: Option<Record>) -> Result<()> {
        let alias = host.alias.clone();
        // validates before anything is written
        self.hosts.add(host)?;

        if let Some(record) = record {
            self.credentials.put(&alias, record)?;
        }

        self.hosts.save()?;
        tracing::info!(alias = %alias, "host saved");
        Ok(())
    }

    /// Drop a host and its keychain record
    pub fn remove_host(&mut self, alias: &str) -> Result<Host> {
        if self.hosts.get(alias).is_none() {
            return Err(SshbookError::NotFound("host not found".to_string()));
        }

        match self.credentials.remove(alias) {
            Ok(()) | Err(SshbookError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let removed = self
            .hosts
            .remove(alias)
            .ok_or_else(|| SshbookError::NotFound("host not found".to_string()))?;
        self.hosts.save()?;

        tracing::info!(alias = %alias, "host removed");
        Ok(removed)
    }

    /// Hosts in file order
    pub fn list(&self) -> Vec<Host> {
        self.hosts.get_all().into_values().cloned().collect()
    }

    pub fn aliases(&self) -> Vec<String> {
        self.hosts.get_all().into_keys().map(str::to_string).collect()
    }

    /// Identity files referenced anywhere in the registry
    pub fn known_keys(&self) -> Vec<String> {
        self.hosts.keys().iter().cloned().collect()
    }

    pub fn show(&self, alias: &str) -> Result<HostDetails> {
        let host = self
            .hosts
            .get(alias)
            .cloned()
            .ok_or_else(|| SshbookError::NotFound("host not found".to_string()))?;

        let record = match self.credentials.get(alias) {
            Ok(record) => Some(record),
            Err(SshbookError::NotFound(_)) => Some(Record::default()),
            Err(SshbookError::PasswordRequired) => None,
            Err(e) => return Err(e),
        };

        Ok(HostDetails { host, record })
    }
}
