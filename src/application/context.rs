use crate::application::backup_service::BackupService;
use crate::application::command_builder::CommandBuilder;
use crate::application::connection_service::ConnectionService;
use crate::application::host_service::HostService;
use crate::domain::ProcessRunner;
use crate::errors::Result;
use crate::infrastructure::{FileCredentialStore, HostRegistry, Settings, TokioProcessRunner};
use std::sync::Arc;

/// Everything one run of the tool works with, opened once at startup
pub struct AppContext {
    settings: Settings,
    hosts: HostRegistry,
    credentials: FileCredentialStore,
    builder: CommandBuilder,
    runner: Arc<dyn ProcessRunner>,
}

impl AppContext {
    /// Parse the profile file and open (or create) the keychain
    pub fn open(settings: Settings) -> Result<Self> {
        let hosts = HostRegistry::parse(&settings.ssh_config)?;
        let credentials = FileCredentialStore::open(&settings.keychain)?;
        let builder = CommandBuilder::from_settings(&settings);

        tracing::debug!(
            ssh_config = %settings.ssh_config.display(),
            keychain = %settings.keychain.display(),
            hosts = hosts.hosts().count(),
            "context opened"
        );

        Ok(Self {
            settings,
            hosts,
            credentials,
            builder,
            runner: Arc::new(TokioProcessRunner::new()),
        })
    }

    pub fn hosts(&self) -> &HostRegistry {
        &self.hosts
    }

    pub fn credentials(&self) -> &FileCredentialStore {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut FileCredentialStore {
        &mut self.credentials
    }

    pub fn connections(&self) -> ConnectionService<'_> {
        ConnectionService::new(
            &self.hosts,
            &self.credentials,
            &self.builder,
            self.runner.as_ref(),
        )
    }

    pub fn host_service(&mut self) -> HostService<'_> {
        HostService::new(&mut self.hosts, &mut self.credentials)
    }

    pub fn backups(&self) -> BackupService {
        BackupService::from_settings(&self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Host, Record};
    use std::path::Path;

    fn settings(dir: &Path) -> Settings {
        Settings {
            ssh_config: dir.join("config"),
            keychain: dir.join("keychain"),
            backup_dir: dir.join("backup"),
            ssh_bin: "ssh".to_string(),
            scp_bin: "scp".to_string(),
            sshpass_bin: "sshpass".to_string(),
        }
    }

    #[test]
    fn state_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();

        let mut ctx = AppContext::open(settings(dir.path())).unwrap();
        assert!(!ctx.credentials().is_bootstrapped());
        ctx.host_service()
            .save_host(Host::new("web", "10.0.0.5"), Some(Record::new("pw", "")))
            .unwrap();

        let ctx = AppContext::open(settings(dir.path())).unwrap();
        assert!(ctx.credentials().is_bootstrapped());
        assert_eq!(ctx.hosts().hosts().count(), 1);
        assert_eq!(ctx.credentials().get("web").unwrap().password, "pw");
    }
}
