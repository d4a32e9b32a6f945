//! Archive the profile file and keychain into one `.tgz`, and put them back.

use crate::errors::{ErrorContext, Result, SshbookError};
use crate::infrastructure::Settings;
use crate::utils::{move_aside, write_atomic};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

pub const SSH_CONFIG_ENTRY: &str = "ssh_config_backup";
pub const KEYCHAIN_ENTRY: &str = "keychain_backup";

/// Files touched by a restore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<PathBuf>,
    /// Previous files, renamed to `<file>.bak`
    pub moved_aside: Vec<PathBuf>,
}

pub struct BackupService {
    ssh_config: PathBuf,
    keychain: PathBuf,
    backup_dir: PathBuf,
}

impl BackupService {
    pub fn new(
        ssh_config: impl Into<PathBuf>,
        keychain: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ssh_config: ssh_config.into(),
            keychain: keychain.into(),
            backup_dir: backup_dir.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.ssh_config, &settings.keychain, &settings.backup_dir)
    }

    /// Write `sshbook_backup_<timestamp>.tgz` into the backup directory
    pub fn backup(&self) -> Result<PathBuf> {
        let config = read_source(&self.ssh_config)?;
        let keychain = read_source(&self.keychain)?;

        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mtime = chrono::Utc::now().timestamp().max(0) as u64;

        for (name, data) in [(SSH_CONFIG_ENTRY, &config), (KEYCHAIN_ENTRY, &keychain)] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o600);
            header.set_mtime(mtime);
            header.set_cksum();
            builder
                .append_data(&mut header, name, data.as_slice())
                .with_context(|| format!("adding {} to archive", name))?;
        }

        let archive = builder
            .into_inner()
            .and_then(GzEncoder::finish)
            .with_context(|| "compressing archive".to_string())?;

        let name = format!(
            "sshbook_backup_{}.tgz",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        );
        let path = self.backup_dir.join(name);
        write_atomic(&path, &archive)?;

        tracing::info!(path = %path.display(), "backup written");
        Ok(path)
    }

    /// Install both payloads of `archive` at their configured paths.
    ///
    /// Existing files are renamed to `<file>.bak` first. An archive missing
    /// either payload is rejected before anything on disk changes.
    pub fn restore(&self, archive: &Path) -> Result<RestoreReport> {
        let file = fs::File::open(archive)
            .with_context(|| format!("opening {}", archive.display()))?;
        let mut tar = tar::Archive::new(GzDecoder::new(file));

        let mut config = None;
        let mut keychain = None;

        let entries = tar
            .entries()
            .map_err(|e| SshbookError::Corrupt(format!("{}: {}", archive.display(), e)))?;
        for entry in entries {
            let mut entry =
                entry.map_err(|e| SshbookError::Corrupt(format!("{}: {}", archive.display(), e)))?;
            let name = entry
                .path()
                .map_err(|e| SshbookError::Corrupt(format!("{}: {}", archive.display(), e)))?
                .to_string_lossy()
                .into_owned();

            let slot = match name.trim_start_matches("./") {
                SSH_CONFIG_ENTRY => &mut config,
                KEYCHAIN_ENTRY => &mut keychain,
                other => {
                    tracing::warn!(entry = %other, "ignoring unknown archive entry");
                    continue;
                }
            };

            let mut data = Zeroizing::new(Vec::new());
            entry
                .read_to_end(&mut data)
                .map_err(|e| SshbookError::Corrupt(format!("{}: {}", name, e)))?;
            *slot = Some(data);
        }

        let config = config.ok_or_else(|| missing(archive, SSH_CONFIG_ENTRY))?;
        let keychain = keychain.ok_or_else(|| missing(archive, KEYCHAIN_ENTRY))?;
        serde_json::from_slice::<serde_json::Value>(&keychain)
            .with_context(|| format!("{} in {}", KEYCHAIN_ENTRY, archive.display()))?;

        let mut report = RestoreReport::default();
        for (target, data) in [(&self.ssh_config, &config), (&self.keychain, &keychain)] {
            if let Some(moved) =
                move_aside(target).with_context(|| format!("moving {} aside", target.display()))?
            {
                report.moved_aside.push(moved);
            }
            write_atomic(target, data)?;
            report.restored.push(target.clone());
        }

        tracing::info!(archive = %archive.display(), "backup restored");
        Ok(report)
    }
}

fn read_source(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Zeroizing::new(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SshbookError::NotFound(format!(
            "{} does not exist",
            path.display()
        ))),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn missing(archive: &Path, entry: &str) -> SshbookError {
    SshbookError::Corrupt(format!("{} has no {} entry", archive.display(), entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(dir: &Path) -> BackupService {
        BackupService::new(
            dir.join("ssh").join("config"),
            dir.join("data").join("keychain"),
            dir.join("backups"),
        )
    }

    fn seed(dir: &Path) {
        fs::create_dir_all(dir.join("ssh")).unwrap();
        fs::create_dir_all(dir.join("data")).unwrap();
        fs::write(dir.join("ssh/config"), "Host web\n    HostName 10.0.0.5\n").unwrap();
        fs::write(dir.join("data/keychain"), "{\"version\":1,\"records\":{}}").unwrap();
    }

    #[test]
    fn backup_then_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let service = service(dir.path());

        let archive = service.backup().unwrap();
        let name = archive.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("sshbook_backup_") && name.ends_with(".tgz"));
        assert!(archive.starts_with(dir.path().join("backups")));

        fs::write(dir.path().join("ssh/config"), "Host changed\n").unwrap();
        let report = service.restore(&archive).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("ssh/config")).unwrap(),
            "Host web\n    HostName 10.0.0.5\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("ssh/config.bak")).unwrap(),
            "Host changed\n"
        );
        assert_eq!(report.restored.len(), 2);
        assert_eq!(report.moved_aside.len(), 2);
    }

    #[test]
    fn restore_rejects_incomplete_archive() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        let archive_path = dir.path().join("partial.tgz");
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let data = b"Host other\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o600);
        header.set_cksum();
        builder
            .append_data(&mut header, SSH_CONFIG_ENTRY, &data[..])
            .unwrap();
        fs::write(&archive_path, builder.into_inner().unwrap().finish().unwrap()).unwrap();

        let err = service(dir.path()).restore(&archive_path).unwrap_err();
        assert!(matches!(err, SshbookError::Corrupt(_)));
        assert_eq!(
            fs::read_to_string(dir.path().join("ssh/config")).unwrap(),
            "Host web\n    HostName 10.0.0.5\n"
        );
        assert!(!dir.path().join("ssh/config.bak").exists());
    }

    #[test]
    fn backup_requires_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = service(dir.path()).backup().unwrap_err();
        assert!(matches!(err, SshbookError::NotFound(_)));
    }
}
