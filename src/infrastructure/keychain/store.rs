use super::crypto::{self, KdfParams, Key, Sealed};
use crate::domain::{CredentialRepository, Record};
use crate::errors::{ErrorContext, Result, SshbookError};
use crate::utils::write_atomic;
use base64::prelude::{Engine, BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use zeroize::Zeroizing;

const KEYCHAIN_VERSION: u32 = 1;
const CHECK_TOKEN: &[u8] = b"sshbook keychain check";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeychainFile {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encryption: Option<EncryptionHeader>,
    #[serde(default)]
    records: BTreeMap<String, StoredRecord>,
}

impl KeychainFile {
    fn empty() -> Self {
        Self {
            version: KEYCHAIN_VERSION,
            encryption: None,
            records: BTreeMap::new(),
        }
    }

    fn parse(bytes: &[u8]) -> Result<Self> {
        let file: KeychainFile = serde_json::from_slice(bytes)?;
        if file.version != KEYCHAIN_VERSION {
            return Err(SshbookError::Corrupt(format!(
                "unsupported keychain version {}",
                file.version
            )));
        }
        Ok(file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncryptionHeader {
    kdf: KdfParams,
    salt: String,
    /// `CHECK_TOKEN` sealed under the derived key; tells a wrong password
    /// apart from damaged records
    check: Sealed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StoredRecord {
    Plain(Record),
    Sealed(Sealed),
}

/// File-backed keychain of per-alias secrets.
///
/// The whole file is rewritten atomically on every mutation. Once
/// encrypted, every record is sealed with a key derived from the keychain
/// password; the key is only ever held in memory.
pub struct FileCredentialStore {
    path: PathBuf,
    file: KeychainFile,
    bootstrapped: bool,
    kdf: KdfParams,
    key: Option<Key>,
}

impl FileCredentialStore {
    /// Open the keychain at `path`, creating an empty one if it does not exist.
    ///
    /// A freshly created keychain reports `is_bootstrapped() == false` for
    /// this handle only, so the caller can offer to enable encryption.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let (file, bootstrapped) = match fs::read(&path) {
            Ok(bytes) => {
                let file = KeychainFile::parse(&bytes)
                    .with_context(|| format!("reading keychain {}", path.display()))?;
                (file, true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let file = KeychainFile::empty();
                write_atomic(&path, &serde_json::to_vec_pretty(&file)?)
                    .with_context(|| format!("creating keychain {}", path.display()))?;
                tracing::info!(path = %path.display(), "created keychain");
                (file, false)
            }
            Err(e) => {
                return Err(SshbookError::Io(format!(
                    "reading keychain {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            path,
            file,
            bootstrapped,
            kdf: KdfParams::default(),
            key: None,
        })
    }

    /// Use different Argon2 costs when encrypting this keychain
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// `false` only on the handle that created the keychain file
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub fn is_encrypted(&self) -> bool {
        self.file.encryption.is_some()
    }

    /// Remember the keychain password for the rest of this process.
    ///
    /// The password is not checked here; a wrong one surfaces as
    /// `DecryptFailure` on first use. Does nothing for an unencrypted keychain.
    pub fn supply_password(&mut self, password: &str) -> Result<()> {
        let header = match &self.file.encryption {
            Some(header) => header,
            None => return Ok(()),
        };

        let salt = BASE64_STANDARD
            .decode(&header.salt)
            .map_err(|e| SshbookError::Corrupt(format!("bad keychain salt: {}", e)))?;
        self.key = Some(crypto::derive_key(password, &salt, &header.kdf)?);

        Ok(())
    }

    /// Protect the keychain with `password`, sealing every existing record.
    ///
    /// There is no way back: re-keying and decrypting are not supported.
    pub fn encrypt_database(&mut self, password: &str) -> Result<()> {
        if self.is_encrypted() {
            return Err(SshbookError::AlreadyEncrypted);
        }

        let salt = crypto::generate_salt();
        let key = crypto::derive_key(password, &salt, &self.kdf)?;

        let mut records = BTreeMap::new();
        for (alias, stored) in &self.file.records {
            let record = match stored {
                StoredRecord::Plain(record) => record,
                StoredRecord::Sealed(_) => {
                    return Err(SshbookError::Corrupt(format!(
                        "record {} is sealed but the keychain is not encrypted",
                        alias
                    )))
                }
            };
            records.insert(alias.clone(), StoredRecord::Sealed(seal_record(&key, record)?));
        }

        let next = KeychainFile {
            version: KEYCHAIN_VERSION,
            encryption: Some(EncryptionHeader {
                kdf: self.kdf,
                salt: BASE64_STANDARD.encode(salt),
                check: crypto::seal(&key, CHECK_TOKEN)?,
            }),
            records,
        };

        self.persist(&next)?;
        self.file = next;
        self.key = Some(key);

        tracing::info!(path = %self.path.display(), "keychain encrypted");
        Ok(())
    }

    /// Key to use for records: `None` for a plain keychain, an error when
    /// the keychain is encrypted and no (or a wrong) password was supplied.
    fn unlocked_key(&self) -> Result<Option<&Key>> {
        let header = match &self.file.encryption {
            Some(header) => header,
            None => return Ok(None),
        };

        let key = self.key.as_ref().ok_or(SshbookError::PasswordRequired)?;
        let token = crypto::open(key, &header.check)?;
        if token.as_slice() != CHECK_TOKEN {
            return Err(SshbookError::DecryptFailure);
        }

        Ok(Some(key))
    }

    fn persist(&self, file: &KeychainFile) -> Result<()> {
        let bytes = Zeroizing::new(serde_json::to_vec_pretty(file)?);
        write_atomic(&self.path, &bytes)
            .with_context(|| format!("writing keychain {}", self.path.display()))
    }

    /// Fetch the record stored for `alias`
    pub fn get(&self, alias: &str) -> Result<Record> {
        let key = self.unlocked_key()?;

        let stored = self
            .file
            .records
            .get(alias)
            .ok_or_else(|| SshbookError::NotFound(format!("no keychain record for {}", alias)))?;

        match (stored, key) {
            (StoredRecord::Plain(record), _) => Ok(record.clone()),
            (StoredRecord::Sealed(sealed), Some(key)) => {
                let plaintext = crypto::open(key, sealed)?;
                serde_json::from_slice(&plaintext)
                    .map_err(|e| SshbookError::Corrupt(format!("record {}: {}", alias, e)))
            }
            (StoredRecord::Sealed(_), None) => Err(SshbookError::Corrupt(format!(
                "record {} is sealed but the keychain is not encrypted",
                alias
            ))),
        }
    }

    /// Insert or replace the record for `alias`
    pub fn put(&mut self, alias: &str, record: Record) -> Result<()> {
        let stored = match self.unlocked_key()? {
            Some(key) => StoredRecord::Sealed(seal_record(key, &record)?),
            None => StoredRecord::Plain(record),
        };

        let mut next = self.file.clone();
        next.records.insert(alias.to_string(), stored);
        self.persist(&next)?;
        self.file = next;

        tracing::debug!(alias, "keychain record stored");
        Ok(())
    }

    /// Delete the record for `alias`
    pub fn remove(&mut self, alias: &str) -> Result<()> {
        self.unlocked_key()?;

        if !self.file.records.contains_key(alias) {
            return Err(SshbookError::NotFound(format!("no keychain record for {}", alias)));
        }

        let mut next = self.file.clone();
        next.records.remove(alias);
        self.persist(&next)?;
        self.file = next;

        tracing::debug!(alias, "keychain record removed");
        Ok(())
    }
}

fn seal_record(key: &Key, record: &Record) -> Result<Sealed> {
    let plaintext = Zeroizing::new(serde_json::to_vec(record)?);
    crypto::seal(key, &plaintext)
}

impl CredentialRepository for FileCredentialStore {
    fn get(&self, alias: &str) -> Result<Record> {
        FileCredentialStore::get(self, alias)
    }

    fn put(&mut self, alias: &str, record: Record) -> Result<()> {
        FileCredentialStore::put(self, alias, record)
    }

    fn remove(&mut self, alias: &str) -> Result<()> {
        FileCredentialStore::remove(self, alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use std::path::Path;

    fn fast_kdf() -> KdfParams {
        KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn open(path: &Path) -> FileCredentialStore {
        FileCredentialStore::open(path).unwrap().with_kdf_params(fast_kdf())
    }

    #[test]
    fn first_open_creates_file_and_reports_bootstrap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub").join("keychain");

        let store = open(&path);
        assert!(!store.is_bootstrapped());
        assert!(!store.is_encrypted());
        assert!(path.exists());

        let store = open(&path);
        assert!(store.is_bootstrapped());
    }

    #[test]
    fn put_then_get_roundtrip_and_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keychain");
        let mut store = open(&path);

        store.put("web", Record::new("first", "KEY-1")).unwrap();
        assert_eq!(store.get("web").unwrap(), Record::new("first", "KEY-1"));

        store.put("web", Record::new("second", "")).unwrap();
        assert_eq!(store.get("web").unwrap(), Record::new("second", ""));

        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("first"));
        assert!(!on_disk.contains("KEY-1"));

        // survives a reopen
        assert_eq!(open(&path).get("web").unwrap(), Record::new("second", ""));
    }

    #[test]
    fn missing_alias_is_not_found() {
        let dir = tempdir().unwrap();
        let store = open(&dir.path().join("keychain"));
        assert!(matches!(store.get("nope"), Err(SshbookError::NotFound(_))));
    }

    #[test]
    fn garbage_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keychain");
        fs::write(&path, b"\x00\x01not json").unwrap();
        assert!(matches!(
            FileCredentialStore::open(&path),
            Err(SshbookError::Corrupt(_))
        ));
    }

    #[test]
    fn encryption_gates_access() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keychain");

        let mut store = open(&path);
        store.put("db", Record::new("s3cret", "-----BEGIN KEY-----")).unwrap();
        store.encrypt_database("master").unwrap();
        // the handle that encrypted keeps working
        assert_eq!(store.get("db").unwrap().password, "s3cret");

        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("s3cret"));
        assert!(!on_disk.contains("BEGIN KEY"));

        let locked = open(&path);
        assert!(locked.is_encrypted());
        assert_eq!(locked.get("db").unwrap_err(), SshbookError::PasswordRequired);
        // gating comes before lookup
        assert_eq!(locked.get("missing").unwrap_err(), SshbookError::PasswordRequired);

        let mut wrong = open(&path);
        wrong.supply_password("not-master").unwrap();
        assert_eq!(wrong.get("db").unwrap_err(), SshbookError::DecryptFailure);

        let mut right = open(&path);
        right.supply_password("master").unwrap();
        assert_eq!(right.get("db").unwrap(), Record::new("s3cret", "-----BEGIN KEY-----"));
    }

    #[test]
    fn writes_after_encryption_are_sealed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keychain");

        let mut store = open(&path);
        store.encrypt_database("master").unwrap();
        store.put("new", Record::new("later-secret", "")).unwrap();
        assert!(!fs::read_to_string(&path).unwrap().contains("later-secret"));

        let mut locked = open(&path);
        assert_eq!(
            locked.put("other", Record::default()).unwrap_err(),
            SshbookError::PasswordRequired
        );
        locked.supply_password("master").unwrap();
        assert_eq!(locked.get("new").unwrap().password, "later-secret");
    }

    #[test]
    fn encrypting_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir.path().join("keychain"));
        store.encrypt_database("one").unwrap();
        assert_eq!(
            store.encrypt_database("two").unwrap_err(),
            SshbookError::AlreadyEncrypted
        );
    }

    #[test]
    fn remove_deletes_record() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir.path().join("keychain"));
        store.put("a", Record::new("x", "")).unwrap();
        store.remove("a").unwrap();
        assert!(matches!(store.get("a"), Err(SshbookError::NotFound(_))));
        assert!(matches!(store.remove("a"), Err(SshbookError::NotFound(_))));
    }
}
