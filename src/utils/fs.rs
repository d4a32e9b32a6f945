use crate::errors::{ErrorContext, Result, SshbookError};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Ensure a directory exists with proper permissions
pub fn ensure_directory(path: &Path) -> io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;

        // Set proper permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
        }
    }

    Ok(())
}

/// Directory a file lives in, `.` for bare file names
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Replace `path` with `contents` so that readers see either the old or the
/// new file, never a partial one.
///
/// The data goes to a temporary file in the same directory (mode 0600 on
/// Unix), is synced, and is then renamed over the target.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = parent_dir(path);
    ensure_directory(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .with_context(|| format!("restricting permissions of {}", tmp.path().display()))?;
    }

    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .with_context(|| format!("writing {}", path.display()))?;

    tmp.persist(path).map_err(SshbookError::from)?;
    Ok(())
}

/// Move an existing file aside to `<name>.bak`, returning the new location.
/// Returns `None` when there was nothing to move.
pub fn move_aside(path: &Path) -> io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    let backup_path = PathBuf::from(name);

    fs::rename(path, &backup_path)?;

    Ok(Some(backup_path))
}

/// Get the sshbook data directory (`~/.sshbook`)
pub fn sshbook_config_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".sshbook"))
        .ok_or_else(|| SshbookError::Config("could not determine home directory".to_string()))
}

/// Get the SSH config directory (`~/.ssh`)
pub fn ssh_config_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".ssh"))
        .ok_or_else(|| SshbookError::Config("could not determine home directory".to_string()))
}
