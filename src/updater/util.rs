use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::Path;
use std::{fs, io, path};

use walkdir::WalkDir;

use crate::updater::error::Result;

/// Indicates if the system path separator is `\`
pub const BACKSLASH_SEPARATOR: bool = path::MAIN_SEPARATOR == '\\';

/// Walks up the directory hierarchy deleting empty directories, never
/// crossing `stop`.
pub fn clean_dirs_up(start_dir: impl AsRef<Path>, stop: impl AsRef<Path>) -> Result<()> {
    let mut current = start_dir.as_ref();
    let stop = stop.as_ref();

    while current != stop && current.exists() && dir_is_empty(current)? {
        fs::remove_dir(current)?;
        current = match current.parent() {
            Some(parent) => parent,
            None => break,
        };
    }

    Ok(())
}

/// Walks down the directory hierarchy deleting all empty directories
pub fn clean_dirs_down(start_dir: impl AsRef<Path>) -> Result<()> {
    let start_dir = start_dir.as_ref();

    for entry in WalkDir::new(start_dir).contents_first(true) {
        let path = entry?;
        if path.file_type().is_dir() && dir_is_empty(path.path())? {
            fs::remove_dir(path.path())?;
        }
    }

    Ok(())
}

/// Identical to `fs::remove_file()` except `NotFound` errors are ignored
pub fn remove_file_ignore_not_found(path: impl AsRef<Path>) -> io::Result<()> {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            return Err(e);
        }
    }
    Ok(())
}

/// Returns true if the specified directory does not contain any files
pub fn dir_is_empty(dir: impl AsRef<Path>) -> Result<bool> {
    Ok(fs::read_dir(dir)?.next().is_none())
}

/// Creates all missing parent directories of the given path
pub fn ensure_parent(path: impl AsRef<Path>) -> io::Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Changes `/` to `\` on Windows
pub fn convert_forwardslash_to_back(path: &str) -> Cow<str> {
    if BACKSLASH_SEPARATOR && path.contains('/') {
        return Cow::Owned(path.replace('/', "\\"));
    }
    path.into()
}

/// Changes `\\` to `/` on Windows
pub fn convert_backslash_to_forward(path: &str) -> Cow<str> {
    if BACKSLASH_SEPARATOR && path.contains('\\') {
        return Cow::Owned(path.replace('\\', "/"));
    }
    path.into()
}

/// Marks the file executable on Unix. No-op elsewhere.
#[cfg(unix)]
pub fn make_executable(path: impl AsRef<Path>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path.as_ref())?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path.as_ref(), perms)
}

#[cfg(not(unix))]
pub fn make_executable(_path: impl AsRef<Path>) -> io::Result<()> {
    Ok(())
}
