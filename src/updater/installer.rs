//! Executes staged changes: downloads are placed under `<root>/update/`,
//! verified, and only then moved over the originals. Launchers and the
//! platform bundle cannot be swapped while in use, so they bypass staging
//! and rely on `.old` backups as the recovery path.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::updater::consts::{APP_BUNDLE, APP_BUNDLE_BACKUP, UPDATE_DIR};
use crate::updater::digest::{digest_file, legacy_digests};
use crate::updater::error::{Result, UpdateError};
use crate::updater::fetch::{DownloadJob, Fetcher};
use crate::updater::model::{Action, FileCollection, FileId, Status};
use crate::updater::platform;
use crate::updater::progress::Progress;
use crate::updater::util;

pub struct Installer<'a> {
    root: PathBuf,
    collection: &'a mut FileCollection,
    fetcher: &'a Fetcher,
}

impl<'a> Installer<'a> {
    pub fn new(
        root: impl AsRef<Path>,
        collection: &'a mut FileCollection,
        fetcher: &'a Fetcher,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            collection,
            fetcher,
        }
    }

    /// Runs the whole batch: stage, download, verify, then move into
    /// place. Nothing in a final location is touched unless every staged
    /// file verified, launchers and the platform bundle excepted.
    pub fn install(&mut self, progress: &mut dyn Progress) -> Result<()> {
        self.ensure_writable_root()?;

        let mut downloads = self.collection.staged_downloads();
        self.check_platforms(&downloads)?;

        if self.needs_bundle_refresh(&downloads) {
            self.back_up_bundle()?;
            downloads = self.force_restage_bundle(downloads)?;
        }

        let jobs = self.stage_downloads(&downloads)?;

        progress.set_title("Downloading updates");
        self.fetcher.download_all(jobs, progress)?;

        for &id in &downloads {
            self.verify(id)?;
        }

        self.stage_uninstalls()?;
        self.move_updated_into_place()?;
        self.commit(&downloads)?;

        Ok(())
    }

    fn ensure_writable_root(&self) -> Result<()> {
        let update_dir = self.root.join(UPDATE_DIR);
        if let Err(e) = fs::create_dir_all(&update_dir) {
            warn!("Cannot create {}: {}", update_dir.display(), e);
            return Err(UpdateError::ReadOnlyRoot(
                self.root.to_string_lossy().to_string(),
            ));
        }
        Ok(())
    }

    fn check_platforms(&self, downloads: &[FileId]) -> Result<()> {
        let platform = platform::current_platform();

        for &id in downloads {
            let file = self.collection.file(id);
            let record = match self.collection.winner(id) {
                Some(record) => record,
                None => continue,
            };

            if !platform::applies_to(&record.platforms, platform) {
                return Err(UpdateError::PlatformMismatch {
                    path: file.name.clone(),
                    platform: platform.to_string(),
                });
            }
        }

        Ok(())
    }

    /// The bundle is refreshed as a whole whenever any staged change
    /// touches it
    fn needs_bundle_refresh(&self, downloads: &[FileId]) -> bool {
        downloads
            .iter()
            .any(|&id| platform::in_platform_bundle(&self.collection.file(id).name))
    }

    /// Copies the platform bundle to its `.old.app` sibling, replacing any
    /// prior backup
    fn back_up_bundle(&self) -> Result<()> {
        let bundle = self.root.join(APP_BUNDLE);
        if !bundle.exists() {
            return Ok(());
        }

        let backup = self.root.join(APP_BUNDLE_BACKUP);
        if backup.exists() {
            fs::remove_dir_all(&backup)?;
        }

        info!("Backing up {} to {}", APP_BUNDLE, APP_BUNDLE_BACKUP);
        copy_tree(&bundle, &backup)?;
        Ok(())
    }

    /// Re-stages every installed file inside the bundle so the bundle is
    /// replaced as a unit
    fn force_restage_bundle(&mut self, mut downloads: Vec<FileId>) -> Result<Vec<FileId>> {
        for (id, file) in self.collection.iter() {
            if !platform::in_platform_bundle(&file.name) {
                continue;
            }
            if file.status == Status::Installed && !downloads.contains(&id) {
                downloads.push(id);
            }
        }

        for &id in &downloads {
            if platform::in_platform_bundle(&self.collection.file(id).name) {
                let file = self.collection.file_mut(id);
                if !file.action.is_download() {
                    file.action = Action::Update;
                }
            }
        }

        Ok(downloads)
    }

    /// Builds download jobs, deciding per file whether it stages under
    /// `update/` or goes directly to its final path
    fn stage_downloads(&mut self, downloads: &[FileId]) -> Result<Vec<DownloadJob>> {
        let mut jobs = Vec::with_capacity(downloads.len());

        for &id in downloads {
            let file = self.collection.file(id);
            let name = file.name.clone();
            let record = self.collection.winner(id).ok_or_else(|| {
                UpdateError::IllegalState(format!("{} has no owning update site", name))
            })?;
            let current = record.current.as_ref().ok_or_else(|| {
                UpdateError::IllegalState(format!("{} has no current version", name))
            })?;
            let site = self.collection.site(&record.site).ok_or_else(|| {
                UpdateError::IllegalState(format!("unknown update site {}", record.site))
            })?;

            let url = site.file_url(&name, current.timestamp);
            let destination = if self.bypasses_staging(&name, record.executable) {
                // In-bundle files rely on the whole-bundle backup instead of
                // per-file sidesteps
                if !platform::in_platform_bundle(&name) {
                    self.sidestep_installed(&name)?;
                }
                self.checked_path(&name)?
            } else {
                self.checked_path(&format!("{}/{}", UPDATE_DIR, name))?
            };

            jobs.push(DownloadJob {
                name,
                url,
                destination,
            });
        }

        Ok(jobs)
    }

    /// Launchers, executables, and in-bundle files skip the staging area
    fn bypasses_staging(&self, name: &str, executable: bool) -> bool {
        platform::launcher_platform(name).is_some()
            || platform::in_platform_bundle(name)
            || executable
            || name.starts_with("config/")
    }

    /// Renames the installed copy out of the way so the download can land
    /// on the final path even while the file is executing
    fn sidestep_installed(&self, name: &str) -> Result<()> {
        let target = self.checked_path(name)?;
        if !target.exists() {
            return Ok(());
        }

        let old = old_name(&target);
        util::remove_file_ignore_not_found(&old)?;
        fs::rename(&target, &old)?;
        debug!("Moved {} aside to {}", target.display(), old.display());
        Ok(())
    }

    /// Verifies a downloaded file: byte length first, then the current or
    /// any legacy digest. A failure aborts the whole batch.
    fn verify(&self, id: FileId) -> Result<()> {
        let file = self.collection.file(id);
        let name = &file.name;
        let record = self
            .collection
            .winner(id)
            .ok_or_else(|| UpdateError::IllegalState(format!("{} lost its record", name)))?;
        let current = record
            .current
            .as_ref()
            .ok_or_else(|| UpdateError::IllegalState(format!("{} lost its version", name)))?;

        let path = if self.bypasses_staging(name, record.executable) {
            self.checked_path(name)?
        } else {
            self.checked_path(&format!("{}/{}", UPDATE_DIR, name))?
        };

        let actual_size = path.metadata()?.len();
        if record.filesize != 0 && actual_size != record.filesize {
            return Err(UpdateError::SizeMismatch {
                path: name.clone(),
                expected: record.filesize,
                actual: actual_size,
            });
        }

        let digest = digest_file(name, &path)?;
        if digest != current.checksum {
            let legacy = legacy_digests(name, &path)?;
            if !legacy.iter().any(|d| *d == current.checksum) {
                return Err(UpdateError::DigestMismatch {
                    path: name.clone(),
                    expected: current.checksum.to_string(),
                    actual: digest.to_string(),
                });
            }
        }

        debug!("Verified {}", name);
        Ok(())
    }

    /// Zero-length placeholders in the update tree mark deletions
    fn stage_uninstalls(&mut self) -> Result<()> {
        let uninstalls: Vec<FileId> = self
            .collection
            .iter()
            .filter(|(_, f)| f.action == Action::Uninstall)
            .map(|(id, _)| id)
            .collect();

        for id in uninstalls {
            let filename = self.collection.file(id).local_filename().to_string();
            let marker = self.checked_path(&format!("{}/{}", UPDATE_DIR, filename))?;
            util::ensure_parent(&marker)?;
            fs::File::create(&marker)?;
            debug!("Staged deletion of {}", filename);
        }

        Ok(())
    }

    /// Walks the update tree and applies it: placeholders delete their
    /// targets, everything else renames over them, sidestepping locked
    /// targets via `.old` names once before giving up.
    pub fn move_updated_into_place(&mut self) -> Result<()> {
        let update_dir = self.root.join(UPDATE_DIR);
        if !update_dir.is_dir() {
            return Ok(());
        }

        for entry in WalkDir::new(&update_dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&update_dir)
                .expect("walked entry under update dir")
                .to_string_lossy()
                .to_string();
            let relative = util::convert_backslash_to_forward(&relative).into_owned();
            let target = self.checked_path(&relative)?;

            if entry.metadata()?.len() == 0 {
                util::remove_file_ignore_not_found(&target)?;
                fs::remove_file(entry.path())?;
                if let Some(parent) = target.parent() {
                    util::clean_dirs_up(parent, &self.root)?;
                }
                info!("Removed {}", relative);
                continue;
            }

            util::ensure_parent(&target)?;
            if let Err(first) = fs::rename(entry.path(), &target) {
                // The target may be locked; move it aside and try once more
                let sidestep = vacant_old_name(&target);
                warn!(
                    "Could not replace {} ({}); sidestepping via {}",
                    target.display(),
                    first,
                    sidestep.display()
                );
                fs::rename(&target, &sidestep)?;
                fs::rename(entry.path(), &target)?;
            }
            info!("Installed {}", relative);
        }

        util::clean_dirs_down(&update_dir)?;
        if update_dir.exists() && util::dir_is_empty(&update_dir)? {
            fs::remove_dir(&update_dir)?;
        }

        Ok(())
    }

    /// Updates the model after a successful batch: downloads become
    /// installed, uninstalls disappear, executables get their bit set
    fn commit(&mut self, downloads: &[FileId]) -> Result<()> {
        for &id in downloads {
            let (checksum, timestamp, filesize, executable) = {
                let record = self.collection.winner(id).ok_or_else(|| {
                    UpdateError::IllegalState("installed file lost its record".to_string())
                })?;
                let current = record.current.as_ref().ok_or_else(|| {
                    UpdateError::IllegalState("installed file lost its version".to_string())
                })?;
                (
                    current.checksum.clone(),
                    current.timestamp,
                    record.filesize,
                    record.executable,
                )
            };

            let name = self.collection.file(id).name.clone();
            let path = self.checked_path(&name)?;

            if executable || platform::launcher_platform(&name).is_some() {
                util::make_executable(&path)?;
            }

            let file = self.collection.file_mut(id);
            file.local.filename = Some(name);
            file.local.digest = Some(checksum);
            file.local.legacy_digests = Vec::new();
            file.local.filesize = filesize;
            file.local.timestamp = Some(timestamp);
            file.tracked = true;
            self.collection.reconcile(id);
        }

        let uninstalled: Vec<FileId> = self
            .collection
            .iter()
            .filter(|(_, f)| f.action == Action::Uninstall)
            .map(|(id, _)| id)
            .collect();
        for id in uninstalled {
            self.collection.clear_local(id);
        }

        Ok(())
    }

    /// Resolves a relative path against the root, refusing anything that
    /// would escape it
    fn checked_path(&self, relative: &str) -> Result<PathBuf> {
        if Path::new(relative).is_absolute()
            || relative.split('/').any(|part| part == "..")
        {
            return Err(UpdateError::ProtectedLocation(relative.to_string()));
        }
        Ok(self
            .root
            .join(util::convert_forwardslash_to_back(relative).as_ref()))
    }
}

/// `launcher` becomes `launcher.old`; Windows executables keep their
/// extension: `launcher.exe` becomes `launcher.old.exe`
fn old_name(path: &Path) -> PathBuf {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    let old = match name.strip_suffix(".exe") {
        Some(stem) => format!("{}.old.exe", stem),
        None => format!("{}.old", name),
    };
    path.with_file_name(old)
}

/// The first unoccupied `.old` / `.oldN` sibling
fn vacant_old_name(path: &Path) -> PathBuf {
    let first = old_name(path);
    if !first.exists() {
        return first;
    }

    let mut n = 1;
    loop {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        let candidate = match name.strip_suffix(".exe") {
            Some(stem) => path.with_file_name(format!("{}.old{}.exe", stem, n)),
            None => path.with_file_name(format!("{}.old{}", name, n)),
        };
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Recursive directory copy preserving the tree shape
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(from).expect("entry under from");
        let destination = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            util::ensure_parent(&destination)?;
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    use super::*;

    #[test]
    fn old_names() {
        assert_eq!(
            PathBuf::from("/r/Spectra-linux64.old"),
            old_name(Path::new("/r/Spectra-linux64"))
        );
        assert_eq!(
            PathBuf::from("/r/Spectra-win64.old.exe"),
            old_name(Path::new("/r/Spectra-win64.exe"))
        );
    }

    #[test]
    fn path_escapes_are_protected() {
        let temp = TempDir::new().unwrap();
        let mut collection = FileCollection::new();
        let fetcher = Fetcher::new().unwrap();
        let installer = Installer::new(temp.path(), &mut collection, &fetcher);

        assert!(installer.checked_path("jars/ok.jar").is_ok());
        assert!(matches!(
            installer.checked_path("../escape.jar"),
            Err(UpdateError::ProtectedLocation(_))
        ));
        assert!(matches!(
            installer.checked_path("jars/../../escape.jar"),
            Err(UpdateError::ProtectedLocation(_))
        ));
    }

    #[test]
    fn move_updated_applies_writes_and_deletes() {
        let temp = TempDir::new().unwrap();
        temp.child("macros/stale.ijm").write_str("stale").unwrap();
        temp.child("update/macros/fresh.ijm")
            .write_str("fresh")
            .unwrap();
        // Zero-length placeholder marks a deletion
        temp.child("update/macros/stale.ijm").touch().unwrap();

        let mut collection = FileCollection::new();
        let fetcher = Fetcher::new().unwrap();
        let mut installer = Installer::new(temp.path(), &mut collection, &fetcher);
        installer.move_updated_into_place().unwrap();

        temp.child("macros/fresh.ijm").assert("fresh");
        temp.child("macros/stale.ijm")
            .assert(predicates::path::missing());
        temp.child("update").assert(predicates::path::missing());
    }

    #[test]
    fn bundle_backup_replaces_previous() {
        let temp = TempDir::new().unwrap();
        temp.child("Spectra.app/Contents/Info.plist")
            .write_str("v2")
            .unwrap();
        temp.child("Spectra.old.app/Contents/Info.plist")
            .write_str("v1")
            .unwrap();

        let mut collection = FileCollection::new();
        let fetcher = Fetcher::new().unwrap();
        let installer = Installer::new(temp.path(), &mut collection, &fetcher);
        installer.back_up_bundle().unwrap();

        temp.child("Spectra.old.app/Contents/Info.plist").assert("v2");
    }
}
