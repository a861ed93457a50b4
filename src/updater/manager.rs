//! The façade the CLI drives: owns the collection, the digest cache, and
//! the network layer, and sequences scan, merge, conflict, install, and
//! upload operations against one installation root.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::updater::cache::ChecksumCache;
use crate::updater::conflicts::{can_proceed, Conflict, ConflictEngine, ResolutionEffect};
use crate::updater::consts::{CHECKSUMS_FILE, DB_XML, UPDATE_DIR};
use crate::updater::deps;
use crate::updater::digest::{digest_file, legacy_digests};
use crate::updater::error::{Result, UpdateError};
use crate::updater::fetch::{DownloadJob, Fetcher};
use crate::updater::installer::Installer;
use crate::updater::model::{
    Action, Dependency, FileCollection, FileId, Status, Version,
};
use crate::updater::platform;
use crate::updater::progress::Progress;
use crate::updater::scanner::Scanner;
use crate::updater::timestamp::Timestamp;
use crate::updater::transport::create_transport;
use crate::updater::uploader::Uploader;
use crate::updater::util;
use crate::updater::xml::{CatalogReader, CatalogWriter};

/// Scope selector for bulk staging
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UpdatePolicy {
    /// Install what is new, update what is updateable, uninstall obsoletes
    Default,
    /// Additionally overwrite locally modified files
    Force,
    /// Additionally re-install `NOT_INSTALLED` files and remove obsolete
    /// local copies, restoring the pristine catalog state
    ForcePristine,
}

pub struct UpdateManager {
    root: PathBuf,
    collection: FileCollection,
    cache: ChecksumCache,
    fetcher: Fetcher,
}

impl UpdateManager {
    /// Opens an installation root, reading the local catalog and digest
    /// cache when they exist
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(UpdateError::IllegalState(format!(
                "Installation root {} does not exist",
                root.display()
            )));
        }

        let mut collection = FileCollection::new();
        let db = root.join(DB_XML);
        if db.exists() {
            CatalogReader::new(&mut collection).read_local_gz(&db)?;
        }

        let cache = ChecksumCache::load(root.join(CHECKSUMS_FILE))?;

        Ok(Self {
            root,
            collection,
            cache,
            fetcher: Fetcher::new()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collection(&self) -> &FileCollection {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut FileCollection {
        &mut self.collection
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Fetches and merges every active site's catalog. With `strict` false,
    /// unreachable sites degrade to their last known state for status
    /// queries; with `strict` true (any operation about to modify state)
    /// the first unreachable site aborts.
    pub fn fetch_remote_catalogs(&mut self, strict: bool) -> Result<()> {
        let sites: Vec<(String, String)> = self
            .collection
            .active_sites()
            .map(|site| (site.name.clone(), site.catalog_url()))
            .collect();

        for (name, url) in sites {
            info!("Fetching catalog of {}", name);

            let bytes = match self.fetcher.fetch_bytes(&url) {
                Ok(bytes) => bytes,
                Err(e) => {
                    if strict {
                        return Err(e);
                    }
                    warn!("Treating {} as up-to-date: {}", name, e);
                    continue;
                }
            };

            CatalogReader::new(&mut self.collection).read_remote_gz(&name, &bytes)?;

            let probed = self.fetcher.probe(&url)?;
            if let Some(site) = self.collection.site_mut(&name) {
                site.timestamp = probed;
            }
        }

        Ok(())
    }

    /// Scans the installation and persists the refreshed digest cache
    pub fn scan(&mut self) -> Result<Vec<Conflict>> {
        let conflicts =
            Scanner::new(&self.root, &mut self.collection, &mut self.cache).scan()?;
        self.cache.save()?;
        Ok(conflicts)
    }

    /// Lists conflicts in the staged changes
    pub fn conflicts(&self, for_upload: bool) -> Vec<Conflict> {
        ConflictEngine::new(&self.collection, &self.root).list(for_upload)
    }

    /// Applies one resolution effect
    pub fn apply_resolution(&mut self, effect: &ResolutionEffect) -> Result<()> {
        match effect {
            ResolutionEffect::Ignore => Ok(()),
            ResolutionEffect::SetAction { file, action } => {
                self.collection.set_action(*file, *action)
            }
            ResolutionEffect::DeleteLocalFiles { paths } => {
                for path in paths {
                    util::remove_file_ignore_not_found(self.root.join(path))?;
                    self.cache.remove(path);
                    info!("Deleted {}", path);
                }
                self.cache.save()
            }
            ResolutionEffect::RemoveDependency { file, dependency } => {
                if let Some(record) = self.collection.winner_mut(*file) {
                    record.dependencies.retain(|d| d.filename != *dependency);
                }
                Ok(())
            }
            ResolutionEffect::StripDependencies { file } => {
                if let Some(record) = self.collection.winner_mut(*file) {
                    record.dependencies.clear();
                }
                Ok(())
            }
            ResolutionEffect::Rechecksum { file } => {
                self.rechecksum(*file)?;
                Ok(())
            }
        }
    }

    /// Recomputes a file's digests bypassing the cache
    fn rechecksum(&mut self, id: FileId) -> Result<Status> {
        let (name, filename) = {
            let file = self.collection.file(id);
            (file.name.clone(), file.local_filename().to_string())
        };
        let path = self.root.join(&filename);

        if !path.exists() {
            self.collection.clear_local(id);
            return Ok(self.collection.file(id).status);
        }

        let mtime = Timestamp::from_mtime(&path)?;
        let digest = digest_file(&name, &path)?;
        let legacy = legacy_digests(&name, &path)?;
        self.cache.put(&filename, mtime, &digest, &legacy);

        let file = self.collection.file_mut(id);
        file.local.digest = Some(digest);
        file.local.legacy_digests = legacy;
        file.local.timestamp = Some(mtime);
        file.local.filesize = path.metadata()?.len();
        self.collection.reconcile(id);
        Ok(self.collection.file(id).status)
    }

    /// Stages the bulk update actions selected by the policy, restricted
    /// to files applying to the running platform. Returns what was staged.
    pub fn stage_updates(&mut self, policy: UpdatePolicy) -> Result<Vec<FileId>> {
        let ids = self.collection.ids();
        self.stage_updates_for(&ids, policy)
    }

    /// Like `stage_updates`, but restricted to the given files
    pub fn stage_updates_for(
        &mut self,
        ids: &[FileId],
        policy: UpdatePolicy,
    ) -> Result<Vec<FileId>> {
        let platform = platform::current_platform();
        let mut staged = Vec::new();

        for &id in ids {
            let applies = self
                .collection
                .winner(id)
                .map(|record| platform::applies_to(&record.platforms, platform))
                .unwrap_or(false);
            if !applies {
                continue;
            }

            let status = self.collection.file(id).status;
            let action = match status {
                Status::New => Some(Action::Install),
                Status::Updateable => Some(Action::Update),
                Status::Modified if policy != UpdatePolicy::Default => Some(Action::Update),
                Status::Obsolete | Status::ObsoleteModified
                    if policy == UpdatePolicy::ForcePristine =>
                {
                    Some(Action::Uninstall)
                }
                Status::NotInstalled if policy == UpdatePolicy::ForcePristine => {
                    Some(Action::Install)
                }
                _ => None,
            };

            if let Some(action) = action {
                staged.extend(self.collection.stage(id, action)?);
            }
        }

        Ok(staged)
    }

    /// Runs the staged batch through the installer and persists the
    /// resulting catalog
    pub fn install(&mut self, progress: &mut dyn Progress) -> Result<()> {
        let conflicts = self.conflicts(false);
        if !can_proceed(&conflicts) {
            return Err(UpdateError::IllegalState(
                "Critical conflicts remain; resolve them first".to_string(),
            ));
        }

        Installer::new(&self.root, &mut self.collection, &self.fetcher).install(progress)?;
        self.refresh_cache_after_install()?;
        self.write_local_catalog()
    }

    fn refresh_cache_after_install(&mut self) -> Result<()> {
        for id in self.collection.ids() {
            let file = self.collection.file(id);
            if file.status != Status::Installed {
                continue;
            }
            if let (Some(filename), Some(digest)) =
                (file.local.filename.clone(), file.local.digest.clone())
            {
                let path = self.root.join(&filename);
                if let Ok(mtime) = Timestamp::from_mtime(&path) {
                    let legacy = file.local.legacy_digests.clone();
                    self.cache.put(&filename, mtime, &digest, &legacy);
                    self.collection.file_mut(id).local.timestamp = Some(mtime);
                }
            }
        }
        self.cache.save()
    }

    /// Publishes the staged uploads to one site
    pub fn upload(
        &mut self,
        site: &str,
        progress: &mut dyn Progress,
    ) -> Result<Timestamp> {
        let conflicts = self.conflicts(true);
        if !can_proceed(&conflicts) {
            return Err(UpdateError::IllegalState(
                "Critical conflicts remain; resolve them first".to_string(),
            ));
        }

        let site_record = self
            .collection
            .site(site)
            .ok_or_else(|| UpdateError::NotFound(format!("Update site {}", site)))?;
        let mut transport = create_transport(site_record)?;

        let timestamp = Uploader::new(&self.root, &mut self.collection, site)
            .upload(transport.as_mut(), progress)?;

        self.write_local_catalog()?;
        Ok(timestamp)
    }

    /// Refreshes the dependency declarations of a file from its archive
    /// contents before an upload
    pub fn refresh_dependencies(&mut self, id: FileId) -> Result<()> {
        let (name, filename, declared) = {
            let file = self.collection.file(id);
            let declared = self
                .collection
                .winner(id)
                .map(|record| {
                    record
                        .dependencies
                        .iter()
                        .map(|d| d.filename.clone())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            (file.name.clone(), file.local_filename().to_string(), declared)
        };

        if !name.ends_with(".jar") {
            return Ok(());
        }

        let analyzed = deps::analyze_installed(&self.root, &name, &filename, &declared)?;

        if let Some(record) = self.collection.winner_mut(id) {
            let kept_overrides: Vec<Dependency> = record
                .dependencies
                .iter()
                .filter(|d| d.overrides)
                .cloned()
                .collect();

            record.dependencies = kept_overrides;
            for dep in analyzed {
                if record.dependency(&dep).is_none() {
                    record.dependencies.push(Dependency::new(dep));
                }
            }
        }

        Ok(())
    }

    /// Stages the newest previous version at or before `timestamp` for
    /// each file, downloads, verifies, and moves it into place
    pub fn downgrade(
        &mut self,
        timestamp: Timestamp,
        ids: &[FileId],
        progress: &mut dyn Progress,
    ) -> Result<Vec<String>> {
        let mut jobs = Vec::new();
        let mut expected: Vec<(FileId, Version)> = Vec::new();
        let mut downgraded = Vec::new();

        for &id in ids {
            let file = self.collection.file(id);
            let name = file.name.clone();
            let record = match self.collection.winner(id) {
                Some(record) => record,
                None => continue,
            };
            let site = match self.collection.site(&record.site) {
                Some(site) => site,
                None => continue,
            };

            // Newest version at or before the requested instant
            let candidate = record
                .current
                .iter()
                .chain(record.previous.iter())
                .filter(|v| v.timestamp <= timestamp)
                .max_by_key(|v| v.timestamp)
                .cloned();

            let version = match candidate {
                Some(version) => version,
                None => {
                    warn!("{} has no version at or before {}", name, timestamp);
                    continue;
                }
            };

            if file.local.matches(&version.checksum) {
                continue;
            }

            jobs.push(DownloadJob {
                name: name.clone(),
                url: site.file_url(&name, version.timestamp),
                destination: self.root.join(UPDATE_DIR).join(&name),
            });
            expected.push((id, version));
            downgraded.push(name);
        }

        if jobs.is_empty() {
            return Ok(downgraded);
        }

        progress.set_title("Downloading older versions");
        self.fetcher.download_all(jobs, progress)?;

        for (id, version) in &expected {
            let name = self.collection.file(*id).name.clone();
            let staged = self.root.join(UPDATE_DIR).join(&name);
            let digest = digest_file(&name, &staged)?;
            if digest != version.checksum {
                let legacy = legacy_digests(&name, &staged)?;
                if !legacy.iter().any(|d| *d == version.checksum) {
                    return Err(UpdateError::DigestMismatch {
                        path: name,
                        expected: version.checksum.to_string(),
                        actual: digest.to_string(),
                    });
                }
            }
        }

        Installer::new(&self.root, &mut self.collection, &self.fetcher)
            .move_updated_into_place()?;

        for (id, _) in expected {
            self.rechecksum(id)?;
        }
        self.cache.save()?;

        Ok(downgraded)
    }

    /// Re-checksums modified files without the cache; files whose fresh
    /// digests match the catalog again had no real change. Returns the
    /// names whose modified state evaporated.
    pub fn revert_unreal_changes(&mut self, ids: &[FileId], simulate: bool) -> Result<Vec<String>> {
        let mut reverted = Vec::new();

        for &id in ids {
            let before = self.collection.file(id).status;
            if !matches!(before, Status::Modified | Status::ObsoleteModified) {
                continue;
            }

            if simulate {
                // Probe without persisting: recompute and compare
                let file = self.collection.file(id);
                let name = file.name.clone();
                let path = self.root.join(file.local_filename());
                if !path.exists() {
                    continue;
                }
                let digest = digest_file(&name, &path)?;
                let matched = self
                    .collection
                    .winner(id)
                    .and_then(|record| record.current.as_ref())
                    .map(|current| {
                        digest == current.checksum
                            || legacy_digests(&name, &path)
                                .map(|l| l.iter().any(|d| *d == current.checksum))
                                .unwrap_or(false)
                    })
                    .unwrap_or(false);
                if matched {
                    reverted.push(name);
                }
                continue;
            }

            let after = self.rechecksum(id)?;
            if after != before && !matches!(after, Status::Modified | Status::ObsoleteModified) {
                reverted.push(self.collection.file(id).name.clone());
            }
        }

        if !simulate {
            self.cache.save()?;
        }

        Ok(reverted)
    }

    /// Serializes the merged catalog back to `<root>/db.xml.gz`
    pub fn write_local_catalog(&self) -> Result<()> {
        CatalogWriter::new(&self.collection).write_local_gz(self.root.join(DB_XML))
    }

    /// Fetches the current payload of a file into memory for comparison
    pub fn fetch_current_payload(&self, id: FileId) -> Result<Vec<u8>> {
        let file = self.collection.file(id);
        let record = self
            .collection
            .winner(id)
            .ok_or_else(|| UpdateError::NotFound(file.name.clone()))?;
        let current = record.current.as_ref().ok_or_else(|| {
            UpdateError::NotFound(format!("{} has no current version", file.name))
        })?;
        let site = self
            .collection
            .site(&record.site)
            .ok_or_else(|| UpdateError::NotFound(record.site.clone()))?;

        self.fetcher
            .fetch_bytes(&site.file_url(&file.name, current.timestamp))
    }

    /// Deletes a local-only file from disk and the model
    pub fn delete_local_only(&mut self, id: FileId) -> Result<()> {
        let file = self.collection.file(id);
        if file.status != Status::LocalOnly {
            return Err(UpdateError::IllegalState(format!(
                "{} is {}; only local-only files can be deleted",
                file.name, file.status
            )));
        }

        let filename = file.local_filename().to_string();
        fs::remove_file(self.root.join(&filename))?;
        self.cache.remove(&filename);
        self.cache.save()?;
        self.collection.clear_local(id);
        Ok(())
    }
}
