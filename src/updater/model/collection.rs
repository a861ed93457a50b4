use std::collections::{HashMap, VecDeque};

use log::{debug, info};

use crate::updater::error::{Result, UpdateError};
use crate::updater::model::file::{
    strip_version_suffix, Action, FileId, FileRecord, LocalState, LogicalFile, RecordId, Status,
};
use crate::updater::model::site::UpdateSite;
use crate::updater::model::version::Version;
use crate::updater::timestamp::Timestamp;

/// The merged view of every update site plus the local installation.
///
/// Per-site records live in an arena and are never merged destructively;
/// each logical file keeps a stack of `(rank, record)` pairs and the
/// highest-ranked record of an active site wins. Logical files iterate in
/// insertion order.
#[derive(Debug, Default)]
pub struct FileCollection {
    sites: Vec<UpdateSite>,
    records: Vec<FileRecord>,
    files: Vec<LogicalFile>,
    index: HashMap<String, FileId>,
}

impl FileCollection {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- sites ----

    /// Registers a new update site. The rank is one past the highest rank
    /// handed out so far and never changes afterwards.
    pub fn add_site(&mut self, name: impl Into<String>, url: impl Into<String>) -> Result<usize> {
        let name = name.into();
        if self.site(&name).is_some() {
            return Err(UpdateError::IllegalArgument(format!(
                "Update site {} already exists",
                name
            )));
        }

        let rank = self.sites.iter().map(|s| s.rank() + 1).max().unwrap_or(0);
        info!("Adding update site {} (rank {})", name, rank);
        self.sites.push(UpdateSite::new(name, url, rank));
        Ok(rank)
    }

    /// Inserts a fully-populated site, keeping its rank. Used when reading
    /// the local catalog back in.
    pub fn insert_site(&mut self, site: UpdateSite) -> Result<()> {
        if self.site(&site.name).is_some() {
            return Err(UpdateError::IllegalArgument(format!(
                "Update site {} already exists",
                site.name
            )));
        }
        self.sites.push(site);
        Ok(())
    }

    pub fn site(&self, name: &str) -> Option<&UpdateSite> {
        self.sites.iter().find(|s| s.name == name)
    }

    pub fn site_mut(&mut self, name: &str) -> Option<&mut UpdateSite> {
        self.sites.iter_mut().find(|s| s.name == name)
    }

    fn site_by_rank(&self, rank: usize) -> Option<&UpdateSite> {
        self.sites.iter().find(|s| s.rank() == rank)
    }

    pub fn sites(&self) -> impl Iterator<Item = &UpdateSite> {
        self.sites.iter()
    }

    pub fn active_sites(&self) -> impl Iterator<Item = &UpdateSite> {
        self.sites.iter().filter(|s| s.active)
    }

    /// Deactivates a site: its records stop participating in winner
    /// resolution. Shadowed entries are promoted, inheriting the dropped
    /// record's version history so the reconciler sees the local copy as a
    /// previous version. Returns the promoted files.
    pub fn deactivate_site(&mut self, name: &str) -> Result<Vec<FileId>> {
        let rank = match self.site(name) {
            Some(site) => site.rank(),
            None => return Err(UpdateError::NotFound(format!("Update site {}", name))),
        };

        info!("Deactivating update site {}", name);

        if let Some(site) = self.site_mut(name) {
            site.active = false;
        }

        let mut promoted = Vec::new();

        for id in 0..self.files.len() {
            let had_entry = self.files[id].entries.iter().any(|(r, _)| *r == rank);
            if !had_entry {
                continue;
            }

            let removed: Vec<RecordId> = self.files[id]
                .entries
                .iter()
                .filter(|(r, _)| *r == rank)
                .map(|(_, rec)| *rec)
                .collect();
            self.files[id].entries.retain(|(r, _)| *r != rank);

            let heir = self.winner_entry(id);

            if let Some(heir) = heir {
                // Fold the dropped record's history into the promoted one
                let mut displaced: Vec<Version> = Vec::new();
                for rec_id in removed {
                    let record = &self.records[rec_id];
                    displaced.extend(record.current.iter().cloned());
                    displaced.extend(record.previous.iter().cloned());
                }
                let heir_record = &mut self.records[heir];
                for version in displaced {
                    heir_record.previous.insert(version);
                }

                self.reconcile(id);
                if self.files[id].status == Status::Updateable {
                    self.files[id].action = Action::Update;
                    promoted.push(id);
                }
            } else {
                self.files[id].tracked = false;
                self.reconcile(id);
                if !self.files[id].is_installed_locally() {
                    self.remove_file(id);
                }
            }
        }

        Ok(promoted)
    }

    /// Marks a site active again. The caller is expected to re-read the
    /// site's catalog afterwards to rebuild its records.
    pub fn activate_site(&mut self, name: &str) -> Result<()> {
        match self.site_mut(name) {
            Some(site) => {
                site.active = true;
                Ok(())
            }
            None => Err(UpdateError::NotFound(format!("Update site {}", name))),
        }
    }

    /// Removes a site entirely. Ranks of the remaining sites are unchanged.
    pub fn remove_site(&mut self, name: &str) -> Result<Vec<FileId>> {
        let promoted = self.deactivate_site(name)?;
        self.sites.retain(|s| s.name != name);
        Ok(promoted)
    }

    /// Drops a site's records ahead of a fresh catalog read. Logical files
    /// left with no entries and no local copy disappear; the rest are
    /// reconciled against their surviving entries.
    pub fn drop_site_records(&mut self, name: &str) {
        let rank = match self.site(name) {
            Some(site) => site.rank(),
            None => return,
        };

        for id in 0..self.files.len() {
            let before = self.files[id].entries.len();
            self.files[id].entries.retain(|(r, _)| *r != rank);

            if self.files[id].entries.len() != before {
                if self.files[id].entries.is_empty() && !self.files[id].is_installed_locally() {
                    self.remove_file(id);
                } else {
                    self.reconcile(id);
                }
            }
        }
    }

    // ---- records ----

    /// Inserts a catalog record for its site, shadowing or being shadowed
    /// by records other sites hold for the same logical name.
    pub fn insert_record(&mut self, record: FileRecord) -> Result<FileId> {
        let rank = match self.site(&record.site) {
            Some(site) => site.rank(),
            None => {
                return Err(UpdateError::IllegalState(format!(
                    "Record {} references unknown update site {}",
                    record.filename, record.site
                )))
            }
        };

        let key = strip_version_suffix(&record.filename);
        let site_name = record.site.clone();

        let id = match self.index.get(&key) {
            Some(&id) => id,
            None => {
                let id = self.files.len();
                self.files.push(LogicalFile::new(key.clone()));
                self.index.insert(key, id);
                id
            }
        };

        // A second claim at the same rank is either the same site re-read
        // (replace) or two equal-ranked sites colliding (reject)
        if let Some(pos) = self.files[id].entries.iter().position(|(r, _)| *r == rank) {
            let existing = self.files[id].entries[pos].1;
            if self.records[existing].site != site_name {
                return Err(UpdateError::ShadowConflict {
                    filename: self.files[id].name.clone(),
                    site_a: self.records[existing].site.clone(),
                    site_b: site_name,
                });
            }
            self.records[existing] = record;
            self.reconcile(id);
            return Ok(id);
        }

        let rec_id = self.records.len();
        self.records.push(record);
        self.files[id].entries.push((rank, rec_id));

        if self.files[id].entries.len() > 1 {
            debug!(
                "{} is claimed by {} sites; rank {} wins",
                self.files[id].name,
                self.files[id].entries.len(),
                self.files[id]
                    .entries
                    .iter()
                    .map(|(r, _)| *r)
                    .max()
                    .unwrap_or(0)
            );
        }

        self.reconcile(id);
        Ok(id)
    }

    /// Registers a file found on disk that no site knows about
    pub fn add_local_only(&mut self, name: impl Into<String>, local: LocalState) -> FileId {
        let key = strip_version_suffix(&name.into());

        let id = match self.index.get(&key) {
            Some(&id) => id,
            None => {
                let id = self.files.len();
                self.files.push(LogicalFile::new(key.clone()));
                self.index.insert(key, id);
                id
            }
        };

        self.files[id].local = local;
        self.reconcile(id);
        id
    }

    pub fn record(&self, id: RecordId) -> &FileRecord {
        &self.records[id]
    }

    pub fn record_mut(&mut self, id: RecordId) -> &mut FileRecord {
        &mut self.records[id]
    }

    /// The record that currently defines the file: the highest-ranked entry
    /// belonging to an active site
    pub fn winner(&self, id: FileId) -> Option<&FileRecord> {
        self.winner_entry(id).map(|rec| &self.records[rec])
    }

    pub fn winner_mut(&mut self, id: FileId) -> Option<&mut FileRecord> {
        self.winner_entry(id).map(move |rec| &mut self.records[rec])
    }

    fn winner_entry(&self, id: FileId) -> Option<RecordId> {
        self.files[id]
            .entries
            .iter()
            .filter(|(rank, _)| {
                self.site_by_rank(*rank)
                    .map(|site| site.active)
                    .unwrap_or(false)
            })
            .max_by_key(|(rank, _)| *rank)
            .map(|(_, rec)| *rec)
    }

    /// True if the given site already has a record claiming the file
    pub fn has_record_for(&self, id: FileId, site: &str) -> bool {
        self.files[id]
            .entries
            .iter()
            .any(|(_, rec)| self.records[*rec].site == site)
    }

    /// Every record claiming the file, winner first
    pub fn stacked_records(&self, id: FileId) -> Vec<&FileRecord> {
        let mut entries = self.files[id].entries.clone();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.iter().map(|(_, rec)| &self.records[*rec]).collect()
    }

    /// The site owning the file's winning record
    pub fn owning_site(&self, id: FileId) -> Option<&UpdateSite> {
        self.winner(id).and_then(|rec| self.site(&rec.site))
    }

    // ---- logical files ----

    pub fn get(&self, name: &str) -> Option<FileId> {
        self.index.get(&strip_version_suffix(name)).copied()
    }

    pub fn file(&self, id: FileId) -> &LogicalFile {
        &self.files[id]
    }

    pub fn file_mut(&mut self, id: FileId) -> &mut LogicalFile {
        &mut self.files[id]
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates live logical files in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (FileId, &LogicalFile)> {
        self.files
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.entries.is_empty() || f.is_installed_locally() || f.tracked)
    }

    pub fn ids(&self) -> Vec<FileId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Destroys a logical file. Only valid for local-only files the user is
    /// deleting or files removed from their last owning site.
    pub fn remove_file(&mut self, id: FileId) {
        let file = &mut self.files[id];
        file.entries.clear();
        file.local = LocalState::default();
        file.tracked = false;
        let name = file.name.clone();
        self.index.remove(&name);
    }

    /// Clears the local state of a file that disappeared from disk and
    /// recomputes its status
    pub fn clear_local(&mut self, id: FileId) {
        self.files[id].local = LocalState::default();
        if self.files[id].entries.is_empty() {
            self.remove_file(id);
        } else {
            self.reconcile(id);
        }
    }

    // ---- status machine ----

    /// Recomputes the file's Status from its local digests and the winning
    /// record's versions, and resets the Action to the inert one when the
    /// previously chosen Action is no longer valid.
    pub fn reconcile(&mut self, id: FileId) {
        let status = self.status_for(id);
        let file = &mut self.files[id];
        file.status = status;

        if !status.valid_actions().contains(&file.action) {
            file.action = status.no_action();
        }
    }

    pub fn reconcile_all(&mut self) {
        for id in 0..self.files.len() {
            self.reconcile(id);
        }
    }

    fn status_for(&self, id: FileId) -> Status {
        let file = &self.files[id];
        let local = &file.local;

        let winner = match self.winner_entry(id) {
            Some(rec) => &self.records[rec],
            None => {
                return if local.digest.is_some() {
                    Status::LocalOnly
                } else {
                    Status::NotInstalled
                };
            }
        };

        match (&local.digest, &winner.current) {
            (None, Some(_)) => {
                if file.tracked {
                    Status::NotInstalled
                } else {
                    Status::New
                }
            }
            (None, None) => Status::ObsoleteUninstalled,
            (Some(_), Some(current)) => {
                if local.matches(&current.checksum) {
                    Status::Installed
                } else if self.previous_matches(id, winner) {
                    Status::Updateable
                } else {
                    Status::Modified
                }
            }
            (Some(_), None) => {
                if self.previous_matches(id, winner) {
                    Status::Obsolete
                } else {
                    Status::ObsoleteModified
                }
            }
        }
    }

    /// True if the local digest matches any historical version: the winning
    /// record's previous versions, or any version a shadowed record carries
    fn previous_matches(&self, id: FileId, winner: &FileRecord) -> bool {
        let file = &self.files[id];

        if winner.has_previous(&file.local) {
            return true;
        }

        file.entries.iter().any(|(_, rec)| {
            let record = &self.records[*rec];
            if std::ptr::eq(record, winner) {
                return false;
            }
            record
                .current
                .iter()
                .any(|v| file.local.matches(&v.checksum))
                || record.has_previous(&file.local)
        })
    }

    // ---- actions ----

    /// Selects an Action for a file, validating it against the Status
    /// table. `Upload`/`Remove` on a shadowing entry are additionally
    /// permitted when the logical name equals the local name.
    pub fn set_action(&mut self, id: FileId, action: Action) -> Result<()> {
        let file = &self.files[id];

        let in_table = file.status.valid_actions().contains(&action);
        let shadow_escape = matches!(action, Action::Upload | Action::Remove)
            && file.is_shadowing()
            && file
                .local
                .filename
                .as_deref()
                .map_or(true, |local| local == file.name);

        if !in_table && !shadow_escape {
            return Err(UpdateError::IllegalState(format!(
                "Cannot {} {}: file is {}",
                action, file.name, file.status
            )));
        }

        if action == Action::Upload {
            let uploadable = self
                .owning_site(id)
                .map(|site| site.is_uploadable())
                .unwrap_or(false);
            if !uploadable {
                return Err(UpdateError::IllegalState(format!(
                    "Cannot upload {}: its update site accepts no uploads",
                    file.name
                )));
            }
        }

        self.files[id].action = action;
        Ok(())
    }

    /// Stages a download action and cascades to the file's transitive
    /// non-overriding dependencies. Each dependency that is neither up to
    /// date nor already staged adopts the first valid action among
    /// `Update`, `Uninstall`, `Install`. Returns everything staged.
    pub fn stage(&mut self, id: FileId, action: Action) -> Result<Vec<FileId>> {
        self.set_action(id, action)?;
        let mut staged = vec![id];

        if !action.is_download() {
            return Ok(staged);
        }

        for dep_id in self.transitive_dependencies(id) {
            let (status, current_action) =
                (self.files[dep_id].status, self.files[dep_id].action);
            if status.is_up_to_date() || current_action.is_mutating() {
                continue;
            }

            for candidate in [Action::Update, Action::Uninstall, Action::Install] {
                if status.valid_actions().contains(&candidate) {
                    debug!(
                        "Staging dependency {} for {}",
                        self.files[dep_id].name, candidate
                    );
                    self.files[dep_id].action = candidate;
                    staged.push(dep_id);
                    break;
                }
            }
        }

        Ok(staged)
    }

    /// Breadth-first closure of the file's non-overriding dependencies.
    /// Unknown dependency names are skipped; the conflict engine reports
    /// them separately.
    pub fn transitive_dependencies(&self, id: FileId) -> Vec<FileId> {
        let mut seen = vec![id];
        let mut queue = VecDeque::from([id]);
        let mut result = Vec::new();

        while let Some(next) = queue.pop_front() {
            let record = match self.winner(next) {
                Some(record) => record,
                None => continue,
            };

            for dep in &record.dependencies {
                if dep.overrides {
                    continue;
                }
                if let Some(dep_id) = self.get(&dep.filename) {
                    if !seen.contains(&dep_id) {
                        seen.push(dep_id);
                        result.push(dep_id);
                        queue.push_back(dep_id);
                    }
                }
            }
        }

        result
    }

    /// Files whose current Action stages a download
    pub fn staged_downloads(&self) -> Vec<FileId> {
        self.iter()
            .filter(|(_, f)| f.action.is_download())
            .map(|(id, _)| id)
            .collect()
    }

    /// Files staged for upload to the given site
    pub fn staged_uploads(&self, site: &str) -> Vec<FileId> {
        self.iter()
            .filter(|(id, f)| {
                f.action == Action::Upload
                    && self
                        .winner(*id)
                        .map(|rec| rec.site == site)
                        .unwrap_or(false)
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Demotes every staged upload's current version and installs the
    /// local state as the new current version with the given timestamp.
    /// Renamed uploads record an extra previous version carrying the old
    /// disk name.
    pub fn finish_upload(&mut self, id: FileId, timestamp: Timestamp) -> Result<()> {
        let file = &self.files[id];
        let digest = file.local.digest.clone().ok_or_else(|| {
            UpdateError::IllegalState(format!("{} has no local checksum", file.name))
        })?;
        let filesize = file.local.filesize;
        let local_name = file.local.filename.clone();
        let logical_name = file.name.clone();

        let record = match self.winner_mut(id) {
            Some(record) => record,
            None => {
                return Err(UpdateError::IllegalState(format!(
                    "{} has no owning update site",
                    logical_name
                )))
            }
        };

        record.obsolete_current(timestamp);

        // A renamed upload is also remembered under its old disk name
        if let Some(local_name) = local_name {
            if local_name != logical_name {
                let mut renamed = Version::new(digest.clone(), timestamp);
                renamed.filename = Some(local_name);
                record.previous.insert(renamed);
            }
        }

        record.current = Some(Version::new(digest, timestamp));
        record.filesize = filesize;

        self.files[id].tracked = true;
        self.reconcile(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::model::file::LocalState;

    fn record(site: &str, name: &str, checksum: &str, ts: &str) -> FileRecord {
        let mut record = FileRecord::new(site, name);
        record.current = Some(Version::new(checksum, ts.parse().unwrap()));
        record
    }

    fn local(checksum: &str) -> LocalState {
        LocalState {
            digest: Some(checksum.into()),
            ..Default::default()
        }
    }

    #[test]
    fn higher_rank_shadows_lower() {
        let mut collection = FileCollection::new();
        collection.add_site("a", "https://a.example.org/").unwrap();
        collection.add_site("b", "https://b.example.org/").unwrap();

        let id = collection
            .insert_record(record("a", "macros/m.ijm", "xx", "20240101000000"))
            .unwrap();
        let same = collection
            .insert_record(record("b", "macros/m.ijm", "yy", "20240201000000"))
            .unwrap();

        assert_eq!(id, same);
        let winner = collection.winner(id).unwrap();
        assert_eq!("b", winner.site);
        assert_eq!(
            &crate::updater::digest::HexDigest::from("yy"),
            &winner.current.as_ref().unwrap().checksum
        );
        assert!(collection.file(id).is_shadowing());
    }

    #[test]
    fn deactivating_winner_promotes_shadow_with_history() {
        let mut collection = FileCollection::new();
        collection.add_site("a", "https://a.example.org/").unwrap();
        collection.add_site("b", "https://b.example.org/").unwrap();

        let id = collection
            .insert_record(record("a", "macros/m.ijm", "xx", "20240101000000"))
            .unwrap();
        collection
            .insert_record(record("b", "macros/m.ijm", "yy", "20240201000000"))
            .unwrap();

        // Local copy matches b's current
        collection.file_mut(id).local = local("yy");
        collection.reconcile(id);
        assert_eq!(Status::Installed, collection.file(id).status);

        let promoted = collection.deactivate_site("b").unwrap();
        assert_eq!(vec![id], promoted);

        let winner = collection.winner(id).unwrap();
        assert_eq!("a", winner.site);
        assert_eq!(Status::Updateable, collection.file(id).status);
        assert_eq!(Action::Update, collection.file(id).action);
    }

    #[test]
    fn equal_rank_claims_conflict() {
        let mut collection = FileCollection::new();
        collection
            .insert_site(UpdateSite::new("a", "https://a.example.org/", 3))
            .unwrap();
        collection
            .insert_site(UpdateSite::new("b", "https://b.example.org/", 3))
            .unwrap();

        collection
            .insert_record(record("a", "macros/m.ijm", "xx", "20240101000000"))
            .unwrap();

        match collection.insert_record(record("b", "macros/m.ijm", "yy", "20240201000000")) {
            Err(UpdateError::ShadowConflict { filename, .. }) => {
                assert_eq!("macros/m.ijm", filename)
            }
            other => panic!("Expected a shadow conflict, got {:?}", other),
        }
    }

    #[test]
    fn status_table() {
        let mut collection = FileCollection::new();
        collection.add_site("main", "https://a.example.org/").unwrap();

        // current set, absent locally, untracked -> New
        let id = collection
            .insert_record(record("main", "jars/a.jar", "xx", "20240101000000"))
            .unwrap();
        assert_eq!(Status::New, collection.file(id).status);

        // tracked -> NotInstalled
        collection.file_mut(id).tracked = true;
        collection.reconcile(id);
        assert_eq!(Status::NotInstalled, collection.file(id).status);

        // matching digest -> Installed
        collection.file_mut(id).local = local("xx");
        collection.reconcile(id);
        assert_eq!(Status::Installed, collection.file(id).status);

        // digest in previous -> Updateable
        let record_mut = collection.winner_mut(id).unwrap();
        record_mut.current = Some(Version::new("zz", "20240301000000".parse().unwrap()));
        record_mut
            .previous
            .insert(Version::new("xx", "20240101000000".parse().unwrap()));
        collection.reconcile(id);
        assert_eq!(Status::Updateable, collection.file(id).status);

        // digest matches nothing -> Modified
        collection.file_mut(id).local = local("mm");
        collection.reconcile(id);
        assert_eq!(Status::Modified, collection.file(id).status);

        // no current, digest in previous -> Obsolete
        let record_mut = collection.winner_mut(id).unwrap();
        record_mut.current = None;
        collection.file_mut(id).local = local("xx");
        collection.reconcile(id);
        assert_eq!(Status::Obsolete, collection.file(id).status);

        // no current, unknown digest -> ObsoleteModified
        collection.file_mut(id).local = local("mm");
        collection.reconcile(id);
        assert_eq!(Status::ObsoleteModified, collection.file(id).status);

        // no current, absent -> ObsoleteUninstalled
        collection.file_mut(id).local = LocalState::default();
        collection.reconcile(id);
        assert_eq!(Status::ObsoleteUninstalled, collection.file(id).status);
    }

    #[test]
    fn staging_cascades_to_dependencies() {
        let mut collection = FileCollection::new();
        collection.add_site("main", "https://a.example.org/").unwrap();

        let mut app = record("main", "plugins/app.jar", "aa", "20240101000000");
        app.dependencies
            .push(crate::updater::model::version::Dependency::new("jars/lib.jar"));
        let app_id = collection.insert_record(app).unwrap();

        let lib_id = collection
            .insert_record(record("main", "jars/lib.jar", "bb", "20240101000000"))
            .unwrap();

        let staged = collection.stage(app_id, Action::Install).unwrap();
        assert_eq!(vec![app_id, lib_id], staged);
        assert_eq!(Action::Install, collection.file(lib_id).action);
    }

    #[test]
    fn up_to_date_dependencies_left_alone() {
        let mut collection = FileCollection::new();
        collection.add_site("main", "https://a.example.org/").unwrap();

        let mut app = record("main", "plugins/app.jar", "aa", "20240101000000");
        app.dependencies
            .push(crate::updater::model::version::Dependency::new("jars/lib.jar"));
        let app_id = collection.insert_record(app).unwrap();

        let lib_id = collection
            .insert_record(record("main", "jars/lib.jar", "bb", "20240101000000"))
            .unwrap();
        collection.file_mut(lib_id).local = local("bb");
        collection.reconcile(lib_id);

        let staged = collection.stage(app_id, Action::Install).unwrap();
        assert_eq!(vec![app_id], staged);
        assert_eq!(Action::Installed, collection.file(lib_id).action);
    }

    #[test]
    fn invalid_action_rejected() {
        let mut collection = FileCollection::new();
        collection.add_site("main", "https://a.example.org/").unwrap();

        let id = collection
            .insert_record(record("main", "jars/a.jar", "xx", "20240101000000"))
            .unwrap();
        collection.file_mut(id).local = local("xx");
        collection.reconcile(id);

        // Installed files cannot be updated
        assert!(collection.set_action(id, Action::Update).is_err());
        assert!(collection.set_action(id, Action::Uninstall).is_ok());
    }

    #[test]
    fn upload_requires_uploadable_site() {
        let mut collection = FileCollection::new();
        collection.add_site("main", "https://a.example.org/").unwrap();

        let id = collection
            .insert_record(record("main", "jars/a.jar", "xx", "20240101000000"))
            .unwrap();
        collection.file_mut(id).local = local("mm");
        collection.reconcile(id);
        assert_eq!(Status::Modified, collection.file(id).status);

        assert!(collection.set_action(id, Action::Upload).is_err());

        collection.site_mut("main").unwrap().host = Some("file:/tmp/site".to_string());
        assert!(collection.set_action(id, Action::Upload).is_ok());
    }

    #[test]
    fn versioned_names_share_a_logical_file() {
        let mut collection = FileCollection::new();
        collection.add_site("main", "https://a.example.org/").unwrap();

        let id = collection
            .insert_record(record("main", "jars/lib.jar", "xx", "20240101000000"))
            .unwrap();

        assert_eq!(Some(id), collection.get("jars/lib-1.2.3.jar"));
        assert_eq!(Some(id), collection.get("jars/lib.jar"));
    }
}
