//! The conflict engine: everything that may block an install or upload,
//! paired with the concrete resolutions a caller can apply.
//!
//! Conflicts are the sole mechanism by which a user recovers from
//! recoverable errors. The engine only inspects; applying a resolution's
//! effect is the caller's job so the model never mutates mid-listing.

use core::fmt;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::Path;

use log::debug;
use strum_macros::Display as EnumDisplay;

use crate::updater::model::{Action, FileCollection, FileId, Status};
use crate::updater::timestamp::Timestamp;

#[derive(Debug, Copy, Clone, Eq, PartialEq, EnumDisplay)]
pub enum Severity {
    #[strum(serialize = "Error")]
    Error,
    #[strum(serialize = "Critical error")]
    CriticalError,
}

/// A concrete, applicable effect. Enumerated rather than hidden in a
/// closure so resolutions can be logged, compared, and tested.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResolutionEffect {
    /// Accept the situation as-is
    Ignore,
    /// Select a different action for a file
    SetAction { file: FileId, action: Action },
    /// Delete stray files from the installation, paths relative to the root
    DeleteLocalFiles { paths: Vec<String> },
    /// Drop a single dependency from a file's winning record
    RemoveDependency { file: FileId, dependency: String },
    /// Drop every dependency from a file's winning record
    StripDependencies { file: FileId },
    /// Re-checksum a file whose content drifted since the scan
    Rechecksum { file: FileId },
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub description: String,
    pub effect: ResolutionEffect,
}

impl Resolution {
    pub fn new(description: impl Into<String>, effect: ResolutionEffect) -> Self {
        Self {
            description: description.into(),
            effect,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub severity: Severity,
    pub filename: Option<String>,
    pub message: String,
    pub resolutions: Vec<Resolution>,
}

impl Conflict {
    pub fn error(filename: Option<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            filename,
            message: message.into(),
            resolutions: Vec::new(),
        }
    }

    pub fn critical(filename: Option<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::CriticalError,
            filename,
            message: message.into(),
            resolutions: Vec::new(),
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolutions.push(resolution);
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::CriticalError
    }
}

impl Display for Conflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.filename {
            Some(filename) => write!(f, "{}: {}: {}", self.severity, filename, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Returns true when nothing blocks the caller from proceeding
pub fn can_proceed(conflicts: &[Conflict]) -> bool {
    !conflicts.iter().any(Conflict::is_critical)
}

/// Lists every conflict in the staged changes
pub struct ConflictEngine<'a> {
    collection: &'a FileCollection,
    root: &'a Path,
}

impl<'a> ConflictEngine<'a> {
    pub fn new(collection: &'a FileCollection, root: &'a Path) -> Self {
        Self { collection, root }
    }

    /// The update/install pass plus, when uploads are staged, the upload pass
    pub fn list(&self, for_upload: bool) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        self.check_staged_dependencies(&mut conflicts);
        self.check_overwritten_modifications(&mut conflicts);
        self.check_kept_obsoletes(&mut conflicts);

        if for_upload {
            self.check_upload_cycles(&mut conflicts);
            self.check_upload_of_removed(&mut conflicts);
            self.check_upload_drift(&mut conflicts);
            self.check_obsolete_dependencies(&mut conflicts);
        }

        debug!("Conflict engine found {} conflicts", conflicts.len());
        conflicts
    }

    /// Every transitive non-overriding dependency of a staged download must
    /// be up to date or itself staged
    fn check_staged_dependencies(&self, conflicts: &mut Vec<Conflict>) {
        for id in self.collection.staged_downloads() {
            let record = match self.collection.winner(id) {
                Some(record) => record,
                None => continue,
            };

            for dep in &record.dependencies {
                if dep.overrides {
                    continue;
                }

                let dep_id = match self.collection.get(&dep.filename) {
                    Some(dep_id) => dep_id,
                    None => {
                        conflicts.push(
                            Conflict::critical(
                                Some(self.collection.file(id).name.clone()),
                                format!("depends on {}, which no site provides", dep.filename),
                            )
                            .with_resolution(Resolution::new(
                                format!("Break the dependency on {}", dep.filename),
                                ResolutionEffect::RemoveDependency {
                                    file: id,
                                    dependency: dep.filename.clone(),
                                },
                            )),
                        );
                        continue;
                    }
                };

                let dep_file = self.collection.file(dep_id);
                if dep_file.status.is_up_to_date() || dep_file.action.is_download() {
                    continue;
                }

                let stage_as = if dep_file.status.valid_actions().contains(&Action::Update) {
                    Action::Update
                } else {
                    Action::Install
                };

                conflicts.push(
                    Conflict::critical(
                        Some(self.collection.file(id).name.clone()),
                        format!(
                            "depends on {}, which is neither up-to-date nor staged",
                            dep_file.name
                        ),
                    )
                    .with_resolution(Resolution::new(
                        format!("{} {}", stage_as, dep_file.name),
                        ResolutionEffect::SetAction {
                            file: dep_id,
                            action: stage_as,
                        },
                    ))
                    .with_resolution(Resolution::new(
                        format!("Break the dependency on {}", dep_file.name),
                        ResolutionEffect::RemoveDependency {
                            file: id,
                            dependency: dep.filename.clone(),
                        },
                    )),
                );
            }
        }
    }

    /// Updating a locally modified file loses the local changes
    fn check_overwritten_modifications(&self, conflicts: &mut Vec<Conflict>) {
        for (id, file) in self.collection.iter() {
            if file.action == Action::Update
                && matches!(file.status, Status::Modified | Status::ObsoleteModified)
            {
                conflicts.push(
                    Conflict::error(
                        Some(file.name.clone()),
                        "is locally modified; updating will overwrite the local changes",
                    )
                    .with_resolution(Resolution::new(
                        "Keep the local version",
                        ResolutionEffect::SetAction {
                            file: id,
                            action: Action::Modified,
                        },
                    ))
                    .with_resolution(Resolution::new(
                        "Overwrite the local changes",
                        ResolutionEffect::Ignore,
                    )),
                );
            }
        }
    }

    /// Obsolete files the user is keeping around
    fn check_kept_obsoletes(&self, conflicts: &mut Vec<Conflict>) {
        for (id, file) in self.collection.iter() {
            if file.status == Status::Obsolete && file.action == Action::Obsolete {
                conflicts.push(
                    Conflict::error(Some(file.name.clone()), "is obsolete")
                        .with_resolution(Resolution::new(
                            "Uninstall it",
                            ResolutionEffect::SetAction {
                                file: id,
                                action: Action::Uninstall,
                            },
                        ))
                        .with_resolution(Resolution::new(
                            "Keep it as-is",
                            ResolutionEffect::Ignore,
                        )),
                );
            }
        }
    }

    /// The dependency graph restricted to one site must stay acyclic
    fn check_upload_cycles(&self, conflicts: &mut Vec<Conflict>) {
        let mut sites: Vec<&str> = Vec::new();
        for (id, file) in self.collection.iter() {
            if file.action == Action::Upload {
                if let Some(record) = self.collection.winner(id) {
                    if !sites.contains(&record.site.as_str()) {
                        sites.push(&record.site);
                    }
                }
            }
        }

        for site in sites {
            if let Some(cycle) = self.find_cycle(site) {
                conflicts.push(Conflict::critical(None, cycle));
            }
        }
    }

    fn find_cycle(&self, site: &str) -> Option<String> {
        // Files owned by the site, with dependency edges within the site
        let mut graph: HashMap<FileId, Vec<FileId>> = HashMap::new();
        for (id, _) in self.collection.iter() {
            let record = match self.collection.winner(id) {
                Some(record) if record.site == site => record,
                _ => continue,
            };

            let edges = record
                .dependencies
                .iter()
                .filter_map(|dep| self.collection.get(&dep.filename))
                .filter(|dep_id| {
                    self.collection
                        .winner(*dep_id)
                        .map(|r| r.site == site)
                        .unwrap_or(false)
                })
                .collect();
            graph.insert(id, edges);
        }

        let mut visited: Vec<FileId> = Vec::new();
        for &start in graph.keys() {
            let mut stack = vec![start];
            if let Some(path) = self.dfs_cycle(&graph, &mut stack, &mut visited) {
                return Some(path);
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        graph: &HashMap<FileId, Vec<FileId>>,
        stack: &mut Vec<FileId>,
        visited: &mut Vec<FileId>,
    ) -> Option<String> {
        let current = *stack.last().unwrap();
        if visited.contains(&current) {
            return None;
        }

        for &next in graph.get(&current).into_iter().flatten() {
            if let Some(pos) = stack.iter().position(|&id| id == next) {
                let mut names: Vec<&str> = stack[pos..]
                    .iter()
                    .map(|&id| self.collection.file(id).name.as_str())
                    .collect();
                names.push(self.collection.file(next).name.as_str());
                return Some(names.join(" -> "));
            }

            stack.push(next);
            if let Some(cycle) = self.dfs_cycle(graph, stack, visited) {
                return Some(cycle);
            }
            stack.pop();
        }

        visited.push(current);
        None
    }

    /// No staged upload may depend on a file scheduled for removal
    fn check_upload_of_removed(&self, conflicts: &mut Vec<Conflict>) {
        for (id, file) in self.collection.iter() {
            if file.action != Action::Upload {
                continue;
            }
            let record = match self.collection.winner(id) {
                Some(record) => record,
                None => continue,
            };

            for dep in &record.dependencies {
                let removed = self
                    .collection
                    .get(&dep.filename)
                    .map(|dep_id| self.collection.file(dep_id).action == Action::Remove)
                    .unwrap_or(false);

                if removed {
                    conflicts.push(
                        Conflict::critical(
                            Some(file.name.clone()),
                            format!("depends on {}, which is scheduled for removal", dep.filename),
                        )
                        .with_resolution(Resolution::new(
                            format!("Break the dependency on {}", dep.filename),
                            ResolutionEffect::RemoveDependency {
                                file: id,
                                dependency: dep.filename.clone(),
                            },
                        )),
                    );
                }
            }
        }
    }

    /// Files must not have changed on disk since the scanner ran
    fn check_upload_drift(&self, conflicts: &mut Vec<Conflict>) {
        for (id, file) in self.collection.iter() {
            if file.action != Action::Upload {
                continue;
            }

            let recorded = match file.local.timestamp {
                Some(recorded) => recorded,
                None => continue,
            };

            let path = self.root.join(file.local_filename());
            let drifted = match Timestamp::from_mtime(&path) {
                Ok(current) => current != recorded,
                Err(_) => true,
            };

            if drifted {
                conflicts.push(
                    Conflict::critical(
                        Some(file.name.clone()),
                        "changed on disk since it was checksummed",
                    )
                    .with_resolution(Resolution::new(
                        "Re-checksum it",
                        ResolutionEffect::Rechecksum { file: id },
                    )),
                );
            }
        }
    }

    /// Obsolete files must not carry dependencies
    fn check_obsolete_dependencies(&self, conflicts: &mut Vec<Conflict>) {
        for (id, file) in self.collection.iter() {
            if !file.status.is_obsolete() {
                continue;
            }

            let record = match self.collection.winner(id) {
                Some(record) => record,
                None => continue,
            };

            if record.current.is_none() && !record.dependencies.is_empty() {
                conflicts.push(
                    Conflict::error(Some(file.name.clone()), "is obsolete but has dependencies")
                        .with_resolution(Resolution::new(
                            "Remove the dependencies",
                            ResolutionEffect::StripDependencies { file: id },
                        )),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::TempDir;

    use super::*;
    use crate::updater::model::{Dependency, FileRecord, LocalState, Version};

    fn collection_with_site() -> FileCollection {
        let mut collection = FileCollection::new();
        collection
            .add_site("main", "https://updates.example.org/")
            .unwrap();
        collection.site_mut("main").unwrap().host = Some("file:/srv/site".to_string());
        collection
    }

    fn record(name: &str, checksum: &str, deps: &[&str]) -> FileRecord {
        let mut record = FileRecord::new("main", name);
        record.current = Some(Version::new(checksum, "20240101000000".parse().unwrap()));
        for dep in deps {
            record.dependencies.push(Dependency::new(*dep));
        }
        record
    }

    #[test]
    fn unstaged_dependency_is_critical() {
        let mut collection = collection_with_site();
        let app = collection
            .insert_record(record("plugins/app.jar", "aa", &["jars/lib.jar"]))
            .unwrap();
        collection
            .insert_record(record("jars/lib.jar", "bb", &[]))
            .unwrap();

        // Stage only the app, bypassing the cascade
        collection.set_action(app, Action::Install).unwrap();
        let lib = collection.get("jars/lib.jar").unwrap();
        collection.file_mut(lib).action = Action::New;

        let temp = TempDir::new().unwrap();
        let conflicts = ConflictEngine::new(&collection, temp.path()).list(false);

        assert_eq!(1, conflicts.len());
        assert!(conflicts[0].is_critical());
        assert!(!can_proceed(&conflicts));

        // Staging the dependency clears the conflict
        collection.set_action(lib, Action::Install).unwrap();
        let conflicts = ConflictEngine::new(&collection, temp.path()).list(false);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn modified_update_warns_without_blocking() {
        let mut collection = collection_with_site();
        let id = collection
            .insert_record(record("plugins/app.jar", "aa", &[]))
            .unwrap();
        collection.file_mut(id).local = LocalState {
            digest: Some("zz".into()),
            ..Default::default()
        };
        collection.reconcile(id);
        assert_eq!(Status::Modified, collection.file(id).status);

        collection.set_action(id, Action::Update).unwrap();

        let temp = TempDir::new().unwrap();
        let conflicts = ConflictEngine::new(&collection, temp.path()).list(false);

        assert_eq!(1, conflicts.len());
        assert_eq!(Severity::Error, conflicts[0].severity);
        assert!(can_proceed(&conflicts));
        assert_eq!(2, conflicts[0].resolutions.len());
    }

    #[test]
    fn dependency_cycle_reported_with_path() {
        let mut collection = collection_with_site();
        let a = collection
            .insert_record(record("jars/a.jar", "aa", &["jars/b.jar"]))
            .unwrap();
        collection
            .insert_record(record("jars/b.jar", "bb", &["jars/a.jar"]))
            .unwrap();

        collection.file_mut(a).local = LocalState {
            digest: Some("mm".into()),
            ..Default::default()
        };
        collection.reconcile(a);
        collection.set_action(a, Action::Upload).unwrap();

        let temp = TempDir::new().unwrap();
        let conflicts = ConflictEngine::new(&collection, temp.path()).list(true);

        let cycle = conflicts
            .iter()
            .find(|c| c.message.contains("->"))
            .expect("expected a cycle conflict");
        assert!(
            cycle.message.contains("jars/a.jar -> jars/b.jar -> jars/a.jar")
                || cycle.message.contains("jars/b.jar -> jars/a.jar -> jars/b.jar"),
            "{}",
            cycle.message
        );
        assert!(cycle.is_critical());
    }

    #[test]
    fn upload_depending_on_removed_file_blocks() {
        let mut collection = collection_with_site();
        let app = collection
            .insert_record(record("plugins/app.jar", "aa", &["jars/lib.jar"]))
            .unwrap();
        let lib = collection
            .insert_record(record("jars/lib.jar", "bb", &[]))
            .unwrap();

        collection.file_mut(app).local = LocalState {
            digest: Some("mm".into()),
            ..Default::default()
        };
        collection.reconcile(app);
        collection.set_action(app, Action::Upload).unwrap();
        collection.set_action(lib, Action::Remove).unwrap();

        let temp = TempDir::new().unwrap();
        let conflicts = ConflictEngine::new(&collection, temp.path()).list(true);

        assert!(conflicts
            .iter()
            .any(|c| c.is_critical() && c.message.contains("scheduled for removal")));
    }
}
