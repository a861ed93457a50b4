//! Walks the installation root, maps what is on disk to catalog entries,
//! and feeds the reconciler.
//!
//! Only a closed set of directory/extension pairs is considered. Candidates
//! sharing an unversioned basename are resolved to a single winner; the
//! losers surface as `MultipleLocalVersions` conflicts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::updater::cache::ChecksumCache;
use crate::updater::conflicts::{Conflict, Resolution, ResolutionEffect};
use crate::updater::digest::{digest_file, legacy_digests};
use crate::updater::error::Result;
use crate::updater::model::{strip_version_suffix, FileCollection, LocalState};
use crate::updater::platform;
use crate::updater::timestamp::Timestamp;
use crate::updater::util;

/// Top-level directories the scanner looks into and the extensions it
/// accepts there. An empty extension list accepts anything.
const DIRECTORY_RULES: &[(&str, &[&str])] = &[
    ("jars", &[".jar", ".class"]),
    ("plugins", &[".jar", ".class", ".txt", ".py", ".js", ".ijm"]),
    ("macros", &[".txt", ".ijm", ".png"]),
    ("scripts", &[".py", ".js", ".txt", ".ijm", ".m"]),
    ("lib", &[]),
    ("config", &[]),
    ("luts", &[]),
    ("images", &[]),
];

pub struct Scanner<'a> {
    root: PathBuf,
    collection: &'a mut FileCollection,
    cache: &'a mut ChecksumCache,
    conflicts: Vec<Conflict>,
}

impl<'a> Scanner<'a> {
    pub fn new(
        root: impl AsRef<Path>,
        collection: &'a mut FileCollection,
        cache: &'a mut ChecksumCache,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            collection,
            cache,
            conflicts: Vec::new(),
        }
    }

    /// Scans the installation: populates local state for every tracked
    /// file, registers untracked artifacts, and demotes records whose
    /// files disappeared. Returns the conflicts encountered.
    pub fn scan(mut self) -> Result<Vec<Conflict>> {
        let candidates = self.queue_candidates()?;
        info!("Scanner queued {} candidate files", candidates.len());

        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for candidate in candidates {
            groups
                .entry(strip_version_suffix(&candidate))
                .or_default()
                .push(candidate);
        }

        let mut logical_names: Vec<String> = groups.keys().cloned().collect();
        logical_names.sort();

        for logical in logical_names {
            let mut paths = groups.remove(&logical).unwrap();
            paths.sort();
            self.resolve_group(&logical, paths)?;
        }

        self.demote_missing()?;
        self.collection.reconcile_all();

        Ok(self.conflicts)
    }

    /// Enumerates every path the directory/extension rules admit
    fn queue_candidates(&self) -> Result<Vec<String>> {
        let mut candidates = Vec::new();

        for (dir, extensions) in DIRECTORY_RULES {
            self.queue_dir(&self.root.join(dir), dir, extensions, &mut candidates)?;
        }

        // Whole trees inside top-level platform bundles
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".app")
                && entry.file_type()?.is_dir()
                && !strip_version_suffix(&name).contains(".old")
            {
                self.queue_dir(&entry.path(), &name, &[], &mut candidates)?;
            }
        }

        // Known launchers at their exact paths
        for (launcher, _) in platform::LAUNCHERS {
            let path = self.root.join(launcher);
            if path.is_file() {
                candidates.push((*launcher).to_string());
            }
        }

        Ok(candidates)
    }

    fn queue_dir(
        &self,
        dir: &Path,
        prefix: &str,
        extensions: &[&str],
        candidates: &mut Vec<String>,
    ) -> Result<()> {
        if !dir.is_dir() {
            return Ok(());
        }

        for entry in WalkDir::new(dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let basename = entry.file_name().to_string_lossy();
            if basename.starts_with('.') {
                continue;
            }
            // Backup copies are never catalog candidates
            if strip_version_suffix(&basename).contains(".old") {
                continue;
            }
            if !extensions.is_empty() && !extensions.iter().any(|ext| basename.ends_with(ext)) {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .expect("walked entry under root")
                .to_string_lossy()
                .to_string();
            let relative = util::convert_backslash_to_forward(&relative).into_owned();

            if relative.starts_with(prefix) {
                candidates.push(relative);
            }
        }

        Ok(())
    }

    /// Resolves a group of candidates sharing one logical name down to a
    /// single retained path, raising a conflict when the losers differ.
    fn resolve_group(&mut self, logical: &str, paths: Vec<String>) -> Result<()> {
        if paths.len() == 1 {
            return self.apply_candidate(logical, &paths[0]);
        }

        let mut checksummed = Vec::with_capacity(paths.len());
        for path in &paths {
            match self.checksum(logical, path) {
                Ok(entry) => checksummed.push(entry),
                Err(e) => warn!("Cannot checksum {}: {}", path, e),
            }
        }

        match checksummed.len() {
            0 => return Ok(()),
            1 => {
                let (path, state) = checksummed.remove(0);
                self.apply_state(logical, path, state);
                return Ok(());
            }
            _ => {}
        }

        let identical = checksummed
            .windows(2)
            .all(|pair| pair[0].1.digest == pair[1].1.digest);

        // Prefer up-to-date over obsolete over locally-modified, newest
        // mtime within the winning category
        let category = |state: &LocalState| -> u8 {
            let id = match self.collection.get(logical) {
                Some(id) => id,
                None => return 2,
            };
            let record = match self.collection.winner(id) {
                Some(record) => record,
                None => return 2,
            };
            if let Some(current) = &record.current {
                if state.matches(&current.checksum) {
                    return 0;
                }
            }
            if record.has_previous(state) {
                return 1;
            }
            2
        };

        let winner_index = (0..checksummed.len())
            .min_by_key(|&i| {
                let (_, state) = &checksummed[i];
                (category(state), std::cmp::Reverse(state.timestamp))
            })
            .expect("non-empty group");

        let (winner_path, winner_state) = checksummed.swap_remove(winner_index);
        let losers: Vec<String> = checksummed.into_iter().map(|(path, _)| path).collect();

        if !identical {
            warn!(
                "Multiple local versions of {}: keeping {}, flagged {}",
                logical,
                winner_path,
                losers.join(", ")
            );
            self.conflicts.push(
                Conflict::error(
                    Some(logical.to_string()),
                    format!(
                        "has multiple local versions; keeping {}, also found {}",
                        winner_path,
                        losers.join(", ")
                    ),
                )
                .with_resolution(Resolution::new(
                    "Keep all copies",
                    ResolutionEffect::Ignore,
                ))
                .with_resolution(Resolution::new(
                    format!("Delete {}", losers.join(", ")),
                    ResolutionEffect::DeleteLocalFiles { paths: losers },
                )),
            );
        }

        self.apply_state(logical, winner_path, winner_state);
        Ok(())
    }

    fn apply_candidate(&mut self, logical: &str, path: &str) -> Result<()> {
        match self.checksum(logical, path) {
            Ok((path, state)) => self.apply_state(logical, path, state),
            Err(e) => warn!("Cannot checksum {}: {}", path, e),
        }
        Ok(())
    }

    fn apply_state(&mut self, logical: &str, path: String, mut state: LocalState) {
        state.filename = Some(path);

        match self.collection.get(logical) {
            Some(id) => {
                self.collection.file_mut(id).local = state;
                self.collection.reconcile(id);
            }
            None => {
                debug!("Found untracked local file {}", logical);
                self.collection.add_local_only(logical, state);
            }
        }
    }

    /// Computes (or reuses from the cache) the digests for one candidate
    fn checksum(&mut self, logical: &str, path: &str) -> Result<(String, LocalState)> {
        let absolute = self.root.join(path);
        let mtime = Timestamp::from_mtime(&absolute)?;
        let filesize = absolute.metadata()?.len();

        let (digest, legacy) = match self.cache.get(path, mtime) {
            Some(cached) => cached,
            None => {
                let digest = digest_file(logical, &absolute)?;
                let legacy = legacy_digests(logical, &absolute)?;
                self.cache.put(path, mtime, &digest, &legacy);
                (digest, legacy)
            }
        };

        Ok((
            path.to_string(),
            LocalState {
                filename: None,
                digest: Some(digest),
                legacy_digests: legacy,
                timestamp: Some(mtime),
                filesize,
            },
        ))
    }

    /// Demotes records whose local files disappeared
    fn demote_missing(&mut self) -> Result<()> {
        let ids = self.collection.ids();

        for id in ids {
            let filename = match &self.collection.file(id).local.filename {
                Some(filename) => filename.clone(),
                None => continue,
            };

            if !self.root.join(&filename).exists() {
                debug!("{} disappeared from disk", filename);
                self.cache.remove(&filename);
                self.collection.clear_local(id);
            }
        }

        Ok(())
    }
}
