//! The `.checksums` file: a cache that spares the scanner from re-hashing
//! archives whose modification time has not changed.
//!
//! Two kinds of lines share the file. Path-keyed entries record the digest
//! computed for a path at a given mtime:
//!
//! ```text
//! <digest> <timestamp> <path>
//! ```
//!
//! Digest-keyed entries, prefixed with `:`, record the legacy-mode
//! equivalents of a digest, colon-joined:
//!
//! ```text
//! :<digest> <legacy>:<legacy>:<legacy>
//! ```

use std::collections::HashMap;
use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::warn;

use crate::updater::digest::HexDigest;
use crate::updater::error::Result;
use crate::updater::timestamp::Timestamp;

#[derive(Debug, Clone)]
struct CacheEntry {
    timestamp: Timestamp,
    digest: HexDigest,
}

#[derive(Debug)]
pub struct ChecksumCache {
    file: PathBuf,
    entries: HashMap<String, CacheEntry>,
    legacy: HashMap<String, Vec<HexDigest>>,
    dirty: bool,
}

impl ChecksumCache {
    /// Loads the cache, tolerating a missing or partially damaged file;
    /// unparseable lines are dropped.
    pub fn load(file: impl AsRef<Path>) -> Result<Self> {
        let file = file.as_ref().to_path_buf();
        let mut entries = HashMap::new();
        let mut legacy = HashMap::new();

        if file.exists() {
            for line in BufReader::new(File::open(&file)?).lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }

                if let Some(rest) = line.strip_prefix(':') {
                    if let Some((digest, equivalents)) = rest.split_once(' ') {
                        legacy.insert(
                            digest.to_ascii_lowercase(),
                            equivalents.split(':').map(HexDigest::from).collect(),
                        );
                    }
                    continue;
                }

                let mut parts = line.splitn(3, ' ');
                let (digest, timestamp, path) = match (parts.next(), parts.next(), parts.next()) {
                    (Some(d), Some(t), Some(p)) => (d, t, p),
                    _ => {
                        warn!("Dropping malformed checksum cache line: {}", line);
                        continue;
                    }
                };

                match Timestamp::try_from(timestamp) {
                    Ok(timestamp) => {
                        entries.insert(
                            path.to_string(),
                            CacheEntry {
                                timestamp,
                                digest: digest.into(),
                            },
                        );
                    }
                    Err(_) => warn!("Dropping malformed checksum cache line: {}", line),
                }
            }
        }

        Ok(Self {
            file,
            entries,
            legacy,
            dirty: false,
        })
    }

    /// Returns the cached digest and its legacy equivalents, but only when
    /// the recorded mtime equals the file's current mtime.
    pub fn get(&self, path: &str, mtime: Timestamp) -> Option<(HexDigest, Vec<HexDigest>)> {
        let entry = self.entries.get(path)?;
        if entry.timestamp != mtime {
            return None;
        }

        let legacy = self
            .legacy
            .get(&entry.digest.as_ref().to_ascii_lowercase())
            .cloned()
            .unwrap_or_default();
        Some((entry.digest.clone(), legacy))
    }

    /// Records a freshly computed digest. The digest-keyed reverse map is
    /// only touched when the digest is not already indexed.
    pub fn put(
        &mut self,
        path: &str,
        mtime: Timestamp,
        digest: &HexDigest,
        legacy_digests: &[HexDigest],
    ) {
        self.entries.insert(
            path.to_string(),
            CacheEntry {
                timestamp: mtime,
                digest: digest.clone(),
            },
        );

        let key = digest.as_ref().to_ascii_lowercase();
        if !legacy_digests.is_empty() && !self.legacy.contains_key(&key) {
            self.legacy.insert(key, legacy_digests.to_vec());
        }

        self.dirty = true;
    }

    /// Forgets a path, e.g. when its file disappeared
    pub fn remove(&mut self, path: &str) {
        if self.entries.remove(path).is_some() {
            self.dirty = true;
        }
    }

    /// Writes the cache back if anything changed
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let mut paths: Vec<&String> = self.entries.keys().collect();
        paths.sort();

        let mut writer = BufWriter::new(File::create(&self.file)?);
        for path in paths {
            let entry = &self.entries[path];
            writeln!(writer, "{} {} {}", entry.digest, entry.timestamp, path)?;
        }

        let mut digests: Vec<&String> = self.legacy.keys().collect();
        digests.sort();
        for digest in digests {
            let joined: Vec<&str> = self.legacy[digest].iter().map(AsRef::as_ref).collect();
            writeln!(writer, ":{} {}", digest, joined.join(":"))?;
        }

        writer.flush()?;
        self.dirty = false;
        Ok(())
    }
}
