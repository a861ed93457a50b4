//! The uploader coordinator: drives a transport through a locked catalog
//! swap. The lock file doubles as the skew sentinel; payloads only become
//! visible once the finished catalog is renamed over `db.xml.gz`.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::updater::consts::{DB_XML, DB_XML_BACKUP, DB_XML_LOCK};
use crate::updater::digest::digest_file;
use crate::updater::error::{Result, UpdateError};
use crate::updater::model::{Action, FileCollection, FileId};
use crate::updater::progress::Progress;
use crate::updater::timestamp::Timestamp;
use crate::updater::transport::{Transport, Uploadable};
use crate::updater::xml::CatalogWriter;

pub struct Uploader<'a> {
    root: PathBuf,
    collection: &'a mut FileCollection,
    site: String,
}

impl<'a> Uploader<'a> {
    pub fn new(
        root: impl AsRef<Path>,
        collection: &'a mut FileCollection,
        site: impl Into<String>,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            collection,
            site: site.into(),
        }
    }

    /// Publishes every staged upload and removal to the site. Returns the
    /// authoritative timestamp the server assigned to the batch.
    ///
    /// Write order: the lock is acquired first (it also re-checks skew),
    /// payloads follow, the finished catalog is the last write (into the
    /// lock name), and the lock-to-catalog rename is the first and only
    /// rename.
    pub fn upload(
        &mut self,
        transport: &mut dyn Transport,
        progress: &mut dyn Progress,
    ) -> Result<Timestamp> {
        let uploads = self.collection.staged_uploads(&self.site);
        let removals = self.staged_removals();

        if uploads.is_empty() && removals.is_empty() {
            return Err(UpdateError::IllegalState(format!(
                "Nothing is staged for upload to {}",
                self.site
            )));
        }

        transport.login()?;

        let result = self.locked_upload(transport, progress, uploads, removals);

        transport.logout();
        result
    }

    fn locked_upload(
        &mut self,
        transport: &mut dyn Transport,
        progress: &mut dyn Progress,
        uploads: Vec<FileId>,
        removals: Vec<FileId>,
    ) -> Result<Timestamp> {
        self.check_skew(transport)?;
        self.verify_staged(&uploads)?;

        // Acquire the lock. A leftover lock from a cancelled upload is
        // replaced rather than honored.
        if transport.timestamp(DB_XML_LOCK)?.is_some() {
            warn!(
                "Replacing leftover catalog lock on {}; a previous upload did not finish",
                self.site
            );
        }
        progress.set_title(&format!("Uploading to {}", self.site));
        transport.upload(
            &[Uploadable::from_bytes(DB_XML_LOCK, Vec::new())],
            progress,
        )?;

        // The server-side mtime of the lock is the authoritative timestamp
        // for everything in this batch
        let timestamp = transport
            .timestamp(DB_XML_LOCK)?
            .unwrap_or_else(Timestamp::now);

        for &id in &uploads {
            self.collection.finish_upload(id, timestamp)?;
        }
        for &id in &removals {
            if let Some(record) = self.collection.winner_mut(id) {
                record.obsolete_current(timestamp);
                record.dependencies.clear();
            }
            self.collection.reconcile(id);
        }

        // Payload files travel under their versioned names
        let mut payloads = Vec::with_capacity(uploads.len());
        for &id in &uploads {
            let file = self.collection.file(id);
            payloads.push(Uploadable::from_file(
                format!("{}-{}", file.name, timestamp),
                self.root.join(file.local_filename()),
            ));
        }
        transport.upload(&payloads, progress)?;

        // Only after every payload succeeded: the finished catalog is the
        // last write, the lock rename the first rename
        let catalog = CatalogWriter::new(self.collection).write_site_gz(&self.site)?;
        transport.upload(&[Uploadable::from_bytes(DB_XML_LOCK, catalog)], progress)?;
        transport.rename(DB_XML_LOCK, DB_XML, Some(DB_XML_BACKUP))?;

        let published = transport.timestamp(DB_XML)?.unwrap_or(timestamp);
        if let Some(site) = self.collection.site_mut(&self.site) {
            site.timestamp = Some(published);
        }

        info!(
            "Published {} uploads and {} removals to {}",
            uploads.len(),
            removals.len(),
            self.site
        );
        progress.done();
        Ok(timestamp)
    }

    /// The remote catalog must be exactly as old as the one last read
    fn check_skew(&self, transport: &mut dyn Transport) -> Result<()> {
        let expected = self
            .collection
            .site(&self.site)
            .and_then(|site| site.timestamp);
        let actual = transport.timestamp(DB_XML)?;

        let skewed = match (expected, actual) {
            (Some(expected), Some(actual)) => expected != actual,
            (None, Some(_)) => true,
            (_, None) => false,
        };

        if skewed {
            return Err(UpdateError::SiteSkew {
                site: self.site.clone(),
                expected: expected.map(|t| t.to_string()).unwrap_or_else(|| "-".into()),
                actual: actual.map(|t| t.to_string()).unwrap_or_else(|| "-".into()),
            });
        }

        Ok(())
    }

    /// Size and digest of every staged upload must still match what the
    /// scanner recorded
    fn verify_staged(&self, uploads: &[FileId]) -> Result<()> {
        for &id in uploads {
            let file = self.collection.file(id);
            let path = self.root.join(file.local_filename());

            let recorded_digest = file.local.digest.as_ref().ok_or_else(|| {
                UpdateError::IllegalState(format!("{} has no local checksum", file.name))
            })?;

            let size = path
                .metadata()
                .map_err(|_| UpdateError::TimestampSkew {
                    path: file.name.clone(),
                })?
                .len();
            if file.local.filesize != 0 && size != file.local.filesize {
                return Err(UpdateError::TimestampSkew {
                    path: file.name.clone(),
                });
            }

            let digest = digest_file(&file.name, &path)?;
            if digest != *recorded_digest {
                return Err(UpdateError::TimestampSkew {
                    path: file.name.clone(),
                });
            }
        }

        Ok(())
    }

    fn staged_removals(&self) -> Vec<FileId> {
        self.collection
            .iter()
            .filter(|(id, f)| {
                f.action == Action::Remove
                    && self
                        .collection
                        .winner(*id)
                        .map(|record| record.site == self.site)
                        .unwrap_or(false)
            })
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    use super::*;
    use crate::updater::model::{FileRecord, LocalState, Status, Version};
    use crate::updater::progress::SilentProgress;
    use crate::updater::transport::FileTransport;
    use crate::updater::xml::CatalogReader;

    fn setup(root: &TempDir, remote: &TempDir) -> FileCollection {
        let mut collection = FileCollection::new();
        collection
            .add_site("main", format!("file:{}/", remote.path().display()))
            .unwrap();
        collection.site_mut("main").unwrap().host =
            Some(format!("file:{}", remote.path().display()));

        root.child("macros/fresh.ijm").write_str("fresh").unwrap();
        let digest = digest_file(
            "macros/fresh.ijm",
            root.child("macros/fresh.ijm").path(),
        )
        .unwrap();

        let id = collection.add_local_only(
            "macros/fresh.ijm",
            LocalState {
                filename: Some("macros/fresh.ijm".to_string()),
                digest: Some(digest),
                legacy_digests: Vec::new(),
                timestamp: Some(
                    Timestamp::from_mtime(root.child("macros/fresh.ijm").path()).unwrap(),
                ),
                filesize: 5,
            },
        );
        assert_eq!(Status::LocalOnly, collection.file(id).status);

        // A local-only file becomes uploadable once a record exists; stage
        // it through a catalog record on the uploadable site
        let record = FileRecord::new("main", "macros/fresh.ijm");
        collection.insert_record(record).unwrap();
        collection.reconcile_all();
        collection.set_action(id, Action::Upload).unwrap();

        collection
    }

    #[test]
    fn upload_publishes_payload_and_catalog() {
        let root = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let mut collection = setup(&root, &remote);

        let mut transport = FileTransport::new(remote.path());
        let timestamp = Uploader::new(root.path(), &mut collection, "main")
            .upload(&mut transport, &mut SilentProgress)
            .unwrap();

        // Payload under its versioned name
        remote
            .child(format!("macros/fresh.ijm-{}", timestamp))
            .assert("fresh");
        // Catalog in place, lock gone
        remote.child("db.xml.gz").assert(predicates::path::exists());
        remote
            .child("db.xml.gz.lock")
            .assert(predicates::path::missing());

        // The uploaded file is now installed at the new version
        let id = collection.get("macros/fresh.ijm").unwrap();
        assert_eq!(Status::Installed, collection.file(id).status);
        let record = collection.winner(id).unwrap();
        assert_eq!(timestamp, record.current.as_ref().unwrap().timestamp);

        // The published catalog is readable and contains the file
        let mut reread = FileCollection::new();
        reread
            .add_site("main", "https://updates.example.org/")
            .unwrap();
        let bytes = std::fs::read(remote.child("db.xml.gz").path()).unwrap();
        CatalogReader::new(&mut reread)
            .read_remote_gz("main", &bytes)
            .unwrap();
        assert!(reread.get("macros/fresh.ijm").is_some());
    }

    #[test]
    fn skew_aborts_before_any_rename() {
        let root = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let mut collection = setup(&root, &remote);

        // Someone else published while we were not looking
        remote.child("db.xml.gz").write_str("interloper").unwrap();
        collection.site_mut("main").unwrap().timestamp =
            Some("20200101000000".parse().unwrap());

        let mut transport = FileTransport::new(remote.path());
        let result =
            Uploader::new(root.path(), &mut collection, "main").upload(&mut transport, &mut SilentProgress);

        match result {
            Err(UpdateError::SiteSkew { site, .. }) => assert_eq!("main", site),
            other => panic!("Expected SiteSkew, got {:?}", other),
        }
        // The interloper's catalog was not replaced
        remote.child("db.xml.gz").assert("interloper");
    }

    #[test]
    fn local_drift_aborts_the_upload() {
        let root = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let mut collection = setup(&root, &remote);

        // File changed after the scanner recorded its digest
        root.child("macros/fresh.ijm").write_str("drifted!").unwrap();

        let mut transport = FileTransport::new(remote.path());
        let result =
            Uploader::new(root.path(), &mut collection, "main").upload(&mut transport, &mut SilentProgress);

        assert!(matches!(result, Err(UpdateError::TimestampSkew { .. })));
    }

    #[test]
    fn leftover_lock_is_replaced() {
        let root = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let mut collection = setup(&root, &remote);

        remote.child("db.xml.gz.lock").write_str("stale").unwrap();

        let mut transport = FileTransport::new(remote.path());
        Uploader::new(root.path(), &mut collection, "main")
            .upload(&mut transport, &mut SilentProgress)
            .unwrap();

        remote
            .child("db.xml.gz.lock")
            .assert(predicates::path::missing());
    }
}
