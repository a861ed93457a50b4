//! Pluggable upload transports. Every transport is statically linked and
//! advertises its protocol string; a site's `host` field (`protocol:address`)
//! selects one. The `file` transport covers local and mounted site
//! directories and is what the test suite drives.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::updater::error::{Result, UpdateError};
use crate::updater::model::UpdateSite;
use crate::updater::progress::Progress;
use crate::updater::timestamp::Timestamp;
use crate::updater::util;

/// One payload for a transport to write
pub struct Uploadable {
    /// Path relative to the site's upload directory
    pub name: String,
    pub source: UploadSource,
}

pub enum UploadSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl Uploadable {
    pub fn from_file(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            source: UploadSource::File(path.as_ref().to_path_buf()),
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: UploadSource::Bytes(bytes),
        }
    }

    pub fn size(&self) -> Result<u64> {
        match &self.source {
            UploadSource::File(path) => Ok(path.metadata()?.len()),
            UploadSource::Bytes(bytes) => Ok(bytes.len() as u64),
        }
    }
}

/// Capability set every upload protocol implements
pub trait Transport {
    fn protocol(&self) -> &'static str;

    fn login(&mut self) -> Result<()> {
        Ok(())
    }

    fn logout(&mut self) {}

    /// Modification time of a remote path, `None` when it does not exist
    fn timestamp(&mut self, path: &str) -> Result<Option<Timestamp>>;

    /// Writes every payload. Implementations report per-item progress.
    fn upload(&mut self, uploadables: &[Uploadable], progress: &mut dyn Progress) -> Result<()>;

    /// Atomically renames a remote path, moving an existing target to
    /// `backup` first when one is given
    fn rename(&mut self, from: &str, to: &str, backup: Option<&str>) -> Result<()>;

    fn total_size(&self, uploadables: &[Uploadable]) -> Result<u64> {
        let mut total = 0;
        for uploadable in uploadables {
            total += uploadable.size()?;
        }
        Ok(total)
    }
}

/// Picks the transport for a site based on its `protocol:address` host
pub fn create_transport(site: &UpdateSite) -> Result<Box<dyn Transport>> {
    let host = site
        .host
        .as_deref()
        .ok_or_else(|| UpdateError::TransportUnavailable("<none>".to_string()))?;

    let (protocol, address) = host.split_once(':').unwrap_or((host, ""));

    match protocol {
        "file" => {
            let directory = site
                .upload_directory
                .as_deref()
                .unwrap_or(address)
                .to_string();
            if directory.is_empty() {
                return Err(UpdateError::InvalidConfiguration(format!(
                    "Update site {} has no upload directory",
                    site.name
                )));
            }
            Ok(Box::new(FileTransport::new(directory)))
        }
        other => Err(UpdateError::TransportUnavailable(other.to_string())),
    }
}

/// Uploads into a directory on the local filesystem
pub struct FileTransport {
    directory: PathBuf,
}

impl FileTransport {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.directory
            .join(util::convert_forwardslash_to_back(path).as_ref())
    }
}

impl Transport for FileTransport {
    fn protocol(&self) -> &'static str {
        "file"
    }

    fn timestamp(&mut self, path: &str) -> Result<Option<Timestamp>> {
        let resolved = self.resolve(path);
        if !resolved.exists() {
            return Ok(None);
        }
        Ok(Some(Timestamp::from_mtime(&resolved)?))
    }

    fn upload(&mut self, uploadables: &[Uploadable], progress: &mut dyn Progress) -> Result<()> {
        progress.set_count(0, uploadables.len());

        for (i, uploadable) in uploadables.iter().enumerate() {
            let destination = self.resolve(&uploadable.name);
            util::ensure_parent(&destination)?;
            progress.add_item(&uploadable.name);

            match &uploadable.source {
                UploadSource::File(path) => {
                    fs::copy(path, &destination)?;
                }
                UploadSource::Bytes(bytes) => {
                    fs::write(&destination, bytes)?;
                }
            }

            debug!("Uploaded {}", uploadable.name);
            progress.item_done(&uploadable.name);
            progress.set_count(i + 1, uploadables.len());
        }

        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str, backup: Option<&str>) -> Result<()> {
        let from_path = self.resolve(from);
        let to_path = self.resolve(to);

        if to_path.exists() {
            if let Some(backup) = backup {
                let backup_path = self.resolve(backup);
                util::remove_file_ignore_not_found(&backup_path)?;
                fs::rename(&to_path, &backup_path)?;
                info!("Backed up {} to {}", to, backup);
            }
        }

        fs::rename(&from_path, &to_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    use super::*;
    use crate::updater::progress::SilentProgress;

    #[test]
    fn file_transport_uploads_and_renames() {
        let remote = TempDir::new().unwrap();
        let mut transport = FileTransport::new(remote.path());

        assert!(transport.timestamp("db.xml.gz").unwrap().is_none());

        transport
            .upload(
                &[Uploadable::from_bytes("db.xml.gz.lock", b"catalog".to_vec())],
                &mut SilentProgress,
            )
            .unwrap();
        assert!(transport.timestamp("db.xml.gz.lock").unwrap().is_some());

        transport
            .rename("db.xml.gz.lock", "db.xml.gz", Some("db.xml.gz.old"))
            .unwrap();
        remote.child("db.xml.gz").assert("catalog");

        // A second publish backs up the first
        transport
            .upload(
                &[Uploadable::from_bytes("db.xml.gz.lock", b"catalog2".to_vec())],
                &mut SilentProgress,
            )
            .unwrap();
        transport
            .rename("db.xml.gz.lock", "db.xml.gz", Some("db.xml.gz.old"))
            .unwrap();
        remote.child("db.xml.gz").assert("catalog2");
        remote.child("db.xml.gz.old").assert("catalog");
    }

    #[test]
    fn unknown_protocol_is_unavailable() {
        let mut site = UpdateSite::new("main", "https://updates.example.org/", 0);
        site.host = Some("carrier-pigeon:coop".to_string());

        match create_transport(&site) {
            Err(UpdateError::TransportUnavailable(protocol)) => {
                assert_eq!("carrier-pigeon", protocol)
            }
            other => panic!("Expected TransportUnavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn file_transport_resolves_nested_names() {
        let remote = TempDir::new().unwrap();
        let mut transport = FileTransport::new(remote.path());

        transport
            .upload(
                &[Uploadable::from_bytes(
                    "plugins/tool.jar-20240101000000",
                    b"jar".to_vec(),
                )],
                &mut SilentProgress,
            )
            .unwrap();

        remote.child("plugins/tool.jar-20240101000000").assert("jar");
    }
}
