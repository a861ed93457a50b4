//! Helpers for building fake update sites and installation roots on disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::ZipWriter;

use rups::updater::{
    digest_file, CatalogWriter, FileCollection, FileRecord, Timestamp, Version,
};

/// Base URL for a site rooted in the given directory
pub fn site_url(dir: &Path) -> String {
    format!("file:{}/", dir.display())
}

/// Writes one payload revision under its versioned name and returns the
/// path it was served from
pub fn serve_payload(dir: &Path, name: &str, timestamp: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(format!("{}-{}", name, timestamp));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

/// Builds a catalog record advertising the served payload as current
pub fn record_for(site: &str, name: &str, timestamp: &str, payload: &Path) -> FileRecord {
    let mut record = FileRecord::new(site, name);
    record.filesize = payload.metadata().unwrap().len();
    record.current = Some(Version::new(
        digest_file(name, payload).unwrap(),
        timestamp.parse::<Timestamp>().unwrap(),
    ));
    record
}

/// Serializes the collection's remote-variant catalog into the site dir
pub fn publish_catalog(dir: &Path, site: &str, collection: &FileCollection) {
    let bytes = CatalogWriter::new(collection).write_site_gz(site).unwrap();
    fs::write(dir.join("db.xml.gz"), bytes).unwrap();
}

/// One-stop site publisher: plain files only
pub fn publish_simple_site(dir: &Path, site: &str, files: &[(&str, &str, &str)]) {
    let mut collection = FileCollection::new();
    collection.add_site(site, site_url(dir)).unwrap();

    for (name, timestamp, contents) in files {
        let payload = serve_payload(dir, name, timestamp, contents.as_bytes());
        let record = record_for(site, name, timestamp, &payload);
        collection.insert_record(record).unwrap();
    }

    publish_catalog(dir, site, &collection);
}

/// Writes a small archive bundle with a manifest, a properties file, and
/// one class member
pub fn write_jar(path: &Path, properties: &str, manifest: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut writer = ZipWriter::new(fs::File::create(path).unwrap());
    let options: FileOptions = FileOptions::default();

    writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
    writer.write_all(manifest.as_bytes()).unwrap();

    writer.start_file("build.properties", options).unwrap();
    writer.write_all(properties.as_bytes()).unwrap();

    writer.start_file("org/Example.class", options).unwrap();
    writer.write_all(b"\xca\xfe\xba\xbe fake").unwrap();

    writer.finish().unwrap();
}
