//! Catalog codec: the GZIP-compressed XML document each update site serves
//! and the manager persists locally as `db.xml.gz`.
//!
//! The local variant leads with `update-site`/`disabled-update-site`
//! declarations; the remote variant contains only `plugin` elements. Unknown
//! attributes are ignored so newer catalogs stay readable; missing required
//! attributes are a hard error.

use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::updater::consts::CATALOG_ROOT_ELEMENT;
use crate::updater::error::{Result, UpdateError};
use crate::updater::model::{
    Dependency, FileCollection, FileRecord, UpdateSite, Version,
};
use crate::updater::timestamp::Timestamp;

const DTD: &str = "\
<!DOCTYPE pluginRecords [
<!ELEMENT pluginRecords ((update-site | disabled-update-site)*, plugin*)>
<!ELEMENT update-site EMPTY>
<!ELEMENT disabled-update-site EMPTY>
<!ELEMENT plugin (platform*, category*, version?, previous-version*)>
<!ELEMENT version (description?, dependency*, link*, author*)>
<!ELEMENT previous-version EMPTY>
<!ELEMENT description (#PCDATA)>
<!ELEMENT dependency EMPTY>
<!ELEMENT link (#PCDATA)>
<!ELEMENT author (#PCDATA)>
<!ELEMENT platform (#PCDATA)>
<!ELEMENT category (#PCDATA)>
<!ATTLIST update-site name CDATA #REQUIRED>
<!ATTLIST update-site url CDATA #REQUIRED>
<!ATTLIST update-site ssh-host CDATA #IMPLIED>
<!ATTLIST update-site upload-directory CDATA #IMPLIED>
<!ATTLIST update-site description CDATA #IMPLIED>
<!ATTLIST update-site maintainer CDATA #IMPLIED>
<!ATTLIST update-site timestamp CDATA #REQUIRED>
<!ATTLIST update-site keep-url CDATA #IMPLIED>
<!ATTLIST update-site official CDATA #IMPLIED>
<!ATTLIST disabled-update-site name CDATA #REQUIRED>
<!ATTLIST disabled-update-site url CDATA #REQUIRED>
<!ATTLIST disabled-update-site ssh-host CDATA #IMPLIED>
<!ATTLIST disabled-update-site upload-directory CDATA #IMPLIED>
<!ATTLIST disabled-update-site description CDATA #IMPLIED>
<!ATTLIST disabled-update-site maintainer CDATA #IMPLIED>
<!ATTLIST disabled-update-site timestamp CDATA #REQUIRED>
<!ATTLIST disabled-update-site keep-url CDATA #IMPLIED>
<!ATTLIST disabled-update-site official CDATA #IMPLIED>
<!ATTLIST plugin update-site CDATA #IMPLIED>
<!ATTLIST plugin filename CDATA #REQUIRED>
<!ATTLIST plugin executable CDATA #IMPLIED>
<!ATTLIST version timestamp CDATA #REQUIRED>
<!ATTLIST version checksum CDATA #REQUIRED>
<!ATTLIST version filesize CDATA #REQUIRED>
<!ATTLIST previous-version filename CDATA #IMPLIED>
<!ATTLIST previous-version timestamp CDATA #REQUIRED>
<!ATTLIST previous-version timestamp-obsolete CDATA #IMPLIED>
<!ATTLIST previous-version checksum CDATA #REQUIRED>
<!ATTLIST dependency filename CDATA #REQUIRED>
<!ATTLIST dependency timestamp CDATA #IMPLIED>
<!ATTLIST dependency overrides CDATA #IMPLIED>
]>";

/// Applies catalog documents to a `FileCollection`
pub struct CatalogReader<'a> {
    collection: &'a mut FileCollection,
}

impl<'a> CatalogReader<'a> {
    pub fn new(collection: &'a mut FileCollection) -> Self {
        Self { collection }
    }

    /// Reads the local catalog, including its site declarations. Every file
    /// read this way is tracked.
    pub fn read_local(&mut self, reader: impl BufRead) -> Result<()> {
        self.read(reader, None, true)
    }

    /// Reads the local catalog from its gzipped file
    pub fn read_local_gz(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::open(path.as_ref())?;
        self.read_local(BufReader::new(GzDecoder::new(file)))
    }

    /// Reads a remote site's catalog. Records the site previously
    /// advertised and no longer does are dropped first.
    pub fn read_remote(&mut self, site: &str, reader: impl BufRead) -> Result<()> {
        self.collection.drop_site_records(site);
        self.read(reader, Some(site), false)
    }

    /// Decompresses and reads a remote site's catalog from raw bytes
    pub fn read_remote_gz(&mut self, site: &str, bytes: &[u8]) -> Result<()> {
        self.read_remote(site, BufReader::new(GzDecoder::new(bytes)))
    }

    fn read(&mut self, reader: impl BufRead, default_site: Option<&str>, local: bool) -> Result<()> {
        let mut xml = Reader::from_reader(reader);
        xml.trim_text(true);

        let mut buf = Vec::new();
        let mut count = 0usize;

        loop {
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    n if n == CATALOG_ROOT_ELEMENT.as_bytes() => {}
                    b"update-site" => self.read_site(&e, true, local, default_site)?,
                    b"disabled-update-site" => self.read_site(&e, false, local, default_site)?,
                    b"plugin" => {
                        self.read_plugin(&mut xml, &e, default_site, local, false)?;
                        count += 1;
                    }
                    other => {
                        return Err(corrupt(
                            default_site,
                            format!("unexpected element <{}>", String::from_utf8_lossy(other)),
                        ))
                    }
                },
                Ok(Event::Empty(e)) => match e.name().as_ref() {
                    b"update-site" => self.read_site(&e, true, local, default_site)?,
                    b"disabled-update-site" => self.read_site(&e, false, local, default_site)?,
                    b"plugin" => {
                        self.read_plugin(&mut xml, &e, default_site, local, true)?;
                        count += 1;
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(corrupt(default_site, e.to_string())),
            }
            buf.clear();
        }

        debug!(
            "Read {} catalog entries from {}",
            count,
            default_site.unwrap_or("the local catalog")
        );

        self.collection.reconcile_all();
        Ok(())
    }

    fn read_site(
        &mut self,
        e: &BytesStart,
        active: bool,
        local: bool,
        default_site: Option<&str>,
    ) -> Result<()> {
        if !local {
            return Err(corrupt(
                default_site,
                "site declarations are only valid in the local catalog".to_string(),
            ));
        }

        let mut name = None;
        let mut url = None;
        let mut host = None;
        let mut upload_directory = None;
        let mut description = None;
        let mut maintainer = None;
        let mut timestamp = None;
        let mut keep_url = false;
        let mut official = false;

        for attr in e.attributes() {
            let attr = attr.map_err(|e| corrupt(default_site, e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| corrupt(default_site, e.to_string()))?
                .into_owned();
            match attr.key.as_ref() {
                b"name" => name = Some(value),
                b"url" => url = Some(value),
                b"ssh-host" => host = Some(value),
                b"upload-directory" => upload_directory = Some(value),
                b"description" => description = Some(value),
                b"maintainer" => maintainer = Some(value),
                b"timestamp" => {
                    timestamp = Some(
                        Timestamp::try_from(value.as_str())
                            .map_err(|e| corrupt(default_site, e.to_string()))?,
                    )
                }
                b"keep-url" => keep_url = value == "true",
                b"official" => official = value == "true",
                _ => {}
            }
        }

        let name = name.ok_or_else(|| missing(default_site, "update-site", "name"))?;
        let url = url.ok_or_else(|| missing(default_site, "update-site", "url"))?;

        let rank = self
            .collection
            .sites()
            .map(|s| s.rank() + 1)
            .max()
            .unwrap_or(0);
        let mut site = UpdateSite::new(name, url, rank);
        site.host = host;
        site.upload_directory = upload_directory;
        site.description = description;
        site.maintainer = maintainer;
        site.timestamp = timestamp;
        site.keep_url = keep_url;
        site.official = official;
        site.active = active;

        self.collection.insert_site(site)
    }

    fn read_plugin(
        &mut self,
        xml: &mut Reader<impl BufRead>,
        e: &BytesStart,
        default_site: Option<&str>,
        local: bool,
        empty: bool,
    ) -> Result<()> {
        let mut filename = None;
        let mut site = default_site.map(str::to_string);
        let mut executable = false;

        for attr in e.attributes() {
            let attr = attr.map_err(|e| corrupt(default_site, e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| corrupt(default_site, e.to_string()))?
                .into_owned();
            match attr.key.as_ref() {
                b"filename" => filename = Some(value),
                b"update-site" => site = Some(value),
                b"executable" => executable = value == "true",
                _ => {}
            }
        }

        let filename = filename.ok_or_else(|| missing(default_site, "plugin", "filename"))?;
        let site = match site {
            Some(site) => site,
            None => return Err(missing(default_site, "plugin", "update-site")),
        };

        let mut record = FileRecord::new(site, filename);
        record.executable = executable;

        if empty {
            let id = self.collection.insert_record(record)?;
            if local {
                self.collection.file_mut(id).tracked = true;
            }
            return Ok(());
        }

        let mut buf = Vec::new();
        loop {
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"version" => {
                        let (version, filesize) = self.read_version(xml, &e, &mut record, default_site)?;
                        record.current = Some(version);
                        record.filesize = filesize;
                    }
                    b"platform" => {
                        record.platforms.insert(read_text(xml, "platform", default_site)?);
                    }
                    b"category" => {
                        record.categories.push(read_text(xml, "category", default_site)?);
                    }
                    other => {
                        return Err(corrupt(
                            default_site,
                            format!("unexpected element <{}>", String::from_utf8_lossy(other)),
                        ))
                    }
                },
                Ok(Event::Empty(e)) => match e.name().as_ref() {
                    b"previous-version" => {
                        let version = self.read_previous(&e, default_site)?;
                        record.previous.insert(version);
                    }
                    b"version" => {
                        let (version, filesize) =
                            self.read_version_attrs(&e, default_site)?;
                        record.current = Some(version);
                        record.filesize = filesize;
                    }
                    _ => {}
                },
                Ok(Event::End(e)) if e.name().as_ref() == b"plugin" => break,
                Ok(Event::Eof) => {
                    return Err(corrupt(default_site, "unterminated <plugin>".to_string()))
                }
                Ok(_) => {}
                Err(e) => return Err(corrupt(default_site, e.to_string())),
            }
            buf.clear();
        }

        let id = self.collection.insert_record(record)?;
        if local {
            self.collection.file_mut(id).tracked = true;
        }
        Ok(())
    }

    fn read_version_attrs(
        &self,
        e: &BytesStart,
        default_site: Option<&str>,
    ) -> Result<(Version, u64)> {
        let mut checksum = None;
        let mut timestamp = None;
        let mut filesize = None;

        for attr in e.attributes() {
            let attr = attr.map_err(|e| corrupt(default_site, e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| corrupt(default_site, e.to_string()))?
                .into_owned();
            match attr.key.as_ref() {
                b"checksum" => checksum = Some(value),
                b"timestamp" => {
                    timestamp = Some(
                        Timestamp::try_from(value.as_str())
                            .map_err(|e| corrupt(default_site, e.to_string()))?,
                    )
                }
                b"filesize" => {
                    filesize = Some(value.parse::<u64>().map_err(|_| {
                        corrupt(default_site, format!("invalid filesize {}", value))
                    })?)
                }
                _ => {}
            }
        }

        let checksum = checksum.ok_or_else(|| missing(default_site, "version", "checksum"))?;
        let timestamp = timestamp.ok_or_else(|| missing(default_site, "version", "timestamp"))?;
        let filesize = filesize.ok_or_else(|| missing(default_site, "version", "filesize"))?;

        Ok((Version::new(checksum, timestamp), filesize))
    }

    fn read_version(
        &mut self,
        xml: &mut Reader<impl BufRead>,
        e: &BytesStart,
        record: &mut FileRecord,
        default_site: Option<&str>,
    ) -> Result<(Version, u64)> {
        let (version, filesize) = self.read_version_attrs(e, default_site)?;

        let mut buf = Vec::new();
        loop {
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"description" => {
                        record.description = Some(read_text(xml, "description", default_site)?)
                    }
                    b"link" => record.links.push(read_text(xml, "link", default_site)?),
                    b"author" => record.authors.push(read_text(xml, "author", default_site)?),
                    other => {
                        return Err(corrupt(
                            default_site,
                            format!("unexpected element <{}>", String::from_utf8_lossy(other)),
                        ))
                    }
                },
                Ok(Event::Empty(e)) => {
                    if e.name().as_ref() == b"dependency" {
                        record.dependencies.push(self.read_dependency(&e, default_site)?);
                    }
                }
                Ok(Event::End(e)) if e.name().as_ref() == b"version" => break,
                Ok(Event::Eof) => {
                    return Err(corrupt(default_site, "unterminated <version>".to_string()))
                }
                Ok(_) => {}
                Err(e) => return Err(corrupt(default_site, e.to_string())),
            }
            buf.clear();
        }

        Ok((version, filesize))
    }

    fn read_previous(&mut self, e: &BytesStart, default_site: Option<&str>) -> Result<Version> {
        let mut checksum = None;
        let mut timestamp = None;
        let mut filename = None;
        let mut timestamp_obsolete = None;

        for attr in e.attributes() {
            let attr = attr.map_err(|e| corrupt(default_site, e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| corrupt(default_site, e.to_string()))?
                .into_owned();
            match attr.key.as_ref() {
                b"checksum" => checksum = Some(value),
                b"filename" => filename = Some(value),
                b"timestamp" => {
                    timestamp = Some(
                        Timestamp::try_from(value.as_str())
                            .map_err(|e| corrupt(default_site, e.to_string()))?,
                    )
                }
                b"timestamp-obsolete" => {
                    timestamp_obsolete = Some(
                        Timestamp::try_from(value.as_str())
                            .map_err(|e| corrupt(default_site, e.to_string()))?,
                    )
                }
                _ => {}
            }
        }

        let checksum =
            checksum.ok_or_else(|| missing(default_site, "previous-version", "checksum"))?;
        let timestamp =
            timestamp.ok_or_else(|| missing(default_site, "previous-version", "timestamp"))?;

        let mut version = Version::with_filename(checksum, timestamp, filename);
        version.timestamp_obsolete = timestamp_obsolete;
        Ok(version)
    }

    fn read_dependency(&mut self, e: &BytesStart, default_site: Option<&str>) -> Result<Dependency> {
        let mut filename = None;
        let mut timestamp = None;
        let mut overrides = false;

        for attr in e.attributes() {
            let attr = attr.map_err(|e| corrupt(default_site, e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| corrupt(default_site, e.to_string()))?
                .into_owned();
            match attr.key.as_ref() {
                b"filename" => filename = Some(value),
                b"timestamp" => {
                    timestamp = Some(
                        Timestamp::try_from(value.as_str())
                            .map_err(|e| corrupt(default_site, e.to_string()))?,
                    )
                }
                b"overrides" => overrides = value == "true",
                _ => {}
            }
        }

        let filename = filename.ok_or_else(|| missing(default_site, "dependency", "filename"))?;

        Ok(Dependency {
            filename,
            timestamp,
            overrides,
        })
    }
}

/// Serializes a `FileCollection` back to catalog XML
pub struct CatalogWriter<'a> {
    collection: &'a FileCollection,
}

impl<'a> CatalogWriter<'a> {
    pub fn new(collection: &'a FileCollection) -> Self {
        Self { collection }
    }

    /// Writes the local catalog: every site declaration in rank order
    /// followed by the winning record of every live file
    pub fn write_local(&self, writer: impl Write) -> Result<()> {
        self.write(writer, None)
    }

    /// Writes the local catalog gzipped to the given path
    pub fn write_local_gz(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_local(GzEncoder::new(file, Compression::default()))
    }

    /// Writes the remote variant of a single site's catalog: no site
    /// declarations, only that site's records
    pub fn write_site(&self, site: &str, writer: impl Write) -> Result<()> {
        self.write(writer, Some(site))
    }

    /// Gzipped remote catalog as raw bytes
    pub fn write_site_gz(&self, site: &str) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_site(site, GzEncoder::new(&mut bytes, Compression::default()))?;
        Ok(bytes)
    }

    fn write(&self, writer: impl Write, only_site: Option<&str>) -> Result<()> {
        let mut xml = Writer::new_with_indent(writer, b'\t', 1);

        xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        xml.write_event(Event::DocType(BytesText::from_escaped(
            &DTD["<!DOCTYPE ".len()..DTD.len() - 1],
        )))?;
        xml.write_event(Event::Start(BytesStart::new(CATALOG_ROOT_ELEMENT)))?;

        if only_site.is_none() {
            let mut sites: Vec<&UpdateSite> = self.collection.sites().collect();
            sites.sort_by_key(|s| s.rank());
            for site in sites {
                self.write_site_decl(&mut xml, site)?;
            }
        }

        for (id, file) in self.collection.iter() {
            let record = match self.collection.winner(id) {
                Some(record) => record,
                None => continue,
            };
            if let Some(only) = only_site {
                if record.site != only {
                    continue;
                }
            }
            self.write_plugin(&mut xml, &file.name, record, only_site.is_none())?;
        }

        xml.write_event(Event::End(BytesEnd::new(CATALOG_ROOT_ELEMENT)))?;
        Ok(())
    }

    fn write_site_decl(&self, xml: &mut Writer<impl Write>, site: &UpdateSite) -> Result<()> {
        let element = if site.active {
            "update-site"
        } else {
            "disabled-update-site"
        };

        let mut e = BytesStart::new(element);
        e.push_attribute(("name", site.name.as_str()));
        e.push_attribute(("url", site.url()));
        if let Some(host) = &site.host {
            e.push_attribute(("ssh-host", host.as_str()));
        }
        if let Some(dir) = &site.upload_directory {
            e.push_attribute(("upload-directory", dir.as_str()));
        }
        if let Some(description) = &site.description {
            e.push_attribute(("description", description.as_str()));
        }
        if let Some(maintainer) = &site.maintainer {
            e.push_attribute(("maintainer", maintainer.as_str()));
        }
        if site.keep_url {
            e.push_attribute(("keep-url", "true"));
        }
        if site.official {
            e.push_attribute(("official", "true"));
        }
        if let Some(timestamp) = site.timestamp {
            e.push_attribute(("timestamp", timestamp.to_string().as_str()));
        }

        xml.write_event(Event::Empty(e))?;
        Ok(())
    }

    fn write_plugin(
        &self,
        xml: &mut Writer<impl Write>,
        name: &str,
        record: &FileRecord,
        with_site: bool,
    ) -> Result<()> {
        let mut e = BytesStart::new("plugin");
        if with_site {
            e.push_attribute(("update-site", record.site.as_str()));
        }
        e.push_attribute(("filename", name));
        if record.executable {
            e.push_attribute(("executable", "true"));
        }
        xml.write_event(Event::Start(e))?;

        for platform in &record.platforms {
            write_text_element(xml, "platform", platform)?;
        }
        for category in &record.categories {
            write_text_element(xml, "category", category)?;
        }

        if let Some(current) = &record.current {
            let mut v = BytesStart::new("version");
            v.push_attribute(("checksum", current.checksum.as_ref()));
            v.push_attribute(("timestamp", current.timestamp.to_string().as_str()));
            v.push_attribute(("filesize", record.filesize.to_string().as_str()));
            xml.write_event(Event::Start(v))?;

            if let Some(description) = &record.description {
                write_text_element(xml, "description", description)?;
            }
            for dep in &record.dependencies {
                let mut d = BytesStart::new("dependency");
                d.push_attribute(("filename", dep.filename.as_str()));
                if let Some(timestamp) = dep.timestamp {
                    d.push_attribute(("timestamp", timestamp.to_string().as_str()));
                }
                if dep.overrides {
                    d.push_attribute(("overrides", "true"));
                }
                xml.write_event(Event::Empty(d))?;
            }
            for link in &record.links {
                write_text_element(xml, "link", link)?;
            }
            for author in &record.authors {
                write_text_element(xml, "author", author)?;
            }

            xml.write_event(Event::End(BytesEnd::new("version")))?;
        }

        for previous in &record.previous {
            let mut p = BytesStart::new("previous-version");
            if let Some(filename) = &previous.filename {
                p.push_attribute(("filename", filename.as_str()));
            }
            p.push_attribute(("timestamp", previous.timestamp.to_string().as_str()));
            if let Some(obsolete) = previous.timestamp_obsolete {
                p.push_attribute(("timestamp-obsolete", obsolete.to_string().as_str()));
            }
            p.push_attribute(("checksum", previous.checksum.as_ref()));
            xml.write_event(Event::Empty(p))?;
        }

        xml.write_event(Event::End(BytesEnd::new("plugin")))?;
        Ok(())
    }
}

fn write_text_element(xml: &mut Writer<impl Write>, name: &str, value: &str) -> Result<()> {
    xml.write_event(Event::Start(BytesStart::new(name)))?;
    xml.write_event(Event::Text(BytesText::new(value)))?;
    xml.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn read_text(
    xml: &mut Reader<impl BufRead>,
    element: &str,
    site: Option<&str>,
) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Text(t)) => {
                text.push_str(
                    &t.unescape()
                        .map_err(|e| corrupt(site, e.to_string()))?,
                );
            }
            Ok(Event::End(e)) if e.name().as_ref() == element.as_bytes() => break,
            Ok(Event::Eof) => {
                return Err(corrupt(site, format!("unterminated <{}>", element)))
            }
            Ok(_) => {}
            Err(e) => return Err(corrupt(site, e.to_string())),
        }
        buf.clear();
    }

    Ok(text)
}

fn corrupt(site: Option<&str>, message: String) -> UpdateError {
    UpdateError::CorruptCatalog {
        site: site.unwrap_or("local").to_string(),
        message,
    }
}

fn missing(site: Option<&str>, element: &str, attribute: &str) -> UpdateError {
    corrupt(
        site,
        format!("<{}> is missing required attribute {}", element, attribute),
    )
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;
    use std::io::Cursor;

    use super::*;
    use crate::updater::model::{Action, Status};

    fn sample_collection() -> FileCollection {
        let mut collection = FileCollection::new();
        collection
            .add_site("main", "https://updates.example.org/main/")
            .unwrap();
        collection.site_mut("main").unwrap().timestamp =
            Some(Timestamp::try_from("20240101000000").unwrap());

        let mut record = FileRecord::new("main", "plugins/Analyzer.jar");
        record.filesize = 4096;
        record.executable = false;
        record.description = Some("Analyzes things".to_string());
        record.current = Some(Version::new(
            "aa00",
            Timestamp::try_from("20240101000000").unwrap(),
        ));
        record.dependencies.push(Dependency {
            filename: "jars/core.jar".to_string(),
            timestamp: Some(Timestamp::try_from("20230601000000").unwrap()),
            overrides: false,
        });
        record.authors.push("Alice".to_string());
        record.categories.push("Analysis".to_string());
        record.platforms.insert("linux64".to_string());
        let mut old = Version::new("99ff", Timestamp::try_from("20230101000000").unwrap());
        old.timestamp_obsolete = Some(Timestamp::try_from("20240101000000").unwrap());
        record.previous.insert(old);
        collection.insert_record(record).unwrap();

        let mut core = FileRecord::new("main", "jars/core.jar");
        core.filesize = 123;
        core.current = Some(Version::new(
            "bb11",
            Timestamp::try_from("20230601000000").unwrap(),
        ));
        collection.insert_record(core).unwrap();

        collection
    }

    #[test]
    fn local_catalog_round_trips() {
        let collection = sample_collection();

        let mut bytes = Vec::new();
        CatalogWriter::new(&collection)
            .write_local(&mut bytes)
            .unwrap();

        let mut reread = FileCollection::new();
        CatalogReader::new(&mut reread)
            .read_local(Cursor::new(&bytes))
            .unwrap();

        let site = reread.site("main").unwrap();
        assert_eq!("https://updates.example.org/main/", site.url());
        assert_eq!(
            Some(Timestamp::try_from("20240101000000").unwrap()),
            site.timestamp
        );

        let id = reread.get("plugins/Analyzer.jar").unwrap();
        let record = reread.winner(id).unwrap();
        assert_eq!(4096, record.filesize);
        assert_eq!(Some("Analyzes things".to_string()), record.description);
        assert_eq!(1, record.dependencies.len());
        assert_eq!("jars/core.jar", record.dependencies[0].filename);
        assert_eq!(1, record.previous.len());
        assert_eq!(vec!["Alice".to_string()], record.authors);
        assert!(record.platforms.contains("linux64"));

        // Files read from the local catalog are tracked
        assert_eq!(Status::NotInstalled, reread.file(id).status);
        assert_eq!(Action::NotInstalled, reread.file(id).action);
    }

    #[test]
    fn remote_catalog_omits_site_declarations() {
        let collection = sample_collection();
        let mut bytes = Vec::new();
        CatalogWriter::new(&collection)
            .write_site("main", &mut bytes)
            .unwrap();

        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("<update-site"));
        assert!(text.contains("<plugin filename="));
    }

    #[test]
    fn remote_catalog_reads_with_default_site() {
        let collection = sample_collection();
        let mut bytes = Vec::new();
        CatalogWriter::new(&collection)
            .write_site("main", &mut bytes)
            .unwrap();

        let mut reread = FileCollection::new();
        reread
            .add_site("main", "https://updates.example.org/main/")
            .unwrap();
        CatalogReader::new(&mut reread)
            .read_remote("main", Cursor::new(&bytes))
            .unwrap();

        let id = reread.get("plugins/Analyzer.jar").unwrap();
        // Never seen locally: the file is new
        assert_eq!(Status::New, reread.file(id).status);
    }

    #[test]
    fn gzip_round_trip() {
        let collection = sample_collection();
        let bytes = CatalogWriter::new(&collection).write_site_gz("main").unwrap();

        let mut reread = FileCollection::new();
        reread
            .add_site("main", "https://updates.example.org/main/")
            .unwrap();
        CatalogReader::new(&mut reread)
            .read_remote_gz("main", &bytes)
            .unwrap();

        assert!(reread.get("jars/core.jar").is_some());
    }

    #[test]
    fn missing_required_attribute_is_corrupt() {
        let xml = r#"<?xml version="1.0"?>
<pluginRecords>
<plugin update-site="main" filename="jars/x.jar">
<version timestamp="20240101000000" filesize="1"/>
</plugin>
</pluginRecords>"#;

        let mut collection = FileCollection::new();
        collection.add_site("main", "https://a.example.org/").unwrap();

        match CatalogReader::new(&mut collection).read_local(Cursor::new(xml.as_bytes())) {
            Err(UpdateError::CorruptCatalog { message, .. }) => {
                assert!(message.contains("checksum"), "{}", message)
            }
            other => panic!("Expected corrupt catalog, got {:?}", other),
        }
    }

    #[test]
    fn disabled_sites_round_trip_with_stable_order() {
        let mut collection = FileCollection::new();
        collection.add_site("first", "https://a.example.org/").unwrap();
        collection.add_site("second", "https://b.example.org/").unwrap();
        collection.add_site("third", "https://c.example.org/").unwrap();
        collection.deactivate_site("second").unwrap();

        let mut bytes = Vec::new();
        CatalogWriter::new(&collection)
            .write_local(&mut bytes)
            .unwrap();

        let mut reread = FileCollection::new();
        CatalogReader::new(&mut reread)
            .read_local(Cursor::new(&bytes))
            .unwrap();

        let names: Vec<(String, bool, usize)> = reread
            .sites()
            .map(|s| (s.name.clone(), s.active, s.rank()))
            .collect();
        assert_eq!(
            vec![
                ("first".to_string(), true, 0),
                ("second".to_string(), false, 1),
                ("third".to_string(), true, 2),
            ],
            names
        );
    }

    #[test]
    fn plugin_without_versions_reads_back() {
        let xml = r#"<?xml version="1.0"?>
<pluginRecords>
<plugin update-site="main" filename="jars/ghost.jar"/>
</pluginRecords>"#;

        let mut collection = FileCollection::new();
        collection.add_site("main", "https://a.example.org/").unwrap();

        CatalogReader::new(&mut collection)
            .read_local(Cursor::new(xml.as_bytes()))
            .unwrap();

        let id = collection.get("jars/ghost.jar").unwrap();
        assert!(collection.winner(id).unwrap().current.is_none());
        assert_eq!(Status::ObsoleteUninstalled, collection.file(id).status);
    }

    #[test]
    fn unknown_attributes_are_ignored() {
        let xml = r#"<?xml version="1.0"?>
<pluginRecords>
<plugin update-site="main" filename="jars/x.jar" frobnicate="yes">
<version timestamp="20240101000000" checksum="aa" filesize="1" shiny="very"/>
</plugin>
</pluginRecords>"#;

        let mut collection = FileCollection::new();
        collection.add_site("main", "https://a.example.org/").unwrap();

        CatalogReader::new(&mut collection)
            .read_local(Cursor::new(xml.as_bytes()))
            .unwrap();
        assert!(collection.get("jars/x.jar").is_some());
    }
}
