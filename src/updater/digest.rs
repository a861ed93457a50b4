use core::{cmp, fmt};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io;
use std::io::{Read, Write};
use std::path::Path;

use digest::Digest;
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use crate::updater::consts::UPDATER_JAR;
use crate::updater::error::Result;

/// Controls which archive entries are normalized before hashing. The current
/// mode filters everything; older catalog generations filtered less, and
/// their digests must still be reproducible so old entries remain
/// recognizable.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct JarHashMode {
    /// Strip `#` comment lines from `*.properties` entries
    pub properties: bool,
    /// Normalize `META-INF/MANIFEST.MF` down to its version line
    pub manifests: bool,
    /// Keep the `Main-Class` attribute when normalizing the manifest
    pub main_class_only: bool,
}

impl JarHashMode {
    pub const CURRENT: JarHashMode = JarHashMode {
        properties: true,
        manifests: true,
        main_class_only: true,
    };

    /// Earlier-era modes, newest first
    pub const LEGACY: [JarHashMode; 3] = [
        JarHashMode {
            properties: true,
            manifests: true,
            main_class_only: false,
        },
        JarHashMode {
            properties: true,
            manifests: false,
            main_class_only: false,
        },
        JarHashMode::RAW,
    ];

    /// No filtering at all; the oldest mode
    pub const RAW: JarHashMode = JarHashMode {
        properties: false,
        manifests: false,
        main_class_only: false,
    };
}

/// Computes the content digest of a file. `path` is the logical path with
/// `/` separators; it is mixed into the digest so identical payloads at
/// different locations hash differently.
pub fn digest_file(path: &str, file: impl AsRef<Path>) -> Result<HexDigest> {
    if path.ends_with(".jar") {
        // The self-updater predates every filter and keeps its original digest
        let mode = if path == UPDATER_JAR {
            JarHashMode::RAW
        } else {
            JarHashMode::CURRENT
        };
        return jar_digest(file, mode);
    }

    let mut hasher = Sha1::new();
    hasher.update(path.as_bytes());

    let mut writer = DigestWriter::new(hasher, io::sink());
    io::copy(&mut File::open(file.as_ref())?, &mut writer)?;
    Ok(writer.finalize_hex())
}

/// Digests an earlier catalog generation may have recorded for this file,
/// newest first. Empty for non-archives.
pub fn legacy_digests(path: &str, file: impl AsRef<Path>) -> Result<Vec<HexDigest>> {
    if !path.ends_with(".jar") || path == UPDATER_JAR {
        return Ok(Vec::new());
    }

    let mut digests = Vec::with_capacity(JarHashMode::LEGACY.len());
    for mode in JarHashMode::LEGACY {
        digests.push(jar_digest(file.as_ref(), mode)?);
    }
    Ok(digests)
}

/// Hashes an archive bundle: entries in ASCII-sorted name order, each entry's
/// name bytes followed by its (possibly filtered) contents. Directory entries
/// are skipped.
pub fn jar_digest(file: impl AsRef<Path>, mode: JarHashMode) -> Result<HexDigest> {
    let mut archive = zip::ZipArchive::new(File::open(file.as_ref())?)?;

    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort_unstable();

    let mut hasher = Sha1::new();

    for name in names {
        if name.ends_with('/') {
            continue;
        }

        let mut entry = archive.by_name(&name)?;
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents)?;

        hasher.update(name.as_bytes());

        if mode.properties && name.ends_with(".properties") {
            hasher.update(strip_property_comments(&contents));
        } else if mode.manifests && name == "META-INF/MANIFEST.MF" {
            hasher.update(normalize_manifest(&contents, mode.main_class_only));
        } else {
            hasher.update(&contents);
        }
    }

    Ok(hasher.finalize().to_vec().into())
}

/// Drops lines whose first byte is `#`. Archive tooling writes the build date
/// as a comment into property files, which would otherwise change the digest
/// on every rebuild.
fn strip_property_comments(contents: &[u8]) -> Vec<u8> {
    let mut filtered = Vec::with_capacity(contents.len());

    for line in split_lines(contents) {
        if !line.starts_with(b"#") {
            filtered.extend_from_slice(line);
        }
    }

    filtered
}

/// Reduces a manifest to `Manifest-Version: 1.0` plus, optionally, the
/// `Main-Class` attribute, in canonical CRLF form.
fn normalize_manifest(contents: &[u8], keep_main_class: bool) -> Vec<u8> {
    let mut normalized = b"Manifest-Version: 1.0\r\n".to_vec();

    if keep_main_class {
        if let Some(main_class) = manifest_main_class(contents) {
            normalized.extend_from_slice(b"Main-Class: ");
            normalized.extend_from_slice(main_class.as_bytes());
            normalized.extend_from_slice(b"\r\n");
        }
    }

    normalized.extend_from_slice(b"\r\n");
    normalized
}

/// Extracts the `Main-Class` attribute from a manifest's main section,
/// unfolding continuation lines first.
fn manifest_main_class(contents: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(contents);
    let mut unfolded: Vec<String> = Vec::new();

    for line in text.lines() {
        if line.is_empty() {
            // Main section ends at the first blank line
            break;
        }
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some(last) = unfolded.last_mut() {
                last.push_str(continuation);
            }
        } else {
            unfolded.push(line.to_string());
        }
    }

    for line in unfolded {
        if let Some(value) = line.strip_prefix("Main-Class:") {
            return Some(value.trim().to_string());
        }
    }

    None
}

/// Splits on `\n` keeping the terminator with each line
fn split_lines(contents: &[u8]) -> impl Iterator<Item = &[u8]> {
    contents.split_inclusive(|b| *b == b'\n')
}

/// Writer wrapper that calculates a digest while writing
pub struct DigestWriter<W: Write> {
    digest: Sha1,
    inner: W,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(digest: Sha1, writer: W) -> Self {
        Self {
            digest,
            inner: writer,
        }
    }

    pub fn finalize_hex(self) -> HexDigest {
        self.digest.finalize().to_vec().into()
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf)?;

        if result > 0 {
            self.digest.update(&buf[0..result]);
        }

        Ok(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A digest encoded as a hex string
#[derive(Deserialize, Serialize, Debug, Eq, Clone)]
pub struct HexDigest(String);

impl From<Vec<u8>> for HexDigest {
    fn from(bytes: Vec<u8>) -> Self {
        Self(hex::encode(bytes))
    }
}

impl From<&str> for HexDigest {
    fn from(digest: &str) -> Self {
        Self(digest.to_string())
    }
}

impl From<String> for HexDigest {
    fn from(digest: String) -> Self {
        Self(digest)
    }
}

impl From<HexDigest> for String {
    fn from(digest: HexDigest) -> Self {
        digest.0
    }
}

impl AsRef<str> for HexDigest {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl Ord for HexDigest {
    /// Case insensitive string comparison
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.0.as_bytes();
        let right = other.0.as_bytes();

        let l = cmp::min(left.len(), right.len());

        for i in 0..l {
            match left[i]
                .to_ascii_lowercase()
                .cmp(&right[i].to_ascii_lowercase())
            {
                Ordering::Equal => (),
                non_eq => return non_eq,
            }
        }

        left.len().cmp(&right.len())
    }
}

impl PartialOrd for HexDigest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HexDigest {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for HexDigest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

impl Display for HexDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
