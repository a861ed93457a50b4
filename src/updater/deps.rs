//! Extracts inter-archive dependencies by reading the class files inside an
//! archive bundle: every symbolic class reference in a constant pool is
//! looked up in an index of the classes the installation's archives provide.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::updater::error::{Result, UpdateError};
use crate::updater::model::strip_version_suffix;
use crate::updater::util;

/// Class name prefixes the host runtime provides; references to these are
/// never dependencies
const RUNTIME_PREFIXES: &[&str] = &["java/", "javax/", "jdk/", "sun/", "com/sun/"];

/// `(archive, dependency)` pairs that must never be emitted; these are the
/// known circular or intentionally empty-deps cases
const EXCLUDED_DEPENDENCIES: &[(&str, &str)] = &[
    ("jars/core.jar", "plugins/Spectra_Updater.jar"),
    ("plugins/Spectra_Updater.jar", "jars/core.jar"),
];

/// Directories whose archives contribute to the class index
const ARCHIVE_DIRS: &[&str] = &["jars", "plugins"];

/// Maps class names to the archives that provide them
pub struct ClassIndex {
    providers: HashMap<String, Vec<String>>,
}

impl ClassIndex {
    /// Builds the index by listing the class members of every archive in
    /// the installation's archive directories. Unreadable archives are
    /// skipped with a warning.
    pub fn build(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let mut providers: HashMap<String, Vec<String>> = HashMap::new();

        for dir in ARCHIVE_DIRS {
            let dir_path = root.join(dir);
            if !dir_path.is_dir() {
                continue;
            }

            for entry in WalkDir::new(&dir_path) {
                let entry = entry?;
                if !entry.file_type().is_file()
                    || !entry.file_name().to_string_lossy().ends_with(".jar")
                {
                    continue;
                }

                let relative = entry
                    .path()
                    .strip_prefix(root)
                    .expect("walked entry under root")
                    .to_string_lossy()
                    .to_string();
                let relative = util::convert_backslash_to_forward(&relative).into_owned();
                let logical = strip_version_suffix(&relative);

                match class_members(entry.path()) {
                    Ok(classes) => {
                        for class in classes {
                            let archives = providers.entry(class).or_default();
                            if !archives.contains(&logical) {
                                archives.push(logical.clone());
                            }
                        }
                    }
                    Err(e) => warn!("Skipping unreadable archive {}: {}", relative, e),
                }
            }
        }

        debug!("Class index covers {} classes", providers.len());
        Ok(Self { providers })
    }

    /// The archives providing the given class name, if any
    pub fn providers(&self, class: &str) -> Option<&[String]> {
        self.providers.get(class).map(Vec::as_slice)
    }
}

/// Analyzes one archive and returns the sorted set of archive filenames it
/// depends on. `declared` is the archive's currently declared dependency
/// list; its first entry providing a reference wins over other providers.
pub fn analyze(
    archive_path: impl AsRef<Path>,
    logical_name: &str,
    index: &ClassIndex,
    declared: &[String],
) -> Result<BTreeSet<String>> {
    let references = archive_references(archive_path.as_ref())?;
    let mut dependencies = BTreeSet::new();

    'outer: for class in references {
        if RUNTIME_PREFIXES.iter().any(|p| class.starts_with(p)) {
            continue;
        }

        let providers = match index.providers(&class) {
            Some(providers) => providers,
            None => continue,
        };

        // A declared dependency that covers the reference settles it
        for dep in declared {
            if providers.contains(dep) {
                if dep != logical_name && !is_excluded(logical_name, dep) {
                    dependencies.insert(dep.clone());
                }
                continue 'outer;
            }
        }

        for provider in providers {
            if provider == logical_name || is_excluded(logical_name, provider) {
                continue;
            }
            dependencies.insert(provider.clone());
        }
    }

    Ok(dependencies)
}

fn is_excluded(archive: &str, dependency: &str) -> bool {
    EXCLUDED_DEPENDENCIES
        .iter()
        .any(|(a, d)| *a == archive && *d == dependency)
}

/// The class names an archive's members reference, minus the classes the
/// archive itself provides
fn archive_references(path: &Path) -> Result<BTreeSet<String>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut references = BTreeSet::new();
    let mut own_classes = BTreeSet::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !entry.name().ends_with(".class") {
            continue;
        }

        own_classes.insert(entry.name().trim_end_matches(".class").to_string());

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;

        match class_references(&bytes) {
            Ok(classes) => references.extend(classes),
            Err(e) => warn!("Unparseable class {} in {}: {}", entry.name(), path.display(), e),
        }
    }

    for own in own_classes {
        references.remove(&own);
    }

    Ok(references)
}

/// The class member names an archive provides
fn class_members(path: &Path) -> Result<BTreeSet<String>> {
    let archive = ZipArchive::new(File::open(path)?)?;
    Ok(archive
        .file_names()
        .filter(|name| name.ends_with(".class"))
        .map(|name| name.trim_end_matches(".class").to_string())
        .collect())
}

/// Parses a class file's constant pool and returns every referenced class
/// name in internal (`org/example/Tool`) form
pub fn class_references(bytes: &[u8]) -> Result<BTreeSet<String>> {
    let mut cursor = ByteCursor::new(bytes);

    if cursor.read_u32()? != 0xCAFE_BABE {
        return Err(UpdateError::IllegalArgument(
            "not a class file (bad magic)".to_string(),
        ));
    }

    cursor.read_u16()?; // minor version
    cursor.read_u16()?; // major version

    let pool_count = cursor.read_u16()?;
    let mut utf8: HashMap<u16, String> = HashMap::new();
    let mut class_name_indexes: Vec<u16> = Vec::new();

    let mut index = 1;
    while index < pool_count {
        let tag = cursor.read_u8()?;
        match tag {
            // Utf8
            1 => {
                let length = cursor.read_u16()? as usize;
                let raw = cursor.read_bytes(length)?;
                utf8.insert(index, String::from_utf8_lossy(raw).into_owned());
            }
            // Integer, Float
            3 | 4 => {
                cursor.skip(4)?;
            }
            // Long, Double occupy two pool slots
            5 | 6 => {
                cursor.skip(8)?;
                index += 1;
            }
            // Class
            7 => {
                class_name_indexes.push(cursor.read_u16()?);
            }
            // String, MethodType, Module, Package
            8 | 16 | 19 | 20 => {
                cursor.skip(2)?;
            }
            // Fieldref, Methodref, InterfaceMethodref, NameAndType,
            // Dynamic, InvokeDynamic
            9 | 10 | 11 | 12 | 17 | 18 => {
                cursor.skip(4)?;
            }
            // MethodHandle
            15 => {
                cursor.skip(3)?;
            }
            other => {
                return Err(UpdateError::IllegalArgument(format!(
                    "unknown constant pool tag {}",
                    other
                )))
            }
        }
        index += 1;
    }

    let mut names = BTreeSet::new();
    for name_index in class_name_indexes {
        let raw = match utf8.get(&name_index) {
            Some(raw) => raw,
            None => continue,
        };
        if let Some(name) = unwrap_class_name(raw) {
            names.insert(name);
        }
    }

    Ok(names)
}

/// Unwraps array descriptors (`[[Lorg/example/Tool;` becomes
/// `org/example/Tool`); primitive arrays yield nothing
fn unwrap_class_name(raw: &str) -> Option<String> {
    let stripped = raw.trim_start_matches('[');

    if stripped.len() == raw.len() {
        return Some(raw.to_string());
    }

    stripped
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .map(str::to_string)
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .bytes
            .get(self.position)
            .ok_or_else(truncated)?;
        self.position += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.position.checked_add(length).ok_or_else(truncated)?;
        let slice = self.bytes.get(self.position..end).ok_or_else(truncated)?;
        self.position = end;
        Ok(slice)
    }

    fn skip(&mut self, length: usize) -> Result<()> {
        self.read_bytes(length)?;
        Ok(())
    }
}

fn truncated() -> UpdateError {
    UpdateError::IllegalArgument("truncated class file".to_string())
}

/// Scans the installation for the archives owned by one file and rewrites
/// the declared dependency list of the analyzed archive. Returns the fresh
/// dependency set.
pub fn analyze_installed(
    root: impl AsRef<Path>,
    logical_name: &str,
    local_filename: &str,
    declared: &[String],
) -> Result<BTreeSet<String>> {
    let root = root.as_ref();
    let index = ClassIndex::build(root)?;
    let path: PathBuf = root.join(local_filename);
    analyze(path, logical_name, &index, declared)
}
