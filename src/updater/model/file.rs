use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use strum_macros::{Display as EnumDisplay, EnumString};

use crate::updater::digest::HexDigest;
use crate::updater::model::version::{Dependency, Version};
use crate::updater::timestamp::Timestamp;

/// Strips the version suffix from archive basenames: `tool-1.2.3.jar` and
/// `tool.jar` share the logical name `tool.jar`.
static VERSION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)(-\d[0-9A-Za-z._+-]*)(\.(?:jar|zip))$").unwrap());

/// Handle of a logical file within a `FileCollection`
pub type FileId = usize;

/// Handle of a per-site catalog record within a `FileCollection`'s arena
pub type RecordId = usize;

/// Descriptive state of a file, derived from the local digest and the
/// catalog's current and previous versions
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, EnumString, EnumDisplay)]
pub enum Status {
    /// Present on disk, unknown to every site
    #[strum(serialize = "local-only")]
    LocalOnly,
    /// Tracked but not present on disk
    #[strum(serialize = "not-installed")]
    NotInstalled,
    /// Local digest equals the advertised current version
    #[strum(serialize = "installed")]
    Installed,
    /// Local digest matches a previous version; a newer one is advertised
    #[strum(serialize = "updateable")]
    Updateable,
    /// Local digest matches no advertised version
    #[strum(serialize = "modified")]
    Modified,
    /// Advertised by a site and never installed locally
    #[strum(serialize = "new")]
    New,
    /// No current version advertised and nothing on disk
    #[strum(serialize = "obsolete-uninstalled")]
    ObsoleteUninstalled,
    /// No current version advertised; the local copy matches old history
    #[strum(serialize = "obsolete")]
    Obsolete,
    /// No current version advertised; the local copy matches nothing
    #[strum(serialize = "obsolete-modified")]
    ObsoleteModified,
}

/// Chosen transition for a file. The first seven mirror a Status and are
/// inert; the rest mutate the installation or the catalog.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, EnumString, EnumDisplay)]
pub enum Action {
    #[strum(serialize = "local-only")]
    LocalOnly,
    #[strum(serialize = "not-installed")]
    NotInstalled,
    #[strum(serialize = "installed")]
    Installed,
    #[strum(serialize = "updateable")]
    Updateable,
    #[strum(serialize = "modified")]
    Modified,
    #[strum(serialize = "new")]
    New,
    #[strum(serialize = "obsolete")]
    Obsolete,
    #[strum(serialize = "uninstall")]
    Uninstall,
    #[strum(serialize = "install")]
    Install,
    #[strum(serialize = "update")]
    Update,
    #[strum(serialize = "upload")]
    Upload,
    #[strum(serialize = "remove")]
    Remove,
}

impl Status {
    /// The actions a user may select for a file in this state. `Upload`
    /// additionally requires the owning site to be uploadable.
    pub fn valid_actions(self) -> &'static [Action] {
        use Action::*;

        match self {
            Status::NotInstalled => &[NotInstalled, Install, Remove],
            Status::Installed => &[Installed, Uninstall],
            Status::Updateable => &[Updateable, Uninstall, Update, Upload],
            Status::Modified => &[Modified, Uninstall, Update, Upload],
            Status::LocalOnly => &[LocalOnly, Uninstall, Upload],
            Status::New => &[New, Install, Remove],
            Status::ObsoleteUninstalled => &[NotInstalled],
            Status::Obsolete => &[Obsolete, Uninstall, Upload],
            Status::ObsoleteModified => &[Modified, Uninstall, Upload],
        }
    }

    /// The inert action that leaves a file in this state untouched
    pub fn no_action(self) -> Action {
        self.valid_actions()[0]
    }

    /// True when the local copy matches the advertised current version
    pub fn is_up_to_date(self) -> bool {
        matches!(self, Status::Installed | Status::LocalOnly)
    }

    pub fn is_obsolete(self) -> bool {
        matches!(
            self,
            Status::Obsolete | Status::ObsoleteModified | Status::ObsoleteUninstalled
        )
    }
}

impl Action {
    /// Actions that change the installation or the catalog when executed
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Action::Uninstall | Action::Install | Action::Update | Action::Upload | Action::Remove
        )
    }

    /// Actions that stage a download
    pub fn is_download(self) -> bool {
        matches!(self, Action::Install | Action::Update)
    }
}

/// What the scanner knows about the file on disk
#[derive(Debug, Clone, Default)]
pub struct LocalState {
    /// The actual disk name, which may carry a version suffix differing
    /// from the catalog's
    pub filename: Option<String>,
    pub digest: Option<HexDigest>,
    pub legacy_digests: Vec<HexDigest>,
    pub timestamp: Option<Timestamp>,
    pub filesize: u64,
}

impl LocalState {
    /// True if any of the local digests equals the given checksum
    pub fn matches(&self, checksum: &HexDigest) -> bool {
        match &self.digest {
            Some(digest) => {
                digest == checksum || self.legacy_digests.iter().any(|d| d == checksum)
            }
            None => false,
        }
    }
}

/// A catalog record as advertised by a single site. Several records may
/// exist for one logical file when sites overlap; the collection keeps all
/// of them and exposes the highest-ranked active one.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub site: String,
    pub filename: String,
    pub filesize: u64,
    pub executable: bool,
    pub description: Option<String>,
    pub current: Option<Version>,
    pub previous: BTreeSet<Version>,
    pub dependencies: Vec<Dependency>,
    pub authors: Vec<String>,
    pub links: Vec<String>,
    pub categories: Vec<String>,
    pub platforms: BTreeSet<String>,
}

impl FileRecord {
    pub fn new(site: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            filename: filename.into(),
            filesize: 0,
            executable: false,
            description: None,
            current: None,
            previous: BTreeSet::new(),
            dependencies: Vec::new(),
            authors: Vec::new(),
            links: Vec::new(),
            categories: Vec::new(),
            platforms: BTreeSet::new(),
        }
    }

    pub fn has_previous(&self, state: &LocalState) -> bool {
        self.previous.iter().any(|v| state.matches(&v.checksum))
    }

    pub fn dependency(&self, filename: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.filename == filename)
    }

    /// Demotes the current version into the previous set, stamping when it
    /// stopped being current
    pub fn obsolete_current(&mut self, when: Timestamp) {
        if let Some(mut current) = self.current.take() {
            current.timestamp_obsolete = Some(when);
            self.previous.insert(current);
        }
    }
}

/// One tracked artifact with a stable logical name, its local state, and
/// the stack of per-site records claiming the name
#[derive(Debug, Clone)]
pub struct LogicalFile {
    pub name: String,
    pub local: LocalState,
    pub status: Status,
    pub action: Action,
    /// Known to the local catalog; distinguishes `NotInstalled` from `New`
    pub tracked: bool,
    /// `(site rank, record handle)`, push order; the winner is the
    /// highest-ranked entry whose site is active
    pub(crate) entries: Vec<(usize, RecordId)>,
}

impl LogicalFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local: LocalState::default(),
            status: Status::New,
            action: Action::New,
            tracked: false,
            entries: Vec::new(),
        }
    }

    /// The disk name to use for the file; falls back to the logical name
    pub fn local_filename(&self) -> &str {
        self.local.filename.as_deref().unwrap_or(&self.name)
    }

    /// True when entries from more than one site claim this name
    pub fn is_shadowing(&self) -> bool {
        self.entries.len() > 1
    }

    /// True if the file is present on disk
    pub fn is_installed_locally(&self) -> bool {
        self.local.digest.is_some()
    }
}

/// The logical name a path is keyed under: the `-<version>` suffix is
/// stripped before a known archive extension.
pub fn strip_version_suffix(name: &str) -> String {
    match VERSION_SUFFIX.captures(name) {
        Some(caps) => format!("{}{}", &caps[1], &caps[3]),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_suffix_stripping() {
        assert_eq!("tool.jar", strip_version_suffix("tool-1.2.3.jar"));
        assert_eq!("tool.jar", strip_version_suffix("tool-20240101.jar"));
        assert_eq!(
            "jars/tool.jar",
            strip_version_suffix("jars/tool-1.0-SNAPSHOT.jar")
        );
        assert_eq!("tool.jar", strip_version_suffix("tool.jar"));
        // A dash not followed by a digit is part of the name
        assert_eq!("tool-x.jar", strip_version_suffix("tool-x.jar"));
        // Non-archive extensions keep their name
        assert_eq!("macro-2.txt", strip_version_suffix("macro-2.txt"));
    }

    #[test]
    fn no_action_is_first_valid_action() {
        assert_eq!(Action::NotInstalled, Status::NotInstalled.no_action());
        assert_eq!(Action::Modified, Status::ObsoleteModified.no_action());
        assert_eq!(Action::NotInstalled, Status::ObsoleteUninstalled.no_action());

        for status in [
            Status::LocalOnly,
            Status::NotInstalled,
            Status::Installed,
            Status::Updateable,
            Status::Modified,
            Status::New,
            Status::ObsoleteUninstalled,
            Status::Obsolete,
            Status::ObsoleteModified,
        ] {
            assert!(status.valid_actions().contains(&status.no_action()));
        }
    }

    #[test]
    fn local_state_matches_legacy_digests() {
        let state = LocalState {
            digest: Some("aa".into()),
            legacy_digests: vec!["bb".into(), "cc".into()],
            ..Default::default()
        };

        assert!(state.matches(&"aa".into()));
        assert!(state.matches(&"bb".into()));
        assert!(!state.matches(&"dd".into()));
    }
}
