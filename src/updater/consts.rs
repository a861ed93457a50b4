use const_format::concatcp;

/// Name of the application whose installation the manager reconciles
pub const APP_NAME: &str = "Spectra";

/// The compressed catalog document, both locally and on update sites
pub const DB_XML: &str = "db.xml.gz";

/// Remote lock file used while republishing a catalog
pub const DB_XML_LOCK: &str = concatcp!(DB_XML, ".lock");

/// Backup name the previous remote catalog is moved to
pub const DB_XML_BACKUP: &str = concatcp!(DB_XML, ".old");

/// Local digest cache, one entry per scanned path
pub const CHECKSUMS_FILE: &str = ".checksums";

/// Staging area downloads are verified in before being moved into place
pub const UPDATE_DIR: &str = "update";

/// macOS platform bundle at the installation root
pub const APP_BUNDLE: &str = concatcp!(APP_NAME, ".app");

/// Sibling backup of the platform bundle
pub const APP_BUNDLE_BACKUP: &str = concatcp!(APP_NAME, ".old.app");

/// The self-updater archive; always hashed in the oldest digest mode
pub const UPDATER_JAR: &str = concatcp!("plugins/", APP_NAME, "_Updater.jar");

/// Name of the main update site
pub const MAIN_SITE_NAME: &str = APP_NAME;

/// XML root element of the catalog document
pub const CATALOG_ROOT_ELEMENT: &str = "pluginRecords";

/// Connect timeout applied to catalog probes, in seconds
pub const PROBE_TIMEOUT_SECS: u64 = 10;

/// Number of parallel download workers
pub const DOWNLOAD_WORKERS: usize = 4;

/// Streaming buffer size for downloads and digests
pub const BUFFER_SIZE: usize = 64 * 1024;
