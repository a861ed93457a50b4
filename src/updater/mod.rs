//! The reconciliation engine behind the `rups` CLI: file model, scanner,
//! catalog codec, state machine, conflict engine, installer, and uploader.

pub use self::cache::ChecksumCache;
pub use self::conflicts::{
    can_proceed, Conflict, ConflictEngine, Resolution, ResolutionEffect, Severity,
};
pub use self::digest::{digest_file, jar_digest, legacy_digests, HexDigest, JarHashMode};
pub use self::error::{Result, UpdateError};
pub use self::fetch::{DownloadJob, Fetcher};
pub use self::installer::Installer;
pub use self::manager::{UpdateManager, UpdatePolicy};
pub use self::model::{
    strip_version_suffix, Action, Dependency, FileCollection, FileId, FileRecord, LocalState,
    LogicalFile, Status, UpdateSite, Version,
};
pub use self::progress::{ConsoleProgress, MultiProgress, Progress, SilentProgress};
pub use self::scanner::Scanner;
pub use self::timestamp::Timestamp;
pub use self::transport::{
    create_transport, FileTransport, Transport, UploadSource, Uploadable,
};
pub use self::uploader::Uploader;
pub use self::xml::{CatalogReader, CatalogWriter};

mod cache;
pub mod consts;
mod conflicts;
pub mod deps;
mod digest;
mod error;
mod fetch;
mod installer;
mod manager;
mod model;
pub mod platform;
mod progress;
mod scanner;
mod timestamp;
mod transport;
mod uploader;
mod util;
mod xml;
