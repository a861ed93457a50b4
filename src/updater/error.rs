use core::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::{error, io};

use thiserror::Error;

pub type Result<T, E = UpdateError> = core::result::Result<T, E>;

/// Application errors
#[derive(Error)]
pub enum UpdateError {
    #[error("Cannot reach {url}: {message}")]
    NetworkUnavailable { url: String, message: String },

    #[error("Proxy authentication required for {0}")]
    ProxyAuthRequired(String),

    #[error(
        "Update site {site} changed since the last read (expected {expected}, found {actual}). \
         Refresh the site before uploading."
    )]
    SiteSkew {
        site: String,
        expected: String,
        actual: String,
    },

    #[error("Update site {site} is locked by another uploader: {lock}")]
    LockContested { site: String, lock: String },

    #[error("Catalog of {site} is corrupt: {message}")]
    CorruptCatalog { site: String, message: String },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Size mismatch for {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("{path} changed on disk since it was checksummed")]
    TimestampSkew { path: String },

    #[error("Dependency {dependency} of {path} is not installed and not staged")]
    DependencyUnresolved { path: String, dependency: String },

    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    #[error("{filename} is claimed by update sites {site_a} and {site_b} at the same rank")]
    ShadowConflict {
        filename: String,
        site_a: String,
        site_b: String,
    },

    #[error("Multiple local versions of {0} found")]
    MultipleLocalVersions(String),

    #[error("Refusing to write to protected location {0}")]
    ProtectedLocation(String),

    #[error("Installation root {0} is not writable")]
    ReadOnlyRoot(String),

    #[error("{path} does not apply to platform {platform}")]
    PlatformMismatch { path: String, platform: String },

    #[error("No transport registered for protocol {0}")]
    TransportUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("{0}")]
    General(String),

    #[error("{0}")]
    Io(io::Error),

    #[error("{0}")]
    Wrapped(Box<dyn error::Error + Send + Sync>),
}

impl Debug for UpdateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<io::Error> for UpdateError {
    fn from(e: io::Error) -> Self {
        UpdateError::Io(e)
    }
}

impl From<globset::Error> for UpdateError {
    fn from(e: globset::Error) -> Self {
        UpdateError::Wrapped(Box::new(e))
    }
}

impl From<walkdir::Error> for UpdateError {
    fn from(e: walkdir::Error) -> Self {
        UpdateError::Wrapped(Box::new(e))
    }
}

impl From<zip::result::ZipError> for UpdateError {
    fn from(e: zip::result::ZipError) -> Self {
        UpdateError::Wrapped(Box::new(e))
    }
}

impl From<quick_xml::Error> for UpdateError {
    fn from(e: quick_xml::Error) -> Self {
        UpdateError::Wrapped(Box::new(e))
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(e: reqwest::Error) -> Self {
        let url = e
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());

        if e.is_connect() || e.is_timeout() {
            UpdateError::NetworkUnavailable {
                url,
                message: e.to_string(),
            }
        } else if e.status() == Some(reqwest::StatusCode::PROXY_AUTHENTICATION_REQUIRED) {
            UpdateError::ProxyAuthRequired(url)
        } else {
            UpdateError::Wrapped(Box::new(e))
        }
    }
}
