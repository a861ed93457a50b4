use std::cmp::Ordering;

use crate::updater::digest::HexDigest;
use crate::updater::timestamp::Timestamp;

/// One concrete revision of a tracked file. The timestamp doubles as the
/// version identifier in per-file URLs.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Version {
    pub checksum: HexDigest,
    pub timestamp: Timestamp,
    /// Set when the revision was published under a different disk name
    pub filename: Option<String>,
    /// When the revision stopped being current
    pub timestamp_obsolete: Option<Timestamp>,
}

impl Version {
    pub fn new(checksum: impl Into<HexDigest>, timestamp: Timestamp) -> Self {
        Self {
            checksum: checksum.into(),
            timestamp,
            filename: None,
            timestamp_obsolete: None,
        }
    }

    pub fn with_filename(
        checksum: impl Into<HexDigest>,
        timestamp: Timestamp,
        filename: Option<String>,
    ) -> Self {
        Self {
            checksum: checksum.into(),
            timestamp,
            filename,
            timestamp_obsolete: None,
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.checksum.cmp(&other.checksum))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A reference from one tracked file to another it requires at runtime
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Dependency {
    /// Logical filename of the required file
    pub filename: String,
    /// Minimum acceptable revision
    pub timestamp: Option<Timestamp>,
    /// An overriding dependency intentionally supersedes a co-named entry
    /// from another site and is excluded from recursive chasing
    pub overrides: bool,
}

impl Dependency {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            timestamp: None,
            overrides: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use super::*;

    #[test]
    fn versions_order_by_timestamp_then_checksum() {
        let a = Version::new("aa", Timestamp::try_from("20240101000000").unwrap());
        let b = Version::new("bb", Timestamp::try_from("20240101000000").unwrap());
        let c = Version::new("aa", Timestamp::try_from("20240102000000").unwrap());

        assert!(a < b);
        assert!(b < c);
    }
}
