use core::fmt;
use std::convert::TryFrom;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::updater::error::{Result, UpdateError};

/// A wall-clock instant in the catalog's canonical form: a 14-digit decimal
/// `YYYYMMDDhhmmss` string. Timestamps double as version identifiers, so they
/// compare numerically, at second resolution.
#[derive(Deserialize, Serialize, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(try_from = "&str")]
#[serde(into = "String")]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn new(raw: u64) -> Result<Self> {
        if raw < 10_000_000_000_000 || raw > 99_991_231_235_959 {
            return Err(UpdateError::IllegalArgument(format!(
                "Invalid timestamp {}",
                raw
            )));
        }
        Ok(Self(raw))
    }

    /// The current wall-clock time
    pub fn now() -> Self {
        Self::from_datetime(&Local::now())
    }

    /// Reads the modification time of a file
    pub fn from_mtime(path: impl AsRef<Path>) -> Result<Self> {
        let mtime = path.as_ref().metadata()?.modified()?;
        Ok(Self::from_system_time(mtime))
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        Self::from_datetime(&DateTime::<Local>::from(time))
    }

    pub fn from_datetime<T: TimeZone>(time: &DateTime<T>) -> Self {
        Self(
            time.year() as u64 * 10_000_000_000
                + time.month() as u64 * 100_000_000
                + time.day() as u64 * 1_000_000
                + time.hour() as u64 * 10_000
                + time.minute() as u64 * 100
                + time.second() as u64,
        )
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl TryFrom<&str> for Timestamp {
    type Error = UpdateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.len() != 14 || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(UpdateError::IllegalArgument(format!(
                "Invalid timestamp {}",
                value
            )));
        }

        match value.parse::<u64>() {
            Ok(raw) => Timestamp::new(raw),
            Err(_) => Err(UpdateError::IllegalArgument(format!(
                "Invalid timestamp {}",
                value
            ))),
        }
    }
}

impl FromStr for Timestamp {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timestamp::try_from(s)
    }
}

impl From<Timestamp> for String {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.to_string()
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:014}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use super::Timestamp;

    #[test]
    fn parse_valid_timestamp() {
        let ts = Timestamp::try_from("20240101000000").unwrap();
        assert_eq!(20_240_101_000_000, ts.as_u64());
        assert_eq!("20240101000000", ts.to_string());
    }

    #[test]
    fn reject_invalid_timestamps() {
        assert!(Timestamp::try_from("2024").is_err());
        assert!(Timestamp::try_from("2024010100000x").is_err());
        assert!(Timestamp::try_from("00000101000000").is_err());
    }

    #[test]
    fn timestamps_order_numerically() {
        let older = Timestamp::try_from("20231231235959").unwrap();
        let newer = Timestamp::try_from("20240101000000").unwrap();
        assert!(older < newer);
    }
}
