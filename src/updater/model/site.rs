use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::updater::timestamp::Timestamp;

/// Characters that must be escaped in the filename part of a per-file URL
const FILENAME_ESCAPES: &AsciiSet = &CONTROLS.add(b' ').add(b'%').add(b'#').add(b'?');

/// An addressable catalog source: a base URL under which the catalog and all
/// payload files live, plus optional upload coordinates.
#[derive(Debug, Clone, Eq)]
pub struct UpdateSite {
    pub name: String,
    url: String,
    /// Upload transport address in `protocol:address` form
    pub host: Option<String>,
    pub upload_directory: Option<String>,
    pub description: Option<String>,
    pub maintainer: Option<String>,
    /// Timestamp of the catalog as last read; uploads must find the remote
    /// copy unchanged from this value
    pub timestamp: Option<Timestamp>,
    pub active: bool,
    pub official: bool,
    /// A user-pinned URL that must never be rewritten automatically
    pub keep_url: bool,
    rank: usize,
}

impl UpdateSite {
    pub fn new(name: impl Into<String>, url: impl Into<String>, rank: usize) -> Self {
        Self {
            name: name.into(),
            url: normalize_url(url.into()),
            host: None,
            upload_directory: None,
            description: None,
            maintainer: None,
            timestamp: None,
            active: true,
            official: false,
            keep_url: false,
            rank,
        }
    }

    /// Higher ranked sites shadow lower ranked ones. Ranks are assigned at
    /// first insertion and survive catalog reloads.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = normalize_url(url.into());
    }

    /// A site can receive uploads when a transport address is configured
    pub fn is_uploadable(&self) -> bool {
        self.host.is_some()
    }

    /// The transport protocol portion of the host, e.g. `file` for
    /// `file:/var/www/site`
    pub fn protocol(&self) -> Option<&str> {
        self.host
            .as_deref()
            .map(|host| host.split_once(':').map(|(p, _)| p).unwrap_or(host))
    }

    /// The URL a payload revision is fetched from: the site base, the
    /// filename with unsafe characters escaped, and the revision timestamp.
    pub fn file_url(&self, filename: &str, timestamp: Timestamp) -> String {
        format!(
            "{}{}-{}",
            self.url,
            utf8_percent_encode(filename, FILENAME_ESCAPES),
            timestamp
        )
    }

    /// The URL of the site's catalog document
    pub fn catalog_url(&self) -> String {
        format!("{}{}", self.url, crate::updater::consts::DB_XML)
    }
}

/// Two sites are equal iff their rank is equal
impl PartialEq for UpdateSite {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank
    }
}

fn normalize_url(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use super::*;

    #[test]
    fn url_gets_trailing_slash() {
        let site = UpdateSite::new("main", "https://updates.example.org/stable", 0);
        assert_eq!("https://updates.example.org/stable/", site.url());
    }

    #[test]
    fn file_urls_escape_spaces_and_append_timestamp() {
        let site = UpdateSite::new("main", "https://updates.example.org/", 0);
        let ts = Timestamp::try_from("20240101000000").unwrap();

        assert_eq!(
            "https://updates.example.org/plugins/My%20Plugin.jar-20240101000000",
            site.file_url("plugins/My Plugin.jar", ts)
        );
    }

    #[test]
    fn protocol_splits_host() {
        let mut site = UpdateSite::new("main", "https://updates.example.org/", 0);
        assert_eq!(None, site.protocol());

        site.host = Some("file:/var/www/site".to_string());
        assert_eq!(Some("file"), site.protocol());
    }
}
