//! Network layer: catalog probes and payload downloads.
//!
//! The core stays single threaded; payload downloads fan out to a small
//! pool of worker threads that report per-chunk progress back over a
//! channel. `file:` URLs short-circuit to local filesystem reads so local
//! mirrors and the test suite work without a network. Outbound HTTP honors
//! the `http_proxy` environment variable through the client's system proxy
//! support.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::DateTime;
use log::{debug, info, warn};

use crate::updater::consts::{BUFFER_SIZE, DOWNLOAD_WORKERS, PROBE_TIMEOUT_SECS};
use crate::updater::error::{Result, UpdateError};
use crate::updater::progress::Progress;
use crate::updater::timestamp::Timestamp;
use crate::updater::util;

/// One payload to fetch to a local destination
#[derive(Debug, Clone)]
pub struct DownloadJob {
    /// Logical name reported to progress sinks
    pub name: String,
    pub url: String,
    pub destination: PathBuf,
}

enum WorkerEvent {
    Started(String),
    Chunk(String, u64, u64),
    Done(String),
    Failed(String, UpdateError),
}

pub struct Fetcher {
    client: reqwest::blocking::Client,
    cancelled: Arc<AtomicBool>,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The flag a driver flips to cancel in-flight work
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Probes a catalog URL for its last-modified time. `None` when the
    /// remote does not expose one.
    pub fn probe(&self, url: &str) -> Result<Option<Timestamp>> {
        if let Some(path) = file_url_path(url) {
            return match Timestamp::from_mtime(&path) {
                Ok(timestamp) => Ok(Some(timestamp)),
                Err(UpdateError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            };
        }

        let response = self.get_with_fallback(url)?;
        let timestamp = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|parsed| Timestamp::from_datetime(&parsed.with_timezone(&chrono::Local)));

        Ok(timestamp)
    }

    /// Fetches a whole document, typically a catalog
    pub fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = file_url_path(url) {
            let mut bytes = Vec::new();
            File::open(&path)?.read_to_end(&mut bytes)?;
            return Ok(bytes);
        }

        let response = self.get_with_fallback(url)?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::NetworkUnavailable {
                url: url.to_string(),
                message: format!("server answered {}", status),
            });
        }

        Ok(response.bytes()?.to_vec())
    }

    /// An `https` request that falls back to plain `http` when the secure
    /// connection cannot be established
    fn get_with_fallback(&self, url: &str) -> Result<reqwest::blocking::Response> {
        match self.client.get(url).send() {
            Ok(response) => Ok(response),
            Err(e) if e.is_connect() && url.starts_with("https://") => {
                let insecure = url.replacen("https://", "http://", 1);
                warn!(
                    "Secure connection to {} failed ({}); retrying over http",
                    url, e
                );
                Ok(self.client.get(&insecure).send()?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Downloads every job, several in parallel, streaming each to its
    /// destination. Partial files are left in place on failure or
    /// cancellation for the next run to overwrite. The first failure
    /// cancels the remaining jobs and is returned.
    pub fn download_all(
        &self,
        jobs: Vec<DownloadJob>,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let total = jobs.len();
        progress.set_count(0, total);

        let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
        let (events_tx, events_rx) = mpsc::channel::<WorkerEvent>();

        let workers = DOWNLOAD_WORKERS.min(total);
        let mut handles = Vec::with_capacity(workers);

        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let events = events_tx.clone();
            let client = self.client.clone();
            let cancelled = Arc::clone(&self.cancelled);

            handles.push(thread::spawn(move || {
                while !cancelled.load(Ordering::Acquire) {
                    let job = match queue.lock().expect("queue lock").pop_front() {
                        Some(job) => job,
                        None => break,
                    };

                    let _ = events.send(WorkerEvent::Started(job.name.clone()));
                    match download_one(&client, &job, &cancelled, &events) {
                        Ok(()) => {
                            let _ = events.send(WorkerEvent::Done(job.name));
                        }
                        Err(e) => {
                            cancelled.store(true, Ordering::Release);
                            let _ = events.send(WorkerEvent::Failed(job.name, e));
                        }
                    }
                }
            }));
        }
        drop(events_tx);

        let mut finished = 0;
        let mut first_error = None;

        for event in events_rx {
            match event {
                WorkerEvent::Started(name) => progress.add_item(&name),
                WorkerEvent::Chunk(_, so_far, total) => {
                    progress.set_item_count(so_far as usize, total as usize)
                }
                WorkerEvent::Done(name) => {
                    finished += 1;
                    progress.set_count(finished, total);
                    progress.item_done(&name);
                }
                WorkerEvent::Failed(name, e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    } else {
                        debug!("Also failed: {}", name);
                    }
                }
            }
        }

        for handle in handles {
            let _ = handle.join();
        }
        progress.done();

        match first_error {
            Some(e) => Err(e),
            None if self.is_cancelled() => {
                Err(UpdateError::General("download cancelled".to_string()))
            }
            None => {
                info!("Downloaded {} files", total);
                Ok(())
            }
        }
    }
}

fn download_one(
    client: &reqwest::blocking::Client,
    job: &DownloadJob,
    cancelled: &AtomicBool,
    events: &mpsc::Sender<WorkerEvent>,
) -> Result<()> {
    util::ensure_parent(&job.destination)?;

    if let Some(path) = file_url_path(&job.url) {
        let mut source = File::open(&path).map_err(|_| UpdateError::NetworkUnavailable {
            url: job.url.clone(),
            message: format!("{} does not exist", path.display()),
        })?;
        let mut destination = File::create(&job.destination)?;
        std::io::copy(&mut source, &mut destination)?;
        return Ok(());
    }

    let mut response = client.get(&job.url).send()?;
    if !response.status().is_success() {
        return Err(UpdateError::NetworkUnavailable {
            url: job.url.clone(),
            message: format!("server answered {}", response.status()),
        });
    }

    let expected = response.content_length().unwrap_or(0);
    let mut destination = File::create(&job.destination)?;
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut so_far: u64 = 0;

    loop {
        if cancelled.load(Ordering::Acquire) {
            return Err(UpdateError::General("download cancelled".to_string()));
        }

        let read = response.read(&mut buffer)?;
        if read == 0 {
            break;
        }

        destination.write_all(&buffer[..read])?;
        so_far += read as u64;
        let _ = events.send(WorkerEvent::Chunk(job.name.clone(), so_far, expected));
    }

    destination.flush()?;
    Ok(())
}

/// Interprets `file:` URLs; returns the filesystem path they point at
pub fn file_url_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("file:")?;
    let path = rest.strip_prefix("//").unwrap_or(rest);
    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    use super::*;
    use crate::updater::progress::SilentProgress;

    #[test]
    fn file_urls_resolve_to_paths() {
        assert_eq!(
            Some(PathBuf::from("/srv/site/db.xml.gz")),
            file_url_path("file:/srv/site/db.xml.gz")
        );
        assert_eq!(
            Some(PathBuf::from("/srv/site/db.xml.gz")),
            file_url_path("file:///srv/site/db.xml.gz")
        );
        assert_eq!(None, file_url_path("https://example.org/db.xml.gz"));
    }

    #[test]
    fn fetches_file_urls_without_network() {
        let temp = TempDir::new().unwrap();
        temp.child("db.xml.gz").write_str("payload").unwrap();

        let fetcher = Fetcher::new().unwrap();
        let url = format!("file:{}", temp.child("db.xml.gz").path().display());

        assert_eq!(b"payload".to_vec(), fetcher.fetch_bytes(&url).unwrap());
        assert!(fetcher.probe(&url).unwrap().is_some());
    }

    #[test]
    fn probe_of_missing_file_is_none() {
        let fetcher = Fetcher::new().unwrap();
        assert!(fetcher
            .probe("file:/definitely/not/there/db.xml.gz")
            .unwrap()
            .is_none());
    }

    #[test]
    fn downloads_file_urls_in_parallel() {
        let temp = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();

        let mut jobs = Vec::new();
        for i in 0..8 {
            let name = format!("jars/file{}.jar", i);
            let source = temp.child(format!("file{}.jar", i));
            source.write_str(&format!("contents {}", i)).unwrap();
            jobs.push(DownloadJob {
                name: name.clone(),
                url: format!("file:{}", source.path().display()),
                destination: dest.path().join(format!("file{}.jar", i)),
            });
        }

        let fetcher = Fetcher::new().unwrap();
        fetcher
            .download_all(jobs, &mut SilentProgress)
            .unwrap();

        for i in 0..8 {
            let expected = format!("contents {}", i);
            dest.child(format!("file{}.jar", i)).assert(expected.as_str());
        }
    }

    #[test]
    fn failed_download_aborts_the_batch() {
        let dest = TempDir::new().unwrap();
        let jobs = vec![DownloadJob {
            name: "jars/missing.jar".to_string(),
            url: "file:/not/a/real/file.jar".to_string(),
            destination: dest.path().join("missing.jar"),
        }];

        let fetcher = Fetcher::new().unwrap();
        assert!(fetcher.download_all(jobs, &mut SilentProgress).is_err());
    }
}
