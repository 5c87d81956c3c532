use std::fs;
use std::io::{Read, Write};
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::error::QmDataError;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { bytes: u64 },
    AlreadyCached,
}

/// Byte-level download progress. `total` is taken from Content-Length and is
/// absent when the server does not report one.
pub trait ProgressSink {
    fn on_progress(&self, received: u64, total: Option<u64>);
    fn on_complete(&self) {}
}

pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn on_progress(&self, _received: u64, _total: Option<u64>) {}
}

pub trait ArchiveClient {
    /// Streams `url` into `destination`. A pre-existing destination short-circuits
    /// without touching the network; `force` discards it first. The destination
    /// only appears once the body has been fully written.
    fn download(
        &self,
        url: &str,
        destination: &Utf8Path,
        force: bool,
        sink: &dyn ProgressSink,
    ) -> Result<FetchOutcome, QmDataError>;
}

#[derive(Clone)]
pub struct HttpArchiveClient {
    client: Client,
}

impl HttpArchiveClient {
    pub fn new() -> Result<Self, QmDataError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("qmdata/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| QmDataError::Filesystem(err.to_string()))?,
        );

        // No overall request timeout: archives can take minutes on slow links.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| QmDataError::Http {
                url: String::new(),
                message: err.to_string(),
            })?;

        Ok(Self { client })
    }
}

impl ArchiveClient for HttpArchiveClient {
    fn download(
        &self,
        url: &str,
        destination: &Utf8Path,
        force: bool,
        sink: &dyn ProgressSink,
    ) -> Result<FetchOutcome, QmDataError> {
        if destination.as_std_path().exists() {
            if !force {
                debug!(%destination, "raw archive already present, skipping download");
                return Ok(FetchOutcome::AlreadyCached);
            }
            fs::remove_file(destination.as_std_path())
                .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
        }

        let parent = destination
            .parent()
            .ok_or_else(|| QmDataError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| QmDataError::Filesystem(err.to_string()))?;

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| QmDataError::Http {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(QmDataError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let total = response.content_length();

        let mut temp = tempfile::Builder::new()
            .prefix("qmdata-fetch")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| QmDataError::Filesystem(err.to_string()))?;

        let mut received = 0u64;
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let read = response.read(&mut buf).map_err(|err| QmDataError::Http {
                url: url.to_string(),
                message: err.to_string(),
            })?;
            if read == 0 {
                break;
            }
            temp.write_all(&buf[..read])
                .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
            received += read as u64;
            sink.on_progress(received, total);
        }
        sink.on_complete();

        temp.persist(destination.as_std_path())
            .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
        debug!(%url, bytes = received, "downloaded raw archive");
        Ok(FetchOutcome::Downloaded { bytes: received })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use camino::Utf8PathBuf;

    use super::*;

    struct CountingSink {
        updates: Mutex<Vec<u64>>,
    }

    impl ProgressSink for CountingSink {
        fn on_progress(&self, received: u64, _total: Option<u64>) {
            self.updates.lock().unwrap().push(received);
        }
    }

    #[test]
    fn existing_destination_short_circuits() {
        let temp = tempfile::tempdir().unwrap();
        let destination =
            Utf8PathBuf::from_path_buf(temp.path().join("qm9_raw.zip")).unwrap();
        fs::write(destination.as_std_path(), b"archive").unwrap();

        let sink = CountingSink {
            updates: Mutex::new(Vec::new()),
        };
        let client = HttpArchiveClient::new().unwrap();
        // The URL is unroutable; the call must never reach the network.
        let outcome = client
            .download("http://invalid.invalid/qm9.zip", &destination, false, &sink)
            .unwrap();

        assert_eq!(outcome, FetchOutcome::AlreadyCached);
        assert!(sink.updates.lock().unwrap().is_empty());
        assert_eq!(fs::read(destination.as_std_path()).unwrap(), b"archive");
    }
}
