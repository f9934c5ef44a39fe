//! Fetching vendor artifacts.
use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use reqwest::blocking::Client;
use tracing::{debug, info, warn};

use crate::{
    constants::{DOWNLOAD_PROGRESS_STEP, PARTIAL_DOWNLOAD_SUFFIX},
    error::StackError,
};

/// Source of vendor artifacts.
pub trait Fetcher {
    /// Writes the resource at `url` to `dest`. `dest` must only appear once
    /// the transfer completed.
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), StackError>;
}

/// Fetches artifacts over HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a default blocking client.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), StackError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|source| StackError::Download {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(StackError::DownloadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let partial = partial_path(dest);
        let total = response.content_length();
        let result = (|| -> Result<(), StackError> {
            let file = File::create(&partial).map_err(StackError::io(&partial))?;
            let mut progress = ProgressWriter::new(file, url, total, DOWNLOAD_PROGRESS_STEP);
            response
                .copy_to(&mut progress)
                .map_err(|source| StackError::Download {
                    url: url.to_string(),
                    source,
                })?;
            progress.flush().map_err(StackError::io(&partial))?;
            debug!("Received {} bytes from {url}", progress.written());
            fs::rename(&partial, dest).map_err(StackError::io(dest))
        })();

        if result.is_err()
            && let Err(err) = fs::remove_file(&partial)
            && err.kind() != io::ErrorKind::NotFound
        {
            warn!("Failed to remove partial download {:?}: {err}", partial);
        }
        result
    }
}

/// Counts bytes written through it and logs progress every `step` bytes.
pub struct ProgressWriter<'a, W> {
    inner: W,
    url: &'a str,
    total: Option<u64>,
    step: u64,
    written: u64,
    next_report: u64,
}

impl<'a, W: Write> ProgressWriter<'a, W> {
    /// Wraps `inner`. `total` is the expected size when the server sent one.
    pub fn new(inner: W, url: &'a str, total: Option<u64>, step: u64) -> Self {
        let step = step.max(1);
        Self {
            inner,
            url,
            total,
            step,
            written: 0,
            next_report: step,
        }
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Unwraps the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn report(&self) {
        let mib = self.written / (1024 * 1024);
        match self.total {
            Some(total) if total > 0 => {
                let percent = self.written.saturating_mul(100) / total;
                info!("Downloading {}: {mib} MiB ({percent}%)", self.url);
            }
            _ => info!("Downloading {}: {mib} MiB", self.url),
        }
    }
}

impl<W: Write> Write for ProgressWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        if self.written >= self.next_report {
            self.report();
            while self.next_report <= self.written {
                self.next_report += self.step;
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Path used while a download to `dest` is in flight.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_DOWNLOAD_SUFFIX);
    dest.with_file_name(name)
}

/// Downloads `url` to `dest` unless `dest` already exists.
///
/// Returns `true` when a transfer happened.
pub fn download_if_missing(
    fetcher: &dyn Fetcher,
    url: &str,
    dest: &Path,
) -> Result<bool, StackError> {
    if dest.exists() {
        info!("Using cached {:?}", dest);
        return Ok(false);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(StackError::io(parent))?;
    }

    // A leftover partial file belongs to an interrupted run.
    match fs::remove_file(partial_path(dest)) {
        Ok(()) => debug!("Discarded partial download for {:?}", dest),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(StackError::Io {
                path: partial_path(dest),
                source,
            });
        }
    }

    info!("Downloading {url}");
    fetcher.fetch(url, dest)?;
    info!("Saved {:?}", dest);
    Ok(true)
}

/// File name component of a URL, without query or fragment.
pub fn file_name_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|name| !name.is_empty())
}
