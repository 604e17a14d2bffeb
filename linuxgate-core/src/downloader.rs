//! Streaming HTTP downloads with throttled progress and optional resume.

use crate::settings::DownloadSettings;
use anyhow::{Context, Result};
use linuxgate_error::{InstallError, InstallResult};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Timeout and buffer class of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadClass {
    /// Boot image and bootloader files.
    Short,
    /// Full installer image.
    Long,
}

impl DownloadClass {
    pub fn chunk_size(&self) -> usize {
        match self {
            DownloadClass::Short => 8 * 1024,
            DownloadClass::Long => 80 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub short_timeout: Duration,
    pub long_timeout: Duration,
    pub progress_interval: Duration,
    pub resume: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self::from_settings(&DownloadSettings::default())
    }
}

impl DownloadOptions {
    pub fn from_settings(settings: &DownloadSettings) -> Self {
        Self {
            short_timeout: Duration::from_secs(settings.short_timeout_secs),
            long_timeout: Duration::from_secs(settings.long_timeout_secs),
            progress_interval: Duration::from_millis(settings.progress_interval_ms),
            resume: settings.resume,
        }
    }

    fn timeout(&self, class: DownloadClass) -> Duration {
        match class {
            DownloadClass::Short => self.short_timeout,
            DownloadClass::Long => self.long_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub percent: u8,
    pub downloaded: u64,
    /// Unknown when the server sent no length.
    pub total: Option<u64>,
}

impl DownloadProgress {
    fn new(downloaded: u64, total: Option<u64>) -> Self {
        let percent = match total {
            Some(t) if t > 0 => (downloaded.saturating_mul(100) / t).min(100) as u8,
            _ => 0,
        };
        Self {
            percent,
            downloaded,
            total,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadArtifact {
    pub path: PathBuf,
    pub size: u64,
    pub resumed: bool,
}

/// Format bytes into a human readable string (e.g. "1.5 GB").
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub(crate) fn create_http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("linuxgate/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

#[derive(Debug, Clone, Default)]
pub struct ResumableDownloader {
    opts: DownloadOptions,
}

impl ResumableDownloader {
    pub fn new(opts: DownloadOptions) -> Self {
        Self { opts }
    }

    /// Stream `url` into `dest`.
    ///
    /// `on_progress` runs at most once per progress interval plus once at the
    /// end. On failure any partial file stays where it is.
    pub fn download(
        &self,
        url: &str,
        dest: &Path,
        class: DownloadClass,
        on_progress: &mut dyn FnMut(DownloadProgress),
    ) -> InstallResult<DownloadArtifact> {
        log::info!("downloading {} -> {}", url, dest.display());
        self.download_inner(url, dest, class, on_progress)
            .map_err(|err| {
                log::warn!("download of {} failed: {:#}", url, err);
                InstallError::DownloadFailed {
                    url: url.to_string(),
                    reason: format!("{:#}", err),
                }
            })
    }

    fn download_inner(
        &self,
        url: &str,
        dest: &Path,
        class: DownloadClass,
        on_progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<DownloadArtifact> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let client = create_http_client(self.opts.timeout(class))?;

        let existing = if self.opts.resume {
            dest.metadata().map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };
        let mut request = client.get(url);
        if existing > 0 {
            log::info!("resuming {} from byte {}", url, existing);
            request = request.header(reqwest::header::RANGE, format!("bytes={}-", existing));
        }
        let mut response = request
            .send()
            .with_context(|| format!("request to {} failed", url))?;
        let status = response.status();

        if existing > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
            log::info!("{} already complete on disk", dest.display());
            on_progress(DownloadProgress {
                percent: 100,
                downloaded: existing,
                total: Some(existing),
            });
            return Ok(DownloadArtifact {
                path: dest.to_path_buf(),
                size: existing,
                resumed: true,
            });
        }
        if !status.is_success() {
            anyhow::bail!("server returned {}", status);
        }

        let resumed = existing > 0 && status == StatusCode::PARTIAL_CONTENT;
        let (mut file, offset) = if resumed {
            let file = OpenOptions::new()
                .append(true)
                .open(dest)
                .with_context(|| format!("failed to open {}", dest.display()))?;
            (file, existing)
        } else {
            let file = File::create(dest)
                .with_context(|| format!("failed to create {}", dest.display()))?;
            (file, 0)
        };
        let total = response.content_length().map(|len| len + offset);

        let mut downloaded = offset;
        let mut buffer = vec![0u8; class.chunk_size()];
        let mut last_emit = Instant::now();
        loop {
            let read = response
                .read(&mut buffer)
                .with_context(|| format!("reading {} failed", url))?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])
                .with_context(|| format!("writing {} failed", dest.display()))?;
            downloaded += read as u64;

            if last_emit.elapsed() >= self.opts.progress_interval {
                on_progress(DownloadProgress::new(downloaded, total));
                last_emit = Instant::now();
            }
        }
        file.flush()?;

        if let Some(expected) = total {
            if downloaded < expected {
                anyhow::bail!("connection closed after {} of {} bytes", downloaded, expected);
            }
        }
        on_progress(DownloadProgress {
            percent: 100,
            downloaded,
            total,
        });
        log::info!(
            "downloaded {} ({})",
            dest.display(),
            format_bytes(downloaded)
        );
        Ok(DownloadArtifact {
            path: dest.to_path_buf(),
            size: downloaded,
            resumed,
        })
    }
}
