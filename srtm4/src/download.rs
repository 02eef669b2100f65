//! SRTM tile archive download.
//!
//! Tiles are published by CGIAR-CSI as one ZIP archive per 5°×5° tile. The
//! server occasionally answers 503 when overloaded, so requests are retried
//! with exponential backoff on 5xx responses and connection failures.
//!
//! The HTTP transport ([`HttpFetcher`]) is only available when the `download`
//! feature is enabled. [`ArchiveFetcher`] lets the tile cache use any other
//! transport.

use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SrtmError};
use crate::filename::TileId;

/// CGIAR-CSI SRTM 90m v4.1, 5°×5° GeoTIFF archives.
pub const CGIAR_URL: &str = "https://srtm.csi.cgiar.org/wp-content/uploads/files/srtm_5x5/TIFF";

/// Default timeout for HTTP requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Status codes worth retrying.
const RETRY_STATUS: [u16; 4] = [500, 502, 503, 504];

/// Fetches the archive of one tile to a local path.
pub trait ArchiveFetcher: Send + Sync {
    /// Download the archive of `tile` to `dest`, overwriting any existing file.
    fn fetch(&self, tile: TileId, dest: &Path) -> Result<()>;
}

/// Configuration for downloading tile archives.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Base URL; the archive URL is `{base_url}/{tile_name}.zip`.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry in seconds, doubled for each further retry.
    pub backoff_secs: f64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_url: CGIAR_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: 5,
            backoff_secs: 0.3,
        }
    }
}

impl DownloadConfig {
    /// Create a configuration for a mirror serving `{base_url}/{tile_name}.zip`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the total number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial backoff delay.
    pub fn with_backoff(mut self, backoff_secs: f64) -> Self {
        self.backoff_secs = backoff_secs;
        self
    }

    /// Archive URL of a tile.
    pub fn url_for(&self, tile: TileId) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            tile.archive_filename()
        )
    }

    /// Delay before attempt number `attempt` (1-based). The first attempt is immediate.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2f64.powi(attempt as i32 - 2);
        Duration::from_secs_f64((self.backoff_secs * factor).max(0.0))
    }
}

/// Whether an HTTP status should be retried.
pub fn is_retryable_status(status: u16) -> bool {
    RETRY_STATUS.contains(&status)
}

/// Outcome of a failed attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// Worth trying again after a delay.
    Retryable(String),
    /// Retrying cannot help.
    Fatal(String),
}

/// Run `op` until it succeeds, fails fatally, or the attempts are exhausted.
///
/// `op` receives the 1-based attempt number.
pub fn with_retry<T>(
    config: &DownloadConfig,
    filename: &str,
    mut op: impl FnMut(u32) -> std::result::Result<T, AttemptError>,
) -> Result<T> {
    let attempts = config.max_attempts.max(1);
    let mut last_reason = String::new();

    for attempt in 1..=attempts {
        let delay = config.delay_before(attempt);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(reason)) => {
                return Err(SrtmError::DownloadFailed {
                    filename: filename.to_string(),
                    reason,
                })
            }
            Err(AttemptError::Retryable(reason)) => {
                tracing::debug!(filename, attempt, reason = %reason, "Retrying download");
                last_reason = reason;
            }
        }
    }

    Err(SrtmError::DownloadFailed {
        filename: filename.to_string(),
        reason: format!("gave up after {} attempts: {}", attempts, last_reason),
    })
}

#[cfg(feature = "download")]
pub use http::HttpFetcher;

#[cfg(feature = "download")]
mod http {
    use std::fs::File;
    use std::path::Path;

    use reqwest::blocking::Client;

    use super::{is_retryable_status, with_retry, ArchiveFetcher, AttemptError, DownloadConfig};
    use crate::error::Result;
    use crate::filename::TileId;

    /// Tile archive downloader over HTTP(S).
    pub struct HttpFetcher {
        client: Client,
        config: DownloadConfig,
    }

    impl HttpFetcher {
        /// Create a new downloader with the given configuration.
        pub fn new(config: DownloadConfig) -> Result<Self> {
            let client = Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_secs))
                .build()?;

            Ok(Self { client, config })
        }

        pub fn config(&self) -> &DownloadConfig {
            &self.config
        }

        /// Perform a single download attempt.
        fn attempt(&self, url: &str, dest: &Path) -> std::result::Result<(), AttemptError> {
            let mut response = self.client.get(url).send().map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    AttemptError::Retryable(e.to_string())
                } else {
                    AttemptError::Fatal(e.to_string())
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                let reason = format!("Response code {} received for url {}", status, url);
                return Err(if is_retryable_status(status.as_u16()) {
                    AttemptError::Retryable(reason)
                } else {
                    AttemptError::Fatal(reason)
                });
            }

            tracing::info!(
                url,
                dest = %dest.display(),
                bytes = response.content_length(),
                "Downloading"
            );

            let mut file = File::create(dest).map_err(|e| AttemptError::Fatal(e.to_string()))?;
            response.copy_to(&mut file).map_err(|e| {
                if e.is_timeout() {
                    AttemptError::Retryable(e.to_string())
                } else {
                    AttemptError::Fatal(e.to_string())
                }
            })?;

            Ok(())
        }
    }

    impl ArchiveFetcher for HttpFetcher {
        fn fetch(&self, tile: TileId, dest: &Path) -> Result<()> {
            let url = self.config.url_for(tile);
            with_retry(&self.config, &tile.archive_filename(), |_| {
                self.attempt(&url, dest)
            })
        }
    }

}
