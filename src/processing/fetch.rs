use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use url::Url;

use crate::models::config::FetchConfig;
use crate::processing::table::{TableError, read_rows};
use crate::sources::{SourceError, build_reqwest_client};

const FALLBACK_EXTENSION: &str = ".jpg";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Client(#[from] SourceError),
    #[error("could not create folder {path}: {source}")]
    Folder {
        path: String,
        source: std::io::Error,
    },
    #[error("'{0}' is not a valid URL")]
    InvalidUrl(String),
    #[error("request to {0} timed out")]
    Timeout(String),
    #[error("HTTP error {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("could not fetch {url}: {source}")]
    Transport { url: String, source: reqwest::Error },
    #[error("could not save file: {0}")]
    Io(#[from] std::io::Error),
}

pub type FetchResult<T> = Result<T, FetchError>;

/// What to do with the URL cell of one CSV row.
#[derive(Debug, PartialEq, Eq)]
pub enum RowAction<'a> {
    Empty,
    NotUrl(&'a str),
    Attempt(&'a str),
}

/// Trims the cell and decides whether it is worth a request.
pub fn classify_url(value: &str) -> RowAction<'_> {
    let value = value.trim();
    if value.is_empty() {
        RowAction::Empty
    } else if !value.starts_with("http") {
        RowAction::NotUrl(value)
    } else {
        RowAction::Attempt(value)
    }
}

/// Extension guessed from a `Content-Type` header value.
pub fn extension_for_content_type(content_type: Option<&str>) -> &'static str {
    let Some(content_type) = content_type else {
        return FALLBACK_EXTENSION;
    };
    if content_type.contains("image/png") {
        ".png"
    } else if content_type.contains("image/gif") {
        ".gif"
    } else if content_type.contains("image/jpeg") {
        ".jpg"
    } else if content_type.contains("image/webp") {
        ".webp"
    } else {
        FALLBACK_EXTENSION
    }
}

/// File name for a downloaded body.
///
/// Uses the last path segment when it looks like a file name (non-empty with
/// a `.`), otherwise `image_{sequence}` plus an extension from the content
/// type.
pub fn derive_filename(url: &Url, content_type: Option<&str>, sequence: usize) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    if !segment.is_empty() && segment.contains('.') {
        return segment.to_string();
    }

    format!(
        "image_{sequence}{}",
        extension_for_content_type(content_type)
    )
}

/// Counters of one download run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub processed: usize,
    pub skipped: usize,
    pub attempted: usize,
    pub downloaded: usize,
    pub failed: usize,
}

/// Downloads single URLs into a folder.
pub struct ImageFetcher {
    client: reqwest::Client,
    download_folder: PathBuf,
}

impl ImageFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    pub fn new(download_folder: &Path, timeout: Duration) -> FetchResult<Self> {
        Ok(Self {
            client: build_reqwest_client(Some(timeout))?,
            download_folder: download_folder.to_path_buf(),
        })
    }

    /// Fetches `url` and stores the body verbatim. Returns the saved path.
    ///
    /// `sequence` is the 1-based row number used when the URL carries no
    /// file name.
    pub async fn fetch(&self, url: &str, sequence: usize) -> FetchResult<PathBuf> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let transport = |source: reqwest::Error| {
            if source.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    source,
                }
            }
        };

        let res = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(transport)?;
        if !res.status().is_success() {
            return Err(FetchError::Status {
                status: res.status(),
                url: url.to_string(),
            });
        }

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = res.bytes().await.map_err(transport)?;

        let filename = derive_filename(&parsed, content_type.as_deref(), sequence);
        if !parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .is_some_and(|segment| segment == filename)
        {
            log::info!("  ... no file name in URL, using {filename}");
        }

        let save_path = self.download_folder.join(filename);
        fs::write(&save_path, &body)?;
        Ok(save_path)
    }
}

/// Downloads the URL column of every CSV row, one request at a time.
///
/// Rows without a usable URL are skipped. Every attempted row, failed or
/// not, is followed by the configured wait. Per-row failures are logged and
/// never stop the run.
pub async fn download_images(config: &FetchConfig) -> FetchResult<FetchStats> {
    if !config.download_folder.exists() {
        fs::create_dir_all(&config.download_folder).map_err(|source| FetchError::Folder {
            path: config.download_folder.display().to_string(),
            source,
        })?;
        log::info!("Created folder {}", config.download_folder.display());
    }

    let rows = read_rows(&config.csv_file, &config.url_column)?;
    let fetcher = ImageFetcher::new(
        &config.download_folder,
        Duration::from_secs(config.timeout_secs),
    )?;
    let wait = Duration::from_secs(config.wait_time_secs);

    let mut stats = FetchStats::default();
    for (i, row) in rows.iter().enumerate() {
        stats.processed += 1;
        let line = i + 2;
        let value = row.get(&config.url_column).map(String::as_str).unwrap_or_default();

        let url = match classify_url(value) {
            RowAction::Empty => {
                log::warn!("Row {line} skipped: '{}' is empty", config.url_column);
                stats.skipped += 1;
                continue;
            }
            RowAction::NotUrl(value) => {
                log::warn!("Row {line} skipped: '{value}' is not a valid URL");
                stats.skipped += 1;
                continue;
            }
            RowAction::Attempt(url) => url,
        };

        stats.attempted += 1;
        log::info!("Item {} (row {line}): downloading {url}", i + 1);
        match fetcher.fetch(url, i + 1).await {
            Ok(path) => {
                stats.downloaded += 1;
                log::info!("  ... saved as {}", path.display());
            }
            Err(e) => {
                stats.failed += 1;
                log::error!("  ... {e}");
            }
        }

        if !wait.is_zero() {
            log::debug!("Waiting {} seconds", wait.as_secs());
            tokio::time::sleep(wait).await;
        }
    }

    log::info!(
        "Download finished: processed={}, skipped={}, attempted={}, downloaded={}, failed={}",
        stats.processed,
        stats.skipped,
        stats.attempted,
        stats.downloaded,
        stats.failed
    );

    Ok(stats)
}
