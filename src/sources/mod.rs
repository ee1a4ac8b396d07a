use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::record::ArchivalRecord;

pub mod adlib;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to build source: {0}")]
    Build(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("failed to parse XML: {0}")]
    Parse(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

impl SourceError {
    /// Whether the error stems from the response body rather than the request.
    pub fn is_parse(&self) -> bool {
        matches!(self, SourceError::Parse(_))
    }
}

/// A paginated remote collection of archival records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetches up to `limit` records starting at the 1-based `start_from`
    /// offset. An empty page marks the end of the collection.
    async fn fetch_page(&self, start_from: usize, limit: usize) -> SourceResult<Vec<ArchivalRecord>>;
}

/// Builds the HTTP client shared by the remote sources and downloaders.
///
/// `timeout` bounds a whole request including the body transfer.
pub fn build_reqwest_client(timeout: Option<Duration>) -> SourceResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| SourceError::Build(e.to_string()))
}
