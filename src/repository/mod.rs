use thiserror::Error;

use crate::processing::embedding::CandidateIndex;

pub mod candidate_index;

pub use candidate_index::FileIndexCache;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache mapping is invalid: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("vector index error: {0}")]
    Index(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

pub trait CandidateIndexReader {
    /// Returns the cached index, or `None` when nothing is cached yet.
    fn load_candidate_index(&self) -> RepositoryResult<Option<CandidateIndex>>;
}

pub trait CandidateIndexWriter {
    fn save_candidate_index(&self, index: &CandidateIndex) -> RepositoryResult<()>;
}
