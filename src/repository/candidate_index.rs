use std::fs;
use std::path::{Path, PathBuf};

use usearch::Index;

use crate::processing::embedding::{CandidateIndex, IndexManifest, index_options};
use crate::repository::{
    CandidateIndexReader, CandidateIndexWriter, RepositoryError, RepositoryResult,
};

/// Candidate index cached as a usearch index file plus a JSON manifest
/// mapping index keys to image paths.
///
/// Both files must exist for the cache to be used. There is no locking:
/// concurrent runs against the same paths race.
pub struct FileIndexCache {
    index_path: PathBuf,
    mapping_path: PathBuf,
}

impl FileIndexCache {
    pub fn new(index_path: impl Into<PathBuf>, mapping_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            mapping_path: mapping_path.into(),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn mapping_path(&self) -> &Path {
        &self.mapping_path
    }
}

fn utf8_path(path: &Path) -> RepositoryResult<&str> {
    path.to_str()
        .ok_or_else(|| RepositoryError::Index(format!("{} is not valid UTF-8", path.display())))
}

fn ensure_parent(path: &Path) -> RepositoryResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

impl CandidateIndexReader for FileIndexCache {
    fn load_candidate_index(&self) -> RepositoryResult<Option<CandidateIndex>> {
        if !self.index_path.exists() || !self.mapping_path.exists() {
            return Ok(None);
        }

        let manifest: IndexManifest = serde_json::from_slice(&fs::read(&self.mapping_path)?)?;
        if manifest.paths.is_empty() {
            return Ok(Some(CandidateIndex::from_parts(manifest, None)));
        }

        let index = Index::new(&index_options(manifest.dimensions))
            .map_err(|e| RepositoryError::Index(e.to_string()))?;
        index
            .load(utf8_path(&self.index_path)?)
            .map_err(|e| RepositoryError::Index(e.to_string()))?;

        if index.size() != manifest.paths.len() {
            return Err(RepositoryError::Index(format!(
                "{} holds {} vectors but {} lists {} paths",
                self.index_path.display(),
                index.size(),
                self.mapping_path.display(),
                manifest.paths.len()
            )));
        }

        Ok(Some(CandidateIndex::from_parts(manifest, Some(index))))
    }
}

impl CandidateIndexWriter for FileIndexCache {
    fn save_candidate_index(&self, index: &CandidateIndex) -> RepositoryResult<()> {
        ensure_parent(&self.index_path)?;
        ensure_parent(&self.mapping_path)?;

        match index.index() {
            Some(vectors) => vectors
                .save(utf8_path(&self.index_path)?)
                .map_err(|e| RepositoryError::Index(e.to_string()))?,
            // Nothing to index; an empty marker keeps both artifacts present.
            None => fs::write(&self.index_path, b"")?,
        }

        fs::write(
            &self.mapping_path,
            serde_json::to_vec_pretty(index.manifest())?,
        )?;
        Ok(())
    }
}
