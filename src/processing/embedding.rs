use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::repository::{RepositoryError, RepositoryResult};
use crate::vision::ImageEmbedder;

/// Normalize a vector to unit length.
///
/// Returns the original vector when the norm is zero.
pub(crate) fn normalize_embedding(vec: &[f32]) -> Vec<f32> {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        vec.to_vec()
    } else {
        vec.iter().map(|x| x / norm).collect()
    }
}

/// Embeds the image behind each item and normalizes the result.
///
/// Items whose image fails are logged and left out, so the output may be
/// shorter than the input.
pub fn embed_images<E, T, F>(embedder: &mut E, items: Vec<T>, path_of: F) -> Vec<(T, Vec<f32>)>
where
    E: ImageEmbedder + ?Sized,
    F: Fn(&T) -> &Path,
{
    let progress = ProgressBar::new(items.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("Embedding images {bar:40} {pos}/{len} {eta}") {
        progress.set_style(style);
    }

    let mut embeddings = Vec::with_capacity(items.len());
    for item in items {
        match embedder.embed_image(path_of(&item)) {
            Ok(vector) => {
                let vector = normalize_embedding(&vector);
                embeddings.push((item, vector));
            }
            Err(error) => log::error!("Error processing {}: {error}", path_of(&item).display()),
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    embeddings
}

/// Identity of a cached index: which model produced it and which file each
/// key refers to (key `i` is `paths[i]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub model: String,
    pub dimensions: usize,
    pub paths: Vec<String>,
}

/// Inner-product index over unit-normalized candidate embeddings.
pub struct CandidateIndex {
    manifest: IndexManifest,
    index: Option<Index>,
}

fn index_error(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Index(error.to_string())
}

/// Options of every candidate index; `dimensions` must match the vectors.
pub(crate) fn index_options(dimensions: usize) -> IndexOptions {
    IndexOptions {
        dimensions,
        metric: MetricKind::IP,
        quantization: ScalarKind::F32,
        ..Default::default()
    }
}

impl CandidateIndex {
    /// Indexes `embeddings` under keys `0..n` in the given order.
    pub fn build(model: &str, embeddings: &[(PathBuf, Vec<f32>)]) -> RepositoryResult<Self> {
        let dimensions = embeddings.first().map(|(_, v)| v.len()).unwrap_or_default();
        let manifest = IndexManifest {
            model: model.to_string(),
            dimensions,
            paths: embeddings
                .iter()
                .map(|(path, _)| path.to_string_lossy().into_owned())
                .collect(),
        };

        if embeddings.is_empty() {
            return Ok(Self {
                manifest,
                index: None,
            });
        }

        let index = Index::new(&index_options(dimensions)).map_err(index_error)?;
        index.reserve(embeddings.len()).map_err(index_error)?;
        for (key, (path, embedding)) in embeddings.iter().enumerate() {
            if embedding.len() != dimensions {
                return Err(RepositoryError::Index(format!(
                    "{} has {} dimensions, expected {dimensions}",
                    path.display(),
                    embedding.len()
                )));
            }
            index
                .add(key as u64, embedding.as_slice())
                .map_err(index_error)?;
        }

        Ok(Self {
            manifest,
            index: Some(index),
        })
    }

    /// Reassembles an index read back from disk.
    pub fn from_parts(manifest: IndexManifest, index: Option<Index>) -> Self {
        Self { manifest, index }
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn index(&self) -> Option<&Index> {
        self.index.as_ref()
    }

    pub fn len(&self) -> usize {
        self.manifest.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.paths.is_empty()
    }

    /// Path stored under `key`.
    pub fn path(&self, key: usize) -> Option<&Path> {
        self.manifest.paths.get(key).map(Path::new)
    }

    /// Returns up to `k` `(key, similarity)` pairs, most similar first.
    ///
    /// Similarity is the inner product of the normalized vectors. The scan is
    /// exhaustive, so the result is the true top `k`.
    pub fn search(&self, query: &[f32], k: usize) -> RepositoryResult<Vec<(usize, f32)>> {
        let Some(index) = self.index.as_ref().filter(|_| k > 0) else {
            return Ok(Vec::new());
        };
        if query.len() != self.manifest.dimensions {
            return Err(RepositoryError::Index(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.manifest.dimensions
            )));
        }

        let neighbors = index
            .exact_search(query, k.min(self.len()))
            .map_err(index_error)?;

        let mut results: Vec<(usize, f32)> = neighbors
            .keys
            .iter()
            .zip(neighbors.distances.iter())
            .filter_map(|(&key, &distance)| {
                let key = usize::try_from(key).ok().filter(|key| *key < self.len())?;
                Some((key, 1.0 - distance))
            })
            .collect();
        results.sort_by(|a, b| b.1.total_cmp(&a.1));
        results.truncate(k);

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(vectors: &[[f32; 3]]) -> Vec<(PathBuf, Vec<f32>)> {
        vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (PathBuf::from(format!("img_{i}.jpg")), normalize_embedding(v)))
            .collect()
    }

    #[test]
    fn normalize_scales_to_unit_length() {
        let normalized = normalize_embedding(&[3.0, 4.0]);

        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
        assert_eq!(normalize_embedding(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn search_returns_empty_for_empty_index() {
        let index = CandidateIndex::build("test", &[]).expect("build should succeed");

        let result = index.search(&[1.0, 0.0, 0.0], 5).expect("search should succeed");

        assert!(result.is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn search_returns_best_neighbor_first() {
        let index = CandidateIndex::build(
            "test",
            &items(&[[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.5, 0.5, 0.0]]),
        )
        .expect("build should succeed");

        let result = index.search(&[1.0, 0.0, 0.0], 10).expect("search should succeed");

        assert_eq!(result.len(), 3);
        assert_eq!(result[0].0, 1);
        assert!((result[0].1 - 1.0).abs() < 1e-4);
        assert_eq!(result[1].0, 2);
        assert!((result[1].1 - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-4);
        assert!(result.windows(2).all(|pair| pair[0].1 >= pair[1].1));
        assert_eq!(index.path(2), Some(Path::new("img_2.jpg")));
    }

    /// Deterministic pseudo-random unit vectors.
    fn random_unit_vectors(count: usize, dimensions: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut state = seed;
        let mut next = move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 40) as f32 / (1u64 << 24) as f32) - 0.5
        };
        (0..count)
            .map(|_| normalize_embedding(&(0..dimensions).map(|_| next()).collect::<Vec<_>>()))
            .collect()
    }

    #[test]
    fn search_matches_brute_force_ranking() {
        let candidates = random_unit_vectors(3000, 64, 7);
        let embeddings: Vec<(PathBuf, Vec<f32>)> = candidates
            .iter()
            .enumerate()
            .map(|(i, v)| (PathBuf::from(format!("img_{i}.jpg")), v.clone()))
            .collect();
        let index = CandidateIndex::build("test", &embeddings).expect("build should succeed");
        let k = 50;

        for query in random_unit_vectors(10, 64, 99) {
            let mut expected: Vec<(usize, f32)> = candidates
                .iter()
                .enumerate()
                .map(|(key, v)| (key, v.iter().zip(&query).map(|(a, b)| a * b).sum()))
                .collect();
            expected.sort_by(|a, b| b.1.total_cmp(&a.1));
            expected.truncate(k);

            let result = index.search(&query, k).expect("search should succeed");

            let keys = |pairs: &[(usize, f32)]| {
                let mut keys: Vec<usize> = pairs.iter().map(|(key, _)| *key).collect();
                keys.sort_unstable();
                keys
            };
            assert_eq!(keys(&result), keys(&expected));
            for ((_, got), (_, want)) in result.iter().zip(&expected) {
                assert!((got - want).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn search_rejects_mismatched_query() {
        let index = CandidateIndex::build("test", &items(&[[1.0, 0.0, 0.0]])).expect("build");

        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn build_rejects_ragged_embeddings() {
        let embeddings = vec![
            (PathBuf::from("a.jpg"), vec![1.0, 0.0]),
            (PathBuf::from("b.jpg"), vec![1.0, 0.0, 0.0]),
        ];

        assert!(CandidateIndex::build("test", &embeddings).is_err());
    }
}
