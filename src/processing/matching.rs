use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::image::{QueryImage, REPRODUCTION_PATH_COLUMN};
use crate::domain::matching::{MatchItem, SimilarityMatch, round_similarity};
use crate::models::config::MatchConfig;
use crate::processing::embedding::{CandidateIndex, embed_images};
use crate::processing::report::{ReportError, ReportOutput, ReportTemplates, write_report};
use crate::processing::table::{TableError, read_rows};
use crate::repository::{CandidateIndexReader, CandidateIndexWriter, RepositoryError};
use crate::vision::ImageEmbedder;

const CANDIDATE_EXTENSION: &str = ".jpg";

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("failed to list candidate images in {path}: {source}")]
    Candidates {
        path: String,
        source: std::io::Error,
    },
    #[error("candidate index: {0}")]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

pub type MatchResult<T> = Result<T, MatchError>;

/// Links derived from catalogue numbers.
#[derive(Clone, Debug)]
pub struct MatchLinks {
    pub source_url_prefix: String,
    /// `{base}` is replaced by the candidate base.
    pub candidate_url_template: String,
}

impl MatchLinks {
    fn source_url(&self, base: &str) -> String {
        format!("{}{base}", self.source_url_prefix)
    }

    fn candidate_url(&self, base: &str) -> String {
        self.candidate_url_template.replace("{base}", base)
    }
}

/// Outcome of one matcher run.
#[derive(Debug)]
pub struct MatchSummary {
    pub queries: usize,
    pub candidates: usize,
    pub from_cache: bool,
    pub items: Vec<MatchItem>,
    pub report: ReportOutput,
}

/// Reads the query CSV and keeps the rows whose image exists on disk.
pub fn load_query_images(csv_path: &Path) -> MatchResult<Vec<QueryImage>> {
    let rows = read_rows(csv_path, REPRODUCTION_PATH_COLUMN)?;
    let images: Vec<QueryImage> = rows
        .iter()
        .filter_map(QueryImage::from_row)
        .filter(|image| image.path.exists())
        .collect();

    log::info!(
        "Loaded {} query images from {} ({} rows)",
        images.len(),
        csv_path.display(),
        rows.len()
    );
    Ok(images)
}

/// `.jpg` files (any case) directly inside `dir`, sorted by path.
pub fn list_candidate_images(dir: &Path) -> MatchResult<Vec<PathBuf>> {
    let list_error = |source| MatchError::Candidates {
        path: dir.display().to_string(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_error)? {
        let path = entry.map_err(list_error)?.path();
        let is_jpg = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .is_some_and(|name| name.ends_with(CANDIDATE_EXTENSION));
        if is_jpg && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    log::info!("Loaded {} candidate images from {}", paths.len(), dir.display());
    Ok(paths)
}

/// Returns the cached candidate index, or embeds `candidates` and caches a
/// fresh one. The flag tells whether the cache was used.
///
/// A cache written by another model is rebuilt.
pub fn resolve_candidate_index<E, C>(
    embedder: &mut E,
    cache: &C,
    candidates: &[PathBuf],
) -> MatchResult<(CandidateIndex, bool)>
where
    E: ImageEmbedder + ?Sized,
    C: CandidateIndexReader + CandidateIndexWriter,
{
    if let Some(index) = cache.load_candidate_index()? {
        if index.manifest().model == embedder.model_name() {
            if index.len() != candidates.len() {
                log::warn!(
                    "Cached index holds {} candidates, directory has {}; reusing cache",
                    index.len(),
                    candidates.len()
                );
            }
            log::info!("Loaded cached candidate index ({} vectors)", index.len());
            return Ok((index, true));
        }
        log::warn!(
            "Cached index was built with model '{}', rebuilding for '{}'",
            index.manifest().model,
            embedder.model_name()
        );
    }

    log::info!("Computing candidate embeddings");
    let embeddings = embed_images(embedder, candidates.to_vec(), |path| path.as_path());
    let index = CandidateIndex::build(embedder.model_name(), &embeddings)?;
    cache.save_candidate_index(&index)?;

    Ok((index, false))
}

/// Up to `results_per_item` `(key, similarity)` pairs per query, best first.
pub fn rank_matches(
    index: &CandidateIndex,
    queries: &[(QueryImage, Vec<f32>)],
    results_per_item: usize,
) -> MatchResult<Vec<Vec<(usize, f32)>>> {
    let k = results_per_item.min(index.len());
    queries
        .iter()
        .map(|(_, embedding)| index.search(embedding, k).map_err(MatchError::from))
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Candidate file stem up to the first `_`.
pub fn candidate_base(filename: &str) -> &str {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename);
    stem.split('_').next().unwrap_or(stem)
}

/// Combines a query, its ranked keys and the catalogue links into the
/// exported record.
pub fn build_match_item(
    position: usize,
    query: &QueryImage,
    ranked: &[(usize, f32)],
    index: &CandidateIndex,
    links: &MatchLinks,
) -> MatchItem {
    let base = query.object_number_base().to_string();

    let matches = ranked
        .iter()
        .enumerate()
        .filter_map(|(rank, &(key, similarity))| {
            let path = index.path(key)?;
            let filename = file_name(path);
            let candidate = candidate_base(&filename).to_string();
            Some(SimilarityMatch {
                rank,
                path: format!("../{}", path.display()),
                url: links.candidate_url(&candidate),
                filename,
                base: candidate,
                similarity: round_similarity(similarity),
            })
        })
        .collect();

    MatchItem {
        index: position,
        source_path: format!("../{}", query.path.display()),
        source_filename: file_name(&query.path),
        object_number: query.object_number.clone(),
        obj_nk_url: links.source_url(&base),
        obj_num_base: base,
        obj_metadata: query.metadata_label(),
        matches,
    }
}

/// One [`MatchItem`] per embedded query, paired with its ranked keys.
pub fn build_match_items(
    queries: &[(QueryImage, Vec<f32>)],
    ranked: &[Vec<(usize, f32)>],
    index: &CandidateIndex,
    links: &MatchLinks,
) -> Vec<MatchItem> {
    queries
        .iter()
        .zip(ranked)
        .enumerate()
        .map(|(position, ((query, _), ranked))| {
            build_match_item(position, query, ranked, index, links)
        })
        .collect()
}

/// Runs the whole matcher: candidates (cached), queries, search, report.
pub fn run_matching<E, C>(
    config: &MatchConfig,
    embedder: &mut E,
    cache: &C,
) -> MatchResult<MatchSummary>
where
    E: ImageEmbedder + ?Sized,
    C: CandidateIndexReader + CandidateIndexWriter,
{
    let html_name = config.html_name();
    log::info!("Config: {}", config.config_name());
    log::info!("HTML output: {html_name}");

    let queries = load_query_images(&config.query_csv)?;
    let candidates = list_candidate_images(&config.candidate_dir)?;

    let (index, from_cache) = resolve_candidate_index(embedder, cache, &candidates)?;

    log::info!("Computing query embeddings");
    let queries = embed_images(embedder, queries, |query| query.path.as_path());

    log::info!("Searching {} candidates", index.len());
    let ranked = rank_matches(&index, &queries, config.results_per_item)?;

    let links = MatchLinks {
        source_url_prefix: config.source_url_prefix.clone(),
        candidate_url_template: config.candidate_url_template.clone(),
    };
    let items = build_match_items(&queries, &ranked, &index, &links);

    let templates = ReportTemplates {
        page: config.template.clone(),
        index: config.index_template.clone(),
        asset_dir: config.asset_dir.clone(),
    };
    let report = write_report(&config.report_dir(), &html_name, &items, &templates)?;

    log::info!(
        "Done. {} query images matched, all files written to {}",
        items.len(),
        config.report_dir().display()
    );

    Ok(MatchSummary {
        queries: queries.len(),
        candidates: index.len(),
        from_cache,
        items,
        report,
    })
}
