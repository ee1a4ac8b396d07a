use serde::{Deserialize, Serialize};

/// A ranked candidate for one query image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    /// Zero-based position in the ranked list.
    pub rank: usize,
    /// Candidate path relative to the report folder.
    pub path: String,
    pub filename: String,
    /// Candidate file stem up to the first `_`.
    pub base: String,
    /// Cosine similarity rounded to three decimals.
    pub similarity: f32,
    pub url: String,
}

/// All matches for one query image together with its catalogue metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchItem {
    pub index: usize,
    pub source_path: String,
    pub source_filename: String,
    pub object_number: String,
    pub obj_num_base: String,
    pub obj_metadata: String,
    pub matches: Vec<SimilarityMatch>,
    #[serde(rename = "obj_NK_url")]
    pub obj_nk_url: String,
}

/// Rounds a similarity score to three decimals for export.
pub fn round_similarity(score: f32) -> f32 {
    (score * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_is_rounded_to_three_decimals() {
        assert_eq!(round_similarity(0.87649), 0.876);
        assert_eq!(round_similarity(0.8766), 0.877);
        assert_eq!(round_similarity(-0.12345), -0.123);
    }
}
