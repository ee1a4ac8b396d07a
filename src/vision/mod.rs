//! Seams to the pretrained models.

use std::path::Path;

use image::DynamicImage;
use thiserror::Error;

use crate::domain::detection::DetectionBox;

pub mod detector;
pub mod embedder;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("failed to load model: {0}")]
    Model(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("failed to read image: {0}")]
    Image(#[from] image::ImageError),
}

pub type VisionResult<T> = Result<T, VisionError>;

/// Turns an image file into an embedding vector.
pub trait ImageEmbedder {
    /// Identifier of the underlying model, recorded next to cached vectors.
    fn model_name(&self) -> &str;

    /// Embeds a single image. The vector does not need to be normalized.
    fn embed_image(&mut self, path: &Path) -> VisionResult<Vec<f32>>;
}

/// Finds sub-photographs in a decoded image.
pub trait PhotoDetector {
    /// Detections in source-image pixel coordinates, best first.
    fn detect(&mut self, image: &DynamicImage) -> VisionResult<Vec<DetectionBox>>;
}
