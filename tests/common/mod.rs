//! Helpers for integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgb, RgbImage};
use provenance_tools::domain::detection::DetectionBox;
use provenance_tools::vision::{ImageEmbedder, PhotoDetector, VisionResult};

/// Temporary working directory removed on drop.
pub struct TestWorkspace {
    dir: tempfile::TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        TestWorkspace {
            dir: tempfile::tempdir().expect("Failed to create temporary directory."),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Creates (if needed) and returns a subdirectory.
    pub fn subdir(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path).expect("Failed to create subdirectory.");
        path
    }
}

/// Writes a solid-colour image; the format follows the extension.
pub fn write_image(path: &Path, width: u32, height: u32, color: [u8; 3]) {
    RgbImage::from_pixel(width, height, Rgb(color))
        .save(path)
        .expect("Failed to write test image.");
}

/// Embeds an image as its top-left colour and counts every call.
pub struct CountingEmbedder {
    model: String,
    pub calls: usize,
}

impl CountingEmbedder {
    pub fn new(model: &str) -> Self {
        CountingEmbedder {
            model: model.to_string(),
            calls: 0,
        }
    }
}

impl ImageEmbedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn embed_image(&mut self, path: &Path) -> VisionResult<Vec<f32>> {
        self.calls += 1;
        let image = image::open(path)?.to_rgb8();
        let pixel = image.get_pixel(0, 0);
        Ok(pixel
            .0
            .iter()
            .map(|channel| f32::from(*channel) / 255.0 + 0.01)
            .collect())
    }
}

/// Returns the boxes registered for an image width, none otherwise.
pub struct WidthDetector {
    pub boxes: Vec<(u32, Vec<DetectionBox>)>,
}

impl PhotoDetector for WidthDetector {
    fn detect(&mut self, image: &DynamicImage) -> VisionResult<Vec<DetectionBox>> {
        Ok(self
            .boxes
            .iter()
            .find(|(width, _)| *width == image.width())
            .map(|(_, boxes)| boxes.clone())
            .unwrap_or_default())
    }
}

pub fn detection(x1: f32, y1: f32, x2: f32, y2: f32) -> DetectionBox {
    DetectionBox {
        x1,
        y1,
        x2,
        y2,
        confidence: 0.9,
        class_id: 0,
    }
}
