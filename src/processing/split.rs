use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::{DynamicImage, ImageFormat};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::models::config::{SplitConfig, SplitMode};
use crate::vision::detector::{YoloDetector, YoloParams};
use crate::vision::{PhotoDetector, VisionError};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tif"];

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("model not found at {0}, train it first")]
    ModelMissing(PathBuf),
    #[error(transparent)]
    Vision(#[from] VisionError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("training failed: {0}")]
    Trainer(String),
}

pub type SplitResult<T> = Result<T, SplitError>;

/// Files written for one input image.
#[derive(Debug, PartialEq, Eq)]
pub enum SplitOutcome {
    /// No detections; the whole image was written.
    Passthrough(PathBuf),
    Crops(Vec<PathBuf>),
}

/// Counters of one inference run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SplitStats {
    pub images: usize,
    /// Images without detections, copied through.
    pub passthrough: usize,
    pub crops: usize,
    pub failed: usize,
}

/// Image files directly inside `dir`, sorted by path.
pub fn list_input_images(dir: &Path) -> SplitResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
        if is_image && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn save_jpeg(image: &DynamicImage, path: &Path) -> SplitResult<()> {
    image
        .to_rgb8()
        .save_with_format(path, ImageFormat::Jpeg)
        .map_err(VisionError::from)?;
    Ok(())
}

/// Detects sub-photographs in one image and writes them to `output_folder`.
///
/// Without detections the whole image is written as `{stem}.jpg`; otherwise
/// detection `i` becomes `{stem}_{i}.jpg`, clamped to the image. A crop that
/// cannot be written is logged and skipped.
pub fn split_image<D>(detector: &mut D, path: &Path, output_folder: &Path) -> SplitResult<SplitOutcome>
where
    D: PhotoDetector + ?Sized,
{
    let image = image::open(path).map_err(VisionError::from)?;
    let detections = detector.detect(&image)?;
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    if detections.is_empty() {
        let target = output_folder.join(format!("{stem}.jpg"));
        save_jpeg(&image, &target)?;
        return Ok(SplitOutcome::Passthrough(target));
    }

    let mut written = Vec::with_capacity(detections.len());
    for (i, detection) in detections.iter().enumerate() {
        let target = output_folder.join(format!("{stem}_{i}.jpg"));
        let Some(rect) = detection.clamp_to(image.width(), image.height()) else {
            log::error!(
                "Error saving crop {i} for {}: box {detection:?} is empty inside the image",
                path.display()
            );
            continue;
        };

        let crop = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
        match save_jpeg(&crop, &target) {
            Ok(()) => written.push(target),
            Err(e) => log::error!("Error saving crop {i} for {}: {e}", path.display()),
        }
    }

    Ok(SplitOutcome::Crops(written))
}

/// Runs [`split_image`] over every image in `input_folder`.
pub fn split_folder<D>(detector: &mut D, input_folder: &Path, output_folder: &Path) -> SplitResult<SplitStats>
where
    D: PhotoDetector + ?Sized,
{
    fs::create_dir_all(output_folder)?;
    let images = list_input_images(input_folder)?;
    log::info!(
        "Found {} images in {}. Starting inference",
        images.len(),
        input_folder.display()
    );

    let progress = ProgressBar::new(images.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("Processing {bar:40} {pos}/{len} {eta}") {
        progress.set_style(style);
    }

    let mut stats = SplitStats::default();
    for path in &images {
        stats.images += 1;
        match split_image(detector, path, output_folder) {
            Ok(SplitOutcome::Passthrough(_)) => stats.passthrough += 1,
            Ok(SplitOutcome::Crops(written)) => stats.crops += written.len(),
            Err(e) => {
                stats.failed += 1;
                log::error!("Error processing {}: {e}", path.display());
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    log::info!(
        "Finished: images={}, passthrough={}, crops={}, failed={}",
        stats.images,
        stats.passthrough,
        stats.crops,
        stats.failed
    );
    Ok(stats)
}

/// Arguments handed to the Ultralytics trainer.
pub fn trainer_args(config: &SplitConfig) -> Vec<String> {
    vec![
        "detect".to_string(),
        "train".to_string(),
        format!("data={}", config.training_yaml.display()),
        format!("model={}", config.base_model),
        format!("epochs={}", config.epochs),
        format!("imgsz={}", config.image_size),
    ]
}

/// Trains a detector by running the external trainer to completion.
pub fn train_model(config: &SplitConfig) -> SplitResult<()> {
    log::info!(
        "Starting training using config: {}",
        config.training_yaml.display()
    );

    let status = Command::new(&config.trainer_command)
        .args(trainer_args(config))
        .status()
        .map_err(|e| SplitError::Trainer(format!("could not start '{}': {e}", config.trainer_command)))?;
    if !status.success() {
        return Err(SplitError::Trainer(format!(
            "'{}' exited with {status}",
            config.trainer_command
        )));
    }

    log::info!(
        "Training complete! Export the best weights to ONNX at {} for inference",
        config.model_path.display()
    );
    Ok(())
}

/// Crops every input image with the trained detector.
pub fn predict(config: &SplitConfig) -> SplitResult<SplitStats> {
    if !config.model_path.exists() {
        return Err(SplitError::ModelMissing(config.model_path.clone()));
    }

    let params = YoloParams {
        input_size: config.image_size,
        conf_threshold: config.confidence,
        iou_threshold: config.iou,
        max_detections: config.max_detections,
    };
    let mut detector = YoloDetector::load(&config.model_path, params)?;
    split_folder(&mut detector, &config.input_folder, &config.output_folder)
}

/// Runs the mode selected in the configuration.
pub fn run(config: &SplitConfig) -> SplitResult<()> {
    match config.mode {
        SplitMode::Train => train_model(config),
        SplitMode::Predict => predict(config).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::domain::detection::DetectionBox;
    use crate::vision::VisionResult;

    struct FixedDetector(Vec<DetectionBox>);

    impl PhotoDetector for FixedDetector {
        fn detect(&mut self, _image: &DynamicImage) -> VisionResult<Vec<DetectionBox>> {
            Ok(self.0.clone())
        }
    }

    fn sheet(dir: &Path) -> PathBuf {
        let path = dir.join("sheet.png");
        RgbImage::from_pixel(40, 30, Rgb([200, 10, 10]))
            .save(&path)
            .expect("write sheet");
        path
    }

    #[test]
    fn crops_are_clamped_and_empty_boxes_skipped() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = sheet(dir.path());
        let boxed = |x1, y1, x2, y2| DetectionBox {
            x1,
            y1,
            x2,
            y2,
            confidence: 0.9,
            class_id: 0,
        };
        let mut detector = FixedDetector(vec![
            boxed(0.0, 0.0, 20.0, 10.0),
            boxed(30.0, 20.0, 90.0, 90.0),
            boxed(50.0, 50.0, 60.0, 60.0),
        ]);

        let outcome = split_image(&mut detector, &input, dir.path()).expect("split");

        let SplitOutcome::Crops(written) = outcome else {
            panic!("expected crops, got {outcome:?}");
        };
        assert_eq!(written, vec![dir.path().join("sheet_0.jpg"), dir.path().join("sheet_1.jpg")]);
        let second = image::open(&written[1]).expect("crop readable");
        assert_eq!((second.width(), second.height()), (10, 10));
    }

    #[test]
    fn image_without_detections_passes_through() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = sheet(dir.path());

        let outcome = split_image(&mut FixedDetector(Vec::new()), &input, dir.path()).expect("split");

        assert_eq!(outcome, SplitOutcome::Passthrough(dir.path().join("sheet.jpg")));
    }

    #[test]
    fn trainer_args_follow_ultralytics_cli() {
        let config = SplitConfig::default();

        assert_eq!(
            trainer_args(&config),
            vec![
                "detect",
                "train",
                "data=DHM/test/input/training_yolo/data.yaml",
                "model=yolov8n.pt",
                "epochs=50",
                "imgsz=640",
            ]
        );
    }

    #[test]
    fn predict_requires_model_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = SplitConfig {
            model_path: dir.path().join("missing.onnx"),
            ..Default::default()
        };

        assert!(matches!(predict(&config), Err(SplitError::ModelMissing(_))));
    }

    #[test]
    fn failing_trainer_is_reported() {
        let config = SplitConfig {
            trainer_command: "definitely-not-a-trainer-binary".to_string(),
            ..Default::default()
        };

        assert!(matches!(train_model(&config), Err(SplitError::Trainer(_))));
    }

    #[test]
    fn input_listing_filters_extensions() {
        let dir = tempfile::tempdir().expect("temp dir");
        for name in ["b.JPG", "a.png", "c.tif", "notes.txt", "d.gif"] {
            fs::write(dir.path().join(name), b"x").expect("write file");
        }

        let names: Vec<String> = list_input_images(dir.path())
            .expect("listing")
            .iter()
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();

        assert_eq!(names, vec!["a.png", "b.JPG", "c.tif"]);
    }
}
