use std::fmt::Display;
use std::path::Path;

use image::DynamicImage;
use image::imageops::FilterType;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;

use crate::domain::detection::DetectionBox;
use crate::vision::{PhotoDetector, VisionError, VisionResult};

/// Grey used by Ultralytics to pad letterboxed inputs.
const PAD_VALUE: f32 = 114.0 / 255.0;
const OUTPUT_NAME: &str = "output0";

#[derive(Clone, Copy, Debug)]
pub struct YoloParams {
    /// Square model input, 640 for the stock exports.
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.5,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Scale and padding applied when fitting an image into the model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

/// YOLOv8 detector running an ONNX export through ONNX Runtime.
pub struct YoloDetector {
    session: Session,
    params: YoloParams,
}

fn model_error(error: impl Display) -> VisionError {
    VisionError::Model(error.to_string())
}

fn inference_error(error: impl Display) -> VisionError {
    VisionError::Inference(error.to_string())
}

impl YoloDetector {
    pub fn load(model_path: &Path, params: YoloParams) -> VisionResult<Self> {
        let session = Session::builder()
            .map_err(model_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(model_error)?
            .commit_from_file(model_path)
            .map_err(|e| model_error(format!("{}: {e}", model_path.display())))?;

        Ok(Self { session, params })
    }
}

impl PhotoDetector for YoloDetector {
    fn detect(&mut self, image: &DynamicImage) -> VisionResult<Vec<DetectionBox>> {
        let params = self.params;
        let size = params.input_size as usize;
        let (input, letterbox) = letterbox(image, params.input_size);

        let tensor = Tensor::from_array((vec![1, 3, size, size], input.into_boxed_slice()))
            .map_err(inference_error)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(inference_error)?;
        let output = outputs
            .get(OUTPUT_NAME)
            .ok_or_else(|| inference_error(format!("model output '{OUTPUT_NAME}' not found")))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;
        let shape: Vec<usize> = shape.iter().map(|&dim| dim.max(0) as usize).collect();

        decode_output(
            &shape,
            data,
            letterbox,
            &params,
            image.width(),
            image.height(),
        )
    }
}

/// Resizes `image` into a `size` x `size` canvas keeping its aspect ratio and
/// returns the CHW float input together with the applied transform.
pub fn letterbox(image: &DynamicImage, size: u32) -> (Vec<f32>, Letterbox) {
    let (width, height) = (image.width().max(1), image.height().max(1));
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - new_width) / 2;
    let pad_y = (size - new_height) / 2;

    let resized = image
        .resize_exact(new_width, new_height, FilterType::Triangle)
        .to_rgb8();

    let side = size as usize;
    let plane = side * side;
    let mut data = vec![PAD_VALUE; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = (y + pad_y) as usize * side + (x + pad_x) as usize;
        for (channel, value) in pixel.0.iter().enumerate() {
            data[channel * plane + offset] = f32::from(*value) / 255.0;
        }
    }

    (
        data,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Decodes a `[1, 4 + classes, anchors]` YOLOv8 head into boxes in source
/// image coordinates: confidence filter, per-class NMS, best first.
pub fn decode_output(
    shape: &[usize],
    data: &[f32],
    letterbox: Letterbox,
    params: &YoloParams,
    image_width: u32,
    image_height: u32,
) -> VisionResult<Vec<DetectionBox>> {
    let [_, channels, anchors] = shape else {
        return Err(inference_error(format!("unexpected output shape {shape:?}")));
    };
    let (channels, anchors) = (*channels, *anchors);
    if channels < 5 || data.len() < channels * anchors {
        return Err(inference_error(format!(
            "output shape {shape:?} does not match {} values",
            data.len()
        )));
    }

    let at = |channel: usize, anchor: usize| data[channel * anchors + anchor];
    let (max_x, max_y) = (image_width as f32, image_height as f32);

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_id, confidence) = (4..channels)
            .map(|channel| (channel - 4, at(channel, anchor)))
            .fold((0, f32::MIN), |best, current| {
                if current.1 > best.1 { current } else { best }
            });
        if confidence < params.conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        let unmap_x = |value: f32| ((value - letterbox.pad_x) / letterbox.scale).clamp(0.0, max_x);
        let unmap_y = |value: f32| ((value - letterbox.pad_y) / letterbox.scale).clamp(0.0, max_y);

        candidates.push(DetectionBox {
            x1: unmap_x(cx - w / 2.0),
            y1: unmap_y(cy - h / 2.0),
            x2: unmap_x(cx + w / 2.0),
            y2: unmap_y(cy + h / 2.0),
            confidence,
            class_id,
        });
    }

    Ok(non_max_suppression(
        candidates,
        params.iou_threshold,
        params.max_detections,
    ))
}

/// Greedy NMS within each class, keeping at most `max_detections` boxes.
pub fn non_max_suppression(
    mut candidates: Vec<DetectionBox>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<DetectionBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<DetectionBox> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
