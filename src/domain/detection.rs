/// A detected sub-photograph, in pixel coordinates of the source image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

/// Integer crop rectangle contained in the image it was clamped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DetectionBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &DetectionBox) -> f32 {
        let width = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let height = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = width * height;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Truncates the corners to integers and clamps them to
    /// `image_width` x `image_height`. Returns `None` for an empty region.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Option<CropRect> {
        let clamp = |value: f32, max: u32| (value.trunc().max(0.0) as u32).min(max);
        let x1 = clamp(self.x1, image_width);
        let y1 = clamp(self.y1, image_height);
        let x2 = clamp(self.x2, image_width);
        let y2 = clamp(self.y2, image_height);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(CropRect {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32) -> DetectionBox {
        DetectionBox {
            x1,
            y1,
            x2,
            y2,
            confidence: 0.9,
            class_id: 0,
        }
    }

    #[test]
    fn clamp_keeps_crop_inside_image() {
        let rect = bbox(-12.7, 5.9, 130.2, 90.0)
            .clamp_to(100, 80)
            .expect("non-empty crop");

        assert_eq!(
            rect,
            CropRect {
                x: 0,
                y: 5,
                width: 100,
                height: 75
            }
        );
    }

    #[test]
    fn clamp_rejects_boxes_outside_image() {
        assert!(bbox(120.0, 10.0, 150.0, 40.0).clamp_to(100, 80).is_none());
        assert!(bbox(10.0, 10.0, 10.5, 40.0).clamp_to(100, 80).is_none());
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(20.0, 20.0, 30.0, 30.0);

        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&bbox(5.0, 0.0, 15.0, 10.0)) - 1.0 / 3.0).abs() < 1e-6);
    }
}
