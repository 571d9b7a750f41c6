//! Plate localization
//!
//! The detector model is external and plugs in through [`PlateLocalizer`].
//! Its raw boxes are post-filtered by geometry and cropped with padding
//! here before any OCR work starts.

use anyhow::Result;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PlateRegion;
use crate::config::DetectionConfig;

/// One raw detector box, in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Detector confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Detector class id (0 = one-row plate, otherwise two-row)
    pub class: u32,
}

impl PlateBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Width over height, 0 for degenerate boxes
    pub fn aspect_ratio(&self) -> f32 {
        if self.height() > 0.0 {
            self.width() / self.height()
        } else {
            0.0
        }
    }

    /// Short class tag used in diagnostics
    pub fn class_name(&self) -> &'static str {
        class_name(self.class)
    }
}

/// `BSD` for class 0, `BSV` otherwise
pub fn class_name(class: u32) -> &'static str {
    if class == 0 {
        "BSD"
    } else {
        "BSV"
    }
}

/// External plate detector
pub trait PlateLocalizer: Send + Sync {
    /// Return every candidate box found in the image
    fn locate(&self, image: &DynamicImage) -> Result<Vec<PlateBox>>;

    fn name(&self) -> &'static str;
}

/// Reports the whole image as one plate; for callers that already hold a crop
#[derive(Debug, Clone, Copy, Default)]
pub struct FullFrameLocalizer;

impl PlateLocalizer for FullFrameLocalizer {
    fn locate(&self, image: &DynamicImage) -> Result<Vec<PlateBox>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(vec![]);
        }
        Ok(vec![PlateBox {
            x1: 0.0,
            y1: 0.0,
            x2: width as f32,
            y2: height as f32,
            confidence: 1.0,
            class: 0,
        }])
    }

    fn name(&self) -> &'static str {
        "full_frame"
    }
}

/// Replays a fixed list of boxes for every image
#[derive(Debug, Clone, Default)]
pub struct FixedLocalizer {
    boxes: Vec<PlateBox>,
}

impl FixedLocalizer {
    pub fn new(boxes: Vec<PlateBox>) -> Self {
        Self { boxes }
    }
}

impl PlateLocalizer for FixedLocalizer {
    fn locate(&self, _image: &DynamicImage) -> Result<Vec<PlateBox>> {
        Ok(self.boxes.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Geometry post-filter and padded cropping of detector boxes
#[derive(Debug, Clone, Default)]
pub struct RegionFilter {
    config: DetectionConfig,
}

impl RegionFilter {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Whether a box is confident enough and shaped like a plate
    pub fn accepts(&self, plate: &PlateBox) -> bool {
        let cfg = &self.config;
        let aspect = plate.aspect_ratio();
        plate.confidence >= cfg.conf_threshold
            && aspect >= cfg.aspect_ratio_min
            && aspect <= cfg.aspect_ratio_max
            && plate.width() > cfg.min_width
            && plate.height() > cfg.min_height
    }

    /// Accepted boxes, most confident first
    pub fn select(&self, boxes: &[PlateBox]) -> Vec<PlateBox> {
        let mut accepted: Vec<PlateBox> = boxes.iter().copied().filter(|b| self.accepts(b)).collect();
        accepted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        debug!("{} of {} boxes passed the plate filter", accepted.len(), boxes.len());
        accepted
    }

    /// Crop a box grown by the configured padding, clamped to the image
    pub fn crop(&self, image: &DynamicImage, plate: &PlateBox) -> Option<PlateRegion> {
        let (width, height) = image.dimensions();
        let (x1, y1) = (plate.x1.max(0.0) as u32, plate.y1.max(0.0) as u32);
        let (x2, y2) = (plate.x2.max(0.0) as u32, plate.y2.max(0.0) as u32);

        let pad_w = (x2.saturating_sub(x1) as f32 * self.config.padding) as u32;
        let pad_h = (y2.saturating_sub(y1) as f32 * self.config.padding) as u32;

        let left = x1.saturating_sub(pad_w);
        let top = y1.saturating_sub(pad_h);
        let right = (x2 + pad_w).min(width);
        let bottom = (y2 + pad_h).min(height);
        if right <= left || bottom <= top {
            return None;
        }

        let bounds = (left, top, right - left, bottom - top);
        Some(PlateRegion {
            image: image.crop_imm(bounds.0, bounds.1, bounds.2, bounds.3),
            bounds,
            detector_confidence: plate.confidence,
            class: plate.class,
        })
    }

    /// Best accepted box, cropped
    pub fn best_region(&self, image: &DynamicImage, boxes: &[PlateBox]) -> Option<PlateRegion> {
        self.select(boxes)
            .iter()
            .find_map(|plate| self.crop(image, plate))
    }
}
