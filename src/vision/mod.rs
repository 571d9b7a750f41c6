//! Vision Layer
//!
//! Image inputs, plate crops and the renderings handed to OCR.
//! The detector and the OCR engine themselves are external; this layer
//! only defines their seams:
//! - [`detection::PlateLocalizer`] for plate boxes
//! - [`ocr::OcrEngine`] for text readings

pub mod detection;
pub mod enhance;
pub mod filters;
pub mod ocr;
pub mod variants;

use image::DynamicImage;
use std::path::PathBuf;

use crate::error::Result;

pub use detection::{
    class_name, FixedLocalizer, FullFrameLocalizer, PlateBox, PlateLocalizer, RegionFilter,
};
pub use ocr::{OcrDetection, OcrEngine, OcrParams, OcrRequest, ReplayOcr, Transcript};
pub use variants::{
    strategy_from_config, AdaptiveVariants, ExhaustiveVariants, ImageQuality, VariantStrategy,
};

/// Any of the image forms callers hand in
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A file on disk
    Path(PathBuf),
    /// Encoded bytes (PNG, JPEG, ...)
    Encoded(Vec<u8>),
    /// An already decoded pixel buffer
    Pixels(DynamicImage),
}

impl ImageSource {
    /// Decode into a pixel buffer.
    ///
    /// Unreadable files are `Io` errors; bytes that are not an image are
    /// `ImageDecode` errors.
    pub fn load(&self) -> Result<DynamicImage> {
        let image = match self {
            ImageSource::Path(path) => image::load_from_memory(&std::fs::read(path)?)?,
            ImageSource::Encoded(bytes) => image::load_from_memory(bytes)?,
            ImageSource::Pixels(image) => image.clone(),
        };
        Ok(image)
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(image: DynamicImage) -> Self {
        ImageSource::Pixels(image)
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Encoded(bytes)
    }
}

/// A plate crop cut from a source image
#[derive(Debug, Clone)]
pub struct PlateRegion {
    /// Cropped pixels
    pub image: DynamicImage,
    /// Crop rectangle in the source image (x, y, width, height)
    pub bounds: (u32, u32, u32, u32),
    /// Detector confidence (0.0 - 1.0)
    pub detector_confidence: f32,
    /// Detector class id
    pub class: u32,
}

impl PlateRegion {
    /// Treat a whole image as the plate
    pub fn full_frame(image: DynamicImage) -> Self {
        let bounds = (0, 0, image.width(), image.height());
        Self {
            image,
            bounds,
            detector_confidence: 1.0,
            class: 0,
        }
    }
}

/// One rendering of a plate crop
#[derive(Debug, Clone)]
pub struct Variant {
    pub image: DynamicImage,
    /// Short tag naming the transform, e.g. `clahe`
    pub label: String,
}

impl Variant {
    pub fn new(label: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            image,
            label: label.into(),
        }
    }
}
