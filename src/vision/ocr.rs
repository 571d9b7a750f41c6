//! OCR (Optical Character Recognition) seam
//!
//! The recognition engine itself is external. [`OcrEngine`] is the call the
//! pipeline makes once per variant; [`ReplayOcr`] answers from recorded
//! detections so the pipeline can run deterministically.

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::OcrConfig;

/// Engine parameters passed along with every image
#[derive(Debug, Clone, PartialEq)]
pub struct OcrParams {
    /// Characters the engine may emit
    pub allowlist: String,
    pub text_threshold: f32,
    pub low_text: f32,
    pub link_threshold: f32,
    pub canvas_size: u32,
    pub mag_ratio: f32,
}

impl From<&OcrConfig> for OcrParams {
    fn from(config: &OcrConfig) -> Self {
        Self {
            allowlist: config.allowlist.clone(),
            text_threshold: config.text_threshold,
            low_text: config.low_text,
            link_threshold: config.link_threshold,
            canvas_size: config.canvas_size,
            mag_ratio: config.mag_ratio,
        }
    }
}

impl Default for OcrParams {
    fn default() -> Self {
        Self::from(&OcrConfig::default())
    }
}

/// One OCR call
#[derive(Debug, Clone, Copy)]
pub struct OcrRequest<'a> {
    pub image: &'a DynamicImage,
    /// Label of the variant being read
    pub label: &'a str,
    pub params: &'a OcrParams,
}

/// Single OCR detection result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrDetection {
    /// Bounding polygon points
    #[serde(default)]
    pub bbox: Vec<(f32, f32)>,
    /// Recognized text
    pub text: String,
    /// Recognition confidence
    pub confidence: f32,
}

impl OcrDetection {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox: Vec::new(),
            text: text.into(),
            confidence,
        }
    }

    /// Attach an axis-aligned box
    pub fn with_box(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.bbox = vec![(x, y), (x + width, y), (x + width, y + height), (x, y + height)];
        self
    }

    /// Leftmost x of the polygon, 0 when no box is known
    pub fn left(&self) -> f32 {
        self.bbox
            .iter()
            .map(|(x, _)| *x)
            .reduce(f32::min)
            .unwrap_or(0.0)
    }
}

/// External OCR engine
pub trait OcrEngine: Send + Sync {
    /// Read every text region in the request image
    fn read_text(&self, request: &OcrRequest<'_>) -> Result<Vec<OcrDetection>>;

    fn name(&self) -> &'static str;
}

/// Recorded detections, by variant label
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    /// Returned for labels without their own entry
    #[serde(default)]
    pub default: Vec<OcrDetection>,
    #[serde(default)]
    pub variants: HashMap<String, Vec<OcrDetection>>,
}

/// Deterministic engine replaying a [`Transcript`]
#[derive(Debug, Default)]
pub struct ReplayOcr {
    transcript: Transcript,
    calls: AtomicUsize,
}

impl ReplayOcr {
    pub fn new(transcript: Transcript) -> Self {
        Self {
            transcript,
            calls: AtomicUsize::new(0),
        }
    }

    /// Same detections for every variant
    pub fn uniform(detections: Vec<OcrDetection>) -> Self {
        Self::new(Transcript {
            default: detections,
            variants: HashMap::new(),
        })
    }

    pub fn with_variant(mut self, label: &str, detections: Vec<OcrDetection>) -> Self {
        self.transcript.variants.insert(label.to_string(), detections);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let transcript: Transcript = serde_json::from_str(json).context("Failed to parse OCR transcript")?;
        Ok(Self::new(transcript))
    }

    /// Load a transcript from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript: {:?}", path))?;
        Self::from_json(&content)
    }

    /// Number of `read_text` calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl OcrEngine for ReplayOcr {
    fn read_text(&self, request: &OcrRequest<'_>) -> Result<Vec<OcrDetection>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let detections = self
            .transcript
            .variants
            .get(request.label)
            .unwrap_or(&self.transcript.default);
        Ok(detections.clone())
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn request<'a>(image: &'a DynamicImage, label: &'a str, params: &'a OcrParams) -> OcrRequest<'a> {
        OcrRequest { image, label, params }
    }

    #[test]
    fn test_params_from_config() {
        let params = OcrParams::from(&OcrConfig::default());
        assert_eq!(params.allowlist, "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-.");
        assert_eq!(params.canvas_size, 5000);
    }

    #[test]
    fn test_replay_by_label() {
        let image = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        let params = OcrParams::default();
        let engine = ReplayOcr::uniform(vec![OcrDetection::new("29A12345", 0.9)])
            .with_variant("otsu", vec![]);

        assert_eq!(engine.read_text(&request(&image, "clahe", &params)).unwrap().len(), 1);
        assert!(engine.read_text(&request(&image, "otsu", &params)).unwrap().is_empty());
        assert_eq!(engine.calls(), 2);
    }

    #[test]
    fn test_transcript_json() {
        let engine = ReplayOcr::from_json(
            r#"{
                "default": [{"text": "29A", "confidence": 0.5, "bbox": [[0, 0], [10, 0], [10, 5], [0, 5]]}],
                "variants": {"clahe": [{"text": "29A12345", "confidence": 0.9}]}
            }"#,
        )
        .unwrap();
        let image = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
        let params = OcrParams::default();
        let read = engine.read_text(&request(&image, "original", &params)).unwrap();
        assert_eq!(read[0].bbox.len(), 4);
        let read = engine.read_text(&request(&image, "clahe", &params)).unwrap();
        assert_eq!(read[0].text, "29A12345");

        assert!(ReplayOcr::from_json("not json").is_err());
    }

    #[test]
    fn test_detection_left_edge() {
        assert_eq!(OcrDetection::new("A", 0.5).with_box(12.0, 3.0, 5.0, 5.0).left(), 12.0);
        assert_eq!(OcrDetection::new("A", 0.5).left(), 0.0);
    }
}
