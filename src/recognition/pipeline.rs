//! Detection orchestration
//!
//! Composes localization, variant generation, OCR collection and
//! resolution into one call per image. Each call moves through
//! `Localized -> VariantsGenerated -> ObservationsCollected -> Resolved`;
//! "no plate" and "plate but no text" are ordinary results, not errors.

use image::DynamicImage;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::collector::{Collection, Collector};
use super::resolver::{ConfidenceBreakdown, Extraction, Resolver, ScoringContext};
use crate::config::RecognizerConfig;
use crate::error::{RecognizeError, Result};
use crate::plate::{ConfusionCorrector, TextCorrector};
use crate::vision::detection::class_name;
use crate::vision::{
    strategy_from_config, FullFrameLocalizer, ImageSource, OcrEngine, OcrParams, OcrRequest,
    PlateBox, PlateLocalizer, PlateRegion, RegionFilter, VariantStrategy,
};

/// Progress of one detection call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStage {
    Localized,
    VariantsGenerated,
    ObservationsCollected,
    Resolved,
}

impl fmt::Display for DetectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectionStage::Localized => "localized",
            DetectionStage::VariantsGenerated => "variants_generated",
            DetectionStage::ObservationsCollected => "observations_collected",
            DetectionStage::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

/// Why no plate text was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundReason {
    /// The detector returned no acceptable box
    NoLocalization,
    /// A plate was located but no reading survived filtering
    OcrEmpty,
}

/// Caller-facing diagnostic tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum DiagnosticLabel {
    /// Plate read; carries the detector class tag
    Detected(&'static str),
    NoDetection,
    DetectedButOcrFailed,
}

impl fmt::Display for DiagnosticLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLabel::Detected(class) => write!(f, "detected_{}", class),
            DiagnosticLabel::NoDetection => f.write_str("no_detection"),
            DiagnosticLabel::DetectedButOcrFailed => f.write_str("detected_but_ocr_failed"),
        }
    }
}

impl From<DiagnosticLabel> for String {
    fn from(label: DiagnosticLabel) -> Self {
        label.to_string()
    }
}

/// A successfully read plate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateReading {
    pub text: String,
    pub confidence: f32,
    /// Detector class id of the plate box
    pub class: u32,
    /// Crop rectangle in the source image (x, y, width, height)
    pub bounds: (u32, u32, u32, u32),
    pub breakdown: ConfidenceBreakdown,
    pub variants_processed: usize,
    pub variant_count: usize,
    pub early_stopped: bool,
}

/// Outcome of one detection call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Recognition {
    Found(PlateReading),
    NotFound {
        reason: NotFoundReason,
        /// Detector confidence when a plate was located, otherwise 0
        confidence: f32,
    },
}

impl Recognition {
    pub fn is_found(&self) -> bool {
        matches!(self, Recognition::Found(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Recognition::Found(reading) => Some(&reading.text),
            Recognition::NotFound { .. } => None,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Recognition::Found(reading) => reading.confidence,
            Recognition::NotFound { confidence, .. } => *confidence,
        }
    }

    pub fn label(&self) -> DiagnosticLabel {
        match self {
            Recognition::Found(reading) => DiagnosticLabel::Detected(class_name(reading.class)),
            Recognition::NotFound {
                reason: NotFoundReason::NoLocalization,
                ..
            } => DiagnosticLabel::NoDetection,
            Recognition::NotFound {
                reason: NotFoundReason::OcrEmpty,
                ..
            } => DiagnosticLabel::DetectedButOcrFailed,
        }
    }

    /// `(text, confidence, label)` as consumed by GUI and web callers
    pub fn into_parts(self) -> (Option<String>, f32, DiagnosticLabel) {
        let label = self.label();
        match self {
            Recognition::Found(reading) => (Some(reading.text), reading.confidence, label),
            Recognition::NotFound { confidence, .. } => (None, confidence, label),
        }
    }
}

/// End-to-end plate recognizer
pub struct Recognizer {
    config: RecognizerConfig,
    localizer: Box<dyn PlateLocalizer>,
    engine: Box<dyn OcrEngine>,
    variants: Box<dyn VariantStrategy>,
    filter: RegionFilter,
    resolver: Resolver,
    params: OcrParams,
}

impl Recognizer {
    /// Create a recognizer around an OCR engine, treating every image as a plate crop
    pub fn new(config: RecognizerConfig, engine: Box<dyn OcrEngine>) -> Self {
        let resolver = Self::build_resolver(&config, Arc::new(ConfusionCorrector::new(config.correction.clone())));
        Self {
            localizer: Box::new(FullFrameLocalizer),
            variants: strategy_from_config(&config.preprocessing),
            filter: RegionFilter::new(config.detection.clone()),
            params: OcrParams::from(&config.ocr),
            engine,
            resolver,
            config,
        }
    }

    fn build_resolver(config: &RecognizerConfig, corrector: Arc<dyn TextCorrector>) -> Resolver {
        Resolver::with_corrector(
            config.scoring.clone(),
            config.ocr.clone(),
            config.validation.clone(),
            corrector,
        )
    }

    /// Use an external plate detector
    pub fn with_localizer(mut self, localizer: Box<dyn PlateLocalizer>) -> Self {
        self.localizer = localizer;
        self
    }

    /// Replace the variant generator
    pub fn with_variant_strategy(mut self, strategy: Box<dyn VariantStrategy>) -> Self {
        self.variants = strategy;
        self
    }

    /// Replace the text corrector
    pub fn with_corrector(mut self, corrector: Arc<dyn TextCorrector>) -> Self {
        self.resolver = Self::build_resolver(&self.config, corrector);
        self
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Locate and read the plate in an image
    pub fn detect(&self, source: &ImageSource) -> Result<Recognition> {
        let image = source.load()?;
        let boxes = self
            .localizer
            .locate(&image)
            .map_err(RecognizeError::localization)?;
        debug!("{} returned {} boxes", self.localizer.name(), boxes.len());
        self.detect_localized(&image, &boxes)
    }

    /// Read the plate given detector boxes for the image
    pub fn detect_localized(&self, image: &DynamicImage, boxes: &[PlateBox]) -> Result<Recognition> {
        let Some(region) = self.filter.best_region(image, boxes) else {
            info!("No plate localized");
            return Ok(Recognition::NotFound {
                reason: NotFoundReason::NoLocalization,
                confidence: 0.0,
            });
        };
        self.recognize_region(&region)
    }

    /// Read an already cropped plate region
    pub fn recognize_region(&self, region: &PlateRegion) -> Result<Recognition> {
        debug!(
            "Stage {}: {}x{} crop, detector confidence {:.3}",
            DetectionStage::Localized,
            region.image.width(),
            region.image.height(),
            region.detector_confidence
        );

        let variants = self.variants.generate(region);
        debug!(
            "Stage {}: {} variants from {}",
            DetectionStage::VariantsGenerated,
            variants.len(),
            self.variants.name()
        );

        let context = ScoringContext {
            detector_confidence: region.detector_confidence,
            variant_count: variants.len(),
        };
        let collector = Collector::new(
            self.engine.as_ref(),
            &self.resolver,
            &self.params,
            &self.config.ocr,
            &self.config.early_stop,
        );
        let Collection {
            observations,
            variants_processed,
            variant_count,
            early_stopped,
        } = collector.collect(&variants, &context)?;
        debug!(
            "Stage {}: {} observations from {} variants",
            DetectionStage::ObservationsCollected,
            observations.len(),
            variants_processed
        );

        if observations.is_empty() {
            info!("Plate located but no reading survived filtering");
            return Ok(Recognition::NotFound {
                reason: NotFoundReason::OcrEmpty,
                confidence: region.detector_confidence,
            });
        }

        let resolution = self.resolver.resolve_with(&observations, &context);
        info!(
            "Stage {}: '{}' at {:.3}",
            DetectionStage::Resolved,
            resolution.text,
            resolution.confidence
        );

        Ok(Recognition::Found(PlateReading {
            text: resolution.text,
            confidence: resolution.confidence,
            class: region.class,
            bounds: region.bounds,
            breakdown: resolution.breakdown,
            variants_processed,
            variant_count,
            early_stopped,
        }))
    }

    /// Single OCR pass over a plate crop, without variants or voting
    pub fn read_plate(&self, source: &ImageSource) -> Result<Option<Extraction>> {
        let image = source.load()?;
        let request = OcrRequest {
            image: &image,
            label: "original",
            params: &self.params,
        };
        let detections = self
            .engine
            .read_text(&request)
            .map_err(|e| RecognizeError::ocr("original", e))?;
        Ok(self.resolver.extract(&detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VariantStrategyKind;
    use crate::plate::PassthroughCorrector;
    use crate::vision::detection::FixedLocalizer;
    use crate::vision::{OcrDetection, ReplayOcr};
    use image::{GrayImage, Luma};

    fn fast_config() -> RecognizerConfig {
        let mut config = RecognizerConfig::default();
        config.preprocessing.denoise_template = 3;
        config.preprocessing.denoise_search = 5;
        config
    }

    /// Sharp enough to stay on the five core variants
    fn plate_image() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(120, 40, |x, y| {
            Luma([if (x + y) % 2 == 0 { 230 } else { 20 }])
        }))
    }

    fn scene() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(640, 480, Luma([90])))
    }

    fn plate_box(class: u32) -> PlateBox {
        PlateBox {
            x1: 100.0,
            y1: 100.0,
            x2: 300.0,
            y2: 160.0,
            confidence: 0.8,
            class,
        }
    }

    #[test]
    fn test_detect_full_frame_reads_plate() {
        let engine = ReplayOcr::uniform(vec![OcrDetection::new("29A12345", 0.85)])
            .with_variant("otsu", vec![OcrDetection::new("30B9999", 0.6)]);
        let recognizer = Recognizer::new(fast_config(), Box::new(engine));

        let recognition = recognizer.detect(&ImageSource::from(plate_image())).unwrap();
        assert!(recognition.is_found());
        assert_eq!(recognition.text(), Some("29A-123.45"));
        assert!(recognition.confidence() > 0.85);
        assert!(recognition.confidence() <= 0.99);
        assert_eq!(recognition.label().to_string(), "detected_BSD");
    }

    #[test]
    fn test_detect_without_localization() {
        let recognizer = Recognizer::new(fast_config(), Box::new(ReplayOcr::default()))
            .with_localizer(Box::new(FixedLocalizer::new(vec![])));

        let (text, confidence, label) = recognizer
            .detect(&ImageSource::from(scene()))
            .unwrap()
            .into_parts();
        assert_eq!(text, None);
        assert_eq!(confidence, 0.0);
        assert_eq!(label, DiagnosticLabel::NoDetection);
    }

    #[test]
    fn test_detect_rejects_badly_shaped_boxes() {
        let square = PlateBox {
            x2: 200.0,
            y2: 200.0,
            ..plate_box(0)
        };
        let recognizer = Recognizer::new(fast_config(), Box::new(ReplayOcr::default()));
        let recognition = recognizer.detect_localized(&scene(), &[square]).unwrap();
        assert_eq!(recognition.label(), DiagnosticLabel::NoDetection);
    }

    #[test]
    fn test_detect_ocr_empty_keeps_detector_confidence() {
        let engine = ReplayOcr::uniform(vec![OcrDetection::new("KHNGPHTHINCBINS", 0.915)]);
        let recognizer = Recognizer::new(fast_config(), Box::new(engine))
            .with_localizer(Box::new(FixedLocalizer::new(vec![plate_box(1)])));

        let recognition = recognizer.detect(&ImageSource::from(scene())).unwrap();
        assert_eq!(
            recognition,
            Recognition::NotFound {
                reason: NotFoundReason::OcrEmpty,
                confidence: 0.8
            }
        );
        assert_eq!(recognition.label().to_string(), "detected_but_ocr_failed");
    }

    #[test]
    fn test_detect_localized_crop_and_class() {
        let engine = ReplayOcr::uniform(vec![OcrDetection::new("51F67890", 0.9)]);
        let recognizer = Recognizer::new(fast_config(), Box::new(engine))
            .with_localizer(Box::new(FixedLocalizer::new(vec![plate_box(1)])));

        match recognizer.detect(&ImageSource::from(scene())).unwrap() {
            Recognition::Found(reading) => {
                assert_eq!(reading.text, "51F-678.90");
                // 20% padding on a 200x60 box
                assert_eq!(reading.bounds, (60, 88, 280, 84));
                assert_eq!(reading.class, 1);
                assert!((reading.breakdown.detector_confidence - 0.8).abs() < 1e-6);
            }
            other => panic!("expected a plate, got {other:?}"),
        }
    }

    #[test]
    fn test_localized_scoring_mode() {
        let mut config = fast_config();
        config.scoring.mode = crate::config::ScoringMode::Localized;
        config.early_stop.enabled = false;
        let engine = ReplayOcr::uniform(vec![OcrDetection::new("29A12345", 0.9)]);
        let recognizer = Recognizer::new(config, Box::new(engine));

        let Recognition::Found(reading) = recognizer.detect(&ImageSource::from(plate_image())).unwrap() else {
            panic!("expected a plate");
        };
        // 5 of 5 variants agree
        assert!((reading.breakdown.vote_ratio - 1.0).abs() < 1e-6);
        // 0.2 + 0.36 + 0.135 + 0.09 + 0.15 + 0.05
        assert!((reading.confidence - 0.985).abs() < 1e-4);
    }

    #[test]
    fn test_early_stop_reported() {
        let mut config = fast_config();
        config.preprocessing.strategy = VariantStrategyKind::Adaptive;
        config.early_stop.min_votes = 3;
        let engine = ReplayOcr::uniform(vec![OcrDetection::new("29A12345", 0.95)]);
        let recognizer = Recognizer::new(config, Box::new(engine));

        let Recognition::Found(reading) = recognizer.detect(&ImageSource::from(plate_image())).unwrap() else {
            panic!("expected a plate");
        };
        assert!(reading.early_stopped);
        assert_eq!(reading.variants_processed, 3);
        assert_eq!(reading.variant_count, 5);
    }

    #[test]
    fn test_decode_failure_is_error() {
        let recognizer = Recognizer::new(fast_config(), Box::new(ReplayOcr::default()));
        let err = recognizer.detect(&ImageSource::Encoded(vec![0, 1, 2])).unwrap_err();
        assert!(matches!(err, RecognizeError::ImageDecode(_)));
    }

    struct BrokenLocalizer;

    impl PlateLocalizer for BrokenLocalizer {
        fn locate(&self, _image: &DynamicImage) -> anyhow::Result<Vec<PlateBox>> {
            anyhow::bail!("model file missing")
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[test]
    fn test_localizer_failure_is_error() {
        let recognizer = Recognizer::new(fast_config(), Box::new(ReplayOcr::default()))
            .with_localizer(Box::new(BrokenLocalizer));
        let err = recognizer.detect(&ImageSource::from(scene())).unwrap_err();
        assert!(err.to_string().contains("model file missing"));
    }

    #[test]
    fn test_read_plate_single_pass() {
        let engine = ReplayOcr::uniform(vec![OcrDetection::new("30B9999", 0.8)]);
        let recognizer = Recognizer::new(fast_config(), Box::new(engine));

        let extraction = recognizer
            .read_plate(&ImageSource::from(plate_image()))
            .unwrap()
            .unwrap();
        assert_eq!(extraction.text, "30B9999");

        let recognizer = Recognizer::new(
            fast_config(),
            Box::new(ReplayOcr::uniform(vec![OcrDetection::new("KHNGPHTHINCBINS", 0.915)])),
        );
        assert!(recognizer
            .read_plate(&ImageSource::from(plate_image()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_passthrough_corrector_skips_digit_rewrites() {
        let detections = vec![OcrDetection::new("29A24567", 0.5), OcrDetection::new("2467", 0.95)];
        let recognizer = Recognizer::new(fast_config(), Box::new(ReplayOcr::uniform(detections.clone())));
        let corrected = recognizer.detect(&ImageSource::from(plate_image())).unwrap();
        assert_eq!(corrected.text(), Some("29A-246.67"));

        let recognizer = Recognizer::new(fast_config(), Box::new(ReplayOcr::uniform(detections)))
            .with_corrector(Arc::new(PassthroughCorrector));
        let raw = recognizer.detect(&ImageSource::from(plate_image())).unwrap();
        assert_eq!(raw.text(), Some("29A-245.67"));
    }

    #[test]
    fn test_diagnostic_labels_render() {
        assert_eq!(DiagnosticLabel::Detected("BSV").to_string(), "detected_BSV");
        assert_eq!(DiagnosticLabel::NoDetection.to_string(), "no_detection");
        let json = serde_json::to_string(&DiagnosticLabel::DetectedButOcrFailed).unwrap();
        assert_eq!(json, "\"detected_but_ocr_failed\"");
    }
}
