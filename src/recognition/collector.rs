//! OCR observation collection
//!
//! Runs the OCR engine once per variant, in order, and keeps the readings
//! that survive the confidence, length and grammar filters. Collection may
//! stop early at a variant boundary once one reading clearly dominates.

use tracing::{debug, info};

use super::resolver::{Observation, Resolver, ScoringContext};
use crate::config::{EarlyStopConfig, OcrConfig};
use crate::error::{RecognizeError, Result};
use crate::plate::{has_valid_components, CharConfidence, PlateGrammar};
use crate::vision::{OcrDetection, OcrEngine, OcrParams, OcrRequest, Variant};

/// Candidates within this share of the top confidence trigger a position combine
const NEAR_TIE_RATIO: f32 = 0.9;

/// Observations gathered for one detection call
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub observations: Vec<Observation>,
    /// Variants that went through OCR
    pub variants_processed: usize,
    /// Variants available
    pub variant_count: usize,
    pub early_stopped: bool,
}

impl Collection {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Per-call OCR driver
pub struct Collector<'a> {
    engine: &'a dyn OcrEngine,
    resolver: &'a Resolver,
    params: &'a OcrParams,
    ocr: &'a OcrConfig,
    early_stop: &'a EarlyStopConfig,
}

impl<'a> Collector<'a> {
    pub fn new(
        engine: &'a dyn OcrEngine,
        resolver: &'a Resolver,
        params: &'a OcrParams,
        ocr: &'a OcrConfig,
        early_stop: &'a EarlyStopConfig,
    ) -> Self {
        Self {
            engine,
            resolver,
            params,
            ocr,
            early_stop,
        }
    }

    /// OCR every variant until done or until early stopping triggers.
    ///
    /// An engine failure aborts the call; no partial result is returned.
    pub fn collect(&self, variants: &[Variant], context: &ScoringContext) -> Result<Collection> {
        let mut collection = Collection {
            variant_count: variants.len(),
            ..Collection::default()
        };

        for variant in variants {
            let request = OcrRequest {
                image: &variant.image,
                label: &variant.label,
                params: self.params,
            };
            let detections = self
                .engine
                .read_text(&request)
                .map_err(|e| RecognizeError::ocr(&variant.label, e))?;

            let observations = self.observe(&detections, &variant.label);
            debug!(
                "Variant '{}': {} detections, {} kept",
                variant.label,
                detections.len(),
                observations.len()
            );
            collection.observations.extend(observations);
            collection.variants_processed += 1;

            if self.should_stop(&collection.observations, context) {
                info!(
                    "Early stop after {}/{} variants",
                    collection.variants_processed,
                    variants.len()
                );
                collection.early_stopped = true;
                break;
            }
        }

        Ok(collection)
    }

    /// Filter and normalize one variant's detections
    pub fn observe(&self, detections: &[OcrDetection], label: &str) -> Vec<Observation> {
        let grammar = self.resolver.grammar();
        let corrector = self.resolver.corrector();
        let confidences =
            CharConfidence::from_readings(detections.iter().map(|d| (d.text.as_str(), d.confidence)));

        let mut kept: Vec<Observation> = Vec::new();
        for det in detections {
            if det.confidence <= self.ocr.confidence_floor {
                continue;
            }
            let corrected = corrector.correct_raw(det.text.trim());
            let cleaned = PlateGrammar::clean(&corrected);
            if !grammar.is_plausible_length(&cleaned) || !has_valid_components(&cleaned) {
                continue;
            }

            let formatted = PlateGrammar::format(&cleaned);
            if !grammar.validate(&formatted) {
                continue;
            }
            let text = corrector.correct_candidate(&formatted, &confidences);
            kept.push(Observation::new(text, det.confidence, label));
        }

        if kept.len() > 1 {
            let top = kept.iter().map(|o| o.confidence).fold(0.0, f32::max);
            let near_ties = kept.iter().filter(|o| o.confidence >= top * NEAR_TIE_RATIO).count();
            if near_ties > 1 {
                if let Some(combined) = self.resolver.combine_by_position(detections, &confidences) {
                    debug!("Variant '{}': combined reading '{}' replaces {} candidates", label, combined, kept.len());
                    return vec![Observation::new(combined, top, label)];
                }
            }
        }

        kept
    }

    /// Whether the leading reading is strong enough to skip remaining variants
    fn should_stop(&self, observations: &[Observation], context: &ScoringContext) -> bool {
        let cfg = self.early_stop;
        if !cfg.enabled || observations.len() < cfg.min_votes {
            return false;
        }
        let resolution = self.resolver.resolve_with(observations, context);
        resolution.breakdown.vote_count >= cfg.min_votes && resolution.confidence >= cfg.confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::ReplayOcr;
    use image::{DynamicImage, GrayImage};

    fn variants(labels: &[&str]) -> Vec<Variant> {
        labels
            .iter()
            .map(|label| Variant::new(*label, DynamicImage::ImageLuma8(GrayImage::new(4, 4))))
            .collect()
    }

    struct Fixture {
        resolver: Resolver,
        params: OcrParams,
        ocr: OcrConfig,
        early_stop: EarlyStopConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                resolver: Resolver::default(),
                params: OcrParams::default(),
                ocr: OcrConfig::default(),
                early_stop: EarlyStopConfig::default(),
            }
        }

        fn collector<'a>(&'a self, engine: &'a dyn OcrEngine) -> Collector<'a> {
            Collector::new(engine, &self.resolver, &self.params, &self.ocr, &self.early_stop)
        }
    }

    #[test]
    fn test_observe_filters_garbage() {
        let fixture = Fixture::new();
        let engine = ReplayOcr::default();
        let collector = fixture.collector(&engine);

        let detections = [
            OcrDetection::new("KHNGPHTHINCBINS", 0.915),
            OcrDetection::new("29A12345", 0.05),
            OcrDetection::new("1234567", 0.9),
            OcrDetection::new("29A1", 0.9),
        ];
        assert!(collector.observe(&detections, "original").is_empty());
    }

    #[test]
    fn test_observe_formats_valid_readings() {
        let fixture = Fixture::new();
        let engine = ReplayOcr::default();
        let collector = fixture.collector(&engine);

        let kept = collector.observe(&[OcrDetection::new(" 29a 123,45 ", 0.8)], "clahe");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "29A-123.45");
        assert_eq!(kept[0].source, "clahe");
        assert!(kept[0].valid);
    }

    #[test]
    fn test_observe_applies_digit_correction() {
        let fixture = Fixture::new();
        let engine = ReplayOcr::default();
        let collector = fixture.collector(&engine);

        // the short fragment is dropped but vouches for its digits
        let detections = [OcrDetection::new("29A24567", 0.5), OcrDetection::new("2467", 0.95)];
        let kept = collector.observe(&detections, "otsu");
        assert_eq!(kept.len(), 1);
        // only '5' stays at 0.5, between even digits
        assert_eq!(kept[0].text, "29A-246.67");
    }

    #[test]
    fn test_collect_runs_every_variant() {
        let fixture = Fixture::new();
        let engine = ReplayOcr::uniform(vec![OcrDetection::new("29A12345", 0.6)])
            .with_variant("otsu", vec![OcrDetection::new("30B9999", 0.7)]);
        let collector = fixture.collector(&engine);

        let collection = collector
            .collect(&variants(&["original", "clahe", "otsu"]), &ScoringContext::default())
            .unwrap();
        assert_eq!(collection.variants_processed, 3);
        assert_eq!(collection.observations.len(), 3);
        assert!(!collection.early_stopped);
        assert_eq!(engine.calls(), 3);
    }

    #[test]
    fn test_collect_stops_early_on_consensus() {
        let fixture = Fixture::new();
        let engine = ReplayOcr::uniform(vec![OcrDetection::new("29A12345", 0.95)]);
        let collector = fixture.collector(&engine);

        let labels = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let collection = collector
            .collect(&variants(&labels), &ScoringContext::default())
            .unwrap();
        assert!(collection.early_stopped);
        assert_eq!(collection.variants_processed, 5);
        assert_eq!(engine.calls(), 5);
    }

    #[test]
    fn test_collect_without_early_stop() {
        let mut fixture = Fixture::new();
        fixture.early_stop.enabled = false;
        let engine = ReplayOcr::uniform(vec![OcrDetection::new("29A12345", 0.95)]);
        let collector = fixture.collector(&engine);

        let collection = collector
            .collect(&variants(&["a", "b", "c", "d", "e", "f"]), &ScoringContext::default())
            .unwrap();
        assert_eq!(collection.variants_processed, 6);
    }

    #[test]
    fn test_collect_empty_when_nothing_validates() {
        let fixture = Fixture::new();
        let engine = ReplayOcr::uniform(vec![OcrDetection::new("KHNGPHTHINCBINS", 0.915)]);
        let collector = fixture.collector(&engine);

        let collection = collector
            .collect(&variants(&["a", "b"]), &ScoringContext::default())
            .unwrap();
        assert!(collection.is_empty());
        assert_eq!(collection.variants_processed, 2);
    }

    struct FailingOcr;

    impl OcrEngine for FailingOcr {
        fn read_text(&self, _request: &OcrRequest<'_>) -> anyhow::Result<Vec<OcrDetection>> {
            anyhow::bail!("engine crashed")
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_engine_failure_propagates() {
        let fixture = Fixture::new();
        let collector = fixture.collector(&FailingOcr);

        let err = collector
            .collect(&variants(&["clahe"]), &ScoringContext::default())
            .unwrap_err();
        match err {
            RecognizeError::Ocr { label, message } => {
                assert_eq!(label, "clahe");
                assert!(message.contains("engine crashed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
