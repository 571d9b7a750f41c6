//! Result resolution
//!
//! Turns many `(text, confidence)` observations of one plate into a single
//! answer with a blended score. The score is a ranking heuristic, not a
//! probability: it rises with votes, with agreement between the matching
//! confidences and with grammar validity, and it never exceeds the
//! configured cap (0.99 by default).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::{OcrConfig, ScoringConfig, ScoringMode, Tier, ValidationConfig};
use crate::plate::{has_valid_components, CharConfidence, ConfusionCorrector, PlateGrammar, TextCorrector};
use crate::vision::OcrDetection;

/// Text reported when nothing usable was read
pub const NOT_DETECTED: &str = "no plate detected";

/// Cleaned length a position-combined reading must have
const COMBINED_MIN_LEN: usize = 7;
const COMBINED_MAX_LEN: usize = 12;
/// Candidates scoring at least this share of the top confidence count as a near tie
const NEAR_TIE_RATIO: f32 = 0.9;
/// Single-pass extraction rejects readings with more letters than this
const EXTRACT_MAX_LETTERS: usize = 4;
/// Single-pass extraction rejects readings with fewer digits than this
const EXTRACT_MIN_DIGITS: usize = 3;

/// One normalized OCR reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub text: String,
    /// OCR confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Label of the variant the reading came from
    #[serde(default)]
    pub source: String,
    /// Cleared by callers to keep a reading out of the vote; the plate
    /// grammar is checked by the resolver regardless
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

impl Observation {
    pub fn new(text: impl Into<String>, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence,
            source: source.into(),
            valid: true,
        }
    }

    /// A reading excluded from voting
    pub fn invalid(text: impl Into<String>, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            valid: false,
            ..Self::new(text, confidence, source)
        }
    }
}

/// Facts about the detection call the localized score blends in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringContext {
    /// Detector confidence of the plate box
    pub detector_confidence: f32,
    /// Number of variants generated; 0 means "use the observation count"
    pub variant_count: usize,
}

impl Default for ScoringContext {
    fn default() -> Self {
        Self {
            detector_confidence: 1.0,
            variant_count: 0,
        }
    }
}

/// Every term that went into a score
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfidenceBreakdown {
    pub detector_confidence: f32,
    pub best_ocr_conf: f32,
    pub avg_ocr_conf: f32,
    pub median_ocr_conf: f32,
    pub vote_count: usize,
    pub vote_ratio: f32,
    pub vote_bonus: f32,
    pub consistency_bonus: f32,
    pub length_bonus: f32,
    pub quality_penalty: f32,
    pub std_dev: f32,
    /// Majority multiplier applied
    pub majority: bool,
}

/// How a resolution was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// Winner of the vote among valid readings
    Vote,
    /// Nothing validated; best raw reading at a penalty
    Fallback,
    /// No observations at all
    Empty,
}

/// Resolver output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub text: String,
    pub confidence: f32,
    pub kind: ResolutionKind,
    pub breakdown: ConfidenceBreakdown,
}

impl Resolution {
    fn empty() -> Self {
        Self {
            text: NOT_DETECTED.to_string(),
            confidence: 0.0,
            kind: ResolutionKind::Empty,
            breakdown: ConfidenceBreakdown::default(),
        }
    }

    pub fn is_detected(&self) -> bool {
        self.kind != ResolutionKind::Empty
    }
}

/// Best reading of a single OCR pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub text: String,
    /// OCR confidence of the leading candidate
    pub confidence: f32,
    /// Whether the text came from combining fragments by position
    pub combined: bool,
}

/// Text of the winning group with its confidences in arrival order
#[derive(Debug, Clone)]
struct PlateCandidate<'a> {
    text: &'a str,
    confidences: Vec<f32>,
}

impl PlateCandidate<'_> {
    fn votes(&self) -> usize {
        self.confidences.len()
    }

    fn best(&self) -> f32 {
        self.confidences.iter().copied().fold(f32::MIN, f32::max)
    }
}

/// Group grammar-valid observations by exact text. The largest group wins,
/// then the one with the higher best confidence, then the one seen first.
fn leading_candidate<'a>(
    observations: &'a [Observation],
    grammar: &PlateGrammar,
) -> Option<PlateCandidate<'a>> {
    let mut groups: Vec<PlateCandidate<'a>> = Vec::new();
    for obs in observations.iter().filter(|o| o.valid && grammar.validate(&o.text)) {
        match groups.iter_mut().find(|g| g.text == obs.text) {
            Some(group) => group.confidences.push(obs.confidence),
            None => groups.push(PlateCandidate {
                text: &obs.text,
                confidences: vec![obs.confidence],
            }),
        }
    }

    let mut leader: Option<PlateCandidate<'a>> = None;
    for group in groups {
        let better = match &leader {
            None => true,
            Some(current) => {
                group.votes() > current.votes()
                    || (group.votes() == current.votes() && group.best() > current.best())
            }
        };
        if better {
            leader = Some(group);
        }
    }
    leader
}

/// Summary statistics of the matching confidences
#[derive(Debug, Clone, Copy)]
struct Stats {
    best: f32,
    avg: f32,
    /// Upper median
    median: f32,
    /// Population standard deviation
    std_dev: f32,
}

impl Stats {
    fn of(values: &[f32]) -> Self {
        let n = values.len().max(1) as f32;
        let best = values.iter().copied().fold(0.0, f32::max);
        let avg = values.iter().sum::<f32>() / n;

        let mut sorted = values.to_vec();
        sorted.sort_by(f32::total_cmp);
        let median = sorted.get(sorted.len() / 2).copied().unwrap_or(0.0);

        let std_dev = if values.len() > 1 {
            (values.iter().map(|v| (v - avg).powi(2)).sum::<f32>() / n).sqrt()
        } else {
            0.0
        };

        Self {
            best,
            avg,
            median,
            std_dev,
        }
    }
}

/// First tier whose threshold the value reaches (tiers in descending order)
fn tier_at_least(tiers: &[Tier], value: f32) -> Option<f32> {
    tiers.iter().find(|t| value >= t.threshold).map(|t| t.value)
}

/// First tier whose threshold the value stays under (tiers in ascending order)
fn tier_below(tiers: &[Tier], value: f32) -> Option<f32> {
    tiers.iter().find(|t| value < t.threshold).map(|t| t.value)
}

/// Voting engine over OCR observations
#[derive(Clone)]
pub struct Resolver {
    scoring: ScoringConfig,
    ocr: OcrConfig,
    grammar: PlateGrammar,
    corrector: Arc<dyn TextCorrector>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(ScoringConfig::default(), OcrConfig::default(), ValidationConfig::default())
    }
}

impl Resolver {
    /// Create a resolver with the confusion corrector
    pub fn new(scoring: ScoringConfig, ocr: OcrConfig, validation: ValidationConfig) -> Self {
        Self::with_corrector(scoring, ocr, validation, Arc::new(ConfusionCorrector::default()))
    }

    pub fn with_corrector(
        scoring: ScoringConfig,
        ocr: OcrConfig,
        validation: ValidationConfig,
        corrector: Arc<dyn TextCorrector>,
    ) -> Self {
        Self {
            scoring,
            ocr,
            grammar: PlateGrammar::new(validation),
            corrector,
        }
    }

    pub fn grammar(&self) -> &PlateGrammar {
        &self.grammar
    }

    pub fn corrector(&self) -> &dyn TextCorrector {
        self.corrector.as_ref()
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Resolve with no detector context
    pub fn resolve(&self, observations: &[Observation]) -> Resolution {
        self.resolve_with(observations, &ScoringContext::default())
    }

    /// Resolve observations into one answer using the configured scoring mode
    pub fn resolve_with(&self, observations: &[Observation], context: &ScoringContext) -> Resolution {
        if observations.is_empty() {
            return Resolution::empty();
        }

        let Some(leader) = leading_candidate(observations, &self.grammar) else {
            return self.fallback(observations);
        };

        let stats = Stats::of(&leader.confidences);
        let (confidence, breakdown) = match self.scoring.mode {
            ScoringMode::Consensus => self.consensus_score(&leader, &stats, observations.len(), context),
            ScoringMode::Localized => self.localized_score(&leader, &stats, observations.len(), context),
        };

        debug!(
            "Resolved '{}' with {} of {} votes, confidence {:.3}",
            leader.text,
            leader.votes(),
            observations.len(),
            confidence
        );

        Resolution {
            text: leader.text.to_string(),
            confidence,
            kind: ResolutionKind::Vote,
            breakdown,
        }
    }

    /// Highest-confidence raw reading at the invalid penalty
    fn fallback(&self, observations: &[Observation]) -> Resolution {
        let mut best = &observations[0];
        for obs in &observations[1..] {
            if obs.confidence > best.confidence {
                best = obs;
            }
        }
        let confidence = self.clamp(best.confidence * self.scoring.invalid_penalty);
        debug!("No valid reading; falling back to '{}' at {:.3}", best.text, confidence);
        Resolution {
            text: best.text.clone(),
            confidence,
            kind: ResolutionKind::Fallback,
            breakdown: ConfidenceBreakdown {
                best_ocr_conf: best.confidence,
                avg_ocr_conf: best.confidence,
                median_ocr_conf: best.confidence,
                vote_count: 1,
                vote_ratio: 1.0 / observations.len() as f32,
                ..ConfidenceBreakdown::default()
            },
        }
    }

    fn consensus_score(
        &self,
        leader: &PlateCandidate<'_>,
        stats: &Stats,
        total: usize,
        context: &ScoringContext,
    ) -> (f32, ConfidenceBreakdown) {
        let cfg = &self.scoring;
        let votes = leader.votes();
        let vote_ratio = votes as f32 / total as f32;

        let vote_bonus = tier_at_least(&cfg.vote_tiers, vote_ratio).unwrap_or(cfg.vote_floor_bonus);
        let consistency_bonus =
            tier_below(&cfg.consistency_tiers, stats.std_dev).unwrap_or(cfg.consistency_floor_bonus);
        let length_bonus = self.length_bonus(leader.text);

        let base = stats.best * cfg.weight_best + stats.median * cfg.weight_median + stats.avg * cfg.weight_avg;
        let mut score = base + vote_bonus + consistency_bonus + length_bonus;

        let majority = votes as f32 >= total as f32 * cfg.majority_ratio;
        if majority {
            score *= cfg.majority_multiplier;
        }

        if self.grammar.validate(leader.text) {
            score = self.validity_boost(score);
        }

        let breakdown = ConfidenceBreakdown {
            detector_confidence: context.detector_confidence,
            best_ocr_conf: stats.best,
            avg_ocr_conf: stats.avg,
            median_ocr_conf: stats.median,
            vote_count: votes,
            vote_ratio,
            vote_bonus,
            consistency_bonus,
            length_bonus,
            quality_penalty: 0.0,
            std_dev: stats.std_dev,
            majority,
        };
        (self.clamp(score), breakdown)
    }

    fn localized_score(
        &self,
        leader: &PlateCandidate<'_>,
        stats: &Stats,
        total: usize,
        context: &ScoringContext,
    ) -> (f32, ConfidenceBreakdown) {
        let cfg = &self.scoring.localized;
        let votes = leader.votes();
        let denominator = if context.variant_count > 0 { context.variant_count } else { total };
        let vote_ratio = votes as f32 / denominator as f32;

        let vote_bonus = tier_at_least(&cfg.vote_tiers, vote_ratio).unwrap_or(0.0);
        let consistency_bonus = tier_below(&cfg.consistency_tiers, stats.std_dev).unwrap_or(0.0);
        let quality_penalty = tier_below(&cfg.quality_penalties, stats.avg).unwrap_or(0.0);

        let base = context.detector_confidence * cfg.weight_detector
            + stats.best * cfg.weight_best
            + stats.median * cfg.weight_median
            + stats.avg * cfg.weight_avg;
        let score = base + vote_bonus + consistency_bonus + quality_penalty;

        let breakdown = ConfidenceBreakdown {
            detector_confidence: context.detector_confidence,
            best_ocr_conf: stats.best,
            avg_ocr_conf: stats.avg,
            median_ocr_conf: stats.median,
            vote_count: votes,
            vote_ratio,
            vote_bonus,
            consistency_bonus,
            length_bonus: 0.0,
            quality_penalty,
            std_dev: stats.std_dev,
            majority: false,
        };
        (self.clamp(score), breakdown)
    }

    fn length_bonus(&self, text: &str) -> f32 {
        let cfg = &self.scoring;
        let len = PlateGrammar::strip_separators(text).chars().count();
        if (cfg.length_ideal.0..=cfg.length_ideal.1).contains(&len) {
            cfg.length_ideal_bonus
        } else if (cfg.length_acceptable.0..=cfg.length_acceptable.1).contains(&len) {
            cfg.length_acceptable_bonus
        } else {
            0.0
        }
    }

    /// Lift a grammar-valid score: to the floor, by the high boost below the
    /// tier, and by at least the low boost above it. Never decreasing in `score`.
    fn validity_boost(&self, score: f32) -> f32 {
        let cfg = &self.scoring;
        if score < cfg.valid_floor {
            cfg.valid_floor
        } else if score < cfg.valid_boost_tier {
            score + cfg.valid_boost_high
        } else {
            (score + cfg.valid_boost_low).max(cfg.valid_boost_tier + cfg.valid_boost_high)
        }
    }

    fn clamp(&self, score: f32) -> f32 {
        if score.is_nan() {
            return 0.0;
        }
        score.clamp(0.0, self.scoring.max_confidence)
    }

    /// Concatenate fragments left to right and validate the result.
    ///
    /// Used when a plate is split across several detections of moderate
    /// confidence. Fragments at or below the combine floor are skipped.
    pub fn combine_by_position(
        &self,
        detections: &[OcrDetection],
        confidences: &CharConfidence,
    ) -> Option<String> {
        let mut ordered: Vec<&OcrDetection> = detections.iter().collect();
        ordered.sort_by(|a, b| a.left().total_cmp(&b.left()));

        let combined: String = ordered
            .iter()
            .filter(|d| d.confidence > self.ocr.combine_floor)
            .map(|d| self.corrector.correct_raw(&PlateGrammar::clean(&d.text)))
            .collect();

        let len = combined.chars().count();
        if !(COMBINED_MIN_LEN..=COMBINED_MAX_LEN).contains(&len) {
            return None;
        }

        let corrected = self.corrector.correct_candidate(&combined, confidences);
        let formatted = PlateGrammar::format(&corrected);
        self.grammar.validate(&formatted).then(|| {
            debug!("Combined {} fragments into '{}'", ordered.len(), formatted);
            formatted
        })
    }

    /// Pick the plate text out of a single OCR pass.
    ///
    /// Stricter than the per-variant filter: the reading must start with two
    /// digits and look like a plate by letter and digit counts. Returns
    /// `None` when nothing survives.
    pub fn extract(&self, detections: &[OcrDetection]) -> Option<Extraction> {
        let mut candidates: Vec<(String, f32)> = Vec::new();

        for det in detections {
            if det.confidence <= self.ocr.confidence_floor {
                continue;
            }
            let cleaned = PlateGrammar::clean(&det.text);
            if !self.grammar.is_plausible_length(&cleaned) || !has_valid_components(&cleaned) {
                continue;
            }
            let letters = cleaned.chars().filter(|c| c.is_ascii_alphabetic()).count();
            let digits = cleaned.chars().filter(|c| c.is_ascii_digit()).count();
            if letters > EXTRACT_MAX_LETTERS || digits < EXTRACT_MIN_DIGITS {
                continue;
            }
            if !cleaned.chars().take(2).all(|c| c.is_ascii_digit()) {
                continue;
            }

            let fixed = self.corrector.correct_raw(&cleaned);
            if self.grammar.validate(&fixed) {
                candidates.push((fixed, det.confidence));
            } else {
                let formatted = PlateGrammar::format(&fixed);
                if self.grammar.validate(&formatted) {
                    candidates.push((formatted, det.confidence));
                }
            }
        }

        if candidates.is_empty() {
            return None;
        }

        candidates.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| b.0.chars().count().cmp(&a.0.chars().count()))
        });

        let confidences =
            CharConfidence::from_readings(detections.iter().map(|d| (d.text.as_str(), d.confidence)));
        let top_confidence = candidates[0].1;

        let near_ties = candidates
            .iter()
            .filter(|(_, conf)| *conf >= top_confidence * NEAR_TIE_RATIO)
            .count();
        if near_ties > 1 {
            if let Some(text) = self.combine_by_position(detections, &confidences) {
                return Some(Extraction {
                    text,
                    confidence: top_confidence,
                    combined: true,
                });
            }
        }

        Some(Extraction {
            text: self.corrector.correct_candidate(&candidates[0].0, &confidences),
            confidence: top_confidence,
            combined: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate::PassthroughCorrector;

    fn obs(text: &str, confidence: f32) -> Observation {
        Observation::new(text, confidence, "test")
    }

    fn localized() -> Resolver {
        Resolver::new(
            ScoringConfig {
                mode: ScoringMode::Localized,
                ..ScoringConfig::default()
            },
            OcrConfig::default(),
            ValidationConfig::default(),
        )
    }

    #[test]
    fn test_empty_observations_give_sentinel() {
        let resolution = Resolver::default().resolve(&[]);
        assert_eq!(resolution.text, NOT_DETECTED);
        assert_eq!(resolution.confidence, 0.0);
        assert_eq!(resolution.kind, ResolutionKind::Empty);
        assert!(!resolution.is_detected());
    }

    #[test]
    fn test_two_votes_beat_one() {
        let observations = [obs("29A12345", 0.85), obs("29A12345", 0.80), obs("30B9999", 0.60)];
        let resolution = Resolver::default().resolve(&observations);

        assert_eq!(resolution.text, "29A12345");
        assert_eq!(resolution.kind, ResolutionKind::Vote);
        assert!(resolution.confidence > 0.85);
        assert!(resolution.confidence <= 0.99);
        assert_eq!(resolution.breakdown.vote_count, 2);
        assert!(resolution.breakdown.majority);
    }

    #[test]
    fn test_breakdown_terms() {
        let observations = [obs("29A-123.45", 0.6), obs("29A-123.45", 0.7), obs("29A-123.45", 0.8)];
        let breakdown = Resolver::default().resolve(&observations).breakdown;

        assert!((breakdown.best_ocr_conf - 0.8).abs() < 1e-6);
        assert!((breakdown.median_ocr_conf - 0.7).abs() < 1e-6);
        assert!((breakdown.avg_ocr_conf - 0.7).abs() < 1e-5);
        // population deviation of 0.6/0.7/0.8
        assert!((breakdown.std_dev - 0.0816).abs() < 1e-3);
        assert!((breakdown.vote_bonus - 0.30).abs() < 1e-6);
        assert!((breakdown.consistency_bonus - 0.10).abs() < 1e-6);
        assert!((breakdown.length_bonus - 0.10).abs() < 1e-6);
    }

    #[test]
    fn test_upper_median_for_even_count() {
        let observations = [obs("29A12345", 0.2), obs("29A12345", 0.4)];
        let breakdown = Resolver::default().resolve(&observations).breakdown;
        assert!((breakdown.median_ocr_conf - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_only_falls_back_with_penalty() {
        let observations = [
            Observation::invalid("HELLO1", 0.9, "a"),
            Observation::invalid("ABC", 0.95, "b"),
        ];
        let resolution = Resolver::default().resolve(&observations);
        assert_eq!(resolution.text, "ABC");
        assert_eq!(resolution.kind, ResolutionKind::Fallback);
        assert!((resolution.confidence - 0.475).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_observations_do_not_vote() {
        let observations = [
            Observation::invalid("XYZ", 0.99, "a"),
            Observation::invalid("XYZ", 0.99, "b"),
            obs("29A12345", 0.5),
        ];
        let resolution = Resolver::default().resolve(&observations);
        assert_eq!(resolution.text, "29A12345");
        // one valid vote out of three observations
        assert!((resolution.breakdown.vote_ratio - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_confident_garbage_never_wins_vote() {
        let resolver = Resolver::default();

        let resolution = resolver.resolve(&[obs("KHNGPHTHINCBINS", 0.915)]);
        assert_eq!(resolution.kind, ResolutionKind::Fallback);
        assert!((resolution.confidence - 0.4575).abs() < 1e-5);

        let observations = [obs("HELLOWORLD", 0.95), obs("HELLOWORLD", 0.95), obs("29A12345", 0.6)];
        let resolution = resolver.resolve(&observations);
        assert_eq!(resolution.kind, ResolutionKind::Vote);
        assert_eq!(resolution.text, "29A12345");
        assert_eq!(resolution.breakdown.vote_count, 1);
    }

    #[test]
    fn test_observation_json_without_flag_is_still_checked() {
        let observations: Vec<Observation> =
            serde_json::from_str(r#"[{"text": "KHNGPHTHINCBINS", "confidence": 0.915}]"#).unwrap();
        assert!(observations[0].valid);
        let resolution = Resolver::default().resolve(&observations);
        assert_ne!(resolution.kind, ResolutionKind::Vote);
    }

    #[test]
    fn test_tie_prefers_higher_best_confidence() {
        let observations = [obs("29A12345", 0.6), obs("30B9999", 0.9)];
        assert_eq!(Resolver::default().resolve(&observations).text, "30B9999");

        let observations = [obs("29A12345", 0.9), obs("30B9999", 0.9)];
        assert_eq!(Resolver::default().resolve(&observations).text, "29A12345");
    }

    #[test]
    fn test_valid_text_reaches_floor() {
        let resolution = Resolver::default().resolve(&[obs("29A12345", 0.05)]);
        assert!(resolution.confidence >= 0.80);
    }

    #[test]
    fn test_validity_boost_is_monotone() {
        let resolver = Resolver::default();
        let mut previous = 0.0;
        for step in 0..=120 {
            let boosted = resolver.validity_boost(step as f32 / 100.0);
            assert!(boosted >= previous, "boost decreased at {step}");
            previous = boosted;
        }
    }

    #[test]
    fn test_more_votes_never_lower_confidence() {
        let resolver = Resolver::default();
        let mut observations = vec![obs("30B9999", 0.3), obs("30B9999", 0.3), obs("51F12345", 0.3)];
        let mut previous = resolver.resolve(&observations).confidence;
        for _ in 0..5 {
            observations.push(obs("30B9999", 0.3));
            let next = resolver.resolve(&observations).confidence;
            assert!(next >= previous);
            previous = next;
        }
    }

    #[test]
    fn test_localized_mode_blends_detector() {
        let resolver = localized();
        let observations = [obs("29A12345", 0.9), obs("29A12345", 0.9)];
        let context = ScoringContext {
            detector_confidence: 0.8,
            variant_count: 5,
        };
        let resolution = resolver.resolve_with(&observations, &context);

        // 0.16 + 0.36 + 0.135 + 0.09 + vote 0.10 (2/5) + consistency 0.05
        assert!((resolution.confidence - 0.895).abs() < 1e-4);
        assert!((resolution.breakdown.vote_ratio - 0.4).abs() < 1e-6);
        assert_eq!(resolution.breakdown.quality_penalty, 0.0);
    }

    #[test]
    fn test_localized_quality_penalty() {
        let resolver = localized();
        let observations = [obs("29A12345", 0.4)];
        let context = ScoringContext {
            detector_confidence: 0.5,
            variant_count: 10,
        };
        let resolution = resolver.resolve_with(&observations, &context);
        assert!((resolution.breakdown.quality_penalty + 0.10).abs() < 1e-6);
        // 0.1 + 0.16 + 0.06 + 0.04 + 0 + 0.05 - 0.1
        assert!((resolution.confidence - 0.31).abs() < 1e-4);
    }

    #[test]
    fn test_extract_rejects_confident_garbage() {
        let resolver = Resolver::default();
        assert!(resolver.extract(&[OcrDetection::new("KHNGPHTHINCBINS", 0.915)]).is_none());
        assert!(resolver.extract(&[]).is_none());
    }

    #[test]
    fn test_extract_keeps_valid_reading() {
        let resolver = Resolver::default();
        let extraction = resolver
            .extract(&[OcrDetection::new("29a12345", 0.8), OcrDetection::new("VIETNAM", 0.9)])
            .unwrap();
        // already valid, so no separators are inserted
        assert_eq!(extraction.text, "29A12345");
        assert!(!extraction.combined);
        assert!((extraction.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_extract_strict_filters() {
        let resolver = Resolver::default();
        // province must lead
        assert!(resolver.extract(&[OcrDetection::new("A29123456", 0.9)]).is_none());
        // too many letters
        assert!(resolver.extract(&[OcrDetection::new("29ABCDE123", 0.9)]).is_none());
        // at the confidence floor
        assert!(resolver.extract(&[OcrDetection::new("29A12345", 0.10)]).is_none());
    }

    #[test]
    fn test_combine_by_position_joins_fragments() {
        let resolver = Resolver::with_corrector(
            ScoringConfig::default(),
            OcrConfig::default(),
            ValidationConfig::default(),
            Arc::new(PassthroughCorrector),
        );
        let detections = [
            OcrDetection::new("123.45", 0.7).with_box(60.0, 0.0, 50.0, 20.0),
            OcrDetection::new("29A", 0.7).with_box(0.0, 0.0, 40.0, 20.0),
            OcrDetection::new("noise", 0.15).with_box(120.0, 0.0, 10.0, 20.0),
        ];
        let combined = resolver.combine_by_position(&detections, &CharConfidence::new());
        assert_eq!(combined.as_deref(), Some("29A-123.45"));
    }

    #[test]
    fn test_combine_rejects_implausible_length() {
        let resolver = Resolver::default();
        let detections = [OcrDetection::new("29A", 0.7).with_box(0.0, 0.0, 10.0, 10.0)];
        assert!(resolver.combine_by_position(&detections, &CharConfidence::new()).is_none());
    }

    #[test]
    fn test_extract_near_tie_without_combination() {
        let resolver = Resolver::default();
        let detections = [
            OcrDetection::new("29A-123.45", 0.70).with_box(0.0, 0.0, 100.0, 20.0),
            OcrDetection::new("29A-123.46", 0.68).with_box(200.0, 0.0, 100.0, 20.0),
        ];
        // both near-tied, but joined they are too long to be one plate
        let extraction = resolver.extract(&detections).unwrap();
        assert!(!extraction.combined);
        assert_eq!(extraction.text, "29A-123.45");
    }

    #[test]
    fn test_extract_near_tie_prefers_combined() {
        let resolver = Resolver::default();
        let detections = [
            OcrDetection::new("29A12345", 0.15).with_box(300.0, 0.0, 80.0, 20.0),
            OcrDetection::new("29A12346", 0.14).with_box(400.0, 0.0, 80.0, 20.0),
            OcrDetection::new("51F", 0.9).with_box(0.0, 0.0, 40.0, 20.0),
            OcrDetection::new("678.90", 0.9).with_box(50.0, 0.0, 80.0, 20.0),
        ];
        let extraction = resolver.extract(&detections).unwrap();
        assert!(extraction.combined);
        assert_eq!(extraction.text, "51F-678.90");
        assert!((extraction.confidence - 0.15).abs() < 1e-6);
    }
}
