//! Recognizer Configuration
//!
//! Every tunable constant of the pipeline, stored in TOML format.
//! A config is built once and handed to the resolver, corrector and
//! generators; nothing reads it from a global.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level recognizer settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Plate localization post-filters
    pub detection: DetectionConfig,
    /// OCR call parameters and observation filters
    pub ocr: OcrConfig,
    /// Variant rendering settings
    pub preprocessing: PreprocessingConfig,
    /// Plate grammar bounds
    pub validation: ValidationConfig,
    /// Digit confusion thresholds
    pub correction: CorrectionConfig,
    /// Confidence blending
    pub scoring: ScoringConfig,
    /// Early termination of observation collection
    pub early_stop: EarlyStopConfig,
}

/// Localization post-filter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum detector confidence for a box to be considered
    pub conf_threshold: f32,
    /// Padding added on each side of a box, as a fraction of its size
    pub padding: f32,
    /// Boxes must be strictly wider than this (pixels)
    pub min_width: f32,
    /// Boxes must be strictly taller than this (pixels)
    pub min_height: f32,
    /// Minimum width/height ratio
    pub aspect_ratio_min: f32,
    /// Maximum width/height ratio
    pub aspect_ratio_max: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.05,
            padding: 0.2,
            min_width: 50.0,
            min_height: 20.0,
            aspect_ratio_min: 1.5,
            aspect_ratio_max: 7.0,
        }
    }
}

/// OCR call and filtering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Characters the OCR engine may emit
    pub allowlist: String,
    /// Detections at or below this confidence are dropped
    pub confidence_floor: f32,
    /// Fragments at or below this confidence are skipped when combining by position
    pub combine_floor: f32,
    /// Text region threshold passed to the engine
    pub text_threshold: f32,
    /// Low-bound text score passed to the engine
    pub low_text: f32,
    /// Character link threshold passed to the engine
    pub link_threshold: f32,
    /// Maximum canvas size passed to the engine
    pub canvas_size: u32,
    /// Magnification ratio passed to the engine
    pub mag_ratio: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            allowlist: "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-.".to_string(),
            confidence_floor: 0.10,
            combine_floor: 0.20,
            text_threshold: 0.15,
            low_text: 0.03,
            link_threshold: 0.03,
            canvas_size: 5000,
            mag_ratio: 3.0,
        }
    }
}

/// Which variant generator to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantStrategyKind {
    /// Fixed chain of enhancement-heavy renderings
    Exhaustive,
    /// Core renderings plus extras sized to the assessed sharpness
    #[default]
    Adaptive,
}

/// Variant rendering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub strategy: VariantStrategyKind,
    /// Hard cap on the number of variants per plate
    pub max_variants: usize,
    /// Append inverted copies of the exhaustive variants
    pub include_inverted: bool,
    pub clahe_clip_limit: f32,
    /// CLAHE tiles per side
    pub clahe_tile_grid: u32,
    /// Center weight of the 3x3 sharpen kernel (neighbors are -1)
    pub sharpen_center: f32,
    /// Plates narrower than this get an upscaled variant
    pub min_resize_width: u32,
    /// Width the enhance chain upscales narrower crops to
    pub enhance_target_width: u32,
    pub gamma_bright: f32,
    pub gamma_dark: f32,
    /// Non-local means filter strength
    pub denoise_h: f32,
    /// Non-local means patch size (odd)
    pub denoise_template: u32,
    /// Non-local means search window size (odd)
    pub denoise_search: u32,
    /// Laplacian variance above which a crop is `good`
    pub good_sharpness: f64,
    /// Laplacian variance above which a crop is `medium`
    pub medium_sharpness: f64,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            strategy: VariantStrategyKind::Adaptive,
            max_variants: 20,
            include_inverted: false,
            clahe_clip_limit: 6.0,
            clahe_tile_grid: 8,
            sharpen_center: 20.0,
            min_resize_width: 400,
            enhance_target_width: 800,
            gamma_bright: 1.5,
            gamma_dark: 0.7,
            denoise_h: 10.0,
            denoise_template: 7,
            denoise_search: 21,
            good_sharpness: 500.0,
            medium_sharpness: 100.0,
        }
    }
}

/// Plate grammar bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_length_raw: usize,
    pub max_length_raw: usize,
    pub min_length_clean: usize,
    pub max_length_clean: usize,
    pub min_letters: usize,
    pub max_letters: usize,
    pub min_digits: usize,
    pub max_digits: usize,
    pub min_province_code: u32,
    pub max_province_code: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_length_raw: 6,
            max_length_raw: 15,
            min_length_clean: 7,
            max_length_clean: 10,
            min_letters: 1,
            max_letters: 3,
            min_digits: 6,
            max_digits: 8,
            min_province_code: 1,
            max_province_code: 99,
        }
    }
}

/// Confidence thresholds for the digit confusion rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Digits at or above this confidence are never rewritten
    pub general_threshold: f32,
    pub two_to_four: f32,
    pub four_to_two: f32,
    /// Used in both directions of the 5/6 rule
    pub five_six: f32,
    /// Used in both directions of the 8/0 rule
    pub eight_zero: f32,
    pub nine_eight: f32,
    /// Used in both directions of the 1/7 rule
    pub one_seven: f32,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            general_threshold: 0.7,
            two_to_four: 0.6,
            four_to_two: 0.5,
            five_six: 0.6,
            eight_zero: 0.5,
            nine_eight: 0.5,
            one_seven: 0.5,
        }
    }
}

/// How the resolver blends observations into one score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Vote/consistency/length bonuses with a validity floor
    #[default]
    Consensus,
    /// Detector confidence blended in, with a quality penalty
    Localized,
}

/// One step of a threshold table: applies when the measured value
/// passes `threshold` (direction depends on the table)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub threshold: f32,
    pub value: f32,
}

impl Tier {
    pub const fn new(threshold: f32, value: f32) -> Self {
        Self { threshold, value }
    }
}

/// Confidence blending settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub mode: ScoringMode,
    pub weight_best: f32,
    pub weight_median: f32,
    pub weight_avg: f32,
    /// Vote ratio at or above `threshold` earns `value` (descending order)
    pub vote_tiers: Vec<Tier>,
    /// Bonus when no vote tier matches
    pub vote_floor_bonus: f32,
    /// Standard deviation strictly below `threshold` earns `value` (ascending order)
    pub consistency_tiers: Vec<Tier>,
    /// Bonus when no consistency tier matches
    pub consistency_floor_bonus: f32,
    /// Cleaned length range earning the full length bonus
    pub length_ideal: (usize, usize),
    pub length_ideal_bonus: f32,
    /// Cleaned length range earning the partial length bonus
    pub length_acceptable: (usize, usize),
    pub length_acceptable_bonus: f32,
    /// Share of all observations the winner needs for the multiplier
    pub majority_ratio: f32,
    pub majority_multiplier: f32,
    /// Grammar-valid winners are lifted to at least this score
    pub valid_floor: f32,
    /// Scores below this tier receive `valid_boost_high`
    pub valid_boost_tier: f32,
    pub valid_boost_high: f32,
    pub valid_boost_low: f32,
    /// Multiplier for the best raw reading when nothing validates
    pub invalid_penalty: f32,
    /// Upper clamp of every score
    pub max_confidence: f32,
    pub localized: LocalizedScoring,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            mode: ScoringMode::Consensus,
            weight_best: 0.40,
            weight_median: 0.25,
            weight_avg: 0.15,
            vote_tiers: vec![Tier::new(0.40, 0.30), Tier::new(0.25, 0.20), Tier::new(0.15, 0.15)],
            vote_floor_bonus: 0.10,
            consistency_tiers: vec![Tier::new(0.08, 0.15), Tier::new(0.15, 0.10)],
            consistency_floor_bonus: 0.05,
            length_ideal: (8, 10),
            length_ideal_bonus: 0.10,
            length_acceptable: (7, 11),
            length_acceptable_bonus: 0.05,
            majority_ratio: 0.6,
            majority_multiplier: 1.15,
            valid_floor: 0.80,
            valid_boost_tier: 0.90,
            valid_boost_high: 0.15,
            valid_boost_low: 0.05,
            invalid_penalty: 0.5,
            max_confidence: 0.99,
            localized: LocalizedScoring::default(),
        }
    }
}

/// Weights and tables of the detector-blended scoring mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizedScoring {
    pub weight_detector: f32,
    pub weight_best: f32,
    pub weight_median: f32,
    pub weight_avg: f32,
    /// Vote ratio against the variant count (descending order)
    pub vote_tiers: Vec<Tier>,
    /// Standard deviation strictly below `threshold` (ascending order)
    pub consistency_tiers: Vec<Tier>,
    /// Mean OCR confidence strictly below `threshold` costs `value` (ascending order)
    pub quality_penalties: Vec<Tier>,
}

impl Default for LocalizedScoring {
    fn default() -> Self {
        Self {
            weight_detector: 0.20,
            weight_best: 0.40,
            weight_median: 0.15,
            weight_avg: 0.10,
            vote_tiers: vec![Tier::new(0.6, 0.15), Tier::new(0.4, 0.10), Tier::new(0.2, 0.05)],
            consistency_tiers: vec![Tier::new(0.05, 0.05), Tier::new(0.10, 0.03), Tier::new(0.15, 0.01)],
            quality_penalties: vec![Tier::new(0.5, -0.10), Tier::new(0.6, -0.05)],
        }
    }
}

/// Early termination settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStopConfig {
    pub enabled: bool,
    /// Observations and leading votes both need to reach this
    pub min_votes: usize,
    /// Provisional score at which collection stops
    pub confidence: f32,
}

impl Default for EarlyStopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_votes: 5,
            confidence: 0.95,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<RecognizerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {:?}", path))?;
    let config: RecognizerConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &RecognizerConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
