//! Character confusion correction
//!
//! Two independent passes fix different OCR failure classes:
//! - [`fix_common_ocr_errors`] repairs systematic shape confusions and
//!   separator glyphs by position, on raw OCR text before validation
//! - [`ConfusionCorrector::correct_digits`] rewrites low-confidence digits
//!   of an already formatted candidate using neighbor parity
//!
//! Neither pass ever changes the two province digits.

use std::collections::HashMap;

use crate::config::CorrectionConfig;

/// Glyphs treated as a plate separator
const SEPARATOR_GLYPHS: [char; 9] = ['-', '.', '_', '–', '—', '~', ',', ';', ':'];

/// Highest observed confidence per character across one OCR pass
#[derive(Debug, Clone, Default)]
pub struct CharConfidence {
    map: HashMap<char, f32>,
}

impl CharConfidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(text, confidence)` readings
    pub fn from_readings<'a, I>(readings: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f32)>,
    {
        let mut confidences = Self::new();
        for (text, confidence) in readings {
            for ch in text.chars() {
                confidences.observe(ch, confidence);
            }
        }
        confidences
    }

    /// Record a reading of `ch`, keeping the maximum
    pub fn observe(&mut self, ch: char, confidence: f32) {
        let entry = self.map.entry(ch).or_insert(confidence);
        if confidence > *entry {
            *entry = confidence;
        }
    }

    /// Confidence of `ch`; unseen characters count as certain
    pub fn get(&self, ch: char) -> f32 {
        self.map.get(&ch).copied().unwrap_or(1.0)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Replacement for a commonly misread glyph
fn confusable(ch: char) -> Option<char> {
    match ch {
        'O' | 'o' => Some('0'),
        'I' | 'l' | '|' => Some('1'),
        'Z' | 'z' => Some('2'),
        'S' | 's' => Some('5'),
        'B' | 'b' => Some('8'),
        'G' | 'g' => Some('6'),
        '_' | '–' | '—' | '~' => Some('-'),
        ',' | ';' | ':' => Some('.'),
        _ => None,
    }
}

/// Position-based correction of raw OCR text.
///
/// Separator glyphs at indices 2-4 become `-`, at 5-9 become `.`.
/// The first two characters and every letter are kept; anything else
/// goes through the confusable table.
pub fn fix_common_ocr_errors(text: &str) -> String {
    text.chars()
        .enumerate()
        .map(|(i, ch)| {
            if SEPARATOR_GLYPHS.contains(&ch) {
                return match i {
                    2..=4 => '-',
                    5..=9 => '.',
                    _ => confusable(ch).unwrap_or(ch),
                };
            }
            if i < 2 || ch.is_alphabetic() {
                ch
            } else {
                confusable(ch).unwrap_or(ch)
            }
        })
        .collect()
}

/// Text correction capability plugged into the pipeline
pub trait TextCorrector: Send + Sync {
    /// Correct raw OCR output before it is cleaned and validated
    fn correct_raw(&self, raw: &str) -> String;

    /// Correct a formatted candidate using per-character confidence
    fn correct_candidate(&self, candidate: &str, confidences: &CharConfidence) -> String;
}

/// Applies both confusion passes
#[derive(Debug, Clone, Default)]
pub struct ConfusionCorrector {
    config: CorrectionConfig,
}

impl ConfusionCorrector {
    pub fn new(config: CorrectionConfig) -> Self {
        Self { config }
    }

    /// Rewrite low-confidence digits of a candidate.
    ///
    /// A digit is considered only below `general_threshold`; the pair rules
    /// then look at a five-character window centered on it.
    pub fn correct_digits(&self, text: &str, confidences: &CharConfidence) -> String {
        let chars: Vec<char> = text.chars().collect();
        let cfg = &self.config;

        chars
            .iter()
            .enumerate()
            .map(|(i, &ch)| {
                if i < 2 || !ch.is_ascii_digit() {
                    return ch;
                }
                let confidence = confidences.get(ch);
                if confidence >= cfg.general_threshold {
                    return ch;
                }

                let window = &chars[i.saturating_sub(2)..(i + 3).min(chars.len())];
                let even = |skip: char| {
                    window
                        .iter()
                        .filter_map(|c| c.to_digit(10).filter(|_| *c != skip))
                        .filter(|d| d % 2 == 0)
                        .count()
                };
                let odd = window
                    .iter()
                    .filter_map(|c| c.to_digit(10))
                    .filter(|d| d % 2 == 1)
                    .count();

                let replacement = match ch {
                    '2' if i > 3 => (even('2') >= 1 && confidence < cfg.two_to_four).then_some('4'),
                    '4' if confidence < cfg.four_to_two => Some('2'),
                    '5' => (even('5') >= 2 && confidence < cfg.five_six).then_some('6'),
                    '6' => (odd >= 2 && confidence < cfg.five_six).then_some('5'),
                    '8' if confidence < cfg.eight_zero => Some('0'),
                    '0' if confidence < cfg.eight_zero => Some('8'),
                    '9' if confidence < cfg.nine_eight => Some('8'),
                    '1' if i > 3 && confidence < cfg.one_seven => Some('7'),
                    '7' if confidence < cfg.one_seven => Some('1'),
                    _ => None,
                };
                replacement.unwrap_or(ch)
            })
            .collect()
    }
}

impl TextCorrector for ConfusionCorrector {
    fn correct_raw(&self, raw: &str) -> String {
        fix_common_ocr_errors(raw)
    }

    fn correct_candidate(&self, candidate: &str, confidences: &CharConfidence) -> String {
        self.correct_digits(candidate, confidences)
    }
}

/// Leaves text untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCorrector;

impl TextCorrector for PassthroughCorrector {
    fn correct_raw(&self, raw: &str) -> String {
        raw.to_string()
    }

    fn correct_candidate(&self, candidate: &str, _confidences: &CharConfidence) -> String {
        candidate.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confidences(pairs: &[(char, f32)]) -> CharConfidence {
        let mut map = CharConfidence::new();
        for &(ch, conf) in pairs {
            map.observe(ch, conf);
        }
        map
    }

    #[test]
    fn test_char_confidence_keeps_maximum() {
        let map = CharConfidence::from_readings([("29A", 0.4), ("9B", 0.8)]);
        assert!((map.get('9') - 0.8).abs() < 1e-6);
        assert!((map.get('2') - 0.4).abs() < 1e-6);
        assert!((map.get('X') - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fix_common_keeps_province_and_letters() {
        assert_eq!(fix_common_ocr_errors("29A12345"), "29A12345");
        assert_eq!(fix_common_ocr_errors("OZA1234"), "OZA1234");
        assert_eq!(fix_common_ocr_errors("29Sb1234"), "29Sb1234");
    }

    #[test]
    fn test_fix_common_maps_confusable_symbols() {
        assert_eq!(fix_common_ocr_errors("29A|2345"), "29A12345");
    }

    #[test]
    fn test_fix_common_places_separators_by_position() {
        // dash zone
        assert_eq!(fix_common_ocr_errors("29A_12345"), "29A-12345");
        assert_eq!(fix_common_ocr_errors("29A.12345"), "29A-12345");
        // dot zone
        assert_eq!(fix_common_ocr_errors("29A-123,45"), "29A-123.45");
        assert_eq!(fix_common_ocr_errors("29A-123-45"), "29A-123.45");
        // outside both zones the table applies
        assert_eq!(fix_common_ocr_errors("29A-1234567_"), "29A-1234567-");
    }

    #[test]
    fn test_five_surrounded_by_even_becomes_six() {
        let corrector = ConfusionCorrector::default();
        let map = confidences(&[('5', 0.5)]);
        assert_eq!(corrector.correct_digits("29A-245.67", &map), "29A-246.67");
    }

    #[test]
    fn test_confident_digits_are_kept() {
        let corrector = ConfusionCorrector::default();
        let map = confidences(&[('5', 0.9)]);
        assert_eq!(corrector.correct_digits("29A-245.67", &map), "29A-245.67");
    }

    #[test]
    fn test_six_surrounded_by_odd_becomes_five() {
        let corrector = ConfusionCorrector::default();
        let map = confidences(&[('6', 0.55)]);
        assert_eq!(corrector.correct_digits("29A-361.79", &map), "29A-351.79");
    }

    #[test]
    fn test_absolute_threshold_pairs() {
        let corrector = ConfusionCorrector::default();
        assert_eq!(
            corrector.correct_digits("29A-800.33", &confidences(&[('8', 0.45)])),
            "29A-000.33"
        );
        assert_eq!(
            corrector.correct_digits("29A-133.33", &confidences(&[('1', 0.45)])),
            "29A-733.33"
        );
        assert_eq!(
            corrector.correct_digits("29A-733.33", &confidences(&[('7', 0.45)])),
            "29A-133.33"
        );
        assert_eq!(
            corrector.correct_digits("29A-933.33", &confidences(&[('9', 0.45)])),
            "29A-833.33"
        );
    }

    #[test]
    fn test_two_becomes_four_only_after_series() {
        let corrector = ConfusionCorrector::default();
        let map = confidences(&[('2', 0.5)]);
        assert_eq!(corrector.correct_digits("30A-280.31", &map), "30A-480.31");
        // index 1 is the province
        assert_eq!(corrector.correct_digits("32A-133.31", &map), "32A-133.31");
    }

    #[test]
    fn test_province_digits_never_change() {
        let corrector = ConfusionCorrector::default();
        let map = confidences(&[('8', 0.1), ('7', 0.1)]);
        assert_eq!(corrector.correct_digits("87A-133.33", &map), "87A-133.33");
    }

    #[test]
    fn test_passthrough_corrector() {
        let corrector = PassthroughCorrector;
        assert_eq!(corrector.correct_raw("29A_1"), "29A_1");
        assert_eq!(corrector.correct_candidate("29A-555.55", &confidences(&[('5', 0.1)])), "29A-555.55");
    }
}
