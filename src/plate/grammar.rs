//! Vietnamese plate grammar
//!
//! Cleaning, validation and separator formatting of plate strings.
//! A plate is a two-digit province code, one or two series letters and
//! a 4-6 digit number, optionally written as `29A-123.45`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ValidationConfig;

/// Accepted shapes once separators are removed
static PLATE_SHAPES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\d{2}[A-Z]{1}\d{4,6}$",
        r"^\d{2}[A-Z]{2}\d{4,6}$",
        r"^\d{2}[A-Z]{1}[A-Z]{1}\d{4,6}$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("plate shape pattern is valid"))
    .collect()
});

/// Province, series and number block of a separator-free plate
static PREFIX_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2})([A-Z]{1,2})(\d+)$").expect("prefix pattern is valid"));

static DASH_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("dash pattern is valid"));
static DOT_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.+").expect("dot pattern is valid"));

static DEFAULT_GRAMMAR: Lazy<PlateGrammar> = Lazy::new(PlateGrammar::default);

/// Plate grammar with configurable bounds
#[derive(Debug, Clone, Default)]
pub struct PlateGrammar {
    config: ValidationConfig,
}

impl PlateGrammar {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Uppercase and drop everything outside `[A-Z0-9.-]`
    pub fn clean(text: &str) -> String {
        text.to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect()
    }

    /// Uppercase and drop separators and spaces, keeping everything else
    pub fn strip_separators(text: &str) -> String {
        text.chars()
            .filter(|c| !matches!(c, '-' | '.' | ' '))
            .collect::<String>()
            .to_uppercase()
    }

    /// Whether a cleaned OCR string is long enough (and short enough) to be a plate reading
    pub fn is_plausible_length(&self, cleaned: &str) -> bool {
        let len = cleaned.chars().count();
        len >= self.config.min_length_raw && len <= self.config.max_length_raw
    }

    /// Check a string against the plate grammar. Never panics.
    pub fn validate(&self, text: &str) -> bool {
        let cfg = &self.config;

        if text.chars().count() < cfg.min_length_raw {
            return false;
        }

        let clean = Self::strip_separators(text);
        let len = clean.chars().count();
        if len < cfg.min_length_clean || len > cfg.max_length_clean {
            return false;
        }

        let letters = clean.chars().filter(|c| c.is_alphabetic()).count();
        let digits = clean.chars().filter(|c| c.is_ascii_digit()).count();
        if letters < cfg.min_letters || letters > cfg.max_letters {
            return false;
        }
        if digits < cfg.min_digits || digits > cfg.max_digits {
            return false;
        }

        if !self.has_province_code(&clean) {
            return false;
        }

        PLATE_SHAPES.iter().any(|shape| shape.is_match(&clean))
    }

    fn has_province_code(&self, clean: &str) -> bool {
        let prefix: String = clean.chars().take(2).collect();
        if prefix.len() != 2 || !prefix.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        prefix
            .parse::<u32>()
            .map(|code| code >= self.config.min_province_code && code <= self.config.max_province_code)
            .unwrap_or(false)
    }

    /// Clean a plate string and (re)place its separators.
    ///
    /// `29A12345` becomes `29A-123.45`; a 6-digit number splits 4+2 and a
    /// 4-digit number keeps no dot. Strings that do not parse as
    /// province + series + number keep their (collapsed) separators.
    pub fn format(text: &str) -> String {
        let cleaned = Self::clean(text);
        let trimmed = cleaned.trim_matches(|c| c == '.' || c == '-');
        let collapsed = DASH_RUNS.replace_all(trimmed, "-");
        let collapsed = DOT_RUNS.replace_all(&collapsed, ".").into_owned();

        let compact: String = collapsed.chars().filter(|c| *c != '-' && *c != '.').collect();
        match PREFIX_NUMBER.captures(&compact) {
            Some(caps) => format!("{}{}-{}", &caps[1], &caps[2], split_number(&caps[3])),
            None => collapsed,
        }
    }
}

/// Insert the dot into a 5- or 6-digit number block
fn split_number(numbers: &str) -> String {
    match numbers.len() {
        5 => format!("{}.{}", &numbers[..3], &numbers[3..]),
        6 => format!("{}.{}", &numbers[..4], &numbers[4..]),
        _ => numbers.to_string(),
    }
}

/// Whether text contains at least one letter and one digit
pub fn has_valid_components(text: &str) -> bool {
    let has_letter = text.chars().any(|c| c.is_alphabetic());
    let has_digit = text.chars().any(|c| c.is_ascii_digit());
    has_letter && has_digit
}

/// [`PlateGrammar::clean`]
pub fn clean_text(text: &str) -> String {
    PlateGrammar::clean(text)
}

/// Validate with the default bounds
pub fn validate_plate(text: &str) -> bool {
    DEFAULT_GRAMMAR.validate(text)
}

/// [`PlateGrammar::format`]
pub fn format_plate(text: &str) -> String {
    PlateGrammar::format(text)
}
