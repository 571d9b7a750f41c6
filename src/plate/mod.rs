//! Plate Text Layer
//!
//! Grammar validation, formatting and OCR confusion correction for
//! Vietnamese plate strings. Pure text; no image handling.

pub mod correction;
pub mod grammar;

pub use correction::{
    fix_common_ocr_errors, CharConfidence, ConfusionCorrector, PassthroughCorrector, TextCorrector,
};
pub use grammar::{clean_text, format_plate, has_valid_components, validate_plate, PlateGrammar};
