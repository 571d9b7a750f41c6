//! Error types for the recognition pipeline
//!
//! "No plate" is not an error; see `recognition::Recognition::NotFound`.

use thiserror::Error;

/// Failures that abort a single recognition call
#[derive(Debug, Error)]
pub enum RecognizeError {
    /// The source image could not be read or decoded
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The external OCR engine failed
    #[error("OCR engine failed on variant '{label}': {message}")]
    Ocr { label: String, message: String },

    /// The external plate detector failed
    #[error("plate localization failed: {0}")]
    Localization(String),
}

impl RecognizeError {
    pub(crate) fn ocr(label: &str, err: anyhow::Error) -> Self {
        Self::Ocr {
            label: label.to_string(),
            message: format!("{:#}", err),
        }
    }

    pub(crate) fn localization(err: anyhow::Error) -> Self {
        Self::Localization(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, RecognizeError>;
