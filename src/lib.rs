//! plate-reader - Vietnamese license plate recognition
//!
//! Reads plate text from images by rendering each plate crop several ways,
//! running an external OCR engine on every rendering, and voting on the
//! grammar-checked readings.

pub mod config;
pub mod error;
pub mod plate;
pub mod recognition;
pub mod storage;
pub mod vision;

pub use config::RecognizerConfig;
pub use error::{RecognizeError, Result};
pub use recognition::{DiagnosticLabel, Observation, Recognition, Recognizer, Resolution, Resolver};
pub use vision::{ImageSource, OcrEngine, PlateLocalizer};
