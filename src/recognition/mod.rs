//! Recognition Layer
//!
//! Turns OCR readings into one plate string and confidence:
//! - [`collector`] runs OCR across variants and filters readings
//! - [`resolver`] votes and scores the surviving observations
//! - [`pipeline`] drives a full detection call from image to result

pub mod collector;
pub mod pipeline;
pub mod resolver;

pub use collector::{Collection, Collector};
pub use pipeline::{
    DetectionStage, DiagnosticLabel, NotFoundReason, PlateReading, Recognition, Recognizer,
};
pub use resolver::{
    ConfidenceBreakdown, Extraction, Observation, Resolution, ResolutionKind, Resolver,
    ScoringContext, NOT_DETECTED,
};
