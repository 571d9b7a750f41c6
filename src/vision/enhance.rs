//! Plate enhancement chain
//!
//! The shared "enhance" step used by several variants: upscale, crop the
//! frame border, denoise, boost local contrast, sharpen, stretch, then keep
//! whichever of three thresholds leaves the most foreground.

use image::{DynamicImage, GrayImage};
use tracing::debug;

use super::filters;
use crate::config::PreprocessingConfig;

/// Fraction of the shorter side trimmed from every edge
const BORDER_CROP: f32 = 0.05;
/// Boost applied to the configured CLAHE clip limit
const CLAHE_BOOST: f32 = 1.5;
const UNSHARP_SIGMA: f32 = 3.0;
/// `2.5 * image - 1.5 * blur`
const UNSHARP_AMOUNT: f32 = 2.5;
const STRETCH_LOW_PCT: f32 = 2.0;
const STRETCH_HIGH_PCT: f32 = 98.0;
const ADAPTIVE_BLOCK: u32 = 11;
const ADAPTIVE_C: f32 = 2.0;
/// White border added around the result
const FINAL_BORDER: u32 = 20;

/// Threshold methods competing inside the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMethod {
    Otsu,
    AdaptiveGaussian,
    AdaptiveMean,
}

impl ThresholdMethod {
    pub const ALL: [ThresholdMethod; 3] = [
        ThresholdMethod::Otsu,
        ThresholdMethod::AdaptiveGaussian,
        ThresholdMethod::AdaptiveMean,
    ];

    pub fn apply(self, image: &GrayImage) -> GrayImage {
        match self {
            ThresholdMethod::Otsu => filters::otsu_binary(image),
            ThresholdMethod::AdaptiveGaussian => {
                filters::adaptive_threshold_gaussian(image, ADAPTIVE_BLOCK, ADAPTIVE_C)
            }
            ThresholdMethod::AdaptiveMean => {
                filters::adaptive_threshold_mean(image, ADAPTIVE_BLOCK, ADAPTIVE_C)
            }
        }
    }
}

/// Run every threshold method and keep the one with the most white pixels.
/// Ties go to the earlier method.
pub fn best_threshold(image: &GrayImage) -> (ThresholdMethod, GrayImage) {
    let mut best: Option<(ThresholdMethod, GrayImage, usize)> = None;
    for method in ThresholdMethod::ALL {
        let binary = method.apply(image);
        let white = filters::count_white(&binary);
        if best.as_ref().map_or(true, |(_, _, score)| white > *score) {
            best = Some((method, binary, white));
        }
    }
    match best {
        Some((method, binary, _)) => (method, binary),
        None => (ThresholdMethod::Otsu, filters::otsu_binary(image)),
    }
}

/// Enhance a plate crop into a clean binary rendering
pub fn enhance(image: &DynamicImage, config: &PreprocessingConfig) -> GrayImage {
    let gray = filters::to_gray(image);
    let gray = filters::upscale_gray_to_width(&gray, config.enhance_target_width);
    let gray = filters::crop_border(&gray, BORDER_CROP);

    let denoised = filters::nl_means_denoise(
        &gray,
        config.denoise_h,
        config.denoise_template,
        config.denoise_search,
    );
    let equalized = filters::clahe(
        &denoised,
        config.clahe_clip_limit * CLAHE_BOOST,
        config.clahe_tile_grid,
    );
    let sharpened = filters::unsharp_mask(&equalized, UNSHARP_SIGMA, UNSHARP_AMOUNT);
    let stretched = filters::percentile_stretch(&sharpened, STRETCH_LOW_PCT, STRETCH_HIGH_PCT);

    let (method, binary) = best_threshold(&stretched);
    debug!("Enhance picked {:?} threshold", method);

    let closed = filters::close_small(&binary);
    let cleaned = filters::nl_means_denoise(
        &closed,
        config.denoise_h / 2.0,
        config.denoise_template,
        config.denoise_search,
    );
    filters::pad(&cleaned, FINAL_BORDER, 255)
}
