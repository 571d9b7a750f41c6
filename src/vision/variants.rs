//! Variant generation
//!
//! Turns one plate crop into an ordered, bounded list of alternate
//! renderings. Two strategies are available:
//! - [`ExhaustiveVariants`]: a fixed chain leaning on the enhance step
//! - [`AdaptiveVariants`]: five cheap core renderings, extended only when
//!   the crop looks blurry

use image::DynamicImage;
use imageproc::filter::bilateral_filter;
use tracing::debug;

use super::enhance::enhance;
use super::filters;
use super::{PlateRegion, Variant};
use crate::config::{PreprocessingConfig, VariantStrategyKind};

/// Sharpen kernel center used by the exhaustive chain (sums to one)
const SHARPEN_UNIT_CENTER: f32 = 9.0;
const STRONG_CLAHE_CLIP: f32 = 5.0;
const STRONG_CLAHE_GRID: u32 = 4;
const GLOBAL_THRESHOLD: u8 = 127;
const BILATERAL_DIAMETER: u32 = 9;
const BILATERAL_SIGMA: f32 = 75.0;
const ADAPTIVE_BLOCK: u32 = 11;
const ADAPTIVE_C: f32 = 2.0;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// Variant generation capability
pub trait VariantStrategy: Send + Sync {
    /// Render the region into at most `max_variants` variants, in priority order
    fn generate(&self, region: &PlateRegion) -> Vec<Variant>;

    fn name(&self) -> &'static str;
}

/// Build the strategy selected in the config
pub fn strategy_from_config(config: &PreprocessingConfig) -> Box<dyn VariantStrategy> {
    match config.strategy {
        VariantStrategyKind::Exhaustive => Box::new(ExhaustiveVariants::new(config.clone())),
        VariantStrategyKind::Adaptive => Box::new(AdaptiveVariants::new(config.clone())),
    }
}

/// Sharpness class of a crop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageQuality {
    Good,
    Medium,
    Poor,
}

impl ImageQuality {
    /// Classify by Laplacian variance
    pub fn assess(image: &DynamicImage, config: &PreprocessingConfig) -> Self {
        Self::from_sharpness(filters::laplacian_variance(&filters::to_gray(image)), config)
    }

    pub fn from_sharpness(variance: f64, config: &PreprocessingConfig) -> Self {
        if variance > config.good_sharpness {
            ImageQuality::Good
        } else if variance > config.medium_sharpness {
            ImageQuality::Medium
        } else {
            ImageQuality::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageQuality::Good => "good",
            ImageQuality::Medium => "medium",
            ImageQuality::Poor => "poor",
        }
    }
}

/// Fixed enhancement-heavy chain
pub struct ExhaustiveVariants {
    config: PreprocessingConfig,
}

impl ExhaustiveVariants {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    fn enhanced(&self, image: &DynamicImage) -> DynamicImage {
        DynamicImage::ImageLuma8(enhance(image, &self.config))
    }
}

impl VariantStrategy for ExhaustiveVariants {
    fn generate(&self, region: &PlateRegion) -> Vec<Variant> {
        let cfg = &self.config;
        let original = &region.image;
        let gray = filters::to_gray(original);
        let gray_image = |g| DynamicImage::ImageLuma8(g);

        let mut variants = vec![
            Variant::new("original", original.clone()),
            Variant::new("enhanced", self.enhanced(original)),
            Variant::new(
                "sharp_enhanced",
                self.enhanced(&gray_image(filters::sharpen(&gray, SHARPEN_UNIT_CENTER))),
            ),
            Variant::new("upscale2x_enhanced", self.enhanced(&filters::scale_by(original, 2.0))),
            Variant::new(
                "clahe_otsu",
                gray_image(filters::otsu_binary(&filters::clahe(
                    &gray,
                    STRONG_CLAHE_CLIP,
                    STRONG_CLAHE_GRID,
                ))),
            ),
            Variant::new(
                "gamma_bright_enhanced",
                self.enhanced(&gray_image(filters::gamma(&gray, cfg.gamma_bright))),
            ),
            Variant::new("global_threshold", gray_image(filters::binarize(&gray, GLOBAL_THRESHOLD))),
            Variant::new(
                "morph_gradient_otsu",
                gray_image(filters::otsu_binary(&filters::morphological_gradient(&gray))),
            ),
            Variant::new(
                "bilateral_adaptive",
                gray_image(filters::adaptive_threshold_mean(
                    &bilateral_filter(&gray, BILATERAL_DIAMETER, BILATERAL_SIGMA, BILATERAL_SIGMA),
                    ADAPTIVE_BLOCK,
                    ADAPTIVE_C,
                )),
            ),
        ];

        if original.width() < cfg.min_resize_width {
            variants.push(Variant::new(
                "resize_400",
                self.enhanced(&filters::upscale_to_width(original, cfg.min_resize_width)),
            ));
        }

        variants.push(Variant::new(
            "edges",
            self.enhanced(&gray_image(filters::edge_blend(&gray, CANNY_LOW, CANNY_HIGH))),
        ));

        if filters::min_max_stretch(&gray).is_some() {
            variants.push(Variant::new(
                "contrast_stretch",
                self.enhanced(&gray_image(filters::percentile_stretch(&gray, 2.0, 98.0))),
            ));
        }

        if cfg.include_inverted {
            let inverted: Vec<Variant> = variants
                .iter()
                .map(|v| Variant::new(format!("inverted_{}", v.label), filters::invert(&v.image)))
                .collect();
            variants.extend(inverted);
        }

        variants.truncate(cfg.max_variants);
        debug!("Exhaustive strategy produced {} variants", variants.len());
        variants
    }

    fn name(&self) -> &'static str {
        "exhaustive"
    }
}

/// Quality-sized chain: 5 core variants, up to 8 for medium crops, up to 10 for poor ones
pub struct AdaptiveVariants {
    config: PreprocessingConfig,
}

impl AdaptiveVariants {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }
}

impl VariantStrategy for AdaptiveVariants {
    fn generate(&self, region: &PlateRegion) -> Vec<Variant> {
        let cfg = &self.config;
        let original = &region.image;
        let gray = filters::to_gray(original);
        let quality = ImageQuality::assess(original, cfg);
        let gray_image = |g| DynamicImage::ImageLuma8(g);

        let denoised =
            filters::nl_means_denoise(&gray, cfg.denoise_h, cfg.denoise_template, cfg.denoise_search);

        let mut variants = vec![
            Variant::new("original", original.clone()),
            Variant::new(
                "clahe",
                gray_image(filters::clahe(&gray, cfg.clahe_clip_limit, cfg.clahe_tile_grid)),
            ),
            Variant::new("sharp", gray_image(filters::sharpen(&denoised, cfg.sharpen_center))),
            Variant::new("otsu", gray_image(filters::otsu_binary(&gray))),
            Variant::new(
                "adaptive",
                gray_image(filters::adaptive_threshold_gaussian(&gray, ADAPTIVE_BLOCK, ADAPTIVE_C)),
            ),
        ];

        if matches!(quality, ImageQuality::Medium | ImageQuality::Poor) {
            if original.width() < cfg.min_resize_width {
                variants.push(Variant::new(
                    "resize_400",
                    filters::upscale_to_width(original, cfg.min_resize_width),
                ));
            }
            variants.push(Variant::new("gamma_bright", gray_image(filters::gamma(&gray, cfg.gamma_bright))));
            variants.push(Variant::new("gamma_dark", gray_image(filters::gamma(&gray, cfg.gamma_dark))));
        }

        if quality == ImageQuality::Poor {
            variants.push(Variant::new("hist_eq", gray_image(filters::equalize(&gray))));
            if let Some(stretched) = filters::min_max_stretch(&gray) {
                variants.push(Variant::new("contrast", gray_image(stretched)));
            }
        }

        variants.truncate(cfg.max_variants);
        debug!(
            "Adaptive strategy: {} quality, {} variants",
            quality.as_str(),
            variants.len()
        );
        variants
    }

    fn name(&self) -> &'static str {
        "adaptive"
    }
}
