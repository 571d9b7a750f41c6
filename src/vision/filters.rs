//! Pixel filters for plate crops
//!
//! Grayscale building blocks for the variant generators. Where imageproc
//! has the operation (Otsu level, Canny, morphology, blurs, bilateral,
//! Laplacian, histogram equalization) it is used directly; CLAHE,
//! non-local means and the offset adaptive thresholds are implemented
//! here on `GrayImage`.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{equalize_histogram, otsu_level};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::{box_filter, gaussian_blur_f32, laplacian_filter};
use imageproc::morphology::{dilate, erode, grayscale_close, Mask};

/// Convert any image to 8-bit grayscale
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Resize by a uniform factor with bicubic interpolation
pub fn scale_by(image: &DynamicImage, factor: f32) -> DynamicImage {
    let width = ((image.width() as f32 * factor).round() as u32).max(1);
    let height = ((image.height() as f32 * factor).round() as u32).max(1);
    image.resize_exact(width, height, FilterType::CatmullRom)
}

/// Upscale so the width reaches `target_width`; wider images are returned as-is
pub fn upscale_to_width(image: &DynamicImage, target_width: u32) -> DynamicImage {
    if image.width() == 0 || image.width() >= target_width {
        return image.clone();
    }
    scale_by(image, target_width as f32 / image.width() as f32)
}

/// Grayscale variant of [`upscale_to_width`]
pub fn upscale_gray_to_width(image: &GrayImage, target_width: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || width >= target_width {
        return image.clone();
    }
    let scale = target_width as f32 / width as f32;
    let new_height = ((height as f32 * scale).round() as u32).max(1);
    imageops::resize(image, target_width, new_height, FilterType::CatmullRom)
}

/// Remove a border of `fraction` of the shorter side, when it exceeds 2 pixels
pub fn crop_border(image: &GrayImage, fraction: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let border = (width.min(height) as f32 * fraction) as u32;
    if border <= 2 || border * 2 >= width || border * 2 >= height {
        return image.clone();
    }
    imageops::crop_imm(image, border, border, width - 2 * border, height - 2 * border).to_image()
}

/// Surround the image with a constant border
pub fn pad(image: &GrayImage, border: u32, value: u8) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut padded = GrayImage::from_pixel(width + 2 * border, height + 2 * border, Luma([value]));
    imageops::replace(&mut padded, image, border as i64, border as i64);
    padded
}

/// Pixel at (x, y) with replicated borders
fn sample(image: &GrayImage, x: i64, y: i64) -> f32 {
    let (width, height) = image.dimensions();
    let x = x.clamp(0, width as i64 - 1) as u32;
    let y = y.clamp(0, height as i64 - 1) as u32;
    image.get_pixel(x, y)[0] as f32
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a `grid` x `grid` set of tiles; each tile's
/// histogram is clipped at `clip_limit` times its mean bin height and the
/// excess redistributed, then tile mappings are blended bilinearly.
pub fn clahe(image: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let tiles_x = grid.clamp(1, width);
    let tiles_y = grid.clamp(1, height);

    let bounds = |t: u32, tiles: u32, size: u32| (t * size / tiles, (t + 1) * size / tiles);

    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        let (y0, y1) = bounds(ty, tiles_y, height);
        for tx in 0..tiles_x {
            let (x0, x1) = bounds(tx, tiles_x, width);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let area = (x1 - x0) * (y1 - y0);
            let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);

            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let share = excess / 256;
            let remainder = (excess % 256) as usize;
            for (i, bin) in hist.iter_mut().enumerate() {
                *bin += share + u32::from(i < remainder);
            }

            let lut = &mut luts[(ty * tiles_x + tx) as usize];
            let mut cdf = 0u32;
            for (value, bin) in hist.iter().enumerate() {
                cdf += bin;
                lut[value] = ((cdf as f32 * 255.0 / area.max(1) as f32).round()).min(255.0) as u8;
            }
        }
    }

    let locate = |pos: u32, tiles: u32, size: u32| {
        let f = (pos as f32 + 0.5) * tiles as f32 / size as f32 - 0.5;
        let base = f.floor();
        let weight = f - base;
        let last = tiles as f32 - 1.0;
        (base.clamp(0.0, last) as u32, (base + 1.0).clamp(0.0, last) as u32, weight)
    };

    GrayImage::from_fn(width, height, |x, y| {
        let value = image.get_pixel(x, y)[0] as usize;
        let (tx0, tx1, ax) = locate(x, tiles_x, width);
        let (ty0, ty1, ay) = locate(y, tiles_y, height);
        let lut = |tx: u32, ty: u32| luts[(ty * tiles_x + tx) as usize][value] as f32;
        let top = lut(tx0, ty0) * (1.0 - ax) + lut(tx1, ty0) * ax;
        let bottom = lut(tx0, ty1) * (1.0 - ax) + lut(tx1, ty1) * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

/// Non-local means denoising.
///
/// Each pixel becomes a weighted mean over a `search` x `search` window,
/// weighted by the similarity of `template` x `template` patches.
/// Patch distances come from one integral image per search offset.
pub fn nl_means_denoise(image: &GrayImage, strength: f32, template: u32, search: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || strength <= 0.0 {
        return image.clone();
    }
    let tr = (template / 2) as i64;
    let sr = (search / 2) as i64;
    let t = 2 * tr + 1;
    let (w, h) = (width as i64, height as i64);

    let r = sr + tr;
    let pw = w + 2 * r;
    let ph = h + 2 * r;
    let padded: Vec<f32> = (0..ph)
        .flat_map(|y| (0..pw).map(move |x| (x - r, y - r)))
        .map(|(x, y)| sample(image, x, y))
        .collect();
    let at = |x: i64, y: i64| padded[(y * pw + x) as usize];

    // distance domain covers every patch pixel of every image pixel
    let dw = w + 2 * tr;
    let dh = h + 2 * tr;
    let stride = (dw + 1) as usize;
    let mut integral = vec![0f64; stride * (dh + 1) as usize];

    let mut acc = vec![0f64; (w * h) as usize];
    let mut weights = vec![0f64; (w * h) as usize];
    let h2 = (strength as f64) * (strength as f64);
    let patch_area = (t * t) as f64;

    for dy in -sr..=sr {
        for dx in -sr..=sr {
            for y in 0..dh {
                let mut row = 0f64;
                for x in 0..dw {
                    let (px, py) = (x + sr, y + sr);
                    let diff = (at(px, py) - at(px + dx, py + dy)) as f64;
                    row += diff * diff;
                    let idx = (y + 1) as usize * stride + (x + 1) as usize;
                    integral[idx] = integral[idx - stride] + row;
                }
            }

            for y in 0..h {
                for x in 0..w {
                    let (x0, y0) = (x as usize, y as usize);
                    let (x1, y1) = ((x + t) as usize, (y + t) as usize);
                    let sum = integral[y1 * stride + x1] - integral[y0 * stride + x1]
                        - integral[y1 * stride + x0]
                        + integral[y0 * stride + x0];
                    let weight = (-(sum / patch_area) / h2).exp();
                    let idx = (y * w + x) as usize;
                    acc[idx] += weight * at(x + r + dx, y + r + dy) as f64;
                    weights[idx] += weight;
                }
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let idx = (y as i64 * w + x as i64) as usize;
        let value = if weights[idx] > 0.0 { acc[idx] / weights[idx] } else { 0.0 };
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Unsharp mask: `amount * image - (amount - 1) * blur(image)`
pub fn unsharp_mask(image: &GrayImage, sigma: f32, amount: f32) -> GrayImage {
    let blurred = gaussian_blur_f32(image, sigma);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let original = image.get_pixel(x, y)[0] as f32;
        let blur = blurred.get_pixel(x, y)[0] as f32;
        Luma([(amount * original - (amount - 1.0) * blur).round().clamp(0.0, 255.0) as u8])
    })
}

/// 3x3 sharpen kernel: `center` weight surrounded by -1
pub fn sharpen(image: &GrayImage, center: f32) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let (x, y) = (x as i64, y as i64);
        let mut value = 0f32;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let weight = if dx == 0 && dy == 0 { center } else { -1.0 };
                value += weight * sample(image, x + dx, y + dy);
            }
        }
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Gamma correction through a lookup table: `255 * (v / 255)^(1 / gamma)`
pub fn gamma(image: &GrayImage, gamma: f32) -> GrayImage {
    let inv = 1.0 / gamma;
    let mut table = [0u8; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        *entry = ((i as f32 / 255.0).powf(inv) * 255.0) as u8;
    }
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = table[pixel[0] as usize];
    }
    out
}

/// Stretch the range between two percentiles to 0..255, clipping outliers
pub fn percentile_stretch(image: &GrayImage, low_pct: f32, high_pct: f32) -> GrayImage {
    let total = (image.width() * image.height()) as usize;
    if total == 0 {
        return image.clone();
    }
    let mut hist = [0usize; 256];
    for pixel in image.pixels() {
        hist[pixel[0] as usize] += 1;
    }
    let percentile = |pct: f32| {
        let rank = ((pct / 100.0) * (total - 1) as f32).round() as usize;
        let mut seen = 0usize;
        for (value, count) in hist.iter().enumerate() {
            seen += count;
            if seen > rank {
                return value as f32;
            }
        }
        255.0
    };
    let low = percentile(low_pct);
    let high = percentile(high_pct);
    stretch_range(image, low, high)
}

/// Stretch the full min..max range to 0..255
pub fn min_max_stretch(image: &GrayImage) -> Option<GrayImage> {
    let min = image.pixels().map(|p| p[0]).min()?;
    let max = image.pixels().map(|p| p[0]).max()?;
    (max > min).then(|| stretch_range(image, min as f32, max as f32))
}

fn stretch_range(image: &GrayImage, low: f32, high: f32) -> GrayImage {
    if high <= low {
        return image.clone();
    }
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let value = (pixel[0] as f32 - low) * 255.0 / (high - low);
        pixel[0] = value.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Histogram equalization
pub fn equalize(image: &GrayImage) -> GrayImage {
    equalize_histogram(image)
}

/// Pixels strictly above `level` become white, the rest black
pub fn binarize(image: &GrayImage, level: u8) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = if pixel[0] > level { 255 } else { 0 };
    }
    out
}

/// Binarize at the Otsu level
pub fn otsu_binary(image: &GrayImage) -> GrayImage {
    binarize(image, otsu_level(image))
}

/// Local-mean threshold over a `block` x `block` window, offset by `c`
pub fn adaptive_threshold_mean(image: &GrayImage, block: u32, c: f32) -> GrayImage {
    let radius = block / 2;
    let local = box_filter(image, radius, radius);
    threshold_against(image, &local, c)
}

/// Gaussian-weighted local threshold over a `block` x `block` window, offset by `c`
pub fn adaptive_threshold_gaussian(image: &GrayImage, block: u32, c: f32) -> GrayImage {
    let sigma = 0.3 * ((block as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let local = gaussian_blur_f32(image, sigma);
    threshold_against(image, &local, c)
}

fn threshold_against(image: &GrayImage, local: &GrayImage, c: f32) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let value = image.get_pixel(x, y)[0] as f32;
        let level = local.get_pixel(x, y)[0] as f32 - c;
        Luma([if value > level { 255 } else { 0 }])
    })
}

/// Morphological close with a 2x2 square
pub fn close_small(image: &GrayImage) -> GrayImage {
    let kernel = GrayImage::from_pixel(2, 2, Luma([255]));
    grayscale_close(image, &Mask::from_image(&kernel, 1, 1))
}

/// Dilation minus erosion with a 3x3 square
pub fn morphological_gradient(image: &GrayImage) -> GrayImage {
    let dilated = dilate(image, Norm::LInf, 1);
    let eroded = erode(image, Norm::LInf, 1);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([dilated.get_pixel(x, y)[0].saturating_sub(eroded.get_pixel(x, y)[0])])
    })
}

/// Blend thickened Canny edges into the image (`0.7 * image + 0.3 * edges`)
pub fn edge_blend(image: &GrayImage, low: f32, high: f32) -> GrayImage {
    let edges = dilate(&canny(image, low, high), Norm::LInf, 1);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let value = 0.7 * image.get_pixel(x, y)[0] as f32 + 0.3 * edges.get_pixel(x, y)[0] as f32;
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Invert intensities
pub fn invert(image: &DynamicImage) -> DynamicImage {
    let mut inverted = image.clone();
    inverted.invert();
    inverted
}

/// Number of non-zero pixels
pub fn count_white(image: &GrayImage) -> usize {
    image.pixels().filter(|p| p[0] != 0).count()
}

/// Variance of the 4-neighbor Laplacian, a blur measure
pub fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }
    let laplacian = laplacian_filter(image);
    let n = (width * height) as f64;
    let (sum, sum_sq) = laplacian.pixels().fold((0f64, 0f64), |(sum, sum_sq), p| {
        let value = p[0] as f64;
        (sum + value, sum_sq + value * value)
    });
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}
