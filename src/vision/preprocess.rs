//! Image preprocessing for recognition
//!
//! Fixed-order pipeline: binarization, dilation, preview capture, rescale.
//! Stateless and deterministic for a given frame and settings.

use crate::config::{BinarizationMode, FilterSettings};
use crate::vision::OcrImage;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::{contrast, filter, morphology};
use tracing::debug;

/// Constant subtracted from the local mean in adaptive modes
const ADAPTIVE_OFFSET: i32 = 2;

/// Subset of the settings the preprocessor reads
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessSettings {
    pub binarization_mode: BinarizationMode,
    pub binarization_threshold: u8,
    pub binarization_block_size: u32,
    pub dilation_iterations: u32,
    pub preview_enabled: bool,
    pub rescale_enabled: bool,
    pub rescale_target_height: u32,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self::from(&FilterSettings::default())
    }
}

impl From<&FilterSettings> for PreprocessSettings {
    fn from(settings: &FilterSettings) -> Self {
        Self {
            binarization_mode: settings.binarization_mode,
            binarization_threshold: settings.binarization_threshold,
            binarization_block_size: settings.binarization_block_size,
            dilation_iterations: settings.dilation_iterations,
            preview_enabled: settings.preview_enabled,
            rescale_enabled: settings.rescale_enabled,
            rescale_target_height: settings.rescale_target_height,
        }
    }
}

/// Result of preprocessing
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Image to recognize
    pub image: OcrImage,
    /// Factor applied by rescaling (1.0 when not rescaled)
    pub scale: f32,
    /// Pre-rescale stage image for display, when enabled
    pub preview: Option<RgbaImage>,
}

/// Run the preprocessing pipeline on a frame
pub fn preprocess(frame: &RgbaImage, settings: &PreprocessSettings) -> Preprocessed {
    debug!(
        "Preprocessing {}x{}: binarization={:?}, dilation={}, rescale={}",
        frame.width(),
        frame.height(),
        settings.binarization_mode,
        settings.dilation_iterations,
        settings.rescale_enabled
    );

    let mut image = binarize(frame, settings);

    if settings.dilation_iterations > 0 {
        image = dilate(&image, settings.dilation_iterations);
    }

    let preview = settings.preview_enabled.then(|| image.to_rgba());

    let mut scale = 1.0;
    if settings.rescale_enabled {
        if let Some((resized, factor)) = rescale(&image, settings.rescale_target_height) {
            image = resized;
            scale = factor;
        }
    }

    Preprocessed {
        image,
        scale,
        preview,
    }
}

/// Adaptive block sizes must be odd and at least 3
pub fn effective_block_size(block_size: u32) -> u32 {
    let odd = if block_size % 2 == 0 {
        block_size + 1
    } else {
        block_size
    };
    odd.max(3)
}

fn binarize(frame: &RgbaImage, settings: &PreprocessSettings) -> OcrImage {
    let mode = settings.binarization_mode;
    if mode == BinarizationMode::None {
        return OcrImage::Rgba(frame.clone());
    }

    let gray = imageops::grayscale(frame);
    let block_size = effective_block_size(settings.binarization_block_size);
    let binary = match mode {
        BinarizationMode::None => gray,
        BinarizationMode::Fixed => apply_threshold(&gray, settings.binarization_threshold),
        BinarizationMode::AdaptiveMean => adaptive_mean(&gray, block_size),
        BinarizationMode::AdaptiveGaussian => adaptive_gaussian(&gray, block_size),
        BinarizationMode::Triangle => apply_threshold(&gray, triangle_level(&gray)),
        BinarizationMode::Otsu => apply_threshold(&gray, contrast::otsu_level(&gray)),
    };
    OcrImage::Luma(binary)
}

/// 255 where the pixel is strictly above `level`, 0 elsewhere
fn apply_threshold(gray: &GrayImage, level: u8) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = if p.0[0] > level { 255 } else { 0 };
    }
    out
}

fn compare_to_local(gray: &GrayImage, local: &GrayImage) -> GrayImage {
    let mut out = GrayImage::new(gray.width(), gray.height());
    for ((o, p), m) in out.pixels_mut().zip(gray.pixels()).zip(local.pixels()) {
        let above = p.0[0] as i32 > m.0[0] as i32 - ADAPTIVE_OFFSET;
        *o = Luma([if above { 255 } else { 0 }]);
    }
    out
}

fn adaptive_mean(gray: &GrayImage, block_size: u32) -> GrayImage {
    let radius = block_size / 2;
    let mean = filter::box_filter(gray, radius, radius);
    compare_to_local(gray, &mean)
}

fn adaptive_gaussian(gray: &GrayImage, block_size: u32) -> GrayImage {
    let kernel = gaussian_kernel(block_size);
    let mean = filter::separable_filter_equal(gray, &kernel);
    compare_to_local(gray, &mean)
}

/// Normalized `size`-tap Gaussian with sigma derived from the size.
///
/// Sizes up to 7 use the fixed binomial tables.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    match size {
        3 => vec![0.25, 0.5, 0.25],
        5 => vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        7 => vec![0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
        _ => {
            let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
            let center = (size as f32 - 1.0) / 2.0;
            let weights: Vec<f32> = (0..size)
                .map(|i| {
                    let x = i as f32 - center;
                    (-(x * x) / (2.0 * sigma * sigma)).exp()
                })
                .collect();
            let sum: f32 = weights.iter().sum();
            weights.into_iter().map(|w| w / sum).collect()
        }
    }
}

/// Triangle method: the level farthest from the line joining the histogram
/// peak and the far end of the longer tail
fn triangle_level(gray: &GrayImage) -> u8 {
    let mut hist = [0i64; 256];
    for p in gray.pixels() {
        hist[p.0[0] as usize] += 1;
    }

    let Some(first) = hist.iter().position(|&h| h > 0) else {
        return 0;
    };
    let last = hist.iter().rposition(|&h| h > 0).unwrap_or(first);
    let mut left = first.saturating_sub(1);
    let right = (last + 1).min(255);

    let mut peak = 0;
    for (i, &h) in hist.iter().enumerate() {
        if h > hist[peak] {
            peak = i;
        }
    }

    let flipped = peak - left < right - peak;
    if flipped {
        hist.reverse();
        left = 255 - right;
        peak = 255 - peak;
    }

    let mut level = left;
    let a = hist[peak];
    let b = left as i64 - peak as i64;
    let mut dist = 0;
    for (i, &h) in hist.iter().enumerate().take(peak + 1).skip(left + 1) {
        let d = a * i as i64 + b * h;
        if d > dist {
            dist = d;
            level = i;
        }
    }
    let level = level.saturating_sub(1);

    if flipped {
        (255 - level) as u8
    } else {
        level as u8
    }
}

/// 3x3 rectangular dilation repeated `iterations` times
fn dilate(image: &OcrImage, iterations: u32) -> OcrImage {
    let k = iterations.min(u8::MAX as u32) as u8;
    match image {
        OcrImage::Luma(gray) => OcrImage::Luma(morphology::dilate(gray, Norm::LInf, k)),
        OcrImage::Rgba(rgba) => {
            let (width, height) = rgba.dimensions();
            let channels: Vec<GrayImage> = (0..4)
                .map(|c| {
                    let plane = GrayImage::from_fn(width, height, |x, y| {
                        Luma([rgba.get_pixel(x, y).0[c]])
                    });
                    morphology::dilate(&plane, Norm::LInf, k)
                })
                .collect();
            let mut out = RgbaImage::new(width, height);
            for (x, y, p) in out.enumerate_pixels_mut() {
                for (c, plane) in channels.iter().enumerate() {
                    p.0[c] = plane.get_pixel(x, y).0[0];
                }
            }
            OcrImage::Rgba(out)
        }
    }
}

/// Scale to `target_height`, keeping aspect ratio
fn rescale(image: &OcrImage, target_height: u32) -> Option<(OcrImage, f32)> {
    let (width, height) = image.dimensions();
    if target_height == 0 || height == 0 || width == 0 {
        return None;
    }
    let scale = target_height as f32 / height as f32;
    let new_width = ((width as f32 * scale).round() as u32).max(1);

    let resized = match image {
        OcrImage::Rgba(img) => {
            OcrImage::Rgba(imageops::resize(img, new_width, target_height, FilterType::Triangle))
        }
        OcrImage::Luma(img) => {
            OcrImage::Luma(imageops::resize(img, new_width, target_height, FilterType::Triangle))
        }
    };
    Some((resized, scale))
}
