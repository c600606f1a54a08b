//! Vision/OCR Layer
//!
//! Change detection, preprocessing and recognition of sampled frames.
//! Backends:
//! - any [`OcrEngine`] supplied through an [`EngineFactory`]
//! - Tesseract (feature `tesseract`)

pub mod change;
pub mod ocr;
pub mod preprocess;
#[cfg(feature = "tesseract")]
pub mod tesseract;

use image::{DynamicImage, GrayImage, RgbaImage};

pub use change::should_skip;
pub use ocr::{
    BoxRect, EngineFactory, EngineHandle, EngineInit, EngineRegion, InitError, OcrBox, OcrEngine,
    OcrError, OcrSession, Recognition, RegionLevel,
};
pub use preprocess::{Preprocessed, PreprocessSettings};

/// Image handed to the OCR engine
#[derive(Debug, Clone, PartialEq)]
pub enum OcrImage {
    /// Colour pixels, 4 channels
    Rgba(RgbaImage),
    /// Single-channel intensity (binarized or grayscale)
    Luma(GrayImage),
}

impl OcrImage {
    pub fn width(&self) -> u32 {
        match self {
            OcrImage::Rgba(img) => img.width(),
            OcrImage::Luma(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            OcrImage::Rgba(img) => img.height(),
            OcrImage::Luma(img) => img.height(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Bytes per pixel
    pub fn channels(&self) -> u32 {
        match self {
            OcrImage::Rgba(_) => 4,
            OcrImage::Luma(_) => 1,
        }
    }

    /// Raw row-major pixel bytes
    pub fn as_raw(&self) -> &[u8] {
        match self {
            OcrImage::Rgba(img) => img.as_raw(),
            OcrImage::Luma(img) => img.as_raw(),
        }
    }

    /// Bytes per row
    pub fn stride(&self) -> u32 {
        self.width() * self.channels()
    }

    /// 4-channel copy for display, expanding intensity to gray
    pub fn to_rgba(&self) -> RgbaImage {
        match self {
            OcrImage::Rgba(img) => img.clone(),
            OcrImage::Luma(img) => DynamicImage::ImageLuma8(img.clone()).to_rgba8(),
        }
    }
}
