//! OCR engine session
//!
//! Owns the engine handle across reconfigurations, gates recognized text by
//! confidence and turns engine regions into filtered boxes.

use crate::config::SegmentationMode;
use crate::vision::OcrImage;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Boxes smaller than this many pixels are noise
pub const MIN_BOX_AREA: i64 = 100;

/// Engine failed to load its model
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to load model '{language}' from '{path}': {reason}")]
    ModelLoad {
        language: String,
        path: String,
        reason: String,
    },
}

/// Failure while using an initialized (or missing) engine
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine is not initialized")]
    NotInitialized,
    #[error("OCR engine error: {0}")]
    Engine(String),
}

/// Granularity of region iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionLevel {
    Word,
    Symbol,
}

/// Raw recognition output from an engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    /// UTF-8 text, `None` when the engine produced nothing
    pub text: Option<String>,
    /// Mean confidence, 0 - 100
    pub mean_confidence: i32,
}

/// One region reported by the engine for the last recognized image
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRegion {
    pub text: String,
    pub confidence: f32,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    /// Region holds no recognizable content
    pub empty: bool,
}

/// Axis-aligned integer rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoxRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoxRect {
    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Map a rectangle from an image scaled by `scale` back to unscaled space
    pub fn unscaled(&self, scale: f32) -> BoxRect {
        if scale <= 0.0 || (scale - 1.0).abs() < f32::EPSILON {
            return *self;
        }
        let f = |v: i32| (v as f32 / scale).round() as i32;
        BoxRect {
            x: f(self.x),
            y: f(self.y),
            width: f(self.width),
            height: f(self.height),
        }
    }
}

/// A labelled text region
#[derive(Debug, Clone, PartialEq)]
pub struct OcrBox {
    pub text: String,
    pub rect: BoxRect,
}

/// Parameters for opening an engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineInit {
    /// Model data directory (empty = engine default)
    pub model_path: String,
    pub language: String,
    /// Engine config files applied at load time
    pub config_files: Vec<PathBuf>,
}

/// An OCR engine instance
pub trait OcrEngine: Send {
    fn set_segmentation_mode(&mut self, mode: SegmentationMode) -> Result<(), OcrError>;

    fn set_char_allowlist(&mut self, allowlist: &str) -> Result<(), OcrError>;

    /// Recognize `image`; region queries refer to the last recognized image
    fn recognize(&mut self, image: &OcrImage) -> Result<Recognition, OcrError>;

    fn regions(&mut self, level: RegionLevel) -> Result<Vec<EngineRegion>, OcrError>;

    /// Release engine resources. Called exactly once by [`EngineHandle`].
    fn close(&mut self) {}
}

/// Creates engine instances for (re)initialization
pub trait EngineFactory: Send + Sync {
    fn open(&self, init: &EngineInit) -> Result<Box<dyn OcrEngine>, InitError>;
}

/// Owned engine that is closed on every exit path
pub struct EngineHandle {
    engine: Option<Box<dyn OcrEngine>>,
}

impl EngineHandle {
    pub fn new(engine: Box<dyn OcrEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    pub fn engine(&mut self) -> Result<&mut (dyn OcrEngine + 'static), OcrError> {
        self.engine.as_deref_mut().ok_or(OcrError::NotInitialized)
    }

    pub fn close(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.close();
            debug!("OCR engine closed");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Engine session with the recognition parameters last applied to it
#[derive(Default)]
pub struct OcrSession {
    handle: Option<EngineHandle>,
    segmentation_mode: SegmentationMode,
}

impl OcrSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.is_some()
    }

    pub fn segmentation_mode(&self) -> SegmentationMode {
        self.segmentation_mode
    }

    /// Tear down any existing engine and open a new one.
    ///
    /// Config files are optional: when the engine cannot be opened with
    /// them, it is opened once more without. On failure the session is left
    /// uninitialized.
    pub fn initialize(
        &mut self,
        factory: &dyn EngineFactory,
        init: &EngineInit,
        mode: SegmentationMode,
        allowlist: &str,
    ) -> Result<(), InitError> {
        self.close();

        info!(
            "Loading OCR model '{}' from: {}",
            init.language,
            if init.model_path.is_empty() { "<default>" } else { &init.model_path }
        );
        let engine = match factory.open(init) {
            Ok(engine) => engine,
            Err(e) if !init.config_files.is_empty() => {
                warn!("Loading OCR model without config files after error: {}", e);
                factory.open(&EngineInit {
                    config_files: Vec::new(),
                    ..init.clone()
                })?
            }
            Err(e) => return Err(e),
        };
        let mut handle = EngineHandle::new(engine);
        apply_soft_settings(&mut handle, mode, allowlist).map_err(|e| InitError::ModelLoad {
            language: init.language.clone(),
            path: init.model_path.clone(),
            reason: e.to_string(),
        })?;

        self.handle = Some(handle);
        self.segmentation_mode = mode;
        Ok(())
    }

    /// Change segmentation mode and allow-list on the live engine
    pub fn reconfigure(&mut self, mode: SegmentationMode, allowlist: &str) -> Result<(), OcrError> {
        let handle = self.handle.as_mut().ok_or(OcrError::NotInitialized)?;
        apply_soft_settings(handle, mode, allowlist)?;
        self.segmentation_mode = mode;
        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }

    /// Recognize `image`, returning trimmed text, or `None` when the engine
    /// found nothing or its mean confidence is below `threshold`
    pub fn recognize(
        &mut self,
        image: &OcrImage,
        threshold: i32,
    ) -> Result<Option<String>, OcrError> {
        let engine = self
            .handle
            .as_mut()
            .ok_or(OcrError::NotInitialized)?
            .engine()?;
        let recognition = engine.recognize(image)?;
        Ok(gate_text(recognition, threshold))
    }

    /// Boxes for the last recognized image of size `image_size`
    pub fn extract_boxes(
        &mut self,
        image_size: (u32, u32),
        threshold: i32,
    ) -> Result<Vec<OcrBox>, OcrError> {
        let level = if self.segmentation_mode == SegmentationMode::SingleChar {
            RegionLevel::Symbol
        } else {
            RegionLevel::Word
        };
        let engine = self
            .handle
            .as_mut()
            .ok_or(OcrError::NotInitialized)?
            .engine()?;
        let regions = engine.regions(level)?;
        Ok(filter_regions(regions, level, image_size, threshold))
    }
}

fn apply_soft_settings(
    handle: &mut EngineHandle,
    mode: SegmentationMode,
    allowlist: &str,
) -> Result<(), OcrError> {
    let engine = handle.engine()?;
    engine.set_segmentation_mode(mode)?;
    engine.set_char_allowlist(allowlist)?;
    Ok(())
}

/// Confidence gate followed by whitespace trimming
pub fn gate_text(recognition: Recognition, threshold: i32) -> Option<String> {
    match recognition.text {
        Some(text) if recognition.mean_confidence >= threshold => {
            Some(text.trim_matches([' ', '\t', '\n', '\r']).to_string())
        }
        _ => None,
    }
}

/// Keep regions that carry content, pass the per-word confidence gate and
/// have a sane area relative to the image
pub fn filter_regions(
    regions: Vec<EngineRegion>,
    level: RegionLevel,
    image_size: (u32, u32),
    threshold: i32,
) -> Vec<OcrBox> {
    let max_area = image_size.0 as i64 * image_size.1 as i64 / 2;

    regions
        .into_iter()
        .filter(|r| !r.empty)
        .filter(|r| level != RegionLevel::Word || r.confidence as i32 >= threshold)
        .filter_map(|r| {
            let rect = BoxRect {
                x: r.left,
                y: r.top,
                width: r.right - r.left,
                height: r.bottom - r.top,
            };
            let area = rect.area();
            (MIN_BOX_AREA..=max_area)
                .contains(&area)
                .then_some(OcrBox { text: r.text, rect })
        })
        .collect()
}
