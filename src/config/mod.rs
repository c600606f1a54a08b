//! Pipeline Configuration
//!
//! Recognition, preprocessing, smoothing and output settings stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Page segmentation mode handed to the OCR engine
///
/// Mirrors the Tesseract page segmentation modes, in engine order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Orientation and script detection only
    OsdOnly,
    /// Automatic page segmentation with OSD
    AutoOsd,
    /// Automatic page segmentation, no OSD or OCR
    AutoOnly,
    /// Fully automatic page segmentation
    Auto,
    /// Single column of text of variable sizes
    SingleColumn,
    /// Single uniform block of vertically aligned text
    SingleBlockVertText,
    /// Single uniform block of text
    #[default]
    SingleBlock,
    /// Single text line
    SingleLine,
    /// Single word
    SingleWord,
    /// Single word in a circle
    CircleWord,
    /// Single character
    SingleChar,
    /// As much text as possible in no particular order
    SparseText,
    /// Sparse text with OSD
    SparseTextOsd,
    /// Single text line, bypassing engine-specific hacks
    RawLine,
}

impl SegmentationMode {
    /// Numeric value used by the engine
    pub fn as_engine_value(self) -> i32 {
        self as i32
    }
}

/// Binarization applied before recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinarizationMode {
    #[default]
    None,
    /// Global threshold at `binarization_threshold`
    Fixed,
    /// Local mean over `binarization_block_size`
    AdaptiveMean,
    /// Local Gaussian-weighted mean over `binarization_block_size`
    AdaptiveGaussian,
    /// Automatic global threshold, triangle method
    Triangle,
    /// Automatic global threshold, Otsu's method
    Otsu,
}

/// What the image sink receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputImageMode {
    /// White boxes on opaque black
    #[default]
    DetectionMask,
    /// Recognized text drawn over a transparent canvas
    TextOverlay,
    /// Recognized text drawn over a filled background
    TextOverlayWithBackground,
}

/// How disruptive a settings change is for a running pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconfigKind {
    /// Nothing changed
    None,
    /// Adjustable in place, engine handle survives
    Soft,
    /// Engine must be torn down and recreated, worker restarted
    Hard,
}

/// Full pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Directory holding the trained model data (empty = engine default)
    pub model_path: String,
    /// Model language, e.g. "eng"
    pub language: String,
    pub segmentation_mode: SegmentationMode,
    /// Characters the engine may emit (empty = all)
    pub char_allowlist: String,
    /// Multi-line user pattern dictionary (empty = none)
    pub user_patterns: String,
    /// Minimum confidence (0 - 100) for text and word boxes
    pub confidence_threshold: i32,
    /// Target duration of one sampling pass
    pub update_interval_ms: u64,
    pub change_detection_enabled: bool,
    /// Percentage of changed pixels required to reprocess
    pub change_detection_threshold_percent: i32,
    pub binarization_mode: BinarizationMode,
    pub binarization_threshold: u8,
    /// Neighbourhood size for adaptive modes (corrected to odd)
    pub binarization_block_size: u32,
    /// 3x3 dilation iterations (0 = off)
    pub dilation_iterations: u32,
    /// Copy the preprocessed image out for display
    pub preview_enabled: bool,
    pub rescale_enabled: bool,
    /// Height the OCR image is scaled to when rescaling
    pub rescale_target_height: u32,
    pub smoothing_enabled: bool,
    /// Fixed reading length the smoother normalizes to
    pub smoothing_word_length: usize,
    /// Number of readings each character position votes over
    pub smoothing_window_size: usize,
    pub output_text_sink_name: String,
    pub output_image_sink_name: String,
    pub output_image_mode: OutputImageMode,
    /// Template with a single `output` variable
    pub output_text_format_template: String,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            language: "eng".to_string(),
            segmentation_mode: SegmentationMode::default(),
            char_allowlist: String::new(),
            user_patterns: String::new(),
            confidence_threshold: 50,
            update_interval_ms: 100,
            change_detection_enabled: false,
            change_detection_threshold_percent: 5,
            binarization_mode: BinarizationMode::None,
            binarization_threshold: 127,
            binarization_block_size: 15,
            dilation_iterations: 0,
            preview_enabled: false,
            rescale_enabled: false,
            rescale_target_height: 300,
            smoothing_enabled: false,
            smoothing_word_length: 5,
            smoothing_window_size: 10,
            output_text_sink_name: String::new(),
            output_image_sink_name: String::new(),
            output_image_mode: OutputImageMode::DetectionMask,
            output_text_format_template: "{{ output }}".to_string(),
        }
    }
}

impl FilterSettings {
    /// Clamp values into their accepted ranges
    pub fn validate(mut self) -> Self {
        self.confidence_threshold = self.confidence_threshold.clamp(0, 100);
        self.change_detection_threshold_percent = self.change_detection_threshold_percent.max(0);
        self
    }

    /// Classify the change from `self` to `next`
    pub fn change_kind(&self, next: &FilterSettings) -> ReconfigKind {
        if self.model_path != next.model_path
            || self.language != next.language
            || self.user_patterns != next.user_patterns
        {
            ReconfigKind::Hard
        } else if self != next {
            ReconfigKind::Soft
        } else {
            ReconfigKind::None
        }
    }

    /// Whether the smoothing filter must be rebuilt when moving to `next`
    pub fn smoothing_changed(&self, next: &FilterSettings) -> bool {
        self.smoothing_enabled != next.smoothing_enabled
            || self.smoothing_word_length != next.smoothing_word_length
            || self.smoothing_window_size != next.smoothing_window_size
    }
}

/// Load settings from file
pub fn load_settings(path: &Path) -> Result<FilterSettings> {
    let content = std::fs::read_to_string(path)?;
    let settings: FilterSettings = toml::from_str(&content)?;
    Ok(settings.validate())
}

/// Save settings to file
pub fn save_settings(settings: &FilterSettings, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}
