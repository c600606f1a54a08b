//! Tesseract OCR backend
//!
//! Talks to the Tesseract C API through `tesseract-sys`. Engines are opened
//! with `TessBaseAPIInit1` so that config files (user patterns) take part in
//! dictionary loading; variables set after init cannot do that.

use super::ocr::{
    EngineFactory, EngineInit, EngineRegion, InitError, OcrEngine, OcrError, Recognition,
    RegionLevel,
};
use super::OcrImage;
use crate::config::SegmentationMode;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr::{self, NonNull};
use tesseract_sys::*;
use tracing::{debug, warn};

/// Word rows in Tesseract TSV output
const TSV_WORD_LEVEL: &str = "5";

/// Owned `TessBaseAPI` instance, ended and deleted on drop
struct TessApi {
    raw: NonNull<TessBaseAPI>,
}

// The C++ instance has no thread affinity; `&mut` access serializes calls.
unsafe impl Send for TessApi {}

impl TessApi {
    fn create() -> Option<Self> {
        NonNull::new(unsafe { TessBaseAPICreate() }).map(|raw| Self { raw })
    }

    fn as_ptr(&self) -> *mut TessBaseAPI {
        self.raw.as_ptr()
    }
}

impl Drop for TessApi {
    fn drop(&mut self) {
        unsafe {
            TessBaseAPIEnd(self.as_ptr());
            TessBaseAPIDelete(self.as_ptr());
        }
    }
}

/// Copy a string allocated by Tesseract and release the original
///
/// # Safety
/// `raw` must be null or a string returned by a `TessBaseAPIGet*Text` call.
unsafe fn take_text(raw: *mut c_char) -> Option<String> {
    if raw.is_null() {
        return None;
    }
    let text = CStr::from_ptr(raw).to_string_lossy().into_owned();
    TessDeleteText(raw);
    Some(text)
}

/// Config file as a C string, or `None` (logged) when it cannot be used
fn usable_config(path: &Path) -> Option<CString> {
    if !path.is_file() {
        warn!("Skipping missing engine config file {}", path.display());
        return None;
    }
    match CString::new(path.to_string_lossy().as_bytes()) {
        Ok(config) => Some(config),
        Err(_) => {
            warn!("Skipping engine config file with NUL in path {}", path.display());
            None
        }
    }
}

/// Opens LSTM-only Tesseract engines
#[derive(Debug, Default, Clone, Copy)]
pub struct TesseractFactory;

impl EngineFactory for TesseractFactory {
    fn open(&self, init: &EngineInit) -> Result<Box<dyn OcrEngine>, InitError> {
        let load_error = |reason: String| InitError::ModelLoad {
            language: init.language.clone(),
            path: init.model_path.clone(),
            reason,
        };
        let c_string = |s: &str| CString::new(s).map_err(|e| load_error(e.to_string()));

        let datapath = if init.model_path.is_empty() {
            None
        } else {
            Some(c_string(&init.model_path)?)
        };
        let language = c_string(&init.language)?;
        let configs: Vec<CString> = init
            .config_files
            .iter()
            .filter_map(|path| usable_config(path))
            .collect();
        let mut config_ptrs: Vec<*mut c_char> =
            configs.iter().map(|c| c.as_ptr() as *mut c_char).collect();
        debug!("Opening Tesseract with {} config file(s)", config_ptrs.len());

        let api = TessApi::create()
            .ok_or_else(|| load_error("could not allocate engine".to_string()))?;
        let status = unsafe {
            TessBaseAPIInit1(
                api.as_ptr(),
                datapath.as_ref().map_or(ptr::null(), |p| p.as_ptr()),
                language.as_ptr(),
                TessOcrEngineMode_OEM_LSTM_ONLY,
                if config_ptrs.is_empty() {
                    ptr::null_mut()
                } else {
                    config_ptrs.as_mut_ptr()
                },
                config_ptrs.len() as c_int,
            )
        };
        if status != 0 {
            return Err(load_error(format!("engine init returned {status}")));
        }

        Ok(Box::new(TesseractEngine { api: Some(api) }))
    }
}

pub struct TesseractEngine {
    api: Option<TessApi>,
}

impl TesseractEngine {
    fn live(&self) -> Result<*mut TessBaseAPI, OcrError> {
        self.api
            .as_ref()
            .map(TessApi::as_ptr)
            .ok_or(OcrError::NotInitialized)
    }
}

fn page_seg_mode(mode: SegmentationMode) -> TessPageSegMode {
    match mode {
        SegmentationMode::OsdOnly => TessPageSegMode_PSM_OSD_ONLY,
        SegmentationMode::AutoOsd => TessPageSegMode_PSM_AUTO_OSD,
        SegmentationMode::AutoOnly => TessPageSegMode_PSM_AUTO_ONLY,
        SegmentationMode::Auto => TessPageSegMode_PSM_AUTO,
        SegmentationMode::SingleColumn => TessPageSegMode_PSM_SINGLE_COLUMN,
        SegmentationMode::SingleBlockVertText => TessPageSegMode_PSM_SINGLE_BLOCK_VERT_TEXT,
        SegmentationMode::SingleBlock => TessPageSegMode_PSM_SINGLE_BLOCK,
        SegmentationMode::SingleLine => TessPageSegMode_PSM_SINGLE_LINE,
        SegmentationMode::SingleWord => TessPageSegMode_PSM_SINGLE_WORD,
        SegmentationMode::CircleWord => TessPageSegMode_PSM_CIRCLE_WORD,
        SegmentationMode::SingleChar => TessPageSegMode_PSM_SINGLE_CHAR,
        SegmentationMode::SparseText => TessPageSegMode_PSM_SPARSE_TEXT,
        SegmentationMode::SparseTextOsd => TessPageSegMode_PSM_SPARSE_TEXT_OSD,
        SegmentationMode::RawLine => TessPageSegMode_PSM_RAW_LINE,
    }
}

impl OcrEngine for TesseractEngine {
    fn set_segmentation_mode(&mut self, mode: SegmentationMode) -> Result<(), OcrError> {
        let api = self.live()?;
        unsafe { TessBaseAPISetPageSegMode(api, page_seg_mode(mode)) };
        Ok(())
    }

    fn set_char_allowlist(&mut self, allowlist: &str) -> Result<(), OcrError> {
        let api = self.live()?;
        let value = CString::new(allowlist).map_err(|e| OcrError::Engine(e.to_string()))?;
        let ok = unsafe {
            TessBaseAPISetVariable(api, c"tessedit_char_whitelist".as_ptr(), value.as_ptr())
        };
        if ok == 0 {
            return Err(OcrError::Engine(
                "tessedit_char_whitelist rejected".to_string(),
            ));
        }
        Ok(())
    }

    fn recognize(&mut self, image: &OcrImage) -> Result<Recognition, OcrError> {
        let api = self.live()?;
        let status = unsafe {
            TessBaseAPISetImage(
                api,
                image.as_raw().as_ptr(),
                image.width() as c_int,
                image.height() as c_int,
                image.channels() as c_int,
                image.stride() as c_int,
            );
            TessBaseAPIRecognize(api, ptr::null_mut())
        };
        if status != 0 {
            return Err(OcrError::Engine(format!("recognition returned {status}")));
        }

        let text = unsafe { take_text(TessBaseAPIGetUTF8Text(api)) };
        let mean_confidence = unsafe { TessBaseAPIMeanTextConf(api) };
        Ok(Recognition {
            text,
            mean_confidence,
        })
    }

    fn regions(&mut self, _level: RegionLevel) -> Result<Vec<EngineRegion>, OcrError> {
        // Single-character segmentation reports each symbol as its own word row.
        let api = self.live()?;
        let tsv = unsafe { take_text(TessBaseAPIGetTsvText(api, 0)) }
            .ok_or_else(|| OcrError::Engine("no layout for last image".to_string()))?;
        Ok(parse_tsv_words(&tsv))
    }

    fn close(&mut self) {
        self.api = None;
    }
}

/// Word rows of `level page block par line word left top width height conf text`
fn parse_tsv_words(tsv: &str) -> Vec<EngineRegion> {
    tsv.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.splitn(12, '\t').collect();
            if cols.len() < 11 || cols[0] != TSV_WORD_LEVEL {
                return None;
            }
            let num = |i: usize| cols[i].trim().parse::<i32>().ok();
            let (left, top, width, height) = (num(6)?, num(7)?, num(8)?, num(9)?);
            let confidence = cols[10].trim().parse::<f32>().ok()?;
            let text = cols.get(11).map(|t| t.trim()).unwrap_or_default().to_string();
            Some(EngineRegion {
                empty: text.is_empty(),
                text,
                confidence,
                left,
                top,
                right: left + width,
                bottom: top + height,
            })
        })
        .collect()
}
