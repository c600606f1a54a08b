//! ocr-sampler - continuous OCR sampling of a shared video frame
//!
//! A background worker periodically snapshots the latest frame, skips it when
//! nothing changed, preprocesses it, recognizes text with a pluggable engine,
//! smooths the result over time and publishes text and region images to
//! named sinks.

pub mod analysis;
pub mod app;
pub mod capture;
pub mod config;
pub mod overlay;
pub mod shared;
pub mod storage;
pub mod vision;
pub mod worker;

pub use app::{Pipeline, PipelineBuilder};
pub use config::FilterSettings;
pub use worker::{PassContext, PassOutcome, WorkerState};
