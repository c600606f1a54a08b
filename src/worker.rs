//! Sampling worker
//!
//! Owns the consumer thread. Each pass snapshots the latest frame without
//! blocking, runs change detection, preprocessing, recognition, smoothing and
//! publishing, then sleeps for whatever is left of the update interval. The
//! sleep is a condition-variable wait so that `stop()` wakes it immediately.

use crate::analysis::smoothing::EMPTY_SLOT;
use crate::app::Shared;
use crate::overlay::render_output;
use crate::shared::{is_valid_sink_name, TextFormatter};
use crate::vision::preprocess::{preprocess, PreprocessSettings};
use crate::vision::{should_skip, OcrBox};
use anyhow::{Context, Result};
use image::RgbaImage;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Cooperative run flag with an interruptible wait
#[derive(Debug, Default)]
pub struct CancelToken {
    running: Mutex<bool>,
    wake: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock()
    }

    /// Set the run flag, returning its previous value
    pub fn arm(&self) -> bool {
        std::mem::replace(&mut *self.running.lock(), true)
    }

    /// Clear the run flag and wake any waiter. Returns whether it was set.
    pub fn cancel(&self) -> bool {
        let was_running = std::mem::replace(&mut *self.running.lock(), false);
        self.wake.notify_all();
        was_running
    }

    /// Wait up to `timeout` unless cancelled first. Returns whether still running.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut running = self.running.lock();
        while *running {
            if self.wake.wait_until(&mut running, deadline).timed_out() {
                break;
            }
        }
        *running
    }
}

/// Lifecycle of the worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
}

/// What a single pass did
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// Producer held the frame lock or no frame exists yet
    NoFrame,
    /// Frame too similar to the last processed one
    Unchanged,
    /// Frame was recognized
    Processed {
        /// Text after gating and smoothing
        text: String,
        /// Boxes published to the image sink
        boxes: usize,
    },
}

/// State carried from one pass to the next, owned by the consumer
pub struct PassContext {
    last_frame: Option<RgbaImage>,
    formatter: TextFormatter,
}

impl Default for PassContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PassContext {
    pub fn new() -> Self {
        Self {
            last_frame: None,
            formatter: TextFormatter::new(),
        }
    }
}

/// Consumer thread handle
pub struct WorkerLoop {
    token: Arc<CancelToken>,
    handle: Option<JoinHandle<()>>,
    state: WorkerState,
}

impl Default for WorkerLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerLoop {
    pub fn new() -> Self {
        Self {
            token: Arc::new(CancelToken::new()),
            handle: None,
            state: WorkerState::Idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }

    /// Spawn the consumer thread. Ignored while already running.
    pub(crate) fn start(&mut self, shared: Arc<Shared>) {
        if self.state == WorkerState::Running {
            debug!("OCR worker already running");
            return;
        }

        // Armed before spawning so an immediate stop() is never lost.
        self.token.arm();
        let token = self.token.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("ocr-worker-{}", shared.id))
            .spawn(move || run(shared, token));

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = WorkerState::Running;
            }
            Err(e) => {
                self.token.cancel();
                error!("Failed to spawn OCR worker: {}", e);
            }
        }
    }

    /// Cancel, wake and join the consumer thread
    pub fn stop(&mut self) {
        if self.handle.is_none() {
            self.state = WorkerState::Idle;
            return;
        }
        self.state = WorkerState::Stopping;
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("OCR worker panicked");
            }
        }
        self.state = WorkerState::Idle;
    }
}

impl Drop for WorkerLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: Arc<Shared>, token: Arc<CancelToken>) {
    info!(
        "Starting OCR worker, update interval: {} ms",
        shared.update_interval_ms.load(Ordering::Relaxed)
    );

    let mut ctx = PassContext::new();
    while token.is_running() {
        let started = Instant::now();

        match process_pass(&shared, &mut ctx) {
            Ok(outcome) => trace!("OCR pass: {:?}", outcome),
            Err(e) => error!("OCR pass failed: {:#}", e),
        }

        let interval = Duration::from_millis(shared.update_interval_ms.load(Ordering::Relaxed));
        let remaining = interval.saturating_sub(started.elapsed());
        if !remaining.is_zero() && !token.wait_for(remaining) {
            break;
        }
    }

    info!("Stopping OCR worker");
}

/// Text delivered to sinks ends at the first unfilled smoothing slot
fn publishable(text: &str) -> &str {
    text.split(EMPTY_SLOT).next().unwrap_or_default()
}

/// Run one sampling pass against the shared state
pub(crate) fn process_pass(shared: &Shared, ctx: &mut PassContext) -> Result<PassOutcome> {
    let Some(captured) = shared.frames.try_snapshot() else {
        return Ok(PassOutcome::NoFrame);
    };
    if captured.image.width() == 0 || captured.image.height() == 0 {
        return Ok(PassOutcome::NoFrame);
    }
    trace!("Sampling frame written {:?} ago", captured.age());
    let frame = captured.image;

    // Held for the whole pass so it sees one consistent configuration.
    let mut processing = shared.processing.lock();
    let processing = &mut *processing;
    let settings = &processing.settings;

    if should_skip(
        settings.change_detection_enabled,
        settings.change_detection_threshold_percent,
        &frame,
        ctx.last_frame.as_ref(),
    ) {
        return Ok(PassOutcome::Unchanged);
    }

    let (frame_width, frame_height) = frame.dimensions();
    let prepared = preprocess(&frame, &PreprocessSettings::from(settings));
    ctx.last_frame = Some(frame);

    if let Some(preview) = prepared.preview {
        *shared.preview.lock() = Some(preview);
    }

    let recognized = processing
        .session
        .recognize(&prepared.image, settings.confidence_threshold)
        .context("recognition failed")?;
    let text = match (recognized, processing.smoothing.as_mut()) {
        (Some(text), Some(filter)) => filter.add_reading(&text),
        (Some(text), None) => text,
        (None, _) => String::new(),
    };

    let published = publishable(&text);
    if !published.is_empty() && is_valid_sink_name(&settings.output_text_sink_name) {
        match ctx
            .formatter
            .format(&settings.output_text_format_template, published)
        {
            Ok(formatted) => shared
                .sink
                .publish_text(&settings.output_text_sink_name, &formatted),
            Err(e) => warn!("Not publishing text: {:#}", e),
        }
    }

    let mut box_count = 0;
    if is_valid_sink_name(&settings.output_image_sink_name) {
        let boxes: Vec<OcrBox> = processing
            .session
            .extract_boxes(prepared.image.dimensions(), settings.confidence_threshold)
            .context("box extraction failed")?
            .into_iter()
            .map(|b| OcrBox {
                rect: b.rect.unscaled(prepared.scale),
                text: b.text,
            })
            .collect();
        box_count = boxes.len();

        let image = render_output(
            settings.output_image_mode,
            frame_width,
            frame_height,
            &boxes,
            shared.renderer.as_ref(),
        );
        shared
            .sink
            .publish_image(&settings.output_image_sink_name, &image);
    }

    Ok(PassOutcome::Processed {
        text,
        boxes: box_count,
    })
}
