//! Pipeline Coordinator
//!
//! Owns the state of one active OCR pipeline: settings, engine session,
//! smoothing filter, frame and preview buffers, and the worker thread.
//! Applies reconfiguration either in place or through a full engine reload.

use crate::analysis::SmoothingFilter;
use crate::capture::FrameBuffer;
use crate::config::{FilterSettings, ReconfigKind};
use crate::overlay::{OutlineRenderer, OverlayRenderer};
use crate::shared::{is_valid_sink_name, NullSink, OutputSink};
use crate::storage::{PluginFiles, StorageError};
use crate::vision::{EngineFactory, EngineInit, OcrSession};
use crate::worker::{process_pass, PassContext, PassOutcome, WorkerLoop, WorkerState};
use anyhow::Result;
use image::RgbaImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything a pass reads or mutates under the settings lock
pub(crate) struct Processing {
    pub settings: FilterSettings,
    pub session: OcrSession,
    pub smoothing: Option<SmoothingFilter>,
}

/// State shared between the host and the worker thread
pub(crate) struct Shared {
    pub id: String,
    pub frames: FrameBuffer,
    pub preview: Mutex<Option<RgbaImage>>,
    pub processing: Mutex<Processing>,
    pub update_interval_ms: AtomicU64,
    pub sink: Arc<dyn OutputSink>,
    pub renderer: Arc<dyn OverlayRenderer>,
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    factory: Arc<dyn EngineFactory>,
    id: Option<String>,
    files: Option<PluginFiles>,
    sink: Arc<dyn OutputSink>,
    renderer: Arc<dyn OverlayRenderer>,
    autostart: bool,
}

impl PipelineBuilder {
    /// Instance identifier keying the side files (default: random UUID)
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Directory for side files (default: module config directory)
    pub fn files(mut self, files: PluginFiles) -> Self {
        self.files = Some(files);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn OverlayRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Do not spawn the worker; the host drives passes with [`Pipeline::run_pass`]
    pub fn manual(mut self) -> Self {
        self.autostart = false;
        self
    }

    /// Create the pipeline, load the engine and start sampling (unless manual).
    ///
    /// An engine that fails to load is logged; the pipeline then stays idle
    /// until a later [`Pipeline::configure`] succeeds.
    pub fn build(self, settings: FilterSettings) -> Result<Pipeline, StorageError> {
        let files = match self.files {
            Some(files) => files,
            None => PluginFiles::in_config_dir()?,
        };
        let id = self
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let settings = settings.validate();

        let shared = Arc::new(Shared {
            id,
            frames: FrameBuffer::new(),
            preview: Mutex::new(None),
            update_interval_ms: AtomicU64::new(settings.update_interval_ms),
            processing: Mutex::new(Processing {
                smoothing: build_smoothing(&settings),
                settings: settings.clone(),
                session: OcrSession::new(),
            }),
            sink: self.sink,
            renderer: self.renderer,
        });

        let mut pipeline = Pipeline {
            shared,
            worker: WorkerLoop::new(),
            wants_running: self.autostart,
            factory: self.factory,
            files,
        };
        pipeline.hard_reinitialize(settings);
        Ok(pipeline)
    }
}

fn build_smoothing(settings: &FilterSettings) -> Option<SmoothingFilter> {
    settings.smoothing_enabled.then(|| {
        SmoothingFilter::new(settings.smoothing_word_length, settings.smoothing_window_size)
    })
}

/// One active OCR sampling pipeline
pub struct Pipeline {
    shared: Arc<Shared>,
    worker: WorkerLoop,
    /// Whether the worker should sample whenever an engine is loaded
    wants_running: bool,
    factory: Arc<dyn EngineFactory>,
    files: PluginFiles,
}

impl Pipeline {
    pub fn builder(factory: Arc<dyn EngineFactory>) -> PipelineBuilder {
        PipelineBuilder {
            factory,
            id: None,
            files: None,
            sink: Arc::new(NullSink),
            renderer: Arc::new(OutlineRenderer),
            autostart: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn files(&self) -> &PluginFiles {
        &self.files
    }

    /// Whether an engine is loaded
    pub fn is_ready(&self) -> bool {
        self.shared.processing.lock().session.is_initialized()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    pub fn settings(&self) -> FilterSettings {
        self.shared.processing.lock().settings.clone()
    }

    /// Producer side: replace the latest frame
    pub fn submit_frame(&self, image: RgbaImage) {
        self.shared.frames.write(image);
    }

    /// Producer side: the frame slot itself, for in-place writes
    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.shared.frames
    }

    /// Latest preprocessed preview, if previews are enabled
    pub fn preview(&self) -> Option<RgbaImage> {
        self.shared.preview.lock().clone()
    }

    /// Run a single pass on the calling thread
    pub fn run_pass(&self, ctx: &mut PassContext) -> Result<PassOutcome> {
        process_pass(&self.shared, ctx)
    }

    /// Apply new settings, reloading the engine only when required
    pub fn configure(&mut self, settings: FilterSettings) {
        let settings = settings.validate();
        let kind = {
            let processing = self.shared.processing.lock();
            if processing.session.is_initialized() {
                processing.settings.change_kind(&settings)
            } else {
                ReconfigKind::Hard
            }
        };

        match kind {
            ReconfigKind::None => {}
            ReconfigKind::Soft => self.soft_reconfigure(settings),
            ReconfigKind::Hard => self.hard_reinitialize(settings),
        }
    }

    fn soft_reconfigure(&mut self, settings: FilterSettings) {
        info!("Updating OCR settings in place");
        let mut processing = self.shared.processing.lock();

        if let Err(e) = processing
            .session
            .reconfigure(settings.segmentation_mode, &settings.char_allowlist)
        {
            error!("Failed to update OCR engine settings: {}", e);
        }
        if processing.settings.smoothing_changed(&settings) {
            processing.smoothing = build_smoothing(&settings);
        }
        if is_valid_sink_name(&settings.output_image_sink_name) {
            self.ensure_files_dir();
        }
        self.shared
            .update_interval_ms
            .store(settings.update_interval_ms, Ordering::Relaxed);
        processing.settings = settings;
    }

    /// Stop the worker, reload the engine and start the worker again if wanted
    fn hard_reinitialize(&mut self, settings: FilterSettings) {
        self.worker.stop();

        {
            let mut processing = self.shared.processing.lock();

            if is_valid_sink_name(&settings.output_image_sink_name) {
                self.ensure_files_dir();
            }

            let config_files = match self
                .files
                .write_user_patterns(&self.shared.id, &settings.user_patterns)
            {
                Ok(config) => config.into_iter().collect(),
                Err(e) => {
                    warn!("Continuing without user patterns: {}", e);
                    Vec::new()
                }
            };
            let init = EngineInit {
                model_path: settings.model_path.clone(),
                language: settings.language.clone(),
                config_files,
            };

            if let Err(e) = processing.session.initialize(
                self.factory.as_ref(),
                &init,
                settings.segmentation_mode,
                &settings.char_allowlist,
            ) {
                error!("Failed to load OCR model: {}", e);
            }

            processing.smoothing = build_smoothing(&settings);
            self.shared
                .update_interval_ms
                .store(settings.update_interval_ms, Ordering::Relaxed);
            processing.settings = settings;

            if !processing.session.is_initialized() {
                return;
            }
        }

        if self.wants_running {
            self.worker.start(self.shared.clone());
        }
    }

    /// Start the worker thread now if an engine is loaded, otherwise after
    /// the next successful reload
    pub fn start(&mut self) {
        self.wants_running = true;
        if self.is_ready() {
            self.worker.start(self.shared.clone());
        } else {
            warn!("No OCR engine loaded, worker starts after the next successful reload");
        }
    }

    /// Stop the worker thread; the engine stays loaded
    pub fn stop(&mut self) {
        self.wants_running = false;
        self.worker.stop();
    }

    fn ensure_files_dir(&self) {
        if let Err(e) = self.files.ensure_dir() {
            warn!("Cannot create output directory: {}", e);
        }
    }

    /// Stop sampling and release the engine
    pub fn shutdown(&mut self) {
        self.wants_running = false;
        self.worker.stop();
        self.shared.processing.lock().session.close();
    }

    /// Remove this instance's side files
    pub fn cleanup_files(&self) -> Result<(), StorageError> {
        self.files.cleanup(&self.shared.id)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentationMode;
    use crate::shared::{ChannelSink, PipelineOutput};
    use crate::vision::{
        EngineRegion, InitError, OcrEngine, OcrError, OcrImage, Recognition, RegionLevel,
    };
    use crossbeam_channel::Receiver;
    use image::Rgba;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[derive(Default)]
    struct ScriptState {
        text: Option<String>,
        confidence: i32,
        regions: Vec<EngineRegion>,
        mode: Option<SegmentationMode>,
        allowlist: String,
        fail_open: bool,
        opens: usize,
        closes: usize,
        recognized: usize,
        used_after_close: usize,
        last_init: Option<EngineInit>,
        last_size: (u32, u32),
    }

    type Script = Arc<Mutex<ScriptState>>;

    struct ScriptedEngine {
        script: Script,
        closed: bool,
    }

    impl OcrEngine for ScriptedEngine {
        fn set_segmentation_mode(&mut self, mode: SegmentationMode) -> Result<(), OcrError> {
            self.script.lock().mode = Some(mode);
            Ok(())
        }

        fn set_char_allowlist(&mut self, allowlist: &str) -> Result<(), OcrError> {
            self.script.lock().allowlist = allowlist.to_string();
            Ok(())
        }

        fn recognize(&mut self, image: &OcrImage) -> Result<Recognition, OcrError> {
            let mut s = self.script.lock();
            if self.closed {
                s.used_after_close += 1;
            }
            s.recognized += 1;
            s.last_size = image.dimensions();
            Ok(Recognition {
                text: s.text.clone(),
                mean_confidence: s.confidence,
            })
        }

        fn regions(&mut self, _level: RegionLevel) -> Result<Vec<EngineRegion>, OcrError> {
            Ok(self.script.lock().regions.clone())
        }

        fn close(&mut self) {
            self.closed = true;
            self.script.lock().closes += 1;
        }
    }

    struct ScriptedFactory {
        script: Script,
    }

    impl EngineFactory for ScriptedFactory {
        fn open(&self, init: &EngineInit) -> Result<Box<dyn OcrEngine>, InitError> {
            let mut s = self.script.lock();
            s.opens += 1;
            s.last_init = Some(init.clone());
            if s.fail_open {
                return Err(InitError::ModelLoad {
                    language: init.language.clone(),
                    path: init.model_path.clone(),
                    reason: "no such model".to_string(),
                });
            }
            Ok(Box::new(ScriptedEngine {
                script: self.script.clone(),
                closed: false,
            }))
        }
    }

    fn script(text: &str, confidence: i32) -> Script {
        Arc::new(Mutex::new(ScriptState {
            text: Some(text.to_string()),
            confidence,
            ..Default::default()
        }))
    }

    fn builder(script: &Script, dir: &TempDir) -> (PipelineBuilder, Receiver<PipelineOutput>) {
        let (sink, rx) = ChannelSink::unbounded();
        let builder = Pipeline::builder(Arc::new(ScriptedFactory {
            script: script.clone(),
        }))
        .id("test")
        .files(PluginFiles::new(dir.path()))
        .sink(Arc::new(sink));
        (builder, rx)
    }

    fn manual(
        script: &Script,
        dir: &TempDir,
        settings: FilterSettings,
    ) -> (Pipeline, Receiver<PipelineOutput>) {
        let (builder, rx) = builder(script, dir);
        (builder.manual().build(settings).unwrap(), rx)
    }

    fn texts(rx: &Receiver<PipelineOutput>) -> Vec<String> {
        rx.try_iter()
            .filter_map(|output| match output {
                PipelineOutput::Text { text, .. } => Some(text),
                PipelineOutput::Image { .. } => None,
            })
            .collect()
    }

    fn frame(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(64, 32, Rgba([value, value, value, 255]))
    }

    #[test]
    fn test_manual_pipeline_is_ready_but_idle() {
        let dir = TempDir::new().unwrap();
        let script = script("", 0);
        let (pipeline, _rx) = manual(&script, &dir, FilterSettings::default());

        assert!(pipeline.is_ready());
        assert_eq!(pipeline.worker_state(), WorkerState::Idle);
        assert_eq!(pipeline.id(), "test");
        let s = script.lock();
        assert_eq!(s.opens, 1);
        assert_eq!(s.mode, Some(SegmentationMode::SingleBlock));
        assert_eq!(s.last_init.as_ref().unwrap().language, "eng");
    }

    #[test]
    fn test_pass_without_frame() {
        let dir = TempDir::new().unwrap();
        let script = script("1", 90);
        let (pipeline, _rx) = manual(&script, &dir, FilterSettings::default());

        let mut ctx = PassContext::new();
        assert_eq!(pipeline.run_pass(&mut ctx).unwrap(), PassOutcome::NoFrame);
        assert_eq!(script.lock().recognized, 0);
    }

    #[test]
    fn test_pass_skips_while_producer_holds_frame() {
        let dir = TempDir::new().unwrap();
        let script = script("1", 90);
        let (pipeline, _rx) = manual(&script, &dir, FilterSettings::default());
        pipeline.submit_frame(frame(0));

        let mut ctx = PassContext::new();
        let guard = pipeline.frame_buffer().lock();
        assert_eq!(pipeline.run_pass(&mut ctx).unwrap(), PassOutcome::NoFrame);
        drop(guard);

        assert!(matches!(
            pipeline.run_pass(&mut ctx).unwrap(),
            PassOutcome::Processed { .. }
        ));
        assert_eq!(script.lock().recognized, 1);
    }

    #[test]
    fn test_confidence_gate_and_template() {
        let dir = TempDir::new().unwrap();
        let script = script("  42\n", 80);
        let settings = FilterSettings {
            output_text_sink_name: "score".to_string(),
            output_text_format_template: "Score: {{ output }}".to_string(),
            ..Default::default()
        };
        let (pipeline, rx) = manual(&script, &dir, settings);
        pipeline.submit_frame(frame(0));
        let mut ctx = PassContext::new();

        assert_eq!(
            pipeline.run_pass(&mut ctx).unwrap(),
            PassOutcome::Processed {
                text: "42".to_string(),
                boxes: 0
            }
        );
        assert_eq!(texts(&rx), vec!["Score: 42"]);

        script.lock().confidence = 49;
        assert_eq!(
            pipeline.run_pass(&mut ctx).unwrap(),
            PassOutcome::Processed {
                text: String::new(),
                boxes: 0
            }
        );
        assert!(texts(&rx).is_empty());
    }

    #[test]
    fn test_placeholder_sink_name_suppresses_text() {
        let dir = TempDir::new().unwrap();
        let script = script("42", 80);
        let settings = FilterSettings {
            output_text_sink_name: "none".to_string(),
            ..Default::default()
        };
        let (pipeline, rx) = manual(&script, &dir, settings);
        pipeline.submit_frame(frame(0));

        pipeline.run_pass(&mut PassContext::new()).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unchanged_frames_are_skipped() {
        let dir = TempDir::new().unwrap();
        let script = script("1", 90);
        let settings = FilterSettings {
            change_detection_enabled: true,
            change_detection_threshold_percent: 5,
            ..Default::default()
        };
        let (pipeline, _rx) = manual(&script, &dir, settings);
        let mut ctx = PassContext::new();

        pipeline.submit_frame(frame(10));
        assert!(matches!(
            pipeline.run_pass(&mut ctx).unwrap(),
            PassOutcome::Processed { .. }
        ));
        assert_eq!(pipeline.run_pass(&mut ctx).unwrap(), PassOutcome::Unchanged);
        assert_eq!(script.lock().recognized, 1);

        pipeline.submit_frame(frame(200));
        assert!(matches!(
            pipeline.run_pass(&mut ctx).unwrap(),
            PassOutcome::Processed { .. }
        ));
        assert_eq!(script.lock().recognized, 2);
    }

    #[test]
    fn test_smoothing_holds_back_unfilled_output() {
        let dir = TempDir::new().unwrap();
        let script = script("ab", 90);
        let settings = FilterSettings {
            smoothing_enabled: true,
            smoothing_word_length: 2,
            smoothing_window_size: 3,
            output_text_sink_name: "out".to_string(),
            ..Default::default()
        };
        let (pipeline, rx) = manual(&script, &dir, settings);
        pipeline.submit_frame(frame(0));
        let mut ctx = PassContext::new();

        assert_eq!(
            pipeline.run_pass(&mut ctx).unwrap(),
            PassOutcome::Processed {
                text: "\0\0".to_string(),
                boxes: 0
            }
        );
        assert!(texts(&rx).is_empty());

        pipeline.run_pass(&mut ctx).unwrap();
        assert_eq!(texts(&rx), vec!["ab"]);
    }

    #[test]
    fn test_mask_matches_frame_with_rescaled_boxes() {
        let dir = TempDir::new().unwrap();
        let script = script("", 0);
        script.lock().regions = vec![EngineRegion {
            text: "hi".to_string(),
            confidence: 90.0,
            left: 20,
            top: 10,
            right: 60,
            bottom: 40,
            empty: false,
        }];
        let settings = FilterSettings {
            rescale_enabled: true,
            rescale_target_height: 64,
            output_image_sink_name: "mask".to_string(),
            ..Default::default()
        };
        let (pipeline, rx) = manual(&script, &dir, settings);
        pipeline.submit_frame(frame(0));

        assert_eq!(
            pipeline.run_pass(&mut PassContext::new()).unwrap(),
            PassOutcome::Processed {
                text: String::new(),
                boxes: 1
            }
        );
        assert_eq!(script.lock().last_size, (128, 64));

        let Ok(PipelineOutput::Image { sink, image }) = rx.try_recv() else {
            panic!("expected a mask");
        };
        assert_eq!(sink, "mask");
        assert_eq!(image.dimensions(), (64, 32));
        assert_eq!(image.get_pixel(15, 10), &Rgba([255, 255, 255, 255]));
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(image.get_pixel(40, 20), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_preview_is_stored_when_enabled() {
        let dir = TempDir::new().unwrap();
        let script = script("", 0);
        let settings = FilterSettings {
            preview_enabled: true,
            ..Default::default()
        };
        let (pipeline, _rx) = manual(&script, &dir, settings);
        assert!(pipeline.preview().is_none());

        pipeline.submit_frame(frame(7));
        pipeline.run_pass(&mut PassContext::new()).unwrap();
        assert_eq!(pipeline.preview().unwrap().dimensions(), (64, 32));
    }

    #[test]
    fn test_soft_reconfigure_keeps_engine() {
        let dir = TempDir::new().unwrap();
        let script = script("", 0);
        let (mut pipeline, _rx) = manual(&script, &dir, FilterSettings::default());

        pipeline.configure(FilterSettings {
            segmentation_mode: SegmentationMode::SingleChar,
            char_allowlist: "0123456789".to_string(),
            update_interval_ms: 500,
            ..Default::default()
        });

        let s = script.lock();
        assert_eq!(s.opens, 1);
        assert_eq!(s.closes, 0);
        assert_eq!(s.mode, Some(SegmentationMode::SingleChar));
        assert_eq!(s.allowlist, "0123456789");
        drop(s);
        assert_eq!(pipeline.settings().update_interval_ms, 500);
    }

    #[test]
    fn test_hard_reconfigure_reopens_engine() {
        let dir = TempDir::new().unwrap();
        let script = script("", 0);
        let (mut pipeline, _rx) = manual(&script, &dir, FilterSettings::default());

        pipeline.configure(FilterSettings {
            language: "deu".to_string(),
            ..Default::default()
        });

        let s = script.lock();
        assert_eq!(s.opens, 2);
        assert_eq!(s.closes, 1);
        assert_eq!(s.last_init.as_ref().unwrap().language, "deu");
        drop(s);
        assert_eq!(pipeline.worker_state(), WorkerState::Idle);
    }

    #[test]
    fn test_user_patterns_written_and_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let script = script("", 0);
        let settings = FilterSettings {
            user_patterns: "\\d\\d:\\d\\d".to_string(),
            ..Default::default()
        };
        let (pipeline, _rx) = manual(&script, &dir, settings);
        let files = pipeline.files().clone();

        let init = script.lock().last_init.clone().unwrap();
        assert_eq!(init.config_files, vec![files.patterns_config_path("test")]);
        assert_eq!(
            std::fs::read_to_string(files.patterns_path("test")).unwrap(),
            "\\d\\d:\\d\\d"
        );

        pipeline.cleanup_files().unwrap();
        assert!(!files.patterns_path("test").exists());
        assert!(!files.patterns_config_path("test").exists());
    }

    #[test]
    fn test_failed_engine_leaves_pipeline_idle() {
        let dir = TempDir::new().unwrap();
        let script = script("1", 90);
        script.lock().fail_open = true;
        let (mut pipeline, _rx) = manual(&script, &dir, FilterSettings::default());

        assert!(!pipeline.is_ready());
        pipeline.submit_frame(frame(0));
        assert!(pipeline.run_pass(&mut PassContext::new()).is_err());

        // Unchanged settings still retry the load while no engine exists
        script.lock().fail_open = false;
        pipeline.configure(FilterSettings::default());
        assert!(pipeline.is_ready());
        assert_eq!(script.lock().opens, 2);
    }

    #[test]
    fn test_empty_frame_is_not_sampled() {
        let dir = TempDir::new().unwrap();
        let script = script("1", 90);
        let settings = FilterSettings {
            output_image_sink_name: "mask".to_string(),
            ..Default::default()
        };
        let (pipeline, rx) = manual(&script, &dir, settings);
        pipeline.submit_frame(RgbaImage::new(0, 0));

        assert_eq!(
            pipeline.run_pass(&mut PassContext::new()).unwrap(),
            PassOutcome::NoFrame
        );
        assert_eq!(script.lock().recognized, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_worker_starts_once_a_failed_load_recovers() {
        let dir = TempDir::new().unwrap();
        let script = script("", 0);
        script.lock().fail_open = true;
        let (builder, _rx) = builder(&script, &dir);
        let mut pipeline = builder.build(FilterSettings::default()).unwrap();
        assert!(!pipeline.is_ready());
        assert_eq!(pipeline.worker_state(), WorkerState::Idle);

        script.lock().fail_open = false;
        pipeline.configure(FilterSettings {
            language: "deu".to_string(),
            ..Default::default()
        });
        assert!(pipeline.is_ready());
        assert_eq!(pipeline.worker_state(), WorkerState::Running);
    }

    #[test]
    fn test_worker_resumes_after_failed_hard_reconfigure() {
        let dir = TempDir::new().unwrap();
        let script = script("", 0);
        let (builder, _rx) = builder(&script, &dir);
        let mut pipeline = builder.build(FilterSettings::default()).unwrap();
        assert_eq!(pipeline.worker_state(), WorkerState::Running);

        script.lock().fail_open = true;
        pipeline.configure(FilterSettings {
            language: "deu".to_string(),
            ..Default::default()
        });
        assert!(!pipeline.is_ready());
        assert_eq!(pipeline.worker_state(), WorkerState::Idle);

        script.lock().fail_open = false;
        pipeline.configure(FilterSettings {
            language: "fra".to_string(),
            ..Default::default()
        });
        assert_eq!(pipeline.worker_state(), WorkerState::Running);
    }

    #[test]
    fn test_start_in_manual_mode_waits_for_engine() {
        let dir = TempDir::new().unwrap();
        let script = script("", 0);
        script.lock().fail_open = true;
        let (mut pipeline, _rx) = manual(&script, &dir, FilterSettings::default());

        pipeline.start();
        assert_eq!(pipeline.worker_state(), WorkerState::Idle);

        script.lock().fail_open = false;
        pipeline.configure(FilterSettings::default());
        assert_eq!(pipeline.worker_state(), WorkerState::Running);

        pipeline.stop();
        pipeline.configure(FilterSettings {
            language: "deu".to_string(),
            ..Default::default()
        });
        assert_eq!(pipeline.worker_state(), WorkerState::Idle);
    }

    #[test]
    fn test_worker_publishes_and_stops_promptly() {
        let dir = TempDir::new().unwrap();
        let script = script("7", 90);
        let settings = FilterSettings {
            update_interval_ms: 20,
            output_text_sink_name: "out".to_string(),
            ..Default::default()
        };
        let (builder, rx) = builder(&script, &dir);
        let mut pipeline = builder.build(settings.clone()).unwrap();
        assert_eq!(pipeline.worker_state(), WorkerState::Running);

        pipeline.submit_frame(frame(0));
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            PipelineOutput::Text { sink, text } => {
                assert_eq!(sink, "out");
                assert_eq!(text, "7");
            }
            other => panic!("unexpected output for {}", other.sink()),
        }

        pipeline.configure(FilterSettings {
            update_interval_ms: 60_000,
            ..settings
        });
        std::thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        pipeline.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(pipeline.worker_state(), WorkerState::Idle);

        let s = script.lock();
        assert_eq!(s.closes, 1);
        assert_eq!(s.used_after_close, 0);
    }

    #[test]
    fn test_hard_reconfigure_restarts_running_worker() {
        let dir = TempDir::new().unwrap();
        let script = script("", 0);
        let (builder, _rx) = builder(&script, &dir);
        let mut pipeline = builder.build(FilterSettings::default()).unwrap();

        pipeline.configure(FilterSettings {
            model_path: dir.path().display().to_string(),
            ..Default::default()
        });
        assert_eq!(pipeline.worker_state(), WorkerState::Running);
        assert_eq!(script.lock().opens, 2);

        pipeline.stop();
        assert_eq!(pipeline.worker_state(), WorkerState::Idle);
        assert!(pipeline.is_ready());
    }

    #[test]
    fn test_drop_closes_engine() {
        let dir = TempDir::new().unwrap();
        let script = script("", 0);
        let (pipeline, _rx) = manual(&script, &dir, FilterSettings::default());

        drop(pipeline);
        assert_eq!(script.lock().closes, 1);
    }
}
