//! Output sinks
//!
//! Where formatted text and rendered images go after a pass.

use crate::shared::messages::PipelineOutput;
use crate::storage::PluginFiles;
use crossbeam_channel::{Receiver, Sender};
use image::RgbaImage;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Whether `name` addresses a real sink
pub fn is_valid_sink_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty() && !name.eq_ignore_ascii_case("none") && name != "(null)"
}

/// Receiver of pipeline results. Called from the worker thread.
pub trait OutputSink: Send + Sync {
    fn publish_text(&self, sink: &str, text: &str);

    fn publish_image(&self, sink: &str, image: &RgbaImage);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn publish_text(&self, _sink: &str, _text: &str) {}

    fn publish_image(&self, _sink: &str, _image: &RgbaImage) {}
}

/// Forwards results over a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<PipelineOutput>,
}

impl ChannelSink {
    pub fn new(tx: Sender<PipelineOutput>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end of an unbounded channel
    pub fn unbounded() -> (Self, Receiver<PipelineOutput>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }

    fn send(&self, output: PipelineOutput) {
        if self.tx.send(output).is_err() {
            debug!("Output receiver disconnected, dropping result");
        }
    }
}

impl OutputSink for ChannelSink {
    fn publish_text(&self, sink: &str, text: &str) {
        self.send(PipelineOutput::Text {
            sink: sink.to_string(),
            text: text.to_string(),
        });
    }

    fn publish_image(&self, sink: &str, image: &RgbaImage) {
        self.send(PipelineOutput::Image {
            sink: sink.to_string(),
            image: image.clone(),
        });
    }
}

/// Writes text to `<dir>/<sink>.txt` and images to the instance mask file
#[derive(Debug, Clone)]
pub struct FileImageSink {
    files: PluginFiles,
    id: String,
}

impl FileImageSink {
    pub fn new(files: PluginFiles, id: impl Into<String>) -> Self {
        Self {
            files,
            id: id.into(),
        }
    }

    fn text_path(&self, sink: &str) -> PathBuf {
        let name: String = sink
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.files.dir().join(format!("{name}.txt"))
    }
}

impl OutputSink for FileImageSink {
    fn publish_text(&self, sink: &str, text: &str) {
        let path = self.text_path(sink);
        if let Err(e) = std::fs::write(&path, text) {
            warn!("Failed to write text output {}: {}", path.display(), e);
        }
    }

    fn publish_image(&self, _sink: &str, image: &RgbaImage) {
        let path = self.files.mask_path(&self.id);
        if let Err(e) = image.save(&path) {
            warn!("Failed to write mask {}: {}", path.display(), e);
        }
    }
}
