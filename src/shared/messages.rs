//! Message types delivered to output sinks

use image::RgbaImage;

/// One published result
#[derive(Debug, Clone)]
pub enum PipelineOutput {
    /// Formatted recognized text for a named text sink
    Text { sink: String, text: String },
    /// Rendered mask or overlay for a named image sink
    Image { sink: String, image: RgbaImage },
}

impl PipelineOutput {
    /// Name of the sink this output is addressed to
    pub fn sink(&self) -> &str {
        match self {
            PipelineOutput::Text { sink, .. } | PipelineOutput::Image { sink, .. } => sink,
        }
    }
}
