//! Results leaving the pipeline
//!
//! Sink abstraction, message types and text templating shared between the
//! worker thread and the host.

pub mod messages;
pub mod sink;
pub mod template;

pub use messages::PipelineOutput;
pub use sink::{is_valid_sink_name, ChannelSink, FileImageSink, NullSink, OutputSink};
pub use template::TextFormatter;
