//! Frame data structures for the shared video frame

use image::RgbaImage;
use std::time::{Duration, Instant};

/// A frame handed over by the producer
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// 4-channel 8-bit pixels
    pub image: RgbaImage,
    /// Timestamp when the frame was written
    pub timestamp: Instant,
}

impl CapturedFrame {
    /// Stamp `image` with the current time
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            timestamp: Instant::now(),
        }
    }

    /// Time since the producer wrote this frame
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }
}
