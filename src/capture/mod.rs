//! Frame Acquisition Layer
//!
//! Single-writer/single-reader slot holding the latest frame. The producer
//! overwrites it under a short-held lock; the consumer only ever takes a
//! non-blocking snapshot, so a busy producer costs one pass, never a stall.

pub mod frame;

use image::RgbaImage;
use parking_lot::{Mutex, MutexGuard};

pub use frame::CapturedFrame;

/// Latest-frame slot shared between producer and worker
#[derive(Debug, Default)]
pub struct FrameBuffer {
    latest: Mutex<Option<CapturedFrame>>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest frame (producer side, blocking)
    pub fn write(&self, image: RgbaImage) {
        *self.latest.lock() = Some(CapturedFrame::new(image));
    }

    /// Hold the slot for in-place writes; the worker skips its pass meanwhile
    pub fn lock(&self) -> MutexGuard<'_, Option<CapturedFrame>> {
        self.latest.lock()
    }

    /// Clone the latest frame without waiting.
    ///
    /// Returns `None` when the producer currently holds the lock or no frame
    /// has been written yet.
    pub fn try_snapshot(&self) -> Option<CapturedFrame> {
        let guard = self.latest.try_lock()?;
        guard.clone()
    }
}
