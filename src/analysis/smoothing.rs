//! Per-character majority-vote smoothing
//!
//! Suppresses frame-to-frame recognition jitter on fixed-format strings
//! (clocks, counters, scoreboards) by voting each character position over
//! a trailing window of recent readings.

use std::collections::VecDeque;

/// Character every window is pre-filled with
pub const EMPTY_SLOT: char = '\0';

/// Sliding-window smoother over fixed-length readings
#[derive(Debug, Clone)]
pub struct SmoothingFilter {
    word_length: usize,
    window_size: usize,
    /// One window per character position, oldest first
    readings: Vec<VecDeque<char>>,
}

impl SmoothingFilter {
    /// Create a filter whose windows start full of [`EMPTY_SLOT`]
    pub fn new(word_length: usize, window_size: usize) -> Self {
        let window: VecDeque<char> = std::iter::repeat(EMPTY_SLOT).take(window_size).collect();
        Self {
            word_length,
            window_size,
            readings: vec![window; word_length],
        }
    }

    /// Feed one reading and return the smoothed word.
    ///
    /// The reading is truncated or right-padded with spaces to `word_length`;
    /// the result always has exactly `word_length` characters.
    pub fn add_reading(&mut self, reading: &str) -> String {
        let chars = reading
            .chars()
            .chain(std::iter::repeat(' '))
            .take(self.word_length);

        let mut smoothed = String::with_capacity(self.word_length);
        for (window, c) in self.readings.iter_mut().zip(chars) {
            window.push_back(c);
            if window.len() > self.window_size {
                window.pop_front();
            }
            smoothed.push(most_common(window).unwrap_or(c));
        }
        smoothed
    }
}

/// Most frequent character; ties go to the first maximal one in window order
fn most_common(window: &VecDeque<char>) -> Option<char> {
    let count = |needle: char| window.iter().filter(|&&c| c == needle).count();

    let mut best: Option<(char, usize)> = None;
    for &c in window {
        let n = count(c);
        match best {
            Some((_, best_n)) if n <= best_n => {}
            _ => best = Some((c, n)),
        }
    }
    best.map(|(c, _)| c)
}
