//! Capture configuration.

use serde::{Deserialize, Serialize};

/// Configuration for capture ring sizes and writer wakeups.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Per-channel ring duration in seconds (default: 5.0)
    pub capture_buffer_seconds: f64,
    /// Unread frames above which a cycle wakes the writer (default: 10)
    pub wakeup_threshold: usize,
    /// Maximum pending writer wakeups (default: 64)
    pub semaphore_depth: usize,
    /// MIDI capture ring size in events (default: 1024)
    pub midi_buffer_events: usize,
    /// Lower bound on ring size in frames (default: 1024)
    pub min_buffer_frames: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_buffer_seconds: 5.0,
            wakeup_threshold: 10,
            semaphore_depth: 64,
            midi_buffer_events: 1024,
            min_buffer_frames: 1024,
        }
    }
}

impl CaptureConfig {
    /// Create config with custom capture buffer duration.
    pub fn with_buffer_seconds(seconds: f64) -> Self {
        Self::default().buffer_seconds(seconds)
    }

    pub fn buffer_seconds(mut self, seconds: f64) -> Self {
        self.capture_buffer_seconds = seconds.max(0.1);
        self
    }

    pub fn wakeup_threshold(mut self, frames: usize) -> Self {
        self.wakeup_threshold = frames;
        self
    }

    pub fn semaphore_depth(mut self, depth: usize) -> Self {
        self.semaphore_depth = depth.max(1);
        self
    }

    pub fn midi_buffer_events(mut self, events: usize) -> Self {
        self.midi_buffer_events = events.max(1);
        self
    }

    pub fn min_buffer_frames(mut self, frames: usize) -> Self {
        self.min_buffer_frames = frames.max(1);
        self
    }

    /// Ring size in frames for a given sample rate.
    pub fn capture_buffer_frames(&self, sample_rate: f64) -> usize {
        ((self.capture_buffer_seconds * sample_rate) as usize).max(self.min_buffer_frames)
    }
}
