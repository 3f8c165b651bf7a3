//! Per-cycle inputs handed to a recording processor by the audio engine.

use crate::midi::MidiEvent;
use crate::Sample;
use serde::{Deserialize, Serialize};

/// Channel counts for an I/O configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChanCount {
    pub audio: usize,
    pub midi: usize,
}

impl ChanCount {
    pub const fn new(audio: usize, midi: usize) -> Self {
        Self { audio, midi }
    }

    pub const fn audio(audio: usize) -> Self {
        Self { audio, midi: 0 }
    }
}

/// Buffers delivered once per processing callback.
///
/// `audio` holds one slice per routed input channel, each at least `nframes` long.
/// `midi` holds the cycle's incoming events sorted by frame offset. `immediate_midi`
/// holds events the track injected out-of-band this cycle; they appear in `midi` too but
/// must not be captured.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferSet<'a> {
    pub audio: &'a [&'a [Sample]],
    pub midi: &'a [MidiEvent],
    pub immediate_midi: &'a [MidiEvent],
}

impl<'a> BufferSet<'a> {
    pub fn audio(audio: &'a [&'a [Sample]]) -> Self {
        Self {
            audio,
            midi: &[],
            immediate_midi: &[],
        }
    }

    pub fn with_midi(mut self, midi: &'a [MidiEvent]) -> Self {
        self.midi = midi;
        self
    }

    pub fn with_immediate_midi(mut self, immediate: &'a [MidiEvent]) -> Self {
        self.immediate_midi = immediate;
        self
    }

    #[inline]
    pub fn count(&self) -> ChanCount {
        ChanCount {
            audio: self.audio.len(),
            midi: usize::from(!self.midi.is_empty()),
        }
    }
}

/// Timing of one processing cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessCycle {
    /// Absolute sample position of the first frame.
    pub start: u64,
    /// Absolute sample position one past the last frame.
    pub end: u64,
    /// Transport speed (1.0 = normal).
    pub speed: f64,
    pub nframes: usize,
}

impl ProcessCycle {
    pub fn new(start: u64, nframes: usize) -> Self {
        Self {
            start,
            end: start + nframes as u64,
            speed: 1.0,
            nframes,
        }
    }

    /// The cycle immediately after this one.
    pub fn next(&self, nframes: usize) -> Self {
        Self {
            start: self.end,
            end: self.end + nframes as u64,
            speed: self.speed,
            nframes,
        }
    }
}
