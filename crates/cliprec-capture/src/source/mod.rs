//! Backing-storage write endpoints.
//!
//! A recording processor streams each channel into an [`AudioWriteSource`] and captured
//! MIDI into a [`MidiWriteSource`]. Every take gets fresh sources from a
//! [`SourceFactory`]. Sources are shared behind [`SharedSource`], which provides the
//! scoped write lock and the once-per-take completion latch.

use crate::error::Result;
use cliprec_core::Sample;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod memory;
pub use memory::{
    MemoryAudioHandle, MemoryAudioSource, MemoryMidiHandle, MemoryMidiSource, MemoryTake,
    MemoryTakeFactory,
};

mod peak;
pub use peak::{read_peak_file, PeakSummary, DEFAULT_PEAK_BLOCK};

#[cfg(feature = "wav")]
mod wav;
#[cfg(feature = "wav")]
pub use wav::WavFileSource;

#[cfg(feature = "smf")]
mod smf;
#[cfg(feature = "smf")]
pub use smf::{SmfMidiSource, SMF_PPQ, SMF_TEMPO_USEC};

#[cfg(all(feature = "wav", feature = "smf"))]
mod file;
#[cfg(all(feature = "wav", feature = "smf"))]
pub use file::FileTakeFactory;

/// Storage endpoint for one recorded audio channel.
pub trait AudioWriteSource: Send {
    fn name(&self) -> &str;

    /// Append samples. Returns how many were stored; fewer than `samples.len()` is a
    /// short write.
    ///
    /// `Err` means nothing from `samples` was stored. A failure after some samples were
    /// accepted must be reported as a short write of that many, so the caller never
    /// hands the stored prefix over again.
    fn write(&mut self, samples: &[Sample]) -> Result<usize>;

    /// No more samples will arrive for this take.
    fn mark_streaming_write_completed(&mut self) -> Result<()>;

    /// Persist peak data accumulated during the take.
    fn done_with_peakfile_writes(&mut self) -> Result<()>;
}

/// Storage endpoint for the MIDI capture path.
pub trait MidiWriteSource: Send {
    fn name(&self) -> &str;

    /// Append one event at an absolute sample position. Returns the bytes stored.
    fn midi_write(&mut self, time: u64, bytes: &[u8]) -> Result<usize>;

    fn mark_streaming_write_completed(&mut self) -> Result<()>;
}

/// A write endpoint shared between the disk writer and the control thread.
///
/// All writes happen under [`SharedSource::lock`]. Completion is latched: once
/// [`SharedSource::complete_with`] has run, later calls do nothing.
pub struct SharedSource<S: ?Sized> {
    completed: AtomicBool,
    inner: Mutex<S>,
}

pub type AudioSourceHandle = Arc<SharedSource<dyn AudioWriteSource>>;
pub type MidiSourceHandle = Arc<SharedSource<dyn MidiWriteSource>>;

impl<S> SharedSource<S> {
    pub fn new(source: S) -> Self {
        Self {
            completed: AtomicBool::new(false),
            inner: Mutex::new(source),
        }
    }
}

impl<S: ?Sized> SharedSource<S> {
    /// Scoped write lock.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.inner.lock()
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Run `finish` under the write lock unless the source was already completed.
    ///
    /// Returns `Ok(false)` if it had been completed before.
    pub fn complete_with<F>(&self, finish: F) -> Result<bool>
    where
        F: FnOnce(&mut S) -> Result<()>,
    {
        let mut guard = self.inner.lock();
        if self.completed.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        finish(&mut guard)?;
        Ok(true)
    }
}

/// Wrap an audio endpoint for sharing.
pub fn audio_handle<S: AudioWriteSource + 'static>(source: S) -> AudioSourceHandle {
    Arc::new(SharedSource::new(source))
}

/// Wrap a MIDI endpoint for sharing.
pub fn midi_handle<S: MidiWriteSource + 'static>(source: S) -> MidiSourceHandle {
    Arc::new(SharedSource::new(source))
}

/// Identifies the take a factory is creating sources for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TakeInfo {
    /// Name of the recording processor.
    pub processor: String,
    /// 1-based take number, per processor.
    pub take: u32,
}

/// Creates write sources at the start of each take.
pub trait SourceFactory: Send + Sync {
    fn audio_source(&self, take: &TakeInfo, channel: usize) -> Result<AudioSourceHandle>;

    fn midi_source(&self, take: &TakeInfo) -> Result<MidiSourceHandle>;
}

/// Make a processor name safe to embed in a file name.
pub(crate) fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "track".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_with_runs_once() {
        let (source, handle) = MemoryAudioSource::new("a");
        let shared = audio_handle(source);

        assert!(shared.complete_with(|s| s.mark_streaming_write_completed()).unwrap());
        assert!(!shared.complete_with(|s| s.mark_streaming_write_completed()).unwrap());
        assert!(shared.is_completed());
        assert!(handle.is_completed());
    }

    #[test]
    fn test_completion_latched_even_on_error() {
        let (source, _handle) = MemoryAudioSource::new("a");
        let shared = audio_handle(source);

        let result = shared.complete_with(|_| Err(crate::Error::Source("boom".into())));
        assert!(result.is_err());
        assert!(shared.is_completed());
        assert!(!shared.complete_with(|_| Ok(())).unwrap());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Audio 1/Bass"), "Audio_1_Bass");
        assert_eq!(file_stem("vox-2"), "vox-2");
        assert_eq!(file_stem(""), "track");
    }
}
