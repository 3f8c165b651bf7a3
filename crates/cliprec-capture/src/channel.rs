//! Per-channel capture endpoints.
//!
//! Each endpoint pairs a ring with the write source of the current take. The audio
//! thread only ever `try_lock`s a ring writer; the disk writer and the control thread
//! serialize on the ring reader.
//!
//! Lock order: reader, then source slot, then source write lock.

use crate::error::{Error, Result};
use crate::metrics::CaptureMetrics;
use crate::source::{AudioSourceHandle, MidiSourceHandle};
use cliprec_core::{CapturedMidiEvent, RingObserver, RingReader, RingWriter, SampleRing};
use parking_lot::{Mutex, MutexGuard};
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use tracing::warn;

/// One recorded audio channel.
pub struct ChannelInfo {
    index: usize,
    writer: Mutex<RingWriter>,
    reader: Mutex<RingReader>,
    observer: RingObserver,
    source: Mutex<Option<AudioSourceHandle>>,
}

impl ChannelInfo {
    pub fn new(index: usize, frames: usize) -> Result<Self> {
        let (writer, reader) = SampleRing::with_capacity(frames)?;
        let observer = writer.observer();
        Ok(Self {
            index,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            observer,
            source: Mutex::new(None),
        })
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn observer(&self) -> &RingObserver {
        &self.observer
    }

    /// Audio thread access. `None` only while the ring is being replaced.
    #[inline]
    pub(crate) fn try_writer(&self) -> Option<MutexGuard<'_, RingWriter>> {
        self.writer.try_lock()
    }

    #[inline]
    pub(crate) fn writer_busy(&self) -> bool {
        self.writer.is_locked()
    }

    pub fn source(&self) -> Option<AudioSourceHandle> {
        self.source.lock().clone()
    }

    /// Same channel with a ring of `frames`. The source carries over; unread frames do not.
    pub(crate) fn resized(&self, frames: usize) -> Result<Self> {
        let resized = Self::new(self.index, frames)?;
        let pending = self.observer.read_space();
        if pending > 0 {
            warn!(
                channel = self.index,
                frames = pending,
                "discarding buffered capture data on resize"
            );
        }
        *resized.source.lock() = self.source.lock().take();
        Ok(resized)
    }

    /// Discard stale frames and attach the new take's source.
    pub(crate) fn begin_take(&self, source: AudioSourceHandle) {
        self.reader.lock().clear();
        *self.source.lock() = Some(source);
    }

    /// Write everything readable to the source, first segment then second.
    ///
    /// Returns the frames written. A short write stops the drain and is an error.
    pub(crate) fn drain(&self, processor: &str, metrics: &CaptureMetrics) -> Result<usize> {
        let mut reader = self.reader.lock();
        let vector = reader.get_read_vector();
        if vector.is_empty() {
            return Ok(0);
        }

        let Some(source) = self.source() else {
            return Ok(0);
        };
        let mut storage = source.lock();
        if source.is_completed() {
            return Ok(0);
        }

        let mut total = 0;
        for segment in vector.segments {
            if segment.is_empty() {
                continue;
            }
            let (front, _) = reader.read_segments();
            let chunk = &front[..segment.len.min(front.len())];
            let requested = chunk.len();
            let written = storage.write(chunk)?;
            reader.increment_read_ptr(written);
            total += written;
            metrics.record_write((written * std::mem::size_of::<f32>()) as u64);

            if written < requested {
                return Err(Error::DiskWrite {
                    processor: processor.to_string(),
                    channel: self.index,
                    requested,
                    written,
                });
            }
        }
        Ok(total)
    }

    /// Complete and detach the take's source. Peaks are flushed exactly once per take.
    pub(crate) fn finish_take(&self) -> Result<()> {
        let Some(source) = self.source() else {
            return Ok(());
        };
        let result = source.complete_with(|storage| {
            let marked = storage.mark_streaming_write_completed();
            let peaks = storage.done_with_peakfile_writes();
            marked.and(peaks)
        });
        *self.source.lock() = None;
        result.map(|_| ())
    }
}

/// MIDI capture ring of timestamped events plus the take's MIDI source.
pub struct MidiCaptureChannel {
    writer: Mutex<HeapProd<CapturedMidiEvent>>,
    reader: Mutex<HeapCons<CapturedMidiEvent>>,
    source: Mutex<Option<MidiSourceHandle>>,
}

impl MidiCaptureChannel {
    pub fn new(events: usize) -> Self {
        let (prod, cons) = HeapRb::new(events.max(1)).split();
        Self {
            writer: Mutex::new(prod),
            reader: Mutex::new(cons),
            source: Mutex::new(None),
        }
    }

    /// Audio thread access.
    #[inline]
    pub(crate) fn try_writer(&self) -> Option<MutexGuard<'_, HeapProd<CapturedMidiEvent>>> {
        self.writer.try_lock()
    }

    pub fn pending(&self) -> usize {
        self.reader.lock().occupied_len()
    }

    pub fn source(&self) -> Option<MidiSourceHandle> {
        self.source.lock().clone()
    }

    pub(crate) fn begin_take(&self, source: MidiSourceHandle) {
        self.reader.lock().clear();
        *self.source.lock() = Some(source);
    }

    /// Write buffered events one at a time, oldest first.
    pub(crate) fn drain(&self, processor: &str, metrics: &CaptureMetrics) -> Result<usize> {
        let mut reader = self.reader.lock();
        if reader.is_empty() {
            return Ok(0);
        }

        let Some(source) = self.source() else {
            return Ok(0);
        };
        let mut storage = source.lock();
        if source.is_completed() {
            return Ok(0);
        }

        let mut written_events = 0;
        let mut failure = None;
        {
            let (first, second) = reader.as_slices();
            for event in first.iter().chain(second) {
                let bytes = event.bytes();
                match storage.midi_write(event.time, bytes) {
                    Ok(n) if n == bytes.len() => written_events += 1,
                    Ok(n) => {
                        failure = Some(Error::DiskWrite {
                            processor: processor.to_string(),
                            channel: 0,
                            requested: bytes.len(),
                            written: n,
                        });
                        break;
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }
        // SAFETY: `written_events` does not exceed the occupied length, and the event
        // type is `Copy`.
        unsafe { reader.advance_read_index(written_events) };
        metrics.record_midi_write(written_events as u64);

        match failure {
            Some(e) => Err(e),
            None => Ok(written_events),
        }
    }

    pub(crate) fn finish_take(&self) -> Result<()> {
        let Some(source) = self.source() else {
            return Ok(());
        };
        let result = source.complete_with(|storage| storage.mark_streaming_write_completed());
        *self.source.lock() = None;
        result.map(|_| ())
    }
}

/// Push one event from the audio thread. Returns false if the ring is full.
#[inline]
pub(crate) fn push_midi(writer: &mut HeapProd<CapturedMidiEvent>, event: CapturedMidiEvent) -> bool {
    writer.try_push(event).is_ok()
}
