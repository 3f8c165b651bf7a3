//! In-memory write endpoints.

use super::{
    audio_handle, midi_handle, AudioSourceHandle, AudioWriteSource, MidiSourceHandle,
    MidiWriteSource, SourceFactory, TakeInfo,
};
use crate::error::Result;
use cliprec_core::Sample;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct AudioState {
    samples: Vec<Sample>,
    completed: bool,
    peak_flushes: usize,
    /// Sample count when peaks were last flushed.
    samples_at_peak_flush: Option<usize>,
}

/// Audio endpoint that appends into a vector.
///
/// Optional knobs simulate slow or failing storage.
pub struct MemoryAudioSource {
    name: String,
    state: Arc<Mutex<AudioState>>,
    write_delay: Option<Duration>,
    capacity: Option<usize>,
}

/// Read side of a [`MemoryAudioSource`].
#[derive(Debug, Clone)]
pub struct MemoryAudioHandle {
    name: String,
    state: Arc<Mutex<AudioState>>,
}

impl MemoryAudioSource {
    pub fn new(name: impl Into<String>) -> (Self, MemoryAudioHandle) {
        let name = name.into();
        let state = Arc::new(Mutex::new(AudioState::default()));
        let handle = MemoryAudioHandle {
            name: name.clone(),
            state: Arc::clone(&state),
        };
        let source = Self {
            name,
            state,
            write_delay: None,
            capacity: None,
        };
        (source, handle)
    }

    /// Sleep this long in every write.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Accept at most `samples` in total; writes past that are short.
    pub fn with_capacity(mut self, samples: usize) -> Self {
        self.capacity = Some(samples);
        self
    }
}

impl AudioWriteSource for MemoryAudioSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, samples: &[Sample]) -> Result<usize> {
        if let Some(delay) = self.write_delay {
            std::thread::sleep(delay);
        }
        let mut state = self.state.lock();
        let room = self
            .capacity
            .map_or(samples.len(), |cap| cap.saturating_sub(state.samples.len()));
        let n = samples.len().min(room);
        state.samples.extend_from_slice(&samples[..n]);
        Ok(n)
    }

    fn mark_streaming_write_completed(&mut self) -> Result<()> {
        self.state.lock().completed = true;
        Ok(())
    }

    fn done_with_peakfile_writes(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.peak_flushes += 1;
        state.samples_at_peak_flush = Some(state.samples.len());
        Ok(())
    }
}

impl MemoryAudioHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.state.lock().samples.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    pub fn peak_flushes(&self) -> usize {
        self.state.lock().peak_flushes
    }

    pub fn samples_at_peak_flush(&self) -> Option<usize> {
        self.state.lock().samples_at_peak_flush
    }
}

#[derive(Debug, Default)]
struct MidiState {
    events: Vec<(u64, Vec<u8>)>,
    completed: bool,
}

/// MIDI endpoint that appends into a vector.
pub struct MemoryMidiSource {
    name: String,
    state: Arc<Mutex<MidiState>>,
    capacity: Option<usize>,
}

/// Read side of a [`MemoryMidiSource`].
#[derive(Debug, Clone)]
pub struct MemoryMidiHandle {
    state: Arc<Mutex<MidiState>>,
}

impl MemoryMidiSource {
    pub fn new(name: impl Into<String>) -> (Self, MemoryMidiHandle) {
        let state = Arc::new(Mutex::new(MidiState::default()));
        let handle = MemoryMidiHandle {
            state: Arc::clone(&state),
        };
        let source = Self {
            name: name.into(),
            state,
            capacity: None,
        };
        (source, handle)
    }

    /// Accept at most `events`; later writes store nothing.
    pub fn with_capacity(mut self, events: usize) -> Self {
        self.capacity = Some(events);
        self
    }
}

impl MidiWriteSource for MemoryMidiSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn midi_write(&mut self, time: u64, bytes: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if self.capacity.is_some_and(|cap| state.events.len() >= cap) {
            return Ok(0);
        }
        state.events.push((time, bytes.to_vec()));
        Ok(bytes.len())
    }

    fn mark_streaming_write_completed(&mut self) -> Result<()> {
        self.state.lock().completed = true;
        Ok(())
    }
}

impl MemoryMidiHandle {
    pub fn events(&self) -> Vec<(u64, Vec<u8>)> {
        self.state.lock().events.clone()
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }
}

/// Sources created for one take by a [`MemoryTakeFactory`].
#[derive(Debug, Clone)]
pub struct MemoryTake {
    pub info: TakeInfo,
    pub channels: Vec<MemoryAudioHandle>,
    pub midi: Option<MemoryMidiHandle>,
}

/// Factory handing out in-memory sources and remembering them per take.
#[derive(Default)]
pub struct MemoryTakeFactory {
    takes: Mutex<Vec<MemoryTake>>,
    write_delay: Option<Duration>,
    audio_capacity: Option<usize>,
}

impl MemoryTakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every audio source sleeps this long per write.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Every audio source accepts at most `samples`.
    pub fn with_audio_capacity(mut self, samples: usize) -> Self {
        self.audio_capacity = Some(samples);
        self
    }

    pub fn takes(&self) -> Vec<MemoryTake> {
        self.takes.lock().clone()
    }

    pub fn take(&self, processor: &str, take: u32) -> Option<MemoryTake> {
        self.takes
            .lock()
            .iter()
            .find(|t| t.info.processor == processor && t.info.take == take)
            .cloned()
    }

    pub fn latest(&self, processor: &str) -> Option<MemoryTake> {
        self.takes
            .lock()
            .iter()
            .rev()
            .find(|t| t.info.processor == processor)
            .cloned()
    }

    fn with_take<R>(&self, info: &TakeInfo, f: impl FnOnce(&mut MemoryTake) -> R) -> R {
        let mut takes = self.takes.lock();
        let index = match takes.iter().position(|t| &t.info == info) {
            Some(index) => index,
            None => {
                takes.push(MemoryTake {
                    info: info.clone(),
                    channels: Vec::new(),
                    midi: None,
                });
                takes.len() - 1
            }
        };
        f(&mut takes[index])
    }
}

impl SourceFactory for MemoryTakeFactory {
    fn audio_source(&self, take: &TakeInfo, channel: usize) -> Result<AudioSourceHandle> {
        let (mut source, handle) =
            MemoryAudioSource::new(format!("{}-take{}-ch{}", take.processor, take.take, channel));
        source.write_delay = self.write_delay;
        source.capacity = self.audio_capacity;

        self.with_take(take, |t| t.channels.push(handle));
        Ok(audio_handle(source))
    }

    fn midi_source(&self, take: &TakeInfo) -> Result<MidiSourceHandle> {
        let (source, handle) =
            MemoryMidiSource::new(format!("{}-take{}", take.processor, take.take));
        self.with_take(take, |t| t.midi = Some(handle));
        Ok(midi_handle(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_capacity_short_write() {
        let (source, handle) = MemoryAudioSource::new("a");
        let mut source = source.with_capacity(5);
        assert_eq!(source.write(&[1.0, 2.0, 3.0]).unwrap(), 3);
        assert_eq!(source.write(&[4.0, 5.0, 6.0]).unwrap(), 2);
        assert_eq!(handle.samples(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_peak_flush_records_length() {
        let (mut source, handle) = MemoryAudioSource::new("a");
        source.write(&[0.5; 7]).unwrap();
        source.done_with_peakfile_writes().unwrap();
        assert_eq!(handle.peak_flushes(), 1);
        assert_eq!(handle.samples_at_peak_flush(), Some(7));
    }

    #[test]
    fn test_factory_groups_sources_by_take() {
        let factory = MemoryTakeFactory::new();
        let first = TakeInfo {
            processor: "vox".into(),
            take: 1,
        };
        let second = TakeInfo { take: 2, ..first.clone() };

        factory.audio_source(&first, 0).unwrap();
        factory.audio_source(&first, 1).unwrap();
        factory.midi_source(&first).unwrap();
        factory.audio_source(&second, 0).unwrap();

        let takes = factory.takes();
        assert_eq!(takes.len(), 2);
        assert_eq!(takes[0].channels.len(), 2);
        assert!(takes[0].midi.is_some());
        assert_eq!(factory.latest("vox").unwrap().info.take, 2);
        assert_eq!(factory.take("vox", 1).unwrap().channels[1].name(), "vox-take1-ch1");
    }

    #[test]
    fn test_midi_capacity() {
        let (source, handle) = MemoryMidiSource::new("m");
        let mut source = source.with_capacity(1);
        assert_eq!(source.midi_write(10, &[0x90, 60, 100]).unwrap(), 3);
        assert_eq!(source.midi_write(20, &[0x80, 60, 0]).unwrap(), 0);
        assert_eq!(handle.events(), vec![(10, vec![0x90, 60, 100])]);
    }
}
