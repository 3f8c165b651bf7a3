//! The recording processor.
//!
//! One per capturing track. [`RecordingProcessor::run`] is called from the audio thread
//! every cycle and copies the cycle's input into per-channel rings; the disk writer
//! empties them through [`RecordingProcessor::pull_data`]. Arming goes through the
//! [`RecordingArbitrator`](crate::RecordingArbitrator).
//!
//! Channel lists are replaced (copy-on-write) only while the processor is disarmed, when
//! the intake gate keeps the audio thread out.

use crate::channel::{push_midi, ChannelInfo, MidiCaptureChannel};
use crate::context::CaptureContext;
use crate::error::{Error, Result};
use crate::source::{SourceFactory, TakeInfo};
use arc_swap::{ArcSwap, ArcSwapOption};
use cliprec_core::{
    AtomicFlag, AtomicU32, AtomicU64, BufferSet, ChanCount, CycleGate, MidiChannelFilter,
    Ordering, ProcessCycle,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

static NEXT_PROCESSOR_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a recording processor, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(u64);

impl ProcessorId {
    fn next() -> Self {
        Self(NEXT_PROCESSOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// While armed, the arbitrator's slot holds a strong reference to the processor and the
/// processor holds its [`CaptureContext`]. Disarm before dropping the last handle;
/// [`CaptureSystem`](crate::CaptureSystem) does so on removal and shutdown.
pub struct RecordingProcessor {
    id: ProcessorId,
    name: String,
    active: AtomicFlag,
    armed: AtomicFlag,
    /// Latched on a failed drain; the writer skips us until the next take.
    write_failed: AtomicFlag,
    intake: CycleGate,
    /// Serializes audio-side producers so every channel's writer is free together.
    producer: Mutex<()>,
    takes: AtomicU32,
    io: Mutex<ChanCount>,
    channels: ArcSwap<Vec<ChannelInfo>>,
    midi: ArcSwapOption<MidiCaptureChannel>,
    midi_filter: MidiChannelFilter,
    factory: Arc<dyn SourceFactory>,
    context: Arc<CaptureContext>,
}

impl RecordingProcessor {
    pub fn new(
        name: impl Into<String>,
        io: ChanCount,
        factory: Arc<dyn SourceFactory>,
        context: Arc<CaptureContext>,
    ) -> Result<Arc<Self>> {
        let name = name.into();
        if Self::supported_io(io).is_none() {
            return Err(Error::UnsupportedConfiguration {
                audio: io.audio,
                midi: io.midi,
            });
        }

        let frames = context.buffer_size.frames();
        let channels = build_channels(io.audio, frames)?;
        let midi = (io.midi > 0)
            .then(|| Arc::new(MidiCaptureChannel::new(context.config.midi_buffer_events)));

        debug!(processor = %name, audio = io.audio, midi = io.midi, frames, "created");

        Ok(Arc::new(Self {
            id: ProcessorId::next(),
            name,
            active: AtomicFlag::new(true),
            armed: AtomicFlag::new(false),
            write_failed: AtomicFlag::new(false),
            intake: CycleGate::new(false),
            producer: Mutex::new(()),
            takes: AtomicU32::new(0),
            io: Mutex::new(io),
            channels: ArcSwap::from_pointee(channels),
            midi: ArcSwapOption::new(midi),
            midi_filter: MidiChannelFilter::default(),
            factory,
            context,
        }))
    }

    #[inline]
    pub fn id(&self) -> ProcessorId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.get()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// An inactive processor ignores its input.
    pub fn set_active(&self, active: bool) {
        self.active.set(active);
    }

    /// Takes started so far.
    pub fn take_count(&self) -> u32 {
        self.takes.load(Ordering::Acquire)
    }

    pub fn write_failed(&self) -> bool {
        self.write_failed.get()
    }

    pub fn midi_filter(&self) -> &MidiChannelFilter {
        &self.midi_filter
    }

    pub fn io(&self) -> ChanCount {
        *self.io.lock()
    }

    pub fn n_channels(&self) -> usize {
        self.channels.load().len()
    }

    pub fn has_midi(&self) -> bool {
        self.midi.load().is_some()
    }

    /// Unread frames per channel.
    pub fn pending_frames(&self) -> Vec<usize> {
        self.channels
            .load()
            .iter()
            .map(|c| c.observer().read_space())
            .collect()
    }

    /// Arm or disarm through the arbitrator.
    pub fn set_armed(self: &Arc<Self>, armed: bool) -> Result<()> {
        if armed {
            self.context.arbitrator.arm(self)
        } else {
            self.context.arbitrator.disarm(self)
        }
    }

    /// Capture one cycle of input. Realtime safe.
    ///
    /// If any channel lacks room for the whole cycle nothing is written at all, neither
    /// audio nor MIDI.
    pub fn run(&self, bufs: &BufferSet<'_>, cycle: &ProcessCycle) {
        if !self.active.get() {
            return;
        }
        let Some(_cycle_guard) = self.intake.enter() else {
            return;
        };
        let Some(_producer) = self.producer.try_lock() else {
            self.context.metrics.record_overrun();
            return;
        };

        let nframes = cycle.nframes;
        let metrics = &self.context.metrics;
        let channels = self.channels.load();
        let n_buffers = bufs.audio.len();
        let mut wake = false;

        if n_buffers > 0 && !channels.is_empty() {
            for chan in channels.iter() {
                let input_short = bufs.audio[chan.index() % n_buffers].len() < nframes;
                if input_short || chan.writer_busy() || chan.observer().write_space() < nframes {
                    metrics.record_overrun();
                    trace!(
                        processor = %self.name,
                        channel = chan.index(),
                        nframes,
                        "capture overrun, cycle dropped"
                    );
                    return;
                }
            }

            let threshold = self.context.config.wakeup_threshold;
            for chan in channels.iter() {
                // Checked free above and no other producer can take it meanwhile.
                let Some(mut writer) = chan.try_writer() else {
                    continue;
                };
                let input = &bufs.audio[chan.index() % n_buffers][..nframes];
                let staged = writer.stage(input);
                writer.increment_write_ptr(staged);
                if writer.read_space() > threshold {
                    wake = true;
                }
            }
        }

        let midi = self.midi.load();
        if let Some(midi) = midi.as_ref() {
            if let Some(mut writer) = midi.try_writer() {
                for event in bufs.midi {
                    if event.time as usize >= nframes {
                        break;
                    }
                    if bufs.immediate_midi.contains(event) {
                        continue;
                    }
                    let mut captured = event.at(cycle.start + u64::from(event.time));
                    if self.midi_filter.filter_captured(&mut captured) {
                        continue;
                    }
                    if push_midi(&mut writer, captured) {
                        wake = true;
                    } else {
                        metrics.record_midi_overrun();
                    }
                }
            }
        }

        if wake {
            self.context.semaphore.signal();
            metrics.record_wakeup();
        }
    }

    /// Move everything buffered into the take's sources. Called by the disk writer.
    ///
    /// Returns frames plus MIDI events written.
    pub fn pull_data(&self) -> Result<usize> {
        let channels = self.channels.load_full();
        let metrics = &self.context.metrics;

        let mut total = 0;
        for chan in channels.iter() {
            total += chan.drain(&self.name, metrics)?;
        }
        if let Some(midi) = self.midi.load_full() {
            total += midi.drain(&self.name, metrics)?;
        }
        Ok(total)
    }

    /// Ring size in frames; 0 with no channels.
    pub fn buffer_frames(&self) -> usize {
        self.channels
            .load()
            .first()
            .map_or(0, |chan| chan.observer().bufsize())
    }

    /// Free fraction of the first channel's ring; 1.0 with no channels.
    pub fn buffer_load(&self) -> f32 {
        self.channels
            .load()
            .first()
            .map_or(1.0, |chan| chan.observer().free_fraction())
    }

    /// Resize every ring to the engine's current capture buffer size.
    pub fn adjust_buffering(&self) -> Result<()> {
        let _transition = self.context.arbitrator.transition();
        self.resize_buffers()
    }

    /// [`adjust_buffering`](Self::adjust_buffering) with the transition lock held.
    pub(crate) fn resize_buffers(&self) -> Result<()> {
        if self.is_armed() {
            return Err(Error::Busy(format!(
                "{} is recording; cannot resize capture buffers",
                self.name
            )));
        }

        let frames = self.context.buffer_size.frames();
        let current = self.channels.load_full();
        if current.iter().all(|c| c.observer().bufsize() == frames) {
            return Ok(());
        }

        let resized = current
            .iter()
            .map(|chan| chan.resized(frames))
            .collect::<Result<Vec<_>>>()?;
        self.channels.store(Arc::new(resized));
        debug!(processor = %self.name, frames, "capture buffers resized");
        Ok(())
    }

    /// Hook for the surrounding system; the channel list follows
    /// [`configure_io`](Self::configure_io) instead.
    pub fn configuration_changed(&self) {}

    /// Outputs mirror inputs; at most one MIDI stream.
    pub fn can_support_io_configuration(&self, input: ChanCount) -> Option<ChanCount> {
        Self::supported_io(input)
    }

    fn supported_io(input: ChanCount) -> Option<ChanCount> {
        (input.midi <= 1).then_some(input)
    }

    /// Rebuild the channel list for a new input configuration.
    pub fn configure_io(&self, io: ChanCount) -> Result<()> {
        let _transition = self.context.arbitrator.transition();
        if self.is_armed() {
            return Err(Error::Busy(format!(
                "{} is recording; cannot reconfigure",
                self.name
            )));
        }
        if Self::supported_io(io).is_none() {
            return Err(Error::UnsupportedConfiguration {
                audio: io.audio,
                midi: io.midi,
            });
        }

        let mut current = self.io.lock();
        if *current == io {
            return Ok(());
        }

        let frames = self.context.buffer_size.frames();
        self.channels.store(Arc::new(build_channels(io.audio, frames)?));
        if io.midi == 0 {
            self.midi.store(None);
        } else if self.midi.load().is_none() {
            self.midi.store(Some(Arc::new(MidiCaptureChannel::new(
                self.context.config.midi_buffer_events,
            ))));
        }
        *current = io;

        debug!(processor = %self.name, audio = io.audio, midi = io.midi, "reconfigured");
        Ok(())
    }

    /// Create the next take's sources and attach them. Nothing is attached unless every
    /// source could be created.
    pub(crate) fn start_take(&self) -> Result<()> {
        let take = TakeInfo {
            processor: self.name.clone(),
            take: self.takes.fetch_add(1, Ordering::AcqRel) + 1,
        };

        let channels = self.channels.load_full();
        let audio = channels
            .iter()
            .map(|chan| self.factory.audio_source(&take, chan.index()))
            .collect::<Result<Vec<_>>>()?;
        let midi_channel = self.midi.load_full();
        let midi_source = match midi_channel {
            Some(_) => Some(self.factory.midi_source(&take)?),
            None => None,
        };

        for (chan, source) in channels.iter().zip(audio) {
            chan.begin_take(source);
        }
        if let (Some(midi), Some(source)) = (midi_channel, midi_source) {
            midi.begin_take(source);
        }
        self.write_failed.set(false);

        debug!(processor = %self.name, take = take.take, "take started");
        Ok(())
    }

    /// Stop intake, drain what is left and complete every source.
    ///
    /// Always completes the sources; the first error is returned.
    pub(crate) fn finish_take(&self) -> Result<()> {
        self.intake.close_and_wait();

        let mut result = self.pull_data().map(|_| ());

        for chan in self.channels.load_full().iter() {
            let finished = chan.finish_take();
            if result.is_ok() {
                result = finished;
            }
        }
        if let Some(midi) = self.midi.load_full() {
            let finished = midi.finish_take();
            if result.is_ok() {
                result = finished;
            }
        }

        debug!(
            processor = %self.name,
            take = self.take_count(),
            ok = result.is_ok(),
            "take finished"
        );
        result
    }

    pub(crate) fn set_armed_flag(&self, armed: bool) {
        self.armed.set(armed);
    }

    pub(crate) fn open_intake(&self) {
        self.intake.open();
    }

    /// Returns true the first time it is called in a take.
    pub(crate) fn latch_write_failure(&self) -> bool {
        !self.write_failed.swap(true)
    }
}

fn build_channels(count: usize, frames: usize) -> Result<Vec<ChannelInfo>> {
    (0..count).map(|index| ChannelInfo::new(index, frames)).collect()
}

impl fmt::Debug for RecordingProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingProcessor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("armed", &self.is_armed())
            .field("channels", &self.n_channels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use crate::source::MemoryTakeFactory;
    use cliprec_core::{MidiChannelMode, MidiEvent};

    fn context(frames: usize) -> Arc<CaptureContext> {
        let config = CaptureConfig::default()
            .buffer_seconds(0.1)
            .min_buffer_frames(frames);
        // 0.1 s at 100 Hz is 10 frames, so `frames` wins.
        Arc::new(CaptureContext::new(config, 100.0))
    }

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    fn armed(io: ChanCount, frames: usize) -> (Arc<RecordingProcessor>, Arc<MemoryTakeFactory>) {
        let factory = Arc::new(MemoryTakeFactory::new());
        let p = RecordingProcessor::new("track", io, factory.clone(), context(frames)).unwrap();
        p.set_armed(true).unwrap();
        (p, factory)
    }

    #[test]
    fn test_disarmed_run_is_ignored() {
        let factory = Arc::new(MemoryTakeFactory::new());
        let p = RecordingProcessor::new("t", ChanCount::audio(1), factory, context(64)).unwrap();
        let input = ramp(0, 16);
        let audio: [&[f32]; 1] = [&input];
        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(0, 16));
        assert_eq!(p.pending_frames(), vec![0]);
    }

    #[test]
    fn test_inactive_run_is_ignored() {
        let (p, _factory) = armed(ChanCount::audio(1), 64);
        p.set_active(false);
        let input = ramp(0, 16);
        let audio: [&[f32]; 1] = [&input];
        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(0, 16));
        assert_eq!(p.pending_frames(), vec![0]);
    }

    #[test]
    fn test_mono_input_feeds_every_channel() {
        let (p, factory) = armed(ChanCount::audio(2), 64);
        let input = ramp(0, 16);
        let audio: [&[f32]; 1] = [&input];
        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(0, 16));
        assert_eq!(p.pending_frames(), vec![16, 16]);

        p.pull_data().unwrap();
        let take = factory.latest("track").unwrap();
        assert_eq!(take.channels[0].samples(), input);
        assert_eq!(take.channels[1].samples(), input);
    }

    #[test]
    fn test_overrun_drops_whole_cycle() {
        let (p, _factory) = armed(ChanCount::audio(2), 32);
        let left = ramp(0, 24);
        let right = ramp(100, 24);
        let audio: [&[f32]; 2] = [&left, &right];
        let cycle = ProcessCycle::new(0, 24);

        p.run(&BufferSet::audio(&audio), &cycle);
        p.run(&BufferSet::audio(&audio), &cycle.next(24));
        assert_eq!(p.pending_frames(), vec![24, 24]);
        assert_eq!(p.context.metrics.snapshot().overruns, 1);
    }

    #[test]
    fn test_busy_channel_drops_whole_cycle() {
        let (p, _factory) = armed(ChanCount::audio(3), 32);
        let input = ramp(0, 8);
        let audio: [&[f32]; 1] = [&input];

        let channels = p.channels.load_full();
        let held = channels[1].try_writer().unwrap();
        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(0, 8));
        drop(held);

        assert_eq!(p.pending_frames(), vec![0, 0, 0]);
        assert_eq!(p.context.metrics.snapshot().overruns, 1);

        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(8, 8));
        assert_eq!(p.pending_frames(), vec![8, 8, 8]);
    }

    #[test]
    fn test_wakeup_once_per_cycle_above_threshold() {
        let (p, _factory) = armed(ChanCount::audio(2), 64);
        let input = ramp(0, 8);
        let audio: [&[f32]; 1] = [&input];

        // 8 frames: under the threshold of 10.
        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(0, 8));
        assert_eq!(p.context.semaphore.pending(), 0);

        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(8, 8));
        assert_eq!(p.context.semaphore.pending(), 1);
        assert_eq!(p.context.metrics.snapshot().wakeups, 1);
    }

    #[test]
    fn test_midi_capture_filters_and_stamps() {
        let (p, factory) = armed(ChanCount::new(0, 1), 64);
        p.midi_filter()
            .set_channel_mode(MidiChannelMode::FilterChannels, 0b01);

        let injected = MidiEvent::note_on(3, 0, 64, 90);
        let events = [
            MidiEvent::note_on(1, 0, 60, 100),
            injected,
            MidiEvent::note_on(4, 1, 62, 100),
            MidiEvent::note_off(6, 0, 60, 0),
            MidiEvent::note_on(40, 0, 70, 100),
        ];
        let bufs = BufferSet::default()
            .with_midi(&events)
            .with_immediate_midi(std::slice::from_ref(&injected));
        p.run(&bufs, &ProcessCycle::new(1000, 32));
        p.pull_data().unwrap();

        let take = factory.latest("track").unwrap();
        assert_eq!(
            take.midi.unwrap().events(),
            vec![(1001, vec![0x90, 60, 100]), (1006, vec![0x80, 60, 0])]
        );
    }

    #[test]
    fn test_adjust_buffering_refused_while_armed() {
        let (p, _factory) = armed(ChanCount::audio(1), 64);
        p.context.buffer_size.set_frames(128);
        assert!(matches!(p.adjust_buffering(), Err(Error::Busy(_))));

        p.set_armed(false).unwrap();
        p.adjust_buffering().unwrap();
        assert_eq!(p.channels.load()[0].observer().bufsize(), 128);
    }

    #[test]
    fn test_buffer_load() {
        let (p, _factory) = armed(ChanCount::audio(1), 100);
        approx::assert_relative_eq!(p.buffer_load(), 1.0);

        let input = ramp(0, 25);
        let audio: [&[f32]; 1] = [&input];
        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(0, 25));
        approx::assert_relative_eq!(p.buffer_load(), 0.75);

        let factory = Arc::new(MemoryTakeFactory::new());
        let empty = RecordingProcessor::new("e", ChanCount::new(0, 1), factory, context(64)).unwrap();
        approx::assert_relative_eq!(empty.buffer_load(), 1.0);
    }

    #[test]
    fn test_io_negotiation() {
        let factory = Arc::new(MemoryTakeFactory::new());
        let p = RecordingProcessor::new("t", ChanCount::audio(2), factory.clone(), context(64))
            .unwrap();

        assert_eq!(
            p.can_support_io_configuration(ChanCount::new(4, 1)),
            Some(ChanCount::new(4, 1))
        );
        assert_eq!(p.can_support_io_configuration(ChanCount::new(2, 2)), None);

        p.configure_io(ChanCount::new(3, 1)).unwrap();
        assert_eq!(p.n_channels(), 3);
        assert!(p.has_midi());

        assert!(matches!(
            p.configure_io(ChanCount::new(1, 2)),
            Err(Error::UnsupportedConfiguration { audio: 1, midi: 2 })
        ));
        assert!(RecordingProcessor::new("x", ChanCount::new(1, 3), factory, context(64)).is_err());
    }

    #[test]
    fn test_rearm_starts_new_take() {
        let (p, factory) = armed(ChanCount::audio(1), 64);
        let input = ramp(0, 16);
        let audio: [&[f32]; 1] = [&input];
        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(0, 16));
        p.set_armed(false).unwrap();

        p.set_armed(true).unwrap();
        let second = ramp(500, 16);
        let audio: [&[f32]; 1] = [&second];
        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(16, 16));
        p.set_armed(false).unwrap();

        assert_eq!(p.take_count(), 2);
        assert_eq!(factory.take("track", 1).unwrap().channels[0].samples(), input);
        assert_eq!(factory.take("track", 2).unwrap().channels[0].samples(), second);
    }

    #[test]
    fn test_write_failure_latch() {
        let (p, _factory) = armed(ChanCount::audio(1), 64);
        assert!(p.latch_write_failure());
        assert!(!p.latch_write_failure());
        assert!(p.write_failed());

        p.set_armed(false).unwrap();
        p.set_armed(true).unwrap();
        assert!(!p.write_failed());
    }
}
