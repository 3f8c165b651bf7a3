//! RT-safe MIDI event types and the per-track capture filter.

use crate::{AtomicU32, Ordering};
use serde::{Deserialize, Serialize};

/// Longest message carried inline. Channel voice and system common messages fit.
pub const MAX_EVENT_BYTES: usize = 3;

/// Incoming MIDI event with a frame offset inside the current cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MidiEvent {
    /// Offset within the current buffer (0 = first sample).
    pub time: u32,
    size: u8,
    data: [u8; MAX_EVENT_BYTES],
}

impl MidiEvent {
    /// Bytes past [`MAX_EVENT_BYTES`] are dropped; use [`MidiEvent::try_new`] to reject
    /// long messages instead.
    #[inline]
    pub fn new(time: u32, bytes: &[u8]) -> Self {
        let size = bytes.len().min(MAX_EVENT_BYTES);
        let mut data = [0u8; MAX_EVENT_BYTES];
        data[..size].copy_from_slice(&bytes[..size]);
        Self {
            time,
            size: size as u8,
            data,
        }
    }

    #[inline]
    pub fn try_new(time: u32, bytes: &[u8]) -> Option<Self> {
        (!bytes.is_empty() && bytes.len() <= MAX_EVENT_BYTES).then(|| Self::new(time, bytes))
    }

    #[inline]
    pub fn note_on(time: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(time, &[0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F])
    }

    #[inline]
    pub fn note_off(time: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(time, &[0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F])
    }

    #[inline]
    pub fn control_change(time: u32, channel: u8, cc: u8, value: u8) -> Self {
        Self::new(time, &[0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F])
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.size as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Channel (0-15) for channel voice messages.
    #[inline]
    pub fn channel(&self) -> Option<u8> {
        is_channel_status(*self.data.first()?).then(|| self.data[0] & 0x0F)
    }

    /// Same bytes, stamped with an absolute sample position.
    #[inline]
    pub fn at(&self, absolute: u64) -> CapturedMidiEvent {
        CapturedMidiEvent {
            time: absolute,
            size: self.size,
            data: self.data,
        }
    }
}

/// MIDI event stamped with an absolute sample position, as stored in the capture ring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CapturedMidiEvent {
    pub time: u64,
    size: u8,
    data: [u8; MAX_EVENT_BYTES],
}

impl CapturedMidiEvent {
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.size as usize]
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.size as usize]
    }
}

#[inline]
fn is_channel_status(status: u8) -> bool {
    (0x80..0xF0).contains(&status)
}

/// How a [`MidiChannelFilter`] treats channel voice messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MidiChannelMode {
    /// Pass everything.
    #[default]
    AllChannels = 0,
    /// Drop messages on channels not in the mask.
    FilterChannels = 1,
    /// Rewrite every message to the single channel in the mask.
    ForceChannel = 2,
}

impl MidiChannelMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::FilterChannels,
            2 => Self::ForceChannel,
            _ => Self::AllChannels,
        }
    }
}

/// Per-track MIDI capture filter.
///
/// Mode and mask live in one atomic word so the audio thread always sees a consistent
/// pair without locking.
#[derive(Debug)]
pub struct MidiChannelFilter {
    mode_mask: AtomicU32,
}

impl Default for MidiChannelFilter {
    fn default() -> Self {
        Self::new(MidiChannelMode::AllChannels, 0xFFFF)
    }
}

impl MidiChannelFilter {
    pub fn new(mode: MidiChannelMode, mask: u16) -> Self {
        Self {
            mode_mask: AtomicU32::new(Self::pack(mode, mask)),
        }
    }

    fn pack(mode: MidiChannelMode, mask: u16) -> u32 {
        let mask = match mode {
            // Force mode uses the lowest channel in the mask.
            MidiChannelMode::ForceChannel if mask != 0 => 1u16 << mask.trailing_zeros(),
            MidiChannelMode::ForceChannel => 1,
            _ => mask,
        };
        ((mode as u32) << 16) | mask as u32
    }

    /// Returns true if anything changed.
    pub fn set_channel_mode(&self, mode: MidiChannelMode, mask: u16) -> bool {
        let new = Self::pack(mode, mask);
        self.mode_mask.swap(new, Ordering::AcqRel) != new
    }

    pub fn set_channel_mask(&self, mask: u16) -> bool {
        let (mode, _) = self.mode_and_mask();
        self.set_channel_mode(mode, mask)
    }

    #[inline]
    pub fn mode_and_mask(&self) -> (MidiChannelMode, u16) {
        let packed = self.mode_mask.load(Ordering::Acquire);
        (
            MidiChannelMode::from_u8((packed >> 16) as u8),
            (packed & 0xFFFF) as u16,
        )
    }

    /// Apply the filter to a raw message.
    ///
    /// Returns true if the message must be dropped. In force mode the status byte is
    /// rewritten in place. Non-channel messages always pass.
    #[inline]
    pub fn filter(&self, bytes: &mut [u8]) -> bool {
        let Some(status) = bytes.first_mut() else {
            return false;
        };
        if !is_channel_status(*status) {
            return false;
        }

        let (mode, mask) = self.mode_and_mask();
        let channel = *status & 0x0F;
        match mode {
            MidiChannelMode::AllChannels => false,
            MidiChannelMode::FilterChannels => (1u16 << channel) & mask == 0,
            MidiChannelMode::ForceChannel => {
                *status = (*status & 0xF0) | (mask.trailing_zeros() as u8 & 0x0F);
                false
            }
        }
    }

    /// [`filter`](MidiChannelFilter::filter) for an event already stamped for capture.
    #[inline]
    pub fn filter_captured(&self, event: &mut CapturedMidiEvent) -> bool {
        self.filter(event.bytes_mut())
    }
}
