//! Real-time safe building blocks for clip recording.
//!
//! # Primary API
//!
//! - [`SampleRing`]: single-producer/single-consumer sample ring with two-segment
//!   read/write vectors ([`RwVector`])
//! - [`Semaphore`]: counting wakeup semaphore, signalled from the audio thread
//! - [`CycleGate`]: intake gate that lets a control thread wait out in-flight audio cycles
//! - [`BufferSet`] / [`ProcessCycle`]: what the audio engine hands a processor each cycle
//! - [`MidiEvent`] / [`MidiChannelFilter`]: raw MIDI events and the per-track capture filter
//!
//! Nothing in this crate performs I/O.
//!
//! # Example
//!
//! ```
//! use cliprec_core::SampleRing;
//!
//! let (mut writer, mut reader) = SampleRing::with_capacity(8).unwrap();
//! writer.push(&[1.0, 2.0, 3.0]).unwrap();
//!
//! let (first, second) = reader.read_segments();
//! assert_eq!(first.len() + second.len(), 3);
//! reader.increment_read_ptr(3);
//! assert_eq!(reader.read_space(), 0);
//! ```

pub mod error;
pub use error::{Error, Result};

mod buffer;
pub use buffer::{BufferSet, ChanCount, ProcessCycle};

pub(crate) mod lockfree;
pub use lockfree::{AtomicFlag, CycleGate, CycleGuard};

pub mod midi;
pub use midi::{CapturedMidiEvent, MidiChannelFilter, MidiChannelMode, MidiEvent};

pub mod ring;
pub use ring::{RingObserver, RingReader, RingWriter, RwVector, SampleRing, Segment};

mod semaphore;
pub use semaphore::Semaphore;

pub use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
pub use std::sync::Arc;

/// Audio sample type carried through the capture path.
pub type Sample = f32;
