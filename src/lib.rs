//! # cliprec - Real-time Clip Recording
//!
//! Captures live track input from the audio callback and persists it to storage without
//! blocking, allocating or locking on the realtime thread.
//!
//! ## Architecture
//!
//! cliprec is an umbrella crate that coordinates:
//! - **cliprec-core** - RT-safe primitives (sample rings, wakeup semaphore, cycle gate,
//!   MIDI events and capture filter)
//! - **cliprec-capture** - Recording processors, arbitration, the disk writer thread and
//!   write endpoints (WAV, SMF, memory)
//!
//! ## Quick Start
//!
//! ```ignore
//! use cliprec::prelude::*;
//! use std::sync::Arc;
//!
//! let system = CaptureSystem::builder(48000.0).build()?;
//! let factory = Arc::new(FileTakeFactory::new("takes", 48000.0));
//! let track = system.add_processor("Audio 1", ChanCount::audio(2), factory)?;
//!
//! track.set_armed(true)?;
//! // Audio thread, every cycle:
//! track.run(&BufferSet::audio(&inputs), &cycle);
//! // Control thread:
//! track.set_armed(false)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - `wav` and `smf`
//! - `wav` - WAV write endpoint with peak sidecar
//! - `smf` - Standard MIDI File write endpoint

/// Re-export of cliprec-core for direct access
pub use cliprec_core as core;

/// Re-export of cliprec-capture for direct access
pub use cliprec_capture as capture;

mod error;
pub use error::{Error, Result};

// Core types
pub use cliprec_core::{
    BufferSet, CapturedMidiEvent, ChanCount, MidiChannelFilter, MidiChannelMode, MidiEvent,
    ProcessCycle, RingObserver, RingReader, RingWriter, RwVector, Sample, SampleRing, Segment,
    Semaphore,
};

// Capture
pub use cliprec_capture::{
    ArmEvent, AudioWriteSource, CaptureConfig, CaptureMetricsSnapshot, CaptureSystem,
    CaptureSystemBuilder, MemoryTakeFactory, MidiWriteSource, ProcessorId,
    RecordingArbitrator, RecordingProcessor, SourceFactory, TakeInfo, WriteFailure,
};

#[cfg(all(feature = "wav", feature = "smf"))]
pub use cliprec_capture::FileTakeFactory;

#[cfg(feature = "wav")]
pub use cliprec_capture::WavFileSource;

#[cfg(feature = "smf")]
pub use cliprec_capture::SmfMidiSource;

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{
        ArmEvent, BufferSet, CaptureConfig, CaptureSystem, ChanCount, MemoryTakeFactory,
        MidiChannelMode, MidiEvent, ProcessCycle, RecordingProcessor, SourceFactory,
    };

    #[cfg(all(feature = "wav", feature = "smf"))]
    pub use crate::FileTakeFactory;

    pub use crate::{Error, Result};
}
