//! Clip recording: capture processors, arbitration and the disk writer.
//!
//! Captures live track input during playback and streams it to backing storage without
//! blocking the audio callback.
//!
//! # Features
//!
//! - **Recording processor**: realtime-safe per-cycle capture into per-channel rings
//! - **Arbitration**: at most one armed processor, finalized before release
//! - **Disk writer**: semaphore-driven background thread draining the armed processor
//! - **Write sources**: WAV (with peak sidecar), Standard MIDI File, in-memory
//! - **Metrics**: bytes written, overruns, wakeups, disk errors
//!
//! # Example
//!
//! ```ignore
//! use cliprec_capture::{CaptureSystem, FileTakeFactory};
//! use cliprec_core::{BufferSet, ChanCount, ProcessCycle};
//! use std::sync::Arc;
//!
//! let system = CaptureSystem::builder(48000.0).build()?;
//! let factory = Arc::new(FileTakeFactory::new("takes", 48000.0));
//! let track = system.add_processor("Audio 1", ChanCount::audio(2), factory)?;
//!
//! track.set_armed(true)?;
//! // Audio thread, every cycle:
//! track.run(&BufferSet::audio(&inputs), &cycle);
//! // Control thread, when done:
//! track.set_armed(false)?;
//! ```

pub mod error;
pub use error::{Error, Result};

// Main high-level API
mod system;
pub use system::{CaptureSystem, CaptureSystemBuilder};

pub mod arbitrator;
pub use arbitrator::RecordingArbitrator;

pub mod processor;
pub use processor::{ProcessorId, RecordingProcessor};

pub mod channel;
pub use channel::{ChannelInfo, MidiCaptureChannel};

pub mod config;
pub use config::CaptureConfig;

pub mod context;
pub use context::{CaptureBufferSize, CaptureContext};

pub mod events;
pub use events::{ArmEvent, WriteFailure};

pub mod metrics;
pub use metrics::{CaptureMetrics, CaptureMetricsSnapshot};

pub mod source;
pub use source::{
    AudioSourceHandle, AudioWriteSource, MemoryTakeFactory, MidiSourceHandle, MidiWriteSource,
    SharedSource, SourceFactory, TakeInfo,
};
#[cfg(all(feature = "wav", feature = "smf"))]
pub use source::FileTakeFactory;
#[cfg(feature = "smf")]
pub use source::SmfMidiSource;
#[cfg(feature = "wav")]
pub use source::WavFileSource;

mod writer;
pub use writer::{DiskWriter, WRITER_THREAD_NAME};
