//! Error types.

use thiserror::Error;

/// Error type.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ring buffer or other core primitive error.
    #[error(transparent)]
    Core(#[from] cliprec_core::Error),

    /// Hound error.
    #[cfg(feature = "wav")]
    #[error("Hound error: {0}")]
    HoundError(#[from] hound::Error),

    /// MIDI encoding error.
    #[error("MIDI error: {0}")]
    Midi(String),

    /// Storage accepted fewer samples (or events) than requested.
    #[error("{processor}: cannot write to disk (channel {channel}: wrote {written} of {requested})")]
    DiskWrite {
        processor: String,
        channel: usize,
        requested: usize,
        written: usize,
    },

    /// I/O configuration the processor cannot handle.
    #[error("Unsupported I/O configuration: {audio} audio, {midi} MIDI")]
    UnsupportedConfiguration { audio: usize, midi: usize },

    /// Disarm requested for a processor that is not the current recorder.
    #[error("{0} is not the current recorder")]
    NotCurrentRecorder(String),

    /// Operation not allowed while recording.
    #[error("Busy: {0}")]
    Busy(String),

    /// No processor with this id.
    #[error("Recording processor not found: {0}")]
    ProcessorNotFound(u64),

    /// Write source creation or bookkeeping error.
    #[error("Source error: {0}")]
    Source(String),

    /// Writer thread error.
    #[error("Writer thread error: {0}")]
    WriterThread(String),
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;
