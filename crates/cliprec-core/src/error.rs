//! Error types for cliprec-core.

use thiserror::Error;

/// Error type for cliprec-core operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The batch does not fit in the ring's free space. Nothing was written.
    #[error("Ring buffer overrun: requested {requested} frames, {available} available")]
    Overrun { requested: usize, available: usize },

    #[error("Invalid ring capacity: {0}")]
    InvalidCapacity(usize),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
