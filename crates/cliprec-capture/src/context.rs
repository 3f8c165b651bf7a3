//! State shared by every recording processor of a capture system.

use crate::arbitrator::RecordingArbitrator;
use crate::config::CaptureConfig;
use crate::metrics::CaptureMetrics;
use cliprec_core::{AtomicUsize, Ordering, Semaphore};
use std::sync::Arc;

/// Engine-wide capture ring size in frames.
#[derive(Debug)]
pub struct CaptureBufferSize {
    frames: AtomicUsize,
}

impl CaptureBufferSize {
    pub fn new(frames: usize) -> Self {
        Self {
            frames: AtomicUsize::new(frames.max(1)),
        }
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::Acquire)
    }

    pub fn set_frames(&self, frames: usize) {
        self.frames.store(frames.max(1), Ordering::Release);
    }
}

/// Writer wakeup semaphore, ring sizing, arbitrator and metrics.
pub struct CaptureContext {
    pub semaphore: Semaphore,
    pub buffer_size: CaptureBufferSize,
    pub arbitrator: Arc<RecordingArbitrator>,
    pub metrics: Arc<CaptureMetrics>,
    pub config: CaptureConfig,
    pub sample_rate: f64,
}

impl CaptureContext {
    pub fn new(config: CaptureConfig, sample_rate: f64) -> Self {
        Self {
            semaphore: Semaphore::new(config.semaphore_depth),
            buffer_size: CaptureBufferSize::new(config.capture_buffer_frames(sample_rate)),
            arbitrator: Arc::new(RecordingArbitrator::new()),
            metrics: Arc::new(CaptureMetrics::new()),
            config,
            sample_rate,
        }
    }
}
