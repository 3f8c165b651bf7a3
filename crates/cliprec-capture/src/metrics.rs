//! Capture statistics.
//!
//! Tracks disk throughput, writer wakeups and realtime overruns.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Capture metrics shared by the audio thread, the disk writer and observers.
pub struct CaptureMetrics {
    /// Bytes written to storage
    bytes_written: AtomicU64,
    /// Storage write operations
    write_ops: AtomicU64,
    /// MIDI events written to storage
    midi_events_written: AtomicU64,
    /// Cycles dropped because a channel ring was full
    overruns: AtomicU64,
    /// MIDI events dropped because the MIDI ring was full
    midi_overruns: AtomicU64,
    /// Writer semaphore posts from the audio thread
    wakeups: AtomicU64,
    /// Failed drains
    disk_errors: AtomicU64,
    /// Write throughput (only touched by the disk writer and snapshot readers)
    throughput: Mutex<ThroughputTracker>,
}

impl Default for CaptureMetrics {
    fn default() -> Self {
        Self {
            bytes_written: AtomicU64::new(0),
            write_ops: AtomicU64::new(0),
            midi_events_written: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            midi_overruns: AtomicU64::new(0),
            wakeups: AtomicU64::new(0),
            disk_errors: AtomicU64::new(0),
            throughput: Mutex::new(ThroughputTracker::new()),
        }
    }
}

/// Recent write throughput over a sliding window.
struct ThroughputTracker {
    recent_writes: Vec<(u64, Instant)>,
    window: Duration,
    cached_rate: f64,
}

impl ThroughputTracker {
    fn new() -> Self {
        Self {
            recent_writes: Vec::with_capacity(64),
            window: Duration::from_secs(1),
            cached_rate: 0.0,
        }
    }

    fn record(&mut self, bytes: u64) {
        let now = Instant::now();
        self.recent_writes.push((bytes, now));

        let cutoff = now.checked_sub(self.window).unwrap_or(now);
        self.recent_writes.retain(|(_, ts)| *ts >= cutoff);

        let total: u64 = self.recent_writes.iter().map(|(b, _)| *b).sum();
        self.cached_rate = match (self.recent_writes.first(), self.recent_writes.last()) {
            (Some(first), Some(last)) if last.1.duration_since(first.1).as_secs_f64() > 0.01 => {
                total as f64 / last.1.duration_since(first.1).as_secs_f64()
            }
            _ => total as f64 / self.window.as_secs_f64(),
        };
    }

    fn clear(&mut self) {
        self.recent_writes.clear();
        self.cached_rate = 0.0;
    }
}

impl CaptureMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record samples written to storage.
    #[inline]
    pub fn record_write(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.write_ops.fetch_add(1, Ordering::Relaxed);
        if let Some(mut tracker) = self.throughput.try_lock() {
            tracker.record(bytes);
        }
    }

    #[inline]
    pub fn record_midi_write(&self, events: u64) {
        self.midi_events_written.fetch_add(events, Ordering::Relaxed);
    }

    /// Audio thread only; lock-free.
    #[inline]
    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    /// Audio thread only; lock-free.
    #[inline]
    pub fn record_midi_overrun(&self) {
        self.midi_overruns.fetch_add(1, Ordering::Relaxed);
    }

    /// Audio thread only; lock-free.
    #[inline]
    pub fn record_wakeup(&self) {
        self.wakeups.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_disk_error(&self) {
        self.disk_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Recent write throughput in bytes/second.
    pub fn write_rate(&self) -> f64 {
        self.throughput.lock().cached_rate
    }

    pub fn snapshot(&self) -> CaptureMetricsSnapshot {
        CaptureMetricsSnapshot {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_ops: self.write_ops.load(Ordering::Relaxed),
            midi_events_written: self.midi_events_written.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            midi_overruns: self.midi_overruns.load(Ordering::Relaxed),
            wakeups: self.wakeups.load(Ordering::Relaxed),
            disk_errors: self.disk_errors.load(Ordering::Relaxed),
            write_rate: self.write_rate(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.bytes_written.store(0, Ordering::Relaxed);
        self.write_ops.store(0, Ordering::Relaxed);
        self.midi_events_written.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.midi_overruns.store(0, Ordering::Relaxed);
        self.wakeups.store(0, Ordering::Relaxed);
        self.disk_errors.store(0, Ordering::Relaxed);
        self.throughput.lock().clear();
    }
}

/// Snapshot of capture metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureMetricsSnapshot {
    pub bytes_written: u64,
    pub write_ops: u64,
    pub midi_events_written: u64,
    pub overruns: u64,
    pub midi_overruns: u64,
    pub wakeups: u64,
    pub disk_errors: u64,
    /// Recent write throughput (bytes/second)
    pub write_rate: f64,
}

impl CaptureMetricsSnapshot {
    /// Frames written, assuming 32-bit float samples.
    pub fn frames_written(&self) -> u64 {
        self.bytes_written / std::mem::size_of::<f32>() as u64
    }
}
