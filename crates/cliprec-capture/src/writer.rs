//! Disk writer thread.
//!
//! Sleeps on the capture semaphore and drains the armed processor on every wakeup.

use crate::context::CaptureContext;
use crate::error::{Error, Result};
use crate::events::WriteFailure;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thread_priority::ThreadPriority;
use tracing::{error, info, warn};

pub const WRITER_THREAD_NAME: &str = "cliprec-writer";

/// Background worker moving captured data from rings to storage.
pub struct DiskWriter {
    context: Arc<CaptureContext>,
    running: Arc<AtomicBool>,
    failure_tx: Sender<WriteFailure>,
    failure_rx: Receiver<WriteFailure>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DiskWriter {
    pub fn new(context: Arc<CaptureContext>) -> Self {
        let (failure_tx, failure_rx) = unbounded();
        Self {
            context,
            running: Arc::new(AtomicBool::new(false)),
            failure_tx,
            failure_rx,
            thread_handle: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.thread_handle.is_some() {
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        let context = Arc::clone(&self.context);
        let running = Arc::clone(&self.running);
        let failures = self.failure_tx.clone();

        let handle = thread::Builder::new()
            .name(WRITER_THREAD_NAME.into())
            .spawn(move || {
                if let Err(e) = thread_priority::set_current_thread_priority(ThreadPriority::Max)
                {
                    warn!(error = ?e, "could not raise disk writer priority");
                }
                writer_loop(&context, &running, &failures);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                Error::WriterThread(e.to_string())
            })?;

        info!("disk writer started");
        self.thread_handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // A saturated semaphore still has tokens pending, so the thread wakes either way.
        self.context.semaphore.signal();

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            info!("disk writer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Failed drains, in order.
    pub fn failures(&self) -> Receiver<WriteFailure> {
        self.failure_rx.clone()
    }
}

impl Drop for DiskWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn writer_loop(context: &CaptureContext, running: &AtomicBool, failures: &Sender<WriteFailure>) {
    while running.load(Ordering::SeqCst) {
        context.semaphore.wait();
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let Some(processor) = context.arbitrator.current() else {
            continue;
        };
        if processor.write_failed() {
            continue;
        }

        if let Err(e) = processor.pull_data() {
            error!(processor = %processor.name(), error = %e, "disk write failed");
            context.metrics.record_disk_error();
            if processor.latch_write_failure() {
                let _ = failures.send(WriteFailure {
                    processor: processor.id(),
                    name: processor.name().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use crate::processor::RecordingProcessor;
    use crate::source::MemoryTakeFactory;
    use cliprec_core::{BufferSet, ChanCount, ProcessCycle};
    use std::time::{Duration, Instant};

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_start_stop() {
        let ctx = Arc::new(CaptureContext::new(CaptureConfig::default(), 48000.0));
        let mut writer = DiskWriter::new(ctx);
        writer.start().unwrap();
        assert!(writer.is_running());
        writer.start().unwrap();

        writer.stop();
        assert!(!writer.is_running());

        // Restartable.
        writer.start().unwrap();
        writer.stop();
    }

    #[test]
    fn test_drains_on_wakeup() {
        let ctx = Arc::new(CaptureContext::new(
            CaptureConfig::default().min_buffer_frames(256),
            100.0,
        ));
        let factory = Arc::new(MemoryTakeFactory::new());
        let p = RecordingProcessor::new("t", ChanCount::audio(1), factory.clone(), ctx.clone())
            .unwrap();
        let mut writer = DiskWriter::new(ctx);
        writer.start().unwrap();
        p.set_armed(true).unwrap();

        let input: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let audio: [&[f32]; 1] = [&input];
        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(0, 64));

        let take = factory.latest("t").unwrap();
        assert!(wait_for(|| take.channels[0].len() == 64));
        assert_eq!(take.channels[0].samples(), input);

        p.set_armed(false).unwrap();
        writer.stop();
    }

    #[test]
    fn test_failure_latched_and_published() {
        let ctx = Arc::new(CaptureContext::new(
            CaptureConfig::default().min_buffer_frames(256),
            100.0,
        ));
        let factory = Arc::new(MemoryTakeFactory::new().with_audio_capacity(20));
        let p = RecordingProcessor::new("t", ChanCount::audio(1), factory, ctx.clone()).unwrap();
        let mut writer = DiskWriter::new(ctx.clone());
        let failures = writer.failures();
        writer.start().unwrap();
        p.set_armed(true).unwrap();

        let input = vec![0.5f32; 32];
        let audio: [&[f32]; 1] = [&input];
        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(0, 32));

        let failure = failures.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(failure.processor, p.id());
        assert!(p.write_failed());

        // Later wakeups skip the processor: no second report.
        p.run(&BufferSet::audio(&audio), &ProcessCycle::new(32, 32));
        assert!(failures.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(ctx.metrics.snapshot().disk_errors, 1);

        writer.stop();
        assert!(p.set_armed(false).is_err());
        assert!(!p.is_armed());
    }
}
