//! Capture system - processor registry, arbitrator and disk writer behind one API.

use crate::config::CaptureConfig;
use crate::context::CaptureContext;
use crate::error::{Error, Result};
use crate::events::{ArmEvent, WriteFailure};
use crate::metrics::{CaptureMetrics, CaptureMetricsSnapshot};
use crate::processor::{ProcessorId, RecordingProcessor};
use crate::source::SourceFactory;
use crate::writer::DiskWriter;
use cliprec_core::ChanCount;
use crossbeam_channel::Receiver;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Complete capture system with its disk writer thread.
pub struct CaptureSystem {
    context: Arc<CaptureContext>,
    writer: Option<DiskWriter>,
    processors: DashMap<ProcessorId, Arc<RecordingProcessor>>,
}

impl CaptureSystem {
    /// Create a new capture system builder.
    pub fn builder(sample_rate: f64) -> CaptureSystemBuilder {
        CaptureSystemBuilder {
            sample_rate,
            config: CaptureConfig::default(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.context.sample_rate
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.context.config
    }

    pub fn context(&self) -> &Arc<CaptureContext> {
        &self.context
    }

    // Processors

    /// Create and register a processor for a track.
    pub fn add_processor(
        &self,
        name: impl Into<String>,
        io: ChanCount,
        factory: Arc<dyn SourceFactory>,
    ) -> Result<Arc<RecordingProcessor>> {
        let processor = RecordingProcessor::new(name, io, factory, Arc::clone(&self.context))?;
        self.processors
            .insert(processor.id(), Arc::clone(&processor));
        Ok(processor)
    }

    /// Unregister a processor, finalizing its take if it is recording.
    pub fn remove_processor(&self, id: ProcessorId) -> Result<()> {
        let (_, processor) = self
            .processors
            .remove(&id)
            .ok_or(Error::ProcessorNotFound(id.as_u64()))?;
        processor.set_armed(false)
    }

    pub fn processor(&self, id: ProcessorId) -> Option<Arc<RecordingProcessor>> {
        self.processors.get(&id).map(|p| Arc::clone(p.value()))
    }

    pub fn processors(&self) -> Vec<Arc<RecordingProcessor>> {
        let mut all: Vec<_> = self
            .processors
            .iter()
            .map(|p| Arc::clone(p.value()))
            .collect();
        all.sort_by_key(|p| p.id());
        all
    }

    // Arming

    pub fn arm(&self, id: ProcessorId) -> Result<()> {
        self.lookup(id)?.set_armed(true)
    }

    pub fn disarm(&self, id: ProcessorId) -> Result<()> {
        self.lookup(id)?.set_armed(false)
    }

    /// Disarm whichever processor is recording.
    pub fn stop(&self) -> Result<()> {
        self.context.arbitrator.disarm_current()
    }

    pub fn current_recorder(&self) -> Option<Arc<RecordingProcessor>> {
        self.context.arbitrator.current()
    }

    pub fn is_recording(&self) -> bool {
        self.current_recorder().is_some()
    }

    fn lookup(&self, id: ProcessorId) -> Result<Arc<RecordingProcessor>> {
        self.processor(id)
            .ok_or(Error::ProcessorNotFound(id.as_u64()))
    }

    // Buffering

    pub fn capture_buffer_frames(&self) -> usize {
        self.context.buffer_size.frames()
    }

    /// Resize every processor's capture rings. Refused while recording.
    pub fn set_capture_buffer_seconds(&self, seconds: f64) -> Result<()> {
        // Held until every ring is resized, so nothing can arm halfway through.
        let _transition = self.context.arbitrator.transition();
        if let Some(current) = self.current_recorder() {
            return Err(Error::Busy(format!(
                "{} is recording; cannot resize capture buffers",
                current.name()
            )));
        }

        let frames = self
            .context
            .config
            .buffer_seconds(seconds)
            .capture_buffer_frames(self.context.sample_rate);
        self.context.buffer_size.set_frames(frames);
        debug!(seconds, frames, "capture buffer size changed");

        for processor in self.processors() {
            processor.resize_buffers()?;
        }
        Ok(())
    }

    // Observation

    pub fn subscribe(&self) -> Receiver<ArmEvent> {
        self.context.arbitrator.subscribe()
    }

    pub fn write_failures(&self) -> Option<Receiver<WriteFailure>> {
        self.writer.as_ref().map(DiskWriter::failures)
    }

    pub fn metrics(&self) -> Arc<CaptureMetrics> {
        Arc::clone(&self.context.metrics)
    }

    pub fn metrics_snapshot(&self) -> CaptureMetricsSnapshot {
        self.context.metrics.snapshot()
    }

    /// Finalize any recording take and stop the disk writer.
    pub fn shutdown(&mut self) -> Result<()> {
        let stopped = self.stop();
        if let Some(mut writer) = self.writer.take() {
            writer.stop();
        }
        stopped
    }
}

impl Drop for CaptureSystem {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "capture system shutdown failed");
        }
    }
}

/// Builder for CaptureSystem.
pub struct CaptureSystemBuilder {
    sample_rate: f64,
    config: CaptureConfig,
}

impl CaptureSystemBuilder {
    pub fn config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    /// Per-channel ring duration.
    pub fn buffer_seconds(mut self, seconds: f64) -> Self {
        self.config = self.config.buffer_seconds(seconds);
        self
    }

    /// Build the capture system (starts the disk writer).
    pub fn build(self) -> Result<CaptureSystem> {
        let context = Arc::new(CaptureContext::new(self.config, self.sample_rate));
        let mut writer = DiskWriter::new(Arc::clone(&context));
        writer.start()?;

        Ok(CaptureSystem {
            context,
            writer: Some(writer),
            processors: DashMap::new(),
        })
    }
}
