//! Single-recorder arbitration.
//!
//! At most one [`RecordingProcessor`] is armed at a time. Arm and disarm are serialized
//! by the transition lock; the slot itself is lock-free to read, so the disk writer can
//! look up the current recorder on every wakeup without contending with the control
//! thread.

use crate::error::{Error, Result};
use crate::events::ArmEvent;
use crate::processor::RecordingProcessor;
use arc_swap::ArcSwapOption;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{debug, error};

pub struct RecordingArbitrator {
    current: ArcSwapOption<RecordingProcessor>,
    transition: Mutex<()>,
    observers: Mutex<Vec<Sender<ArmEvent>>>,
}

impl Default for RecordingArbitrator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingArbitrator {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            transition: Mutex::new(()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// The armed processor, if any.
    pub fn current(&self) -> Option<Arc<RecordingProcessor>> {
        self.current.load_full()
    }

    pub fn is_current(&self, processor: &Arc<RecordingProcessor>) -> bool {
        self.current
            .load()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, processor))
    }

    /// Receive an [`ArmEvent`] for every state change from now on.
    pub fn subscribe(&self) -> Receiver<ArmEvent> {
        let (tx, rx) = unbounded();
        self.observers.lock().push(tx);
        rx
    }

    /// Held by reconfiguration so it cannot interleave with a take starting.
    pub(crate) fn transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock()
    }

    /// Make `processor` the recorder, finalizing whichever processor held the slot.
    pub fn arm(&self, processor: &Arc<RecordingProcessor>) -> Result<()> {
        let _transition = self.transition.lock();

        if processor.is_armed() {
            return Ok(());
        }

        if let Some(previous) = self.current.load_full() {
            let finished = self.release(&previous);
            if let Err(e) = finished {
                error!(
                    processor = %previous.name(),
                    error = %e,
                    "finalize failed while switching recorder"
                );
            }
        }

        processor.start_take()?;
        processor.set_armed_flag(true);
        self.current.store(Some(Arc::clone(processor)));
        processor.open_intake();
        debug!(processor = %processor.name(), take = processor.take_count(), "armed");

        self.publish(processor, true);
        Ok(())
    }

    /// Finalize and release `processor`.
    ///
    /// No-op if it is not armed. Finalize errors are returned after the slot has been
    /// cleared.
    pub fn disarm(&self, processor: &Arc<RecordingProcessor>) -> Result<()> {
        let _transition = self.transition.lock();

        if !processor.is_armed() {
            return Ok(());
        }
        if !self.is_current(processor) {
            return Err(Error::NotCurrentRecorder(processor.name().to_string()));
        }

        self.release(processor)
    }

    /// Disarm whatever is armed.
    pub fn disarm_current(&self) -> Result<()> {
        let _transition = self.transition.lock();
        match self.current.load_full() {
            Some(current) => self.release(&current),
            None => Ok(()),
        }
    }

    /// Transition lock must be held.
    fn release(&self, processor: &Arc<RecordingProcessor>) -> Result<()> {
        let finished = processor.finish_take();
        processor.set_armed_flag(false);
        self.current.store(None);
        debug!(processor = %processor.name(), "disarmed");

        self.publish(processor, false);
        finished
    }

    fn publish(&self, processor: &RecordingProcessor, armed: bool) {
        let event = ArmEvent {
            processor: processor.id(),
            name: processor.name().to_string(),
            armed,
        };
        self.observers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
