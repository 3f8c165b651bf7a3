//! Lock-free primitives shared between the audio thread and control threads.

use crate::{AtomicBool, AtomicUsize, Ordering};

/// Cache-line aligned atomic bool.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicFlag {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Intake gate for audio cycles.
///
/// The audio thread calls [`CycleGate::enter`] at the top of each cycle and holds the
/// returned guard until it is done touching shared state. A control thread calls
/// [`CycleGate::close_and_wait`]; once it returns, no cycle is inside the gate and no new
/// one can enter until [`CycleGate::open`].
///
/// `enter` never blocks and never allocates.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct CycleGate {
    open: AtomicBool,
    in_flight: AtomicUsize,
}

impl CycleGate {
    pub fn new(open: bool) -> Self {
        Self {
            open: AtomicBool::new(open),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Returns `None` when the gate is closed.
    #[inline]
    pub fn enter(&self) -> Option<CycleGuard<'_>> {
        // SeqCst on both sides: the closer stores `open` then loads `in_flight`, we
        // increment `in_flight` then load `open`. One of us sees the other.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if !self.open.load(Ordering::SeqCst) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(CycleGuard { gate: self })
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Close the gate and spin (yielding) until every in-flight cycle has left.
    ///
    /// Must not be called from the audio thread.
    pub fn close_and_wait(&self) {
        self.open.store(false, Ordering::SeqCst);
        while self.in_flight.load(Ordering::SeqCst) != 0 {
            std::thread::yield_now();
        }
    }
}

/// Proof that a cycle is inside a [`CycleGate`].
#[derive(Debug)]
pub struct CycleGuard<'a> {
    gate: &'a CycleGate,
}

impl Drop for CycleGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
