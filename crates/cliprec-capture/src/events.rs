//! Notifications published by the capture system.

use crate::processor::ProcessorId;

/// Record-arm state change.
///
/// Published after the new state is established, so a subscriber that sees
/// `armed == false` can rely on the take being finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmEvent {
    pub processor: ProcessorId,
    pub name: String,
    pub armed: bool,
}

/// A drain of the current recorder failed.
///
/// The processor stays armed; whether to disarm is up to the owning layer. Further
/// wakeups skip the processor until its next take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub processor: ProcessorId,
    pub name: String,
    pub message: String,
}
