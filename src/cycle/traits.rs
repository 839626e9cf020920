//! Collaborator traits for the cycle controller
//!
//! The controller never touches hardware, timers or the BLE stack directly.
//! It drives them through these traits so the state machine can run against
//! the real drivers on the device and against mocks in tests.

use core::fmt;

/// The actuator could not be configured or driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorError;

/// A deferred callback could not be armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleError;

/// A state change notification could not be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyError;

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("actuator I/O error")
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scheduling failure")
    }
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("notification failure")
    }
}

/// Physical output switched on and off by the sequence
///
/// Only the scheduler callback holds the actuator, so methods take `&mut self`.
pub trait Actuator {
    /// Prepare the output and leave it switched off
    fn configure(&mut self) -> Result<(), ActuatorError>;

    /// Switch the output on or off
    fn set_level(&mut self, on: bool) -> Result<(), ActuatorError>;
}

/// Deferred single-shot scheduler for the controller callback
///
/// Called both from the callback itself and from request contexts, so methods
/// take `&self`. Arming while a callback is already pending leaves the pending
/// one in place; rescheduling replaces its delay.
pub trait Scheduler {
    /// Arm the callback to run once after `delay_ms`
    fn schedule_after(&self, delay_ms: u32) -> Result<(), ScheduleError>;

    /// Arm the callback to run once after `delay_ms`, replacing any pending delay
    fn reschedule_after(&self, delay_ms: u32) -> Result<(), ScheduleError>;

    /// Returns `true` while an armed callback has not started yet
    fn is_pending(&self) -> bool;
}

impl<T: Scheduler + ?Sized> Scheduler for &T {
    fn schedule_after(&self, delay_ms: u32) -> Result<(), ScheduleError> {
        (**self).schedule_after(delay_ms)
    }

    fn reschedule_after(&self, delay_ms: u32) -> Result<(), ScheduleError> {
        (**self).reschedule_after(delay_ms)
    }

    fn is_pending(&self) -> bool {
        (**self).is_pending()
    }
}

/// Sink for running/idle state changes (BLE notifications on the device)
pub trait Notifier {
    /// Best effort: the controller logs failures and carries on
    fn notify_state_changed(&self, running: bool) -> Result<(), NotifyError>;
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn notify_state_changed(&self, running: bool) -> Result<(), NotifyError> {
        (**self).notify_state_changed(running)
    }
}
