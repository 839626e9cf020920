//! Deferred work runner for the cycle controller
//!
//! The controller arms a single-shot callback through [`DeferredWork`]; the
//! cycle task waits for the requested delay and then advances the state
//! machine. State changes are published on [`STATE_SIGNAL`] for the BLE task.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Timer;

use crate::cycle::{Actuator, CycleController, Notifier, NotifyError, ScheduleError, Scheduler};

/// Latest running/idle change, consumed by the BLE task
pub static STATE_SIGNAL: Signal<CriticalSectionRawMutex, bool> = Signal::new();

/// Single-shot delayed callback slot
pub struct DeferredWork {
    pending: AtomicBool,
    delay_ms: Signal<CriticalSectionRawMutex, u32>,
}

impl DeferredWork {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            delay_ms: Signal::new(),
        }
    }

    /// Wait until the callback is armed, returning its delay
    async fn armed(&self) -> u32 {
        self.delay_ms.wait().await
    }

    /// Mark the callback as started, so it can be armed again
    fn begin(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

impl Default for DeferredWork {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for DeferredWork {
    fn schedule_after(&self, delay_ms: u32) -> Result<(), ScheduleError> {
        if self.pending.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.delay_ms.signal(delay_ms);
        Ok(())
    }

    fn reschedule_after(&self, delay_ms: u32) -> Result<(), ScheduleError> {
        // The signal keeps only the latest delay
        self.pending.store(true, Ordering::Release);
        self.delay_ms.signal(delay_ms);
        Ok(())
    }

    fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// Forwards state changes to [`STATE_SIGNAL`]
pub struct SignalNotifier;

impl Notifier for SignalNotifier {
    fn notify_state_changed(&self, running: bool) -> Result<(), NotifyError> {
        STATE_SIGNAL.signal(running);
        Ok(())
    }
}

/// Runs the controller callback whenever it is armed
pub async fn cycle_task<A: Actuator>(
    controller: &'static CycleController<'static, &'static DeferredWork>,
    work: &'static DeferredWork,
    mut actuator: A,
) {
    loop {
        let delay_ms = work.armed().await;
        Timer::after_millis(u64::from(delay_ms)).await;
        work.begin();
        controller.run_once(&mut actuator, &SignalNotifier);
    }
}
