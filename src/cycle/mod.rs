//! Cycle controller: the timed LED on/off sequence
//!
//! A trigger request starts a sequence of on/off periods whose timing comes
//! from the [`ConfigRegistry`]. The sequence is advanced by a deferred
//! callback ([`CycleController::run_once`]) that the scheduler invokes once
//! per toggle. Requests from other contexts only read the phase or raise the
//! stop flag, so every piece of shared state is a single atomic cell and no
//! locking is needed.
//!
//! ```text
//!             trigger
//!   Idle ───────────────► ActuatorOn ◄──────── ActuatorOff
//!    ▲                        │                    ▲
//!    │   done or stop         │  more periods      │
//!    └────────────────────────┴────────────────────┘
//!
//!   Initializing ──► (switch off, settle) ──► Idle
//!   any actuator failure ──► Error (terminal)
//! ```

pub mod pin;
pub mod traits;

pub use pin::PinActuator;
pub use traits::{Actuator, ActuatorError, Notifier, NotifyError, ScheduleError, Scheduler};

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::settings::{ConfigRegistry, TimingParams};

/// State machine phase
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// No sequence running, accepts a trigger
    Idle = 0,
    /// Mid-sequence, actuator on
    ActuatorOn = 1,
    /// Mid-sequence, actuator off
    ActuatorOff = 2,
    /// Actuator failure, the device must be restarted
    Error = 3,
    /// Startup, until the first callback confirms the actuator is off
    Initializing = 4,
}

impl CyclePhase {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => CyclePhase::Idle,
            1 => CyclePhase::ActuatorOn,
            2 => CyclePhase::ActuatorOff,
            3 => CyclePhase::Error,
            _ => CyclePhase::Initializing,
        }
    }

    /// Returns `true` while a sequence is toggling the actuator
    pub const fn is_sequencing(self) -> bool {
        matches!(self, CyclePhase::ActuatorOn | CyclePhase::ActuatorOff)
    }
}

/// Reason a trigger or stop request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleError {
    /// The current phase does not accept the request
    Busy,
    /// The callback could not be armed
    SchedulingFailure,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Busy => f.write_str("controller busy"),
            CycleError::SchedulingFailure => f.write_str("scheduling failure"),
        }
    }
}

/// Fatal startup failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    Actuator(ActuatorError),
    Scheduling(ScheduleError),
}

impl From<ActuatorError> for InitError {
    fn from(error: ActuatorError) -> Self {
        InitError::Actuator(error)
    }
}

impl From<ScheduleError> for InitError {
    fn from(error: ScheduleError) -> Self {
        InitError::Scheduling(error)
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Actuator(error) => write!(f, "init failed: {}", error),
            InitError::Scheduling(error) => write!(f, "init failed: {}", error),
        }
    }
}

/// Controller context holding every cross-context cell of the sequence
///
/// Created once at startup. The firmware keeps it in a `static`; tests create
/// independent instances.
pub struct CycleController<'a, S> {
    registry: &'a ConfigRegistry,
    scheduler: S,
    phase: AtomicU8,
    stop_requested: AtomicBool,
    /// Completed periods in the current sequence, touched by the callback only
    cycle_count: AtomicU32,
}

impl<'a, S> CycleController<'a, S> {
    /// Create a controller in the `Initializing` phase
    pub const fn new(registry: &'a ConfigRegistry, scheduler: S) -> Self {
        Self {
            registry,
            scheduler,
            phase: AtomicU8::new(CyclePhase::Initializing as u8),
            stop_requested: AtomicBool::new(false),
            cycle_count: AtomicU32::new(0),
        }
    }

    /// Registry the controller reads its timing from
    pub fn registry(&self) -> &'a ConfigRegistry {
        self.registry
    }

    /// Snapshot of the current phase
    pub fn phase(&self) -> CyclePhase {
        CyclePhase::from_raw(self.phase.load(Ordering::Acquire))
    }

    /// Snapshot of the pending stop request
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// `true` unless the controller is idle
    ///
    /// May lag a concurrent transition by one scheduler tick.
    pub fn device_running(&self) -> bool {
        self.phase() != CyclePhase::Idle
    }

    /// `true` once an actuator failure has put the controller in `Error`
    pub fn error_occurred(&self) -> bool {
        self.phase() == CyclePhase::Error
    }

    fn set_phase(&self, phase: CyclePhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

impl<'a, S: Scheduler> CycleController<'a, S> {
    /// Configure the actuator and arm the first callback
    ///
    /// The first callback runs in `Initializing`, switches the actuator off and
    /// settles into `Idle` before any trigger is accepted.
    pub fn init<A: Actuator>(&self, actuator: &mut A) -> Result<(), InitError> {
        log::debug!("Init cycle controller");

        actuator.configure().map_err(|error| {
            log::error!("LED device not available");
            error
        })?;

        self.registry.commit();
        self.stop_requested.store(false, Ordering::Release);
        self.cycle_count.store(0, Ordering::Relaxed);
        self.set_phase(CyclePhase::Initializing);

        self.scheduler.schedule_after(0).map_err(|error| {
            log::error!("Error while submitting controller work in init");
            error
        })?;

        Ok(())
    }

    /// Request a new sequence
    ///
    /// Only accepted in `Idle`. The actuator is switched on asynchronously by
    /// the next callback.
    pub fn trigger_new_cycle(&self) -> Result<(), CycleError> {
        if self.phase() != CyclePhase::Idle {
            return Err(CycleError::Busy);
        }

        if !self.scheduler.is_pending() {
            self.scheduler.schedule_after(0).map_err(|_| {
                log::error!("Cannot schedule new cycle");
                CycleError::SchedulingFailure
            })?;
        }

        log::info!("New cycle requested");
        Ok(())
    }

    /// Request the running sequence to stop
    ///
    /// The sequence finishes its current toggle and returns to `Idle` at the
    /// next callback that switches the actuator off.
    pub fn stop_cycle(&self) -> Result<(), CycleError> {
        match self.phase() {
            CyclePhase::Idle => Ok(()),
            CyclePhase::ActuatorOn | CyclePhase::ActuatorOff => {
                self.stop_requested.store(true, Ordering::Release);
                log::info!("Stop requested");
                Ok(())
            }
            CyclePhase::Error | CyclePhase::Initializing => Err(CycleError::Busy),
        }
    }

    /// Scheduler callback: advance the state machine by one toggle
    pub fn run_once<A: Actuator, N: Notifier>(&self, actuator: &mut A, notifier: &N) {
        let phase = self.phase();
        if phase == CyclePhase::Error {
            log::debug!("Exec in error: early exiting");
            return;
        }

        let timing = self.registry.snapshot();
        let period_count = self.registry.period_count();
        log::debug!("Run cycle controller in {:?}", phase);

        match phase {
            CyclePhase::Idle => {
                self.cycle_count.store(0, Ordering::Relaxed);
                // A stop aimed at the previous sequence must not cut this one short
                self.stop_requested.store(false, Ordering::Release);
                self.switch_on(actuator, notifier, &timing);
            }
            CyclePhase::ActuatorOff => self.switch_on(actuator, notifier, &timing),
            CyclePhase::Initializing => {
                // Settle as if a sequence had just completed
                self.cycle_count.store(period_count, Ordering::Relaxed);
                self.switch_off_and_settle(actuator, notifier, &timing, period_count);
            }
            CyclePhase::ActuatorOn => {
                self.switch_off_and_settle(actuator, notifier, &timing, period_count)
            }
            CyclePhase::Error => {}
        }
    }

    /// Entry action of `ActuatorOn`
    fn switch_on<A: Actuator, N: Notifier>(&self, actuator: &mut A, notifier: &N, timing: &TimingParams) {
        log::debug!("Switching LED ON");
        if actuator.set_level(true).is_err() {
            log::error!("Cannot set LED ON");
            self.set_phase(CyclePhase::Error);
            return;
        }

        self.set_phase(CyclePhase::ActuatorOn);
        if !self.schedule_next(timing.on_duration_ms) {
            return;
        }

        if self.cycle_count.load(Ordering::Relaxed) == 0 {
            self.notify(notifier, true);
        }
    }

    /// Entry action shared by `ActuatorOn` and `Initializing`: switch off,
    /// count the period and either finish or wait for the next one
    fn switch_off_and_settle<A: Actuator, N: Notifier>(
        &self,
        actuator: &mut A,
        notifier: &N,
        timing: &TimingParams,
        period_count: u32,
    ) {
        log::debug!("Switching LED OFF");
        if actuator.set_level(false).is_err() {
            log::error!("Cannot set LED OFF");
            self.set_phase(CyclePhase::Error);
            return;
        }

        let completed = self.cycle_count.load(Ordering::Relaxed).saturating_add(1);
        self.cycle_count.store(completed, Ordering::Relaxed);

        let stop = self.stop_requested.swap(false, Ordering::AcqRel);
        if completed >= period_count || stop {
            self.set_phase(CyclePhase::Idle);
            log::info!("Cycle finished after {} periods", completed);
            self.notify(notifier, false);
        } else {
            self.set_phase(CyclePhase::ActuatorOff);
            self.schedule_next(timing.off_duration_ms);
        }
    }

    /// Arms the next callback; a sequence that cannot advance is unrecoverable
    ///
    /// Replaces any callback a request armed while this one was running.
    fn schedule_next(&self, delay_ms: u32) -> bool {
        match self.scheduler.reschedule_after(delay_ms) {
            Ok(()) => true,
            Err(_) => {
                log::error!("Cannot schedule next toggle in {} ms", delay_ms);
                self.set_phase(CyclePhase::Error);
                false
            }
        }
    }

    fn notify<N: Notifier>(&self, notifier: &N, running: bool) {
        if notifier.notify_state_changed(running).is_err() {
            log::warn!("Failed to send state notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::traits::mock::{MockActuator, MockNotifier, MockScheduler};
    use super::*;
    use crate::settings::{Bounds, ParamId};

    type TestController<'a> = CycleController<'a, &'a MockScheduler>;

    /// Fire the pending callback, if any
    fn fire(
        controller: &TestController<'_>,
        scheduler: &MockScheduler,
        actuator: &mut MockActuator,
        notifier: &MockNotifier,
    ) -> bool {
        if scheduler.take_pending() {
            controller.run_once(actuator, notifier);
            true
        } else {
            false
        }
    }

    /// Fire callbacks until nothing is pending, returning how many ran
    fn run_to_completion(
        controller: &TestController<'_>,
        scheduler: &MockScheduler,
        actuator: &mut MockActuator,
        notifier: &MockNotifier,
    ) -> usize {
        let mut callbacks = 0;
        while fire(controller, scheduler, actuator, notifier) {
            callbacks += 1;
            assert!(callbacks < 1_000, "sequence never settled");
        }
        callbacks
    }

    /// Init and settle into Idle, forgetting the boot notification
    fn boot(
        controller: &TestController<'_>,
        scheduler: &MockScheduler,
        actuator: &mut MockActuator,
        notifier: &MockNotifier,
    ) {
        controller.init(actuator).unwrap();
        run_to_completion(controller, scheduler, actuator, notifier);
        assert_eq!(controller.phase(), CyclePhase::Idle);
        notifier.clear();
    }

    #[test]
    fn test_init_settles_into_idle() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();

        controller.init(&mut actuator).unwrap();
        assert!(actuator.is_configured());
        assert_eq!(controller.phase(), CyclePhase::Initializing);
        assert_eq!(scheduler.last_delay(), Some(0));
        assert!(controller.device_running());

        assert_eq!(run_to_completion(&controller, &scheduler, &mut actuator, &notifier), 1);
        assert_eq!(controller.phase(), CyclePhase::Idle);
        assert_eq!(actuator.last_level(), Some(false));
        assert_eq!(actuator.on_count(), 0);
        assert_eq!(notifier.events().as_slice(), &[false]);
        assert!(!controller.device_running());
    }

    #[test]
    fn test_init_actuator_failure() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        actuator.set_fail_configure();

        assert_eq!(
            controller.init(&mut actuator),
            Err(InitError::Actuator(ActuatorError))
        );
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn test_init_scheduling_failure() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        scheduler.set_next_error(ScheduleError);

        assert_eq!(
            controller.init(&mut actuator),
            Err(InitError::Scheduling(ScheduleError))
        );
    }

    #[test]
    fn test_trigger_rejected_outside_idle() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();

        // Initializing
        controller.init(&mut actuator).unwrap();
        assert_eq!(controller.trigger_new_cycle(), Err(CycleError::Busy));
        assert_eq!(controller.phase(), CyclePhase::Initializing);
        run_to_completion(&controller, &scheduler, &mut actuator, &notifier);

        // ActuatorOn
        controller.trigger_new_cycle().unwrap();
        fire(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(controller.phase(), CyclePhase::ActuatorOn);
        assert_eq!(controller.trigger_new_cycle(), Err(CycleError::Busy));
        assert_eq!(controller.phase(), CyclePhase::ActuatorOn);

        // ActuatorOff
        fire(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(controller.phase(), CyclePhase::ActuatorOff);
        assert_eq!(controller.trigger_new_cycle(), Err(CycleError::Busy));
        assert_eq!(controller.phase(), CyclePhase::ActuatorOff);

        // Error
        actuator.set_fail_next_write();
        fire(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(controller.phase(), CyclePhase::Error);
        assert_eq!(controller.trigger_new_cycle(), Err(CycleError::Busy));
        assert_eq!(controller.phase(), CyclePhase::Error);
    }

    #[test]
    fn test_stop_in_idle_is_noop() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        assert_eq!(controller.stop_cycle(), Ok(()));
        assert_eq!(controller.phase(), CyclePhase::Idle);
        assert!(!controller.stop_requested());
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn test_stop_rejected_while_initializing() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();

        controller.init(&mut actuator).unwrap();
        assert_eq!(controller.stop_cycle(), Err(CycleError::Busy));
        assert!(!controller.stop_requested());
    }

    #[test]
    fn test_full_sequence() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(registry.period_count(), 15);

        controller.trigger_new_cycle().unwrap();
        assert_eq!(controller.phase(), CyclePhase::Idle);
        assert!(scheduler.is_pending());

        let callbacks = run_to_completion(&controller, &scheduler, &mut actuator, &notifier);

        // Idle->On, then 15 offs and 14 re-ons
        assert_eq!(callbacks, 30);
        assert_eq!(actuator.on_count(), 15);
        assert_eq!(actuator.last_level(), Some(false));
        assert_eq!(controller.phase(), CyclePhase::Idle);
        assert_eq!(notifier.events().as_slice(), &[true, false]);

        // Boot settle, then on/off delays alternating
        let delays = scheduler.delays();
        assert_eq!(delays[1], 0);
        assert!(delays[2..].iter().all(|&delay| delay == 500));
        assert_eq!(delays.len(), 2 + 29);
    }

    #[test]
    fn test_trigger_during_callback_keeps_on_duration() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        controller.trigger_new_cycle().unwrap();
        // The worker has consumed the callback but not run it yet
        assert!(scheduler.take_pending());
        controller.trigger_new_cycle().unwrap();
        controller.run_once(&mut actuator, &notifier);

        assert_eq!(controller.phase(), CyclePhase::ActuatorOn);
        assert_eq!(scheduler.last_delay(), Some(500));

        // Exactly one callback pending, and it switches off
        assert!(fire(&controller, &scheduler, &mut actuator, &notifier));
        assert_eq!(controller.phase(), CyclePhase::ActuatorOff);
        assert_eq!(actuator.levels().last(), Some(&false));
        assert_eq!(actuator.on_count(), 1);
        assert_eq!(notifier.events().as_slice(), &[true]);
    }

    #[test]
    fn test_running_notification_only_on_first_period() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        controller.trigger_new_cycle().unwrap();
        for _ in 0..5 {
            fire(&controller, &scheduler, &mut actuator, &notifier);
        }
        assert_eq!(notifier.events().as_slice(), &[true]);
        assert!(controller.device_running());
    }

    #[test]
    fn test_parameter_change_while_idle_applies_to_next_trigger() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        registry.set_value(ParamId::OnDuration, 250).unwrap();
        registry.set_value(ParamId::OffDuration, 250).unwrap();
        registry.set_value(ParamId::SequenceDuration, 2_000).unwrap();
        assert_eq!(registry.period_count(), 4);

        controller.trigger_new_cycle().unwrap();
        run_to_completion(&controller, &scheduler, &mut actuator, &notifier);

        assert_eq!(actuator.on_count(), 4);
        assert_eq!(scheduler.last_delay(), Some(250));
    }

    #[test]
    fn test_parameter_change_mid_sequence_affects_next_delay_only() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        controller.trigger_new_cycle().unwrap();
        fire(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(scheduler.last_delay(), Some(500));

        registry.set_value(ParamId::OffDuration, 1_500).unwrap();
        assert_eq!(controller.phase(), CyclePhase::ActuatorOn);

        fire(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(controller.phase(), CyclePhase::ActuatorOff);
        assert_eq!(scheduler.last_delay(), Some(1_500));
    }

    #[test]
    fn test_stop_while_on_finishes_current_toggle() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        controller.trigger_new_cycle().unwrap();
        fire(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(controller.phase(), CyclePhase::ActuatorOn);

        assert_eq!(controller.stop_cycle(), Ok(()));
        assert_eq!(controller.phase(), CyclePhase::ActuatorOn);
        assert!(controller.stop_requested());
        assert_eq!(actuator.last_level(), Some(true));

        fire(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(controller.phase(), CyclePhase::Idle);
        assert_eq!(actuator.last_level(), Some(false));
        assert!(!controller.stop_requested());
        assert!(!scheduler.is_pending());
        assert_eq!(notifier.events().as_slice(), &[true, false]);
    }

    #[test]
    fn test_stop_while_off_runs_one_more_toggle() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        controller.trigger_new_cycle().unwrap();
        fire(&controller, &scheduler, &mut actuator, &notifier);
        fire(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(controller.phase(), CyclePhase::ActuatorOff);

        controller.stop_cycle().unwrap();
        fire(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(controller.phase(), CyclePhase::ActuatorOn);

        fire(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(controller.phase(), CyclePhase::Idle);
        assert_eq!(actuator.on_count(), 2);
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn test_stale_stop_does_not_cut_next_sequence() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        registry.set_value(ParamId::SequenceDuration, 3_000).unwrap();
        controller.trigger_new_cycle().unwrap();
        fire(&controller, &scheduler, &mut actuator, &notifier);

        // Stop seen in ActuatorOn but raised after the final switch-off
        for _ in 0..4 {
            fire(&controller, &scheduler, &mut actuator, &notifier);
        }
        assert_eq!(controller.phase(), CyclePhase::ActuatorOn);
        fire(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(controller.phase(), CyclePhase::Idle);
        controller.stop_requested.store(true, Ordering::Release);

        controller.trigger_new_cycle().unwrap();
        run_to_completion(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(actuator.on_count(), 6);
    }

    #[test]
    fn test_actuator_failure_is_terminal() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        controller.trigger_new_cycle().unwrap();
        fire(&controller, &scheduler, &mut actuator, &notifier);
        actuator.set_fail_next_write();
        fire(&controller, &scheduler, &mut actuator, &notifier);

        assert_eq!(controller.phase(), CyclePhase::Error);
        assert!(controller.error_occurred());
        assert!(controller.device_running());
        assert!(!scheduler.is_pending());

        // Later callbacks are no-ops
        let levels_before = actuator.levels().len();
        controller.run_once(&mut actuator, &notifier);
        controller.run_once(&mut actuator, &notifier);
        assert_eq!(actuator.levels().len(), levels_before);
        assert_eq!(controller.phase(), CyclePhase::Error);

        assert_eq!(controller.trigger_new_cycle(), Err(CycleError::Busy));
        assert_eq!(controller.stop_cycle(), Err(CycleError::Busy));
        assert_eq!(controller.phase(), CyclePhase::Error);
        assert_eq!(notifier.events().as_slice(), &[true]);
    }

    #[test]
    fn test_failure_switching_on_is_terminal() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        controller.trigger_new_cycle().unwrap();
        actuator.set_fail_next_write();
        fire(&controller, &scheduler, &mut actuator, &notifier);

        assert!(controller.error_occurred());
        assert!(notifier.events().is_empty());
    }

    #[test]
    fn test_scheduling_failure_mid_sequence_is_terminal() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        controller.trigger_new_cycle().unwrap();
        scheduler.take_pending();
        scheduler.set_next_error(ScheduleError);
        controller.run_once(&mut actuator, &notifier);

        assert!(controller.error_occurred());
        assert!(notifier.events().is_empty());
    }

    #[test]
    fn test_trigger_scheduling_failure() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        scheduler.set_next_error(ScheduleError);
        assert_eq!(controller.trigger_new_cycle(), Err(CycleError::SchedulingFailure));
        assert_eq!(controller.phase(), CyclePhase::Idle);
    }

    #[test]
    fn test_repeated_trigger_before_callback_schedules_once() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);
        let scheduled = scheduler.delays().len();

        controller.trigger_new_cycle().unwrap();
        controller.trigger_new_cycle().unwrap();
        assert_eq!(scheduler.delays().len(), scheduled + 1);

        fire(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(controller.trigger_new_cycle(), Err(CycleError::Busy));
    }

    #[test]
    fn test_notifier_failure_is_not_fatal() {
        let registry = ConfigRegistry::new();
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);
        notifier.set_failing(true);

        controller.trigger_new_cycle().unwrap();
        run_to_completion(&controller, &scheduler, &mut actuator, &notifier);

        assert_eq!(controller.phase(), CyclePhase::Idle);
        assert_eq!(actuator.on_count(), 15);
        assert_eq!(notifier.events().as_slice(), &[true, false]);
    }

    #[test]
    fn test_zero_period_count_runs_single_period() {
        let registry = ConfigRegistry::new()
            .with_bounds(ParamId::SequenceDuration, Bounds::UNBOUNDED);
        let scheduler = MockScheduler::new();
        let controller = CycleController::new(&registry, &scheduler);
        let mut actuator = MockActuator::new();
        let notifier = MockNotifier::new();
        boot(&controller, &scheduler, &mut actuator, &notifier);

        registry.set_value(ParamId::SequenceDuration, 100).unwrap();
        assert_eq!(registry.period_count(), 0);

        controller.trigger_new_cycle().unwrap();
        run_to_completion(&controller, &scheduler, &mut actuator, &notifier);
        assert_eq!(actuator.on_count(), 1);
        assert_eq!(controller.phase(), CyclePhase::Idle);
    }

    #[test]
    fn test_phase_round_trip() {
        for phase in [
            CyclePhase::Idle,
            CyclePhase::ActuatorOn,
            CyclePhase::ActuatorOff,
            CyclePhase::Error,
            CyclePhase::Initializing,
        ] {
            assert_eq!(CyclePhase::from_raw(phase as u8), phase);
        }
        assert!(CyclePhase::ActuatorOff.is_sequencing());
        assert!(!CyclePhase::Initializing.is_sequencing());
    }
}
