//! Embassy tasks module
//!
//! Contains all async tasks for the firmware, organised by functionality.

pub mod ble;
pub mod cycle;
pub mod supervisor;

pub use ble::ble_task;
pub use cycle::{cycle_task, DeferredWork, SignalNotifier, STATE_SIGNAL};
pub use supervisor::supervisor_task;
