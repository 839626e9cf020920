//! Supervisor task restarting the device after a controller failure
//!
//! The cycle controller never leaves its `Error` phase on its own. The
//! supervisor polls it and performs a software reset once it gets there.

use embassy_time::{Duration, Timer};

use crate::config::supervisor::{POLL_INTERVAL_MS, REBOOT_DELAY_MS};
use crate::cycle::CycleController;

/// Reboot the device (normal restart)
fn reboot() -> ! {
    esp_hal::system::software_reset()
}

/// Polls the controller and reboots once it reports an error
pub async fn supervisor_task<S>(controller: &'static CycleController<'static, S>) {
    loop {
        Timer::after(Duration::from_millis(POLL_INTERVAL_MS)).await;

        if controller.error_occurred() {
            log::error!("Controller in error state, rebooting...");
            // Allow the log message to drain
            Timer::after(Duration::from_millis(REBOOT_DELAY_MS)).await;
            reboot();
        }
    }
}
