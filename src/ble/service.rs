//! GATT services exposing the LED cycle
//!
//! - Config service `53a80100-…`: sequence duration, on-time and off-time as
//!   u32 milliseconds (read, write)
//! - User service `53a80200-…`: one-byte running state (read, write, notify)
//!
//! Every characteristic carries a user description and a presentation format.
//! The UUID literals must stay in sync with [`crate::config::uuid`].

use trouble_host::prelude::*;

use crate::config::ble::{CONFIG_PRESENTATION_FORMAT, STATE_PRESENTATION_FORMAT};
use crate::config::timing;

/// Timing parameters, persisted on every accepted write
#[gatt_service(uuid = "53a80100-0001-4c43-0001-4c4544435943")]
pub struct ConfigService {
    #[descriptor(uuid = descriptors::CHARACTERISTIC_USER_DESCRIPTION, read, value = "Sequence duration (ms)")]
    #[descriptor(uuid = descriptors::CHARACTERISTIC_PRESENTATION_FORMAT, read, value = CONFIG_PRESENTATION_FORMAT)]
    #[characteristic(uuid = "53a80101-0001-4c43-0001-4c4544435943", read, write, value = timing::DEFAULT_SEQUENCE_DURATION_MS)]
    pub seq_duration_ms: u32,

    #[descriptor(uuid = descriptors::CHARACTERISTIC_USER_DESCRIPTION, read, value = "LED on time (ms)")]
    #[descriptor(uuid = descriptors::CHARACTERISTIC_PRESENTATION_FORMAT, read, value = CONFIG_PRESENTATION_FORMAT)]
    #[characteristic(uuid = "53a80102-0001-4c43-0001-4c4544435943", read, write, value = timing::DEFAULT_ON_DURATION_MS)]
    pub ton_ms: u32,

    #[descriptor(uuid = descriptors::CHARACTERISTIC_USER_DESCRIPTION, read, value = "LED off time (ms)")]
    #[descriptor(uuid = descriptors::CHARACTERISTIC_PRESENTATION_FORMAT, read, value = CONFIG_PRESENTATION_FORMAT)]
    #[characteristic(uuid = "53a80103-0001-4c43-0001-4c4544435943", read, write, value = timing::DEFAULT_OFF_DURATION_MS)]
    pub toff_ms: u32,
}

/// Start/stop control and running notifications
#[gatt_service(uuid = "53a80200-0001-4c43-0001-4c4544435943")]
pub struct UserService {
    /// 0x01 while a sequence runs, 0x00 when idle
    #[descriptor(uuid = descriptors::CHARACTERISTIC_USER_DESCRIPTION, read, value = "Device state")]
    #[descriptor(uuid = descriptors::CHARACTERISTIC_PRESENTATION_FORMAT, read, value = STATE_PRESENTATION_FORMAT)]
    #[characteristic(uuid = "53a80201-0001-4c43-0001-4c4544435943", read, write, notify, value = 0)]
    pub state: u8,
}
