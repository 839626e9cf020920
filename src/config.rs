//! Hardware and firmware configuration constants for the ESP32-S3 LED cycle board

/// LED pin
pub mod led {
    pub const PIN: u8 = 48;
    /// The on-board LED lights when the pin is driven low
    pub const ACTIVE_LOW: bool = true;
}

/// Firmware defaults for the sequence timing parameters
pub mod timing {
    /// Total length of one activation sequence
    pub const DEFAULT_SEQUENCE_DURATION_MS: u32 = 15_000;
    /// LED on-time within one period
    pub const DEFAULT_ON_DURATION_MS: u32 = 500;
    /// LED off-time within one period
    pub const DEFAULT_OFF_DURATION_MS: u32 = 500;
}

/// Validation bounds applied by the firmware registry
pub mod limits {
    pub const MIN_TOGGLE_MS: u32 = 1;
    pub const MAX_TOGGLE_MS: u32 = 60_000;
    /// One hour
    pub const MAX_SEQUENCE_DURATION_MS: u32 = 3_600_000;
}

/// Settings key layout
pub mod settings {
    /// Module prefix shared by every persisted key
    pub const MODULE_PREFIX: &str = "led_cycle";

    /// Separator between key segments
    pub const KEY_SEPARATOR: char = '/';

    /// Maximum length of a fully-qualified key
    pub const KEY_MAX_LEN: usize = 40;

    /// Every parameter is stored as a native-endian u32
    pub const VALUE_LEN: usize = 4;

    pub const KEY_SEQ_DURATION_MS: &str = "cfg/led/seq_duration_ms";
    pub const KEY_TON_MS: &str = "cfg/led/ton_ms";
    pub const KEY_TOFF_MS: &str = "cfg/led/toff_ms";
}

/// Flash settings store layout
pub mod storage {
    /// Offset of the settings region (default NVS partition)
    pub const REGION_OFFSET: u32 = 0x9000;

    /// Number of record slots in the region
    pub const SLOT_COUNT: usize = 8;

    /// Size of a single record slot in bytes
    pub const RECORD_SIZE: usize = 64;

    /// Marker written at the start of every valid record
    pub const RECORD_MAGIC: u16 = 0x4C43;
}

/// BLE configuration
pub mod ble {
    /// Device name prefix for BLE advertising
    pub const DEVICE_NAME_PREFIX: &str = "LedCycle-";

    /// Number of maximum concurrent connections
    pub const CONNECTIONS_MAX: usize = 1;

    /// Number of L2CAP channels
    pub const L2CAP_CHANNELS_MAX: usize = 3;

    /// Characteristic Presentation Format format code for `boolean`
    pub const FORMAT_BOOLEAN: u8 = 0x01;

    /// Characteristic Presentation Format format code for `uint32`
    pub const FORMAT_UINT32: u8 = 0x08;

    /// Presentation Format descriptor value:
    /// `[format, exponent, unit: u16 LE, namespace, description: u16 LE]`
    pub const fn presentation_format(format: u8) -> [u8; 7] {
        [format, 0, 0, 0, 0, 0, 0]
    }

    /// Presentation format of the u32 config characteristics
    pub const CONFIG_PRESENTATION_FORMAT: [u8; 7] = presentation_format(FORMAT_UINT32);

    /// Presentation format of the state characteristic
    pub const STATE_PRESENTATION_FORMAT: [u8; 7] = presentation_format(FORMAT_BOOLEAN);
}

/// 128-bit attribute UUIDs
///
/// All UUIDs share one base. Service and characteristic numbers are packed
/// into the low bytes of the first 32-bit group:
/// ```text
/// 53a8SSCC-0001-4c43-0001-4c4544435943
/// ```
pub mod uuid {
    const PART_RANDOM: u32 = 0x53a8 << 16;
    const PART_PROJECT_ID: u16 = 0x0001;
    const PART_PROJECT: u16 = 0x4c43;
    const PART_CLIENT: u16 = 0x0001;
    const PART_VENDOR: u64 = 0x4c45_4443_5943;

    pub const SERVICE_CONFIG: u8 = 0x01;
    pub const CONFIG_CHRC_SEQ_DURATION_MS: u8 = 0x01;
    pub const CONFIG_CHRC_TON_MS: u8 = 0x02;
    pub const CONFIG_CHRC_TOFF_MS: u8 = 0x03;

    pub const SERVICE_USER: u8 = 0x02;
    pub const USER_CHRC_STATE: u8 = 0x01;

    const fn encode(first: u32) -> u128 {
        ((first as u128) << 96)
            | ((PART_PROJECT_ID as u128) << 80)
            | ((PART_PROJECT as u128) << 64)
            | ((PART_CLIENT as u128) << 48)
            | (PART_VENDOR as u128)
    }

    /// UUID of a service
    pub const fn service(service: u8) -> u128 {
        encode(PART_RANDOM | ((service as u32) << 8))
    }

    /// UUID of a characteristic inside a service
    pub const fn characteristic(service: u8, chrc: u8) -> u128 {
        encode(PART_RANDOM | ((service as u32) << 8) | chrc as u32)
    }

    pub const CONFIG_SERVICE: u128 = service(SERVICE_CONFIG);
    pub const SEQ_DURATION_MS: u128 = characteristic(SERVICE_CONFIG, CONFIG_CHRC_SEQ_DURATION_MS);
    pub const TON_MS: u128 = characteristic(SERVICE_CONFIG, CONFIG_CHRC_TON_MS);
    pub const TOFF_MS: u128 = characteristic(SERVICE_CONFIG, CONFIG_CHRC_TOFF_MS);

    pub const USER_SERVICE: u128 = service(SERVICE_USER);
    pub const STATE: u128 = characteristic(SERVICE_USER, USER_CHRC_STATE);
}

/// Supervisor loop timing
pub mod supervisor {
    /// How often the supervisor checks for a controller error
    pub const POLL_INTERVAL_MS: u64 = 1000;

    /// Delay between detecting an error and resetting, lets the log drain
    pub const REBOOT_DELAY_MS: u64 = 1000;
}
