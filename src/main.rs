#![no_std]
#![no_main]

extern crate alloc;

// Required for ESP-IDF bootloader compatibility
// Use explicit parameters to ensure correct efuse block revision values
esp_bootloader_esp_idf::esp_app_desc!(
    env!("CARGO_PKG_VERSION"),  // version
    env!("CARGO_PKG_NAME"),     // project_name
    "00:00:00",                 // build_time
    "2025-01-01",               // build_date
    "0.0.0",                    // idf_ver (not using IDF)
    0x10000,                    // mmu_page_size (64KB)
    0,                          // min_efuse_blk_rev_full (accept all)
    u16::MAX                    // max_efuse_blk_rev_full (accept all)
);

use embassy_executor::Spawner;
use esp_backtrace as _;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::timer::timg::TimerGroup;
use esp_storage::FlashStorage;
use static_cell::StaticCell;

use led_cycle_firmware::bridge::TransportBridge;
use led_cycle_firmware::config;
use led_cycle_firmware::cycle::{CycleController, PinActuator};
use led_cycle_firmware::settings::ConfigRegistry;
use led_cycle_firmware::storage::{FlashSettingsStore, SettingsStore};
use led_cycle_firmware::tasks::{self, DeferredWork};

/// Live timing parameters
static REGISTRY: ConfigRegistry = ConfigRegistry::firmware();

/// Delayed callback slot driving the controller
static WORK: DeferredWork = DeferredWork::new();

/// The one controller of this device
static CONTROLLER: CycleController<'static, &'static DeferredWork> =
    CycleController::new(&REGISTRY, &WORK);

/// Static executor for embassy
static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();

/// Static cell for esp-radio controller (needed for 'static lifetime)
static RADIO_CONTROLLER: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

type LedActuator = PinActuator<Output<'static>>;
type SettingsFlash = FlashSettingsStore<FlashStorage<'static>>;

/// Type alias for the BLE controller
type BleController = trouble_host::prelude::ExternalController<
    esp_radio::ble::controller::BleConnector<'static>,
    10,
>;

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(log::LevelFilter::Info);

    // Initialise heap allocator for BLE support (64KB - BLE requires significant heap)
    esp_alloc::heap_allocator!(size: 64 * 1024);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Start with the LED off
    let led_level = if config::led::ACTIVE_LOW { Level::High } else { Level::Low };
    let led = Output::new(peripherals.GPIO48, led_level, OutputConfig::default());
    let mut actuator = PinActuator::new(led, config::led::ACTIVE_LOW);

    // Initialise the RTOS scheduler with timer - MUST be done before any async operations
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Restore persisted parameters, falling back to defaults
    let mut store = FlashSettingsStore::new(
        FlashStorage::new(peripherals.FLASH),
        config::storage::REGION_OFFSET,
    );
    if let Err(error) = store.load(&REGISTRY) {
        log::warn!("Settings not loaded ({}), using defaults", error);
    }

    if let Err(error) = CONTROLLER.init(&mut actuator) {
        log::error!("Cannot start cycle controller: {}", error);
        loop {
            core::hint::spin_loop();
        }
    }

    // Read unique device ID from eFuse MAC address (last 3 bytes)
    let mac = esp_hal::efuse::Efuse::read_base_mac_address();
    let device_id: [u8; 3] = [mac[3], mac[4], mac[5]];

    // Initialise esp-radio for BLE support (must be after esp_rtos::start)
    let radio_controller = RADIO_CONTROLLER.init(
        esp_radio::init().expect("Failed to initialize esp-radio")
    );

    // Create BLE connector (ownership is passed to ExternalController)
    let ble_connector = esp_radio::ble::controller::BleConnector::new(
        radio_controller,
        peripherals.BT,
        esp_radio::ble::Config::default(),
    ).expect("Failed to initialize BLE connector");

    // Wrap in ExternalController for trouble-host compatibility
    let controller: BleController = trouble_host::prelude::ExternalController::new(ble_connector);

    // Create and run the embassy executor
    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(async_main(spawner, actuator, controller, device_id, store));
    })
}

#[embassy_executor::task]
async fn async_main(
    spawner: Spawner,
    actuator: LedActuator,
    ble_controller: BleController,
    device_id: [u8; 3],
    store: SettingsFlash,
) {
    spawner.must_spawn(cycle_runner_task(actuator));
    spawner.must_spawn(supervisor_task());
    spawner.must_spawn(ble_host_task(ble_controller, device_id, store));
}

/// Task that advances the LED sequence whenever its callback is due
#[embassy_executor::task]
async fn cycle_runner_task(actuator: LedActuator) {
    tasks::cycle_task(&CONTROLLER, &WORK, actuator).await;
}

/// Task that reboots the device after an actuator failure
#[embassy_executor::task]
async fn supervisor_task() {
    tasks::supervisor_task(&CONTROLLER).await;
}

/// Task that manages BLE connectivity
///
/// This task handles BLE advertising, connections, and routes attribute
/// accesses to the controller and the settings store.
#[embassy_executor::task]
async fn ble_host_task(controller: BleController, device_id: [u8; 3], store: SettingsFlash) {
    tasks::ble_task(controller, device_id, TransportBridge::new(&CONTROLLER), store).await;
}
