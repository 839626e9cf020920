//! BLE task for configuration and start/stop control
//!
//! Implements the BLE host task that manages connections and routes attribute
//! accesses through the [`TransportBridge`].

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use trouble_host::prelude::*;

use crate::ble::{ConfigService, UserService};
use crate::bridge::{state_byte, AttError, TransportBridge};
use crate::config::ble::{CONNECTIONS_MAX, DEVICE_NAME_PREFIX, L2CAP_CHANNELS_MAX};
use crate::config::uuid;
use crate::cycle::Scheduler;
use crate::storage::SettingsStore;
use crate::tasks::cycle::STATE_SIGNAL;

/// Format device ID bytes as uppercase hex into a buffer
/// Returns the formatted string slice
fn format_device_name<'a>(buf: &'a mut [u8; 20], device_id: &[u8; 3]) -> &'a str {
    const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";
    let prefix = DEVICE_NAME_PREFIX.as_bytes();

    buf[..prefix.len()].copy_from_slice(prefix);

    let mut pos = prefix.len();
    for &byte in device_id {
        buf[pos] = HEX_CHARS[(byte >> 4) as usize];
        buf[pos + 1] = HEX_CHARS[(byte & 0x0F) as usize];
        pos += 2;
    }

    // All bytes are ASCII, so this will always succeed
    core::str::from_utf8(&buf[..pos]).unwrap_or(DEVICE_NAME_PREFIX)
}

/// BLE GATT Server with the config and user services
#[gatt_server(mutex_type = CriticalSectionRawMutex)]
struct Server {
    config: ConfigService,
    user: UserService,
}

impl Server<'_> {
    /// Settings identifier behind a config characteristic handle
    fn config_identifier(&self, handle: u16) -> Option<u128> {
        if handle == self.config.seq_duration_ms.handle {
            Some(uuid::SEQ_DURATION_MS)
        } else if handle == self.config.ton_ms.handle {
            Some(uuid::TON_MS)
        } else if handle == self.config.toff_ms.handle {
            Some(uuid::TOFF_MS)
        } else {
            None
        }
    }

    fn config_characteristic(&self, identifier: u128) -> Option<&Characteristic<u32>> {
        match identifier {
            uuid::SEQ_DURATION_MS => Some(&self.config.seq_duration_ms),
            uuid::TON_MS => Some(&self.config.ton_ms),
            uuid::TOFF_MS => Some(&self.config.toff_ms),
            _ => None,
        }
    }
}

fn att_code(error: AttError) -> AttErrorCode {
    match error {
        AttError::ValueNotAllowed => AttErrorCode::VALUE_NOT_ALLOWED,
        AttError::RequestNotSupported => AttErrorCode::REQUEST_NOT_SUPPORTED,
        AttError::ProcedureInProgress => AttErrorCode::PROCEDURE_ALREADY_IN_PROGRESS,
        AttError::InvalidValueLength => AttErrorCode::INVALID_ATTRIBUTE_VALUE_LENGTH,
    }
}

/// Main BLE task that manages the Bluetooth stack and connections
///
/// This task:
/// 1. Initialises the BLE controller
/// 2. Starts advertising as "LedCycle-XXXXXX" (unique per device)
/// 3. Serves config reads/writes and persists accepted writes
/// 4. Forwards state writes to the cycle controller
/// 5. Notifies running/idle changes
pub async fn ble_task<C, S, St>(
    controller: C,
    device_id: [u8; 3],
    bridge: TransportBridge<'static, S>,
    mut store: St,
) where
    C: Controller,
    S: Scheduler,
    St: SettingsStore,
{
    let mut device_name_buf = [0u8; 20];
    let device_name = format_device_name(&mut device_name_buf, &device_id);

    log::info!("BLE: Starting as '{}'", device_name);

    let mut resources: HostResources<DefaultPacketPool, CONNECTIONS_MAX, L2CAP_CHANNELS_MAX> =
        HostResources::new();

    // Build the BLE stack with address derived from device ID
    let stack = trouble_host::new(controller, &mut resources).set_random_address(Address::random([
        device_id[0],
        device_id[1],
        device_id[2],
        0x4C,
        0x43,
        0xC7,
    ]));

    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    let gap = GapConfig::Peripheral(PeripheralConfig {
        name: device_name,
        appearance: &appearance::UNKNOWN,
    });
    let server: Server = match Server::new_with_config(gap) {
        Ok(s) => s,
        Err(_) => {
            log::error!("BLE: Cannot create GATT server");
            return;
        }
    };

    let runner_task = runner.run();

    let peripheral_task = async {
        let mut adv_data = [0u8; 31];
        let adv_len = match AdStructure::encode_slice(
            &[
                AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
                AdStructure::CompleteLocalName(device_name.as_bytes()),
            ],
            &mut adv_data,
        ) {
            Ok(l) => l,
            Err(_) => return,
        };

        let mut scan_data = [0u8; 31];
        let scan_len = match AdStructure::encode_slice(
            &[AdStructure::ServiceUuids128(&[uuid::CONFIG_SERVICE.to_le_bytes()])],
            &mut scan_data,
        ) {
            Ok(l) => l,
            Err(_) => return,
        };

        loop {
            log::debug!("BLE: Advertising...");
            let advertiser = match peripheral
                .advertise(
                    &Default::default(),
                    Advertisement::ConnectableScannableUndirected {
                        adv_data: &adv_data[..adv_len],
                        scan_data: &scan_data[..scan_len],
                    },
                )
                .await
            {
                Ok(a) => a,
                Err(_) => continue,
            };

            let acceptor = match advertiser.accept().await {
                Ok(a) => {
                    log::info!("BLE: Connected");
                    a
                }
                Err(_) => continue,
            };

            let conn = match acceptor.with_attribute_server(&*server) {
                Ok(c) => c,
                Err(_) => continue,
            };

            // Changes that happened while disconnected are not replayed
            STATE_SIGNAL.reset();

            loop {
                match select(conn.next(), STATE_SIGNAL.wait()).await {
                    Either::First(GattConnectionEvent::Disconnected { reason: _ }) => {
                        log::info!("BLE: Disconnected");
                        break;
                    }
                    Either::First(GattConnectionEvent::Gatt { event }) => {
                        handle_gatt_event(&server, &bridge, &mut store, event);
                    }
                    Either::First(_) => {}
                    Either::Second(running) => {
                        if server.user.state.notify(&conn, &state_byte(running)).await.is_err() {
                            log::warn!("BLE: State notification failed");
                        }
                    }
                }
            }
        }
    };

    select(runner_task, peripheral_task).await;
}

/// Serve one attribute access
///
/// Characteristic values are refreshed from the live state before a read is
/// accepted; writes are validated by the bridge before they are accepted.
fn handle_gatt_event<S: Scheduler, St: SettingsStore>(
    server: &Server<'_>,
    bridge: &TransportBridge<'static, S>,
    store: &mut St,
    event: GattEvent<'_, '_, DefaultPacketPool>,
) {
    match event {
        GattEvent::Read(read_event) => {
            let handle = read_event.handle();
            if let Some(identifier) = server.config_identifier(handle) {
                let refreshed = bridge.config_value(identifier).and_then(|value| {
                    let characteristic = server
                        .config_characteristic(identifier)
                        .ok_or(AttError::RequestNotSupported)?;
                    server
                        .set(characteristic, &value)
                        .map_err(|_| AttError::RequestNotSupported)
                });
                if let Err(error) = refreshed {
                    let _ = read_event.reject(att_code(error));
                    return;
                }
            } else if handle == server.user.state.handle {
                let _ = server.set(&server.user.state, &bridge.read_state());
            }
            let _ = read_event.accept();
        }
        GattEvent::Write(write_event) => {
            let handle = write_event.handle();
            let result = if let Some(identifier) = server.config_identifier(handle) {
                bridge.write_config(identifier, write_event.data(), store)
            } else if handle == server.user.state.handle {
                bridge.write_state(write_event.data())
            } else {
                Ok(())
            };

            match result {
                Ok(()) => {
                    if write_event.accept().is_err() {
                        log::warn!("BLE: Accepted write to handle {} not stored", handle);
                    }
                }
                Err(error) => {
                    log::warn!("BLE: Write to handle {} rejected: {}", handle, error);
                    let _ = write_event.reject(att_code(error));
                }
            }
        }
        GattEvent::Other(other_event) => {
            let _ = other_event.accept();
        }
    }
}
