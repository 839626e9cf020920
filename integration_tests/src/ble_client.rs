//! BLE client for the LED cycle config and user services.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

/// Config service and its characteristics (u32 LE milliseconds)
pub const CONFIG_SERVICE_UUID: Uuid = Uuid::from_u128(0x53a80100_0001_4c43_0001_4c4544435943);
pub const SEQ_DURATION_UUID: Uuid = Uuid::from_u128(0x53a80101_0001_4c43_0001_4c4544435943);
pub const TON_UUID: Uuid = Uuid::from_u128(0x53a80102_0001_4c43_0001_4c4544435943);
pub const TOFF_UUID: Uuid = Uuid::from_u128(0x53a80103_0001_4c43_0001_4c4544435943);

/// User service state characteristic (u8, notify)
pub const STATE_UUID: Uuid = Uuid::from_u128(0x53a80201_0001_4c43_0001_4c4544435943);

/// BLE client for communicating with the LED cycle device.
pub struct BleClient {
    peripheral: Peripheral,
    characteristics: Vec<Characteristic>,
    state_char: Characteristic,
    /// State notifications received so far
    notifications: Arc<Mutex<Vec<u8>>>,
}

impl BleClient {
    /// Scan for a device whose name starts with `name` and connect.
    pub async fn connect_by_name(name: &str, scan_timeout: Duration) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapters found"))?;

        adapter
            .start_scan(ScanFilter {
                services: vec![CONFIG_SERVICE_UUID],
            })
            .await?;

        let peripheral = Self::find_device_by_name(&adapter, name, scan_timeout).await?;

        adapter.stop_scan().await?;

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristics: Vec<Characteristic> =
            peripheral.characteristics().into_iter().collect();

        let state_char = characteristics
            .iter()
            .find(|c| c.uuid == STATE_UUID)
            .cloned()
            .ok_or_else(|| anyhow!("State characteristic not found"))?;

        peripheral.subscribe(&state_char).await?;

        let notifications = Arc::new(Mutex::new(Vec::new()));

        let buffer_clone = notifications.clone();
        let peripheral_clone = peripheral.clone();
        tokio::spawn(async move {
            let mut stream = match peripheral_clone.notifications().await {
                Ok(s) => s,
                Err(_) => return,
            };

            while let Some(data) = stream.next().await {
                if data.uuid == STATE_UUID {
                    let mut buf = buffer_clone.lock().await;
                    buf.extend_from_slice(&data.value);
                }
            }
        });

        Ok(Self {
            peripheral,
            characteristics,
            state_char,
            notifications,
        })
    }

    /// Find a device by name prefix within the scan timeout.
    async fn find_device_by_name(
        adapter: &Adapter,
        name: &str,
        scan_timeout: Duration,
    ) -> Result<Peripheral> {
        let start = std::time::Instant::now();

        while start.elapsed() < scan_timeout {
            let peripherals = adapter.peripherals().await?;

            for peripheral in peripherals {
                if let Some(props) = peripheral.properties().await? {
                    if let Some(local_name) = props.local_name {
                        if local_name.starts_with(name) {
                            println!("  Found {}", local_name);
                            return Ok(peripheral);
                        }
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(anyhow!("Device '{}' not found within timeout", name))
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| anyhow!("Characteristic {} not found", uuid))
    }

    /// Read a u32 config characteristic.
    pub async fn read_u32(&self, uuid: Uuid) -> Result<u32> {
        let value = self.peripheral.read(self.characteristic(uuid)?).await?;
        let bytes: [u8; 4] = value
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("Expected 4 bytes, got {}", value.len()))?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Write a u32 config characteristic; the device rejects invalid values.
    pub async fn write_u32(&self, uuid: Uuid, value: u32) -> Result<()> {
        self.write_raw(uuid, &value.to_le_bytes()).await
    }

    /// Write raw bytes with response.
    pub async fn write_raw(&self, uuid: Uuid, data: &[u8]) -> Result<()> {
        self.peripheral
            .write(self.characteristic(uuid)?, data, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    /// Read the state byte (1 = running).
    pub async fn read_state(&self) -> Result<u8> {
        let value = self.peripheral.read(&self.state_char).await?;
        value
            .first()
            .copied()
            .ok_or_else(|| anyhow!("Empty state value"))
    }

    /// Write the state byte: non-zero starts a sequence, zero stops it.
    pub async fn write_state(&self, value: u8) -> Result<()> {
        self.peripheral
            .write(&self.state_char, &[value], WriteType::WithResponse)
            .await?;
        Ok(())
    }

    /// Wait until a state notification with `expected` arrives.
    pub async fn wait_for_state(&self, expected: u8, timeout_duration: Duration) -> Result<()> {
        let result = timeout(timeout_duration, async {
            loop {
                let mut buf = self.notifications.lock().await;
                if let Some(pos) = buf.iter().position(|&b| b == expected) {
                    buf.drain(..=pos);
                    return;
                }
                drop(buf);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        result.map_err(|_| anyhow!("Timeout waiting for state notification {}", expected))
    }

    /// Forget any received notifications.
    pub async fn clear_notifications(&self) {
        self.notifications.lock().await.clear();
    }

    /// Disconnect from the device.
    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.unsubscribe(&self.state_char).await?;
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
