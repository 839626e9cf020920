//! Persistent settings store
//!
//! Parameters survive a reboot as fixed-size records in a small flash region.
//! Each slot holds one key/value pair protected by a CRC:
//!
//! ```text
//! [magic: u16 LE][key_len: u8][value_len: u8][key: 40][value: 4][crc16: u16 LE][0xFF pad]
//! ```
//!
//! An erased slot reads as all `0xFF`. Records whose magic, lengths or CRC do
//! not check out are counted as corrupt and skipped.

use core::fmt;

use crc::{Crc, CRC_16_XMODEM};
use embedded_storage::{ReadStorage, Storage};

use crate::config::settings::{KEY_MAX_LEN, VALUE_LEN};
use crate::config::storage::{RECORD_MAGIC, RECORD_SIZE, SLOT_COUNT};
use crate::settings::{ConfigRegistry, StorageKey};

const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

const HEADER_LEN: usize = 4;
const KEY_OFFSET: usize = HEADER_LEN;
const VALUE_OFFSET: usize = KEY_OFFSET + KEY_MAX_LEN;
const CRC_OFFSET: usize = VALUE_OFFSET + VALUE_LEN;
const ERASED: u8 = 0xFF;

/// Errors that can occur while loading or saving settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Flash read or write failed
    Io,
    /// No free slot for a new key
    Full,
    /// Key empty or longer than the record allows
    InvalidKey,
    /// Value is not exactly four bytes
    InvalidValue,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io => f.write_str("flash I/O error"),
            StoreError::Full => f.write_str("settings store full"),
            StoreError::InvalidKey => f.write_str("invalid settings key"),
            StoreError::InvalidValue => f.write_str("invalid settings value"),
        }
    }
}

/// Outcome of a boot-time load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    /// Records applied to the registry
    pub applied: usize,
    /// Corrupt records and records the registry refused
    pub rejected: usize,
}

/// Durable backing for the configuration registry
pub trait SettingsStore {
    /// Apply every persisted key to `registry`, then commit it
    fn load(&mut self, registry: &ConfigRegistry) -> Result<LoadSummary, StoreError>;

    /// Persist one fully-qualified key
    fn save_one(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

/// Decoded content of one slot
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Erased,
    Corrupt,
    Record {
        key: StorageKey,
        value: [u8; VALUE_LEN],
    },
}

fn encode_record(key: &str, value: &[u8]) -> Result<[u8; RECORD_SIZE], StoreError> {
    if key.is_empty() || key.len() > KEY_MAX_LEN {
        return Err(StoreError::InvalidKey);
    }
    if value.len() != VALUE_LEN {
        return Err(StoreError::InvalidValue);
    }

    let mut record = [ERASED; RECORD_SIZE];
    record[..2].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
    record[2] = key.len() as u8;
    record[3] = VALUE_LEN as u8;
    record[KEY_OFFSET..VALUE_OFFSET].fill(0);
    record[KEY_OFFSET..KEY_OFFSET + key.len()].copy_from_slice(key.as_bytes());
    record[VALUE_OFFSET..CRC_OFFSET].copy_from_slice(value);

    let crc = CRC.checksum(&record[..CRC_OFFSET]);
    record[CRC_OFFSET..CRC_OFFSET + 2].copy_from_slice(&crc.to_le_bytes());
    Ok(record)
}

fn decode_record(record: &[u8; RECORD_SIZE]) -> Slot {
    if record.iter().all(|&byte| byte == ERASED) {
        return Slot::Erased;
    }

    let magic = u16::from_le_bytes([record[0], record[1]]);
    let key_len = record[2] as usize;
    let value_len = record[3] as usize;
    if magic != RECORD_MAGIC || key_len == 0 || key_len > KEY_MAX_LEN || value_len != VALUE_LEN {
        return Slot::Corrupt;
    }

    let received_crc = u16::from_le_bytes([record[CRC_OFFSET], record[CRC_OFFSET + 1]]);
    if CRC.checksum(&record[..CRC_OFFSET]) != received_crc {
        return Slot::Corrupt;
    }

    let Ok(text) = core::str::from_utf8(&record[KEY_OFFSET..KEY_OFFSET + key_len]) else {
        return Slot::Corrupt;
    };
    let mut key = StorageKey::new();
    if key.push_str(text).is_err() {
        return Slot::Corrupt;
    }

    let mut value = [0u8; VALUE_LEN];
    value.copy_from_slice(&record[VALUE_OFFSET..CRC_OFFSET]);
    Slot::Record { key, value }
}

/// Settings store on any `embedded_storage` flash
pub struct FlashSettingsStore<F> {
    flash: F,
    base: u32,
}

impl<F: Storage> FlashSettingsStore<F> {
    /// Store whose slots start at `base` bytes into `flash`
    pub fn new(flash: F, base: u32) -> Self {
        Self { flash, base }
    }

    /// Release the underlying flash
    pub fn into_inner(self) -> F {
        self.flash
    }

    fn slot_offset(&self, slot: usize) -> u32 {
        self.base + (slot * RECORD_SIZE) as u32
    }

    fn read_slot(&mut self, slot: usize) -> Result<Slot, StoreError> {
        let mut record = [0u8; RECORD_SIZE];
        let offset = self.slot_offset(slot);
        self.flash.read(offset, &mut record).map_err(|_| {
            log::error!("Flash read failed at {:#x}", offset);
            StoreError::Io
        })?;
        Ok(decode_record(&record))
    }
}

impl<F: Storage> SettingsStore for FlashSettingsStore<F> {
    fn load(&mut self, registry: &ConfigRegistry) -> Result<LoadSummary, StoreError> {
        let mut summary = LoadSummary::default();

        for slot in 0..SLOT_COUNT {
            match self.read_slot(slot)? {
                Slot::Erased => {}
                Slot::Corrupt => {
                    log::warn!("Skipping corrupt settings record in slot {}", slot);
                    summary.rejected += 1;
                }
                Slot::Record { key, value } => match registry.set(&key, &value) {
                    Ok(()) => summary.applied += 1,
                    Err(error) => {
                        log::warn!("Ignoring stored {}: {}", key, error);
                        summary.rejected += 1;
                    }
                },
            }
        }

        registry.commit();
        log::info!(
            "Settings loaded: {} applied, {} rejected",
            summary.applied,
            summary.rejected
        );
        Ok(summary)
    }

    fn save_one(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let record = encode_record(key, value)?;

        let mut target = None;
        for slot in 0..SLOT_COUNT {
            match self.read_slot(slot)? {
                Slot::Record {
                    key: stored,
                    value: stored_value,
                } if stored.as_str() == key => {
                    if stored_value == value {
                        log::debug!("Setting {} unchanged, skipping write", key);
                        return Ok(());
                    }
                    target = Some(slot);
                    break;
                }
                Slot::Erased if target.is_none() => target = Some(slot),
                _ => {}
            }
        }

        let slot = target.ok_or_else(|| {
            log::error!("No free settings slot for {}", key);
            StoreError::Full
        })?;

        let offset = self.slot_offset(slot);
        self.flash.write(offset, &record).map_err(|_| {
            log::error!("Flash write failed at {:#x}", offset);
            StoreError::Io
        })?;
        log::debug!("Saved {} to slot {}", key, slot);
        Ok(())
    }
}
