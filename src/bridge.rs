//! Transport bridge between BLE attribute accesses and the controller
//!
//! Attribute reads and writes arrive as raw bytes addressed by the
//! characteristic UUID. The bridge resolves them against the registry, applies
//! them to the live configuration and the persistent store, or forwards them
//! to the cycle controller, and maps every failure onto an ATT error code.

use core::fmt;

use crate::config::settings::VALUE_LEN;
use crate::cycle::{CycleController, Scheduler};
use crate::settings::ConfigError;
use crate::storage::SettingsStore;

/// ATT error returned to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttError {
    /// Value rejected by validation or could not be persisted
    ValueNotAllowed,
    /// Attribute is not backed by a setting
    RequestNotSupported,
    /// Controller refused the request in its current phase
    ProcedureInProgress,
    /// Write payload is empty
    InvalidValueLength,
}

impl AttError {
    /// ATT protocol error code
    pub const fn code(self) -> u8 {
        match self {
            AttError::RequestNotSupported => 0x06,
            AttError::InvalidValueLength => 0x0D,
            AttError::ValueNotAllowed => 0x13,
            AttError::ProcedureInProgress => 0xFE,
        }
    }
}

impl fmt::Display for AttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttError::ValueNotAllowed => f.write_str("value not allowed"),
            AttError::RequestNotSupported => f.write_str("request not supported"),
            AttError::ProcedureInProgress => f.write_str("procedure already in progress"),
            AttError::InvalidValueLength => f.write_str("invalid attribute value length"),
        }
    }
}

/// State characteristic value while a sequence is running
pub const STATE_RUNNING: u8 = 0x01;
/// State characteristic value while idle
pub const STATE_IDLE: u8 = 0x00;

/// Encodes a running flag as the one-byte state value
pub const fn state_byte(running: bool) -> u8 {
    if running {
        STATE_RUNNING
    } else {
        STATE_IDLE
    }
}

/// Attribute-level front end of one controller
pub struct TransportBridge<'a, S> {
    controller: &'a CycleController<'a, S>,
}

impl<'a, S: Scheduler> TransportBridge<'a, S> {
    pub fn new(controller: &'a CycleController<'a, S>) -> Self {
        Self { controller }
    }

    /// Apply a configuration write live, then persist it
    ///
    /// A value that is applied but fails to persist stays live until reboot.
    pub fn write_config<St: SettingsStore>(
        &self,
        identifier: u128,
        data: &[u8],
        store: &mut St,
    ) -> Result<(), AttError> {
        let registry = self.controller.registry();
        let key = registry.storage_key(identifier).map_err(|error| match error {
            ConfigError::NotFound => AttError::RequestNotSupported,
            _ => AttError::ValueNotAllowed,
        })?;

        registry.set(&key, data).map_err(|error| {
            log::warn!("Rejected write to {}: {}", key, error);
            AttError::ValueNotAllowed
        })?;

        store.save_one(&key, data).map_err(|error| {
            log::error!("Cannot save {}: {}", key, error);
            AttError::ValueNotAllowed
        })?;

        log::info!("{} updated", key);
        Ok(())
    }

    /// Read the live value of a configuration attribute into `buf`
    pub fn read_config(&self, identifier: u128, buf: &mut [u8]) -> Result<usize, AttError> {
        let registry = self.controller.registry();
        let key = registry
            .storage_key(identifier)
            .map_err(|_| AttError::RequestNotSupported)?;
        registry
            .get(&key, buf)
            .map_err(|_| AttError::RequestNotSupported)
    }

    /// Typed variant of [`Self::read_config`]
    pub fn config_value(&self, identifier: u128) -> Result<u32, AttError> {
        let mut buf = [0u8; VALUE_LEN];
        self.read_config(identifier, &mut buf)?;
        Ok(u32::from_ne_bytes(buf))
    }

    /// Start a sequence on a non-zero byte, stop it on zero
    ///
    /// The payload must be exactly one byte; anything else is refused before
    /// the controller is touched.
    pub fn write_state(&self, data: &[u8]) -> Result<(), AttError> {
        let &[first] = data else {
            log::warn!("State write of {} bytes refused", data.len());
            return Err(AttError::InvalidValueLength);
        };

        let result = if first != 0 {
            self.controller.trigger_new_cycle()
        } else {
            self.controller.stop_cycle()
        };

        result.map_err(|error| {
            log::warn!("State write {} refused: {}", first, error);
            AttError::ProcedureInProgress
        })
    }

    /// Current state byte
    pub fn read_state(&self) -> u8 {
        state_byte(self.controller.device_running())
    }
}
