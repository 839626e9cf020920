//! Configuration registry for the sequence timing parameters
//!
//! The registry owns the live timing values as independent atomic cells and
//! maps the two external namespaces onto them: BLE attribute UUIDs and
//! persisted settings keys. Every update is validated against the
//! descriptor's bounds and republishes the derived period count with a single
//! atomic store, so readers never observe a half-computed value.
//!
//! Writers never lock. A write that would empty the period is undone, and the
//! period count is republished until it matches the values it was derived
//! from.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use heapless::String;

use crate::config::{limits, settings, timing, uuid};

/// Number of tunable parameters
pub const PARAM_COUNT: usize = 3;

/// Tag identifying one timing parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamId {
    /// Total sequence duration in milliseconds
    SequenceDuration,
    /// LED on-time per period in milliseconds
    OnDuration,
    /// LED off-time per period in milliseconds
    OffDuration,
}

impl ParamId {
    /// All parameters in table order
    pub const ALL: [ParamId; PARAM_COUNT] = [
        ParamId::SequenceDuration,
        ParamId::OnDuration,
        ParamId::OffDuration,
    ];

    const fn index(self) -> usize {
        match self {
            ParamId::SequenceDuration => 0,
            ParamId::OnDuration => 1,
            ParamId::OffDuration => 2,
        }
    }

    /// Storage key relative to the module prefix
    pub const fn local_key(self) -> &'static str {
        match self {
            ParamId::SequenceDuration => settings::KEY_SEQ_DURATION_MS,
            ParamId::OnDuration => settings::KEY_TON_MS,
            ParamId::OffDuration => settings::KEY_TOFF_MS,
        }
    }

    /// BLE characteristic UUID exposing this parameter
    pub const fn identifier(self) -> u128 {
        match self {
            ParamId::SequenceDuration => uuid::SEQ_DURATION_MS,
            ParamId::OnDuration => uuid::TON_MS,
            ParamId::OffDuration => uuid::TOFF_MS,
        }
    }
}

/// Optional inclusive bounds for a parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl Bounds {
    /// Accepts every value
    pub const UNBOUNDED: Self = Self {
        min: None,
        max: None,
    };

    /// Inclusive `[min, max]` range
    pub const fn new(min: u32, max: u32) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Upper bound only
    pub const fn at_most(max: u32) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    /// Returns `true` when `value` satisfies both bounds
    pub const fn contains(&self, value: u32) -> bool {
        let above_min = match self.min {
            Some(min) => value >= min,
            None => true,
        };
        let below_max = match self.max {
            Some(max) => value <= max,
            None => true,
        };
        above_min && below_max
    }
}

/// Registry record binding an external identifier to a live parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub id: ParamId,
    /// BLE attribute UUID
    pub identifier: u128,
    /// Key relative to the module prefix
    pub local_key: &'static str,
    pub bounds: Bounds,
}

impl ParamDescriptor {
    const fn unbounded(id: ParamId) -> Self {
        Self {
            id,
            identifier: id.identifier(),
            local_key: id.local_key(),
            bounds: Bounds::UNBOUNDED,
        }
    }
}

/// Errors returned by registry operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Unknown identifier or key
    NotFound,
    /// Malformed size, buffer or key
    InvalidArgument,
    /// Value outside the validated bounds
    OutOfRange,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotFound => f.write_str("setting not found"),
            ConfigError::InvalidArgument => f.write_str("invalid argument"),
            ConfigError::OutOfRange => f.write_str("value out of range"),
        }
    }
}

/// Plain copy of the three timing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingParams {
    pub sequence_duration_ms: u32,
    pub on_duration_ms: u32,
    pub off_duration_ms: u32,
}

impl TimingParams {
    /// Number of on/off periods that fit in the sequence
    pub const fn period_count(&self) -> u32 {
        period_count(
            self.sequence_duration_ms,
            self.on_duration_ms,
            self.off_duration_ms,
        )
    }
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            sequence_duration_ms: timing::DEFAULT_SEQUENCE_DURATION_MS,
            on_duration_ms: timing::DEFAULT_ON_DURATION_MS,
            off_duration_ms: timing::DEFAULT_OFF_DURATION_MS,
        }
    }
}

/// `sequence / (on + off)`, or 0 when the period is empty
pub const fn period_count(sequence_ms: u32, on_ms: u32, off_ms: u32) -> u32 {
    let period = on_ms as u64 + off_ms as u64;
    if period == 0 {
        0
    } else {
        (sequence_ms as u64 / period) as u32
    }
}

/// Fully-qualified settings key
pub type StorageKey = String<{ settings::KEY_MAX_LEN }>;

/// Strips `"<module prefix>/"` from a fully-qualified key
pub fn strip_module_prefix(key: &str) -> Option<&str> {
    key.strip_prefix(settings::MODULE_PREFIX)?
        .strip_prefix(settings::KEY_SEPARATOR)
}

/// Live timing parameters, their descriptors and the derived period count
pub struct ConfigRegistry {
    descriptors: [ParamDescriptor; PARAM_COUNT],
    values: [AtomicU32; PARAM_COUNT],
    period_count: AtomicU32,
}

impl ConfigRegistry {
    /// Registry with firmware default values and no bounds
    pub const fn new() -> Self {
        Self::with_defaults(TimingParams {
            sequence_duration_ms: timing::DEFAULT_SEQUENCE_DURATION_MS,
            on_duration_ms: timing::DEFAULT_ON_DURATION_MS,
            off_duration_ms: timing::DEFAULT_OFF_DURATION_MS,
        })
    }

    /// Registry with explicit starting values and no bounds
    pub const fn with_defaults(defaults: TimingParams) -> Self {
        Self {
            descriptors: [
                ParamDescriptor::unbounded(ParamId::SequenceDuration),
                ParamDescriptor::unbounded(ParamId::OnDuration),
                ParamDescriptor::unbounded(ParamId::OffDuration),
            ],
            values: [
                AtomicU32::new(defaults.sequence_duration_ms),
                AtomicU32::new(defaults.on_duration_ms),
                AtomicU32::new(defaults.off_duration_ms),
            ],
            period_count: AtomicU32::new(defaults.period_count()),
        }
    }

    /// Registry as shipped on the device: default values, firmware limits
    pub const fn firmware() -> Self {
        Self::new()
            .with_bounds(
                ParamId::SequenceDuration,
                Bounds::at_most(limits::MAX_SEQUENCE_DURATION_MS),
            )
            .with_bounds(
                ParamId::OnDuration,
                Bounds::new(limits::MIN_TOGGLE_MS, limits::MAX_TOGGLE_MS),
            )
            .with_bounds(
                ParamId::OffDuration,
                Bounds::new(limits::MIN_TOGGLE_MS, limits::MAX_TOGGLE_MS),
            )
    }

    /// Replaces the validation bounds of one parameter
    pub const fn with_bounds(mut self, id: ParamId, bounds: Bounds) -> Self {
        self.descriptors[id.index()].bounds = bounds;
        self
    }

    /// Descriptor table in declaration order
    pub fn descriptors(&self) -> &[ParamDescriptor] {
        &self.descriptors
    }

    /// Descriptor for a parameter tag
    pub fn descriptor(&self, id: ParamId) -> &ParamDescriptor {
        &self.descriptors[id.index()]
    }

    /// Looks up a descriptor by its BLE attribute UUID
    pub fn resolve(&self, identifier: u128) -> Result<&ParamDescriptor, ConfigError> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.identifier == identifier)
            .ok_or_else(|| {
                log::error!("No setting for attribute {:032x}", identifier);
                ConfigError::NotFound
            })
    }

    /// Looks up a descriptor by local or fully-qualified storage key
    pub fn resolve_key(&self, key: &str) -> Result<&ParamDescriptor, ConfigError> {
        let local = strip_module_prefix(key).unwrap_or(key);
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.local_key == local)
            .ok_or_else(|| {
                log::error!("Invalid name, cannot retrieve setting for {}", key);
                ConfigError::NotFound
            })
    }

    /// Builds `"<module prefix>/<local key>"` for a descriptor
    pub fn compose_storage_key(
        &self,
        descriptor: &ParamDescriptor,
    ) -> Result<StorageKey, ConfigError> {
        let mut key = StorageKey::new();
        key.push_str(settings::MODULE_PREFIX)
            .and_then(|()| key.push(settings::KEY_SEPARATOR))
            .and_then(|()| key.push_str(descriptor.local_key))
            .map_err(|()| {
                log::error!("Key too long for setting {}", descriptor.local_key);
                ConfigError::InvalidArgument
            })?;
        Ok(key)
    }

    /// Writes the fully-qualified key into `buf`, returning its length
    ///
    /// `buf` must hold at least [`settings::KEY_MAX_LEN`] bytes.
    pub fn compose_storage_key_into(
        &self,
        descriptor: &ParamDescriptor,
        buf: &mut [u8],
    ) -> Result<usize, ConfigError> {
        if buf.len() < settings::KEY_MAX_LEN {
            log::error!("Buffer too short for full key name");
            return Err(ConfigError::InvalidArgument);
        }
        let key = self.compose_storage_key(descriptor)?;
        buf[..key.len()].copy_from_slice(key.as_bytes());
        Ok(key.len())
    }

    /// Resolves an attribute UUID straight to its fully-qualified key
    pub fn storage_key(&self, identifier: u128) -> Result<StorageKey, ConfigError> {
        let descriptor = self.resolve(identifier)?;
        self.compose_storage_key(descriptor)
    }

    /// Decodes and stores a 4-byte native-endian value under `key`
    pub fn set(&self, key: &str, bytes: &[u8]) -> Result<(), ConfigError> {
        let descriptor = self.resolve_key(key)?;
        let raw: [u8; settings::VALUE_LEN] = bytes.try_into().map_err(|_| {
            log::error!("Invalid size {} for setting {}", bytes.len(), key);
            ConfigError::InvalidArgument
        })?;
        self.store_checked(descriptor, u32::from_ne_bytes(raw))
    }

    /// Validates and stores a typed value
    pub fn set_value(&self, id: ParamId, value: u32) -> Result<(), ConfigError> {
        self.store_checked(self.descriptor(id), value)
    }

    /// Copies the live value of `key` into `buf`, returning the byte count
    pub fn get(&self, key: &str, buf: &mut [u8]) -> Result<usize, ConfigError> {
        let descriptor = self.resolve_key(key)?;
        let out = buf.get_mut(..settings::VALUE_LEN).ok_or_else(|| {
            log::error!("Buffer for value too short");
            ConfigError::InvalidArgument
        })?;
        out.copy_from_slice(&self.value(descriptor.id).to_ne_bytes());
        Ok(settings::VALUE_LEN)
    }

    /// Recomputes the period count once a bulk load has finished
    pub fn commit(&self) {
        self.recompute_period_count();
        log::debug!("Settings committed, {} periods", self.period_count());
    }

    /// Live value of a parameter
    pub fn value(&self, id: ParamId) -> u32 {
        self.values[id.index()].load(Ordering::SeqCst)
    }

    /// Derived number of on/off periods per sequence
    pub fn period_count(&self) -> u32 {
        self.period_count.load(Ordering::SeqCst)
    }

    /// Reads all three parameters (each read individually atomic)
    pub fn snapshot(&self) -> TimingParams {
        TimingParams {
            sequence_duration_ms: self.value(ParamId::SequenceDuration),
            on_duration_ms: self.value(ParamId::OnDuration),
            off_duration_ms: self.value(ParamId::OffDuration),
        }
    }

    fn store_checked(&self, descriptor: &ParamDescriptor, value: u32) -> Result<(), ConfigError> {
        if !descriptor.bounds.contains(value) {
            log::error!("Invalid value {} for setting {}", value, descriptor.local_key);
            return Err(ConfigError::OutOfRange);
        }

        let cell = &self.values[descriptor.id.index()];
        let previous = cell.swap(value, Ordering::SeqCst);
        if self.empties_period(descriptor.id, value) {
            // Another writer may already have replaced the value
            let _ = cell.compare_exchange(value, previous, Ordering::SeqCst, Ordering::SeqCst);
            self.recompute_period_count();
            log::error!("Setting {} to {} leaves an empty period", descriptor.local_key, value);
            return Err(ConfigError::OutOfRange);
        }

        self.recompute_period_count();
        log::debug!("Config value {} changed to {}", descriptor.local_key, value);
        Ok(())
    }

    /// `true` when the stored `value` leaves `on + off == 0`
    ///
    /// Checked after the store: of two racing zero writes, at least one sees
    /// the other and backs out.
    fn empties_period(&self, id: ParamId, value: u32) -> bool {
        match id {
            ParamId::OnDuration => value == 0 && self.value(ParamId::OffDuration) == 0,
            ParamId::OffDuration => value == 0 && self.value(ParamId::OnDuration) == 0,
            ParamId::SequenceDuration => false,
        }
    }

    fn recompute_period_count(&self) {
        let mut published = self.period_count.load(Ordering::SeqCst);
        loop {
            let count = self.snapshot().period_count();
            match self.period_count.compare_exchange(
                published,
                count,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                // A value stored after the snapshot needs another pass
                Ok(_) if self.snapshot().period_count() == count => break,
                Ok(_) => published = count,
                Err(current) => published = current,
            }
        }
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}
