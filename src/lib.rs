#![cfg_attr(not(test), no_std)]

pub mod bridge;
pub mod config;
pub mod cycle;
pub mod settings;
pub mod storage;

// These modules depend on embassy/esp features only available with embedded feature
#[cfg(feature = "embedded")]
pub mod ble;
#[cfg(feature = "embedded")]
pub mod tasks;
