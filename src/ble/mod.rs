//! Bluetooth Low Energy module
//!
//! Exposes the timing parameters and the start/stop control as GATT
//! services.

pub mod service;

pub use service::{ConfigService, UserService};
