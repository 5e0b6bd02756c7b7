//! Peripheral drivers.

pub mod as7341;
pub mod watchdog;
