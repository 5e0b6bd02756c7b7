//! Device configuration parameters
//!
//! Everything the protocol core consumes but does not own: transport buffer
//! sizes, stream limits, sensor defaults and the identity strings reported by
//! `get_info`. Compile-time capacities live alongside as constants because
//! they size fixed arenas.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Capacity of the line framer's record buffer (bytes).
pub const JSON_BUFFER_SIZE: usize = 2048;

/// Hard ceiling on stream slots; `max_data_streams` must not exceed it.
pub const MAX_STREAM_SLOTS: usize = 8;

/// Capacity of the command registry (power of two for `FnvIndexMap`).
pub const MAX_COMMANDS: usize = 16;

/// Longest accepted stream type key.
pub const MAX_STREAM_TYPE_LEN: usize = 32;

/// Highest AS7341 gain index (512×).
pub const MAX_GAIN: u8 = 10;

/// Integration time bounds accepted by `as7341_config` (ms).
pub const MIN_INTEGRATION_TIME_MS: u16 = 1;
pub const MAX_INTEGRATION_TIME_MS: u16 = 1000;

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    // --- Serial link ---
    pub serial_baud_rate: u32,
    /// Upper bound on bytes drained from the transport per tick.
    pub serial_rx_size: usize,
    pub serial_tx_size: usize,

    // --- Streaming ---
    /// Maximum number of distinct stream types alive at once.
    pub max_data_streams: usize,
    pub min_stream_interval_ms: u32,
    pub max_stream_interval_ms: u32,
    pub default_stream_interval_ms: u32,

    // --- AS7341 defaults ---
    /// Gain index, 0 = 0.5× … 10 = 512×.
    pub default_gain: u8,
    pub default_integration_time_ms: u16,
    pub default_led_current_ma: u8,
    pub max_led_current_ma: u8,

    // --- Identity ---
    pub device_name: String,
    pub firmware_version: String,

    // --- Power / liveness ---
    pub enable_power_saving: bool,
    /// Enter light sleep after this long without a command.
    pub sleep_after_idle_ms: u64,
    /// Task watchdog deadline; the loop must come round within this.
    pub watchdog_timeout_ms: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial_baud_rate: 115_200,
            serial_rx_size: 2048,
            serial_tx_size: 2048,

            max_data_streams: 3,
            min_stream_interval_ms: 10,
            max_stream_interval_ms: 60_000,
            default_stream_interval_ms: 100,

            default_gain: 5, // 16×
            default_integration_time_ms: 100,
            default_led_current_ma: 10,
            max_led_current_ma: 20,

            device_name: "AS7341 Nephelometer".into(),
            firmware_version: "0.1.0".into(),

            enable_power_saving: false,
            sleep_after_idle_ms: 60_000,
            watchdog_timeout_ms: 30_000,
        }
    }
}

impl DeviceConfig {
    /// Reject configurations the scheduler or sensor layer cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_data_streams == 0 || self.max_data_streams > MAX_STREAM_SLOTS {
            return Err(Error::Config("max_data_streams out of range"));
        }
        if self.min_stream_interval_ms == 0
            || self.min_stream_interval_ms > self.default_stream_interval_ms
            || self.default_stream_interval_ms > self.max_stream_interval_ms
        {
            return Err(Error::Config("stream intervals must satisfy 0 < min <= default <= max"));
        }
        if self.default_gain > MAX_GAIN {
            return Err(Error::Config("default_gain above 512x"));
        }
        if !(MIN_INTEGRATION_TIME_MS..=MAX_INTEGRATION_TIME_MS)
            .contains(&self.default_integration_time_ms)
        {
            return Err(Error::Config("default_integration_time_ms out of range"));
        }
        if self.default_led_current_ma > self.max_led_current_ma {
            return Err(Error::Config("default LED current above maximum"));
        }
        if self.serial_rx_size == 0 {
            return Err(Error::Config("serial_rx_size must be non-zero"));
        }
        Ok(())
    }
}
