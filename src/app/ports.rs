//! Port traits: the hexagonal boundary between the protocol core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ command handlers / AppService
//! ```
//!
//! Driven adapters (the AS7341 driver, the power controller, the chip-level
//! system services) implement these traits. Handlers only ever see them as
//! `&mut dyn Port`, so every command is testable with mocks.

use serde::Serialize;

use crate::diagnostics::SystemInfo;
use crate::error::SensorError;

// ───────────────────────────────────────────────────────────────
// Spectral sensor port
// ───────────────────────────────────────────────────────────────

/// Measurement settings applied by [`SpectralSensor::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSettings {
    /// Gain index, 0 = 0.5× … 10 = 512×.
    pub gain: u8,
    pub integration_time_ms: u16,
    pub led_current_ma: u8,
}

/// Current sensor configuration as reported to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SensorConfiguration {
    pub gain: u8,
    pub integration_time: u16,
    pub led_current: u8,
    pub led_enabled: bool,
    pub external_led_enabled: bool,
}

/// One full readout: eight spectral channels plus Clear and NIR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpectralReading {
    #[serde(rename = "F1")]
    pub f1: u16,
    #[serde(rename = "F2")]
    pub f2: u16,
    #[serde(rename = "F3")]
    pub f3: u16,
    #[serde(rename = "F4")]
    pub f4: u16,
    #[serde(rename = "F5")]
    pub f5: u16,
    #[serde(rename = "F6")]
    pub f6: u16,
    #[serde(rename = "F7")]
    pub f7: u16,
    #[serde(rename = "F8")]
    pub f8: u16,
    #[serde(rename = "Clear")]
    pub clear: u16,
    #[serde(rename = "NIR")]
    pub nir: u16,
}

/// The spectral sensor collaborator.
///
/// Every method must return within a bounded time; implementations poll
/// with a fixed budget rather than waiting on the bus indefinitely.
pub trait SpectralSensor {
    /// Probe and power up the device, then apply the default settings.
    fn begin(&mut self) -> Result<(), SensorError>;

    fn configure(&mut self, settings: SensorSettings) -> Result<(), SensorError>;

    fn read_all_channels(&mut self) -> Result<SpectralReading, SensorError>;

    /// Drive the onboard LED; `current_ma` is clamped by the driver.
    fn set_led(&mut self, enabled: bool, current_ma: u8) -> Result<(), SensorError>;

    fn set_external_led(&mut self, enabled: bool) -> Result<(), SensorError>;

    fn configuration(&self) -> SensorConfiguration;

    /// Whether the device answers on the bus right now.
    fn is_connected(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// System port (chip services)
// ───────────────────────────────────────────────────────────────

pub trait SystemPort {
    fn info(&self) -> SystemInfo;

    /// Irreversible restart. On target this does not return.
    fn restart(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Power port
// ───────────────────────────────────────────────────────────────

/// Idle / sleep controller. Opaque to the protocol core.
pub trait PowerPort {
    /// Record host activity (a command was received).
    fn update_activity(&mut self, now_ms: u64);

    /// Called on idle ticks; may enter light sleep.
    fn check_sleep_conditions(&mut self, now_ms: u64);
}
