//! AS7341 11-channel spectral sensor driver.
//!
//! Talks to the chip over any `embedded-hal` 1.0 [`I2c`] bus, so the same
//! code runs against `esp_idf_hal::i2c::I2cDriver` on target and against a
//! register-map mock on the host.
//!
//! ```text
//!   readout = two SMUX passes, six ADCs each
//!   pass 1: F1 F2 F3 F4 Clear NIR   → CH0..CH5
//!   pass 2: F5 F6 F7 F8 Clear NIR   → CH0..CH5
//! ```
//!
//! Integration time = (ATIME + 1) × (ASTEP + 1) × 2.78 µs. ATIME is fixed at
//! 29 and ASTEP carries the requested time, which keeps 1..=1000 ms inside
//! the 16-bit ASTEP range.
//!
//! Every wait is a bounded poll; a missing data-ready bit becomes
//! [`SensorError::Timeout`] instead of a stalled main loop.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::app::ports::{SensorConfiguration, SensorSettings, SpectralReading, SpectralSensor};
use crate::config::MAX_GAIN;
use crate::error::SensorError;

// ───────────────────────────────────────────────────────────────
// Register map
// ───────────────────────────────────────────────────────────────

pub const DEFAULT_ADDR: u8 = 0x39;
const CHIP_ID: u8 = 0x09;

const REG_CONFIG: u8 = 0x70;
const REG_LED: u8 = 0x74;
const REG_ENABLE: u8 = 0x80;
const REG_ATIME: u8 = 0x81;
const REG_WHOAMI: u8 = 0x92;
const REG_CH0_DATA_L: u8 = 0x95;
const REG_STATUS2: u8 = 0xA3;
const REG_CFG0: u8 = 0xA9;
const REG_CFG1: u8 = 0xAA;
const REG_CFG6: u8 = 0xAF;
const REG_ASTEP_L: u8 = 0xCA;

const ENABLE_PON: u8 = 1 << 0;
const ENABLE_SP_EN: u8 = 1 << 1;
const ENABLE_SMUXEN: u8 = 1 << 4;
const STATUS2_AVALID: u8 = 1 << 6;
const CFG0_REG_BANK: u8 = 1 << 4;
const CONFIG_LED_SEL: u8 = 1 << 3;
const LED_ACT: u8 = 1 << 7;
const CFG6_SMUX_WRITE: u8 = 2 << 3;

const ATIME: u8 = 29;
/// One integration step, in nanoseconds.
const STEP_NS: u64 = 2_780;

pub const MIN_LED_CURRENT_MA: u8 = 4;
pub const MAX_LED_CURRENT_MA: u8 = 20;

/// SMUX RAM image routing F1–F4, Clear and NIR onto ADC0–5.
const SMUX_F1_F4: [u8; 20] = [
    0x30, 0x01, 0x00, 0x00, 0x00, 0x42, 0x00, 0x00, 0x50, 0x00, 0x00, 0x00, 0x20, 0x04, 0x00,
    0x30, 0x01, 0x50, 0x00, 0x06,
];

/// SMUX RAM image routing F5–F8, Clear and NIR onto ADC0–5.
const SMUX_F5_F8: [u8; 20] = [
    0x00, 0x00, 0x00, 0x40, 0x02, 0x00, 0x10, 0x03, 0x50, 0x10, 0x03, 0x00, 0x00, 0x00, 0x24,
    0x00, 0x00, 0x50, 0x00, 0x06,
];

/// Poll budget for SMUX completion (1 ms per poll).
const SMUX_POLLS: u32 = 100;
/// Extra polls granted beyond the integration time.
const DATA_POLL_SLACK: u32 = 100;

/// ASTEP for a requested integration time, ATIME fixed.
pub fn astep_for(integration_time_ms: u16) -> u16 {
    let steps_total = u64::from(integration_time_ms) * 1_000_000 / STEP_NS;
    let per_atime = steps_total / (u64::from(ATIME) + 1);
    per_atime.clamp(1, 65_535) as u16 - 1
}

/// LED drive code: 4 mA → 0, 2 mA per step, clamped to 4..=20 mA.
pub fn led_drive_for(current_ma: u8) -> u8 {
    (current_ma.clamp(MIN_LED_CURRENT_MA, MAX_LED_CURRENT_MA) - MIN_LED_CURRENT_MA) / 2
}

// ───────────────────────────────────────────────────────────────
// Driver
// ───────────────────────────────────────────────────────────────

pub struct As7341<I2C, D, L> {
    i2c: I2C,
    delay: D,
    address: u8,
    external_led: Option<L>,
    defaults: SensorSettings,
    settings: SensorSettings,
    initialized: bool,
    led_enabled: bool,
    external_led_enabled: bool,
}

impl<I2C, D, L> As7341<I2C, D, L>
where
    I2C: I2c,
    D: DelayNs,
    L: OutputPin,
{
    pub fn new(i2c: I2C, delay: D, external_led: Option<L>, defaults: SensorSettings) -> Self {
        Self {
            i2c,
            delay,
            address: DEFAULT_ADDR,
            external_led,
            defaults,
            settings: defaults,
            initialized: false,
            led_enabled: false,
            external_led_enabled: false,
        }
    }

    /// Use a non-default 7-bit bus address.
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Hand back the bus, delay and pin.
    pub fn release(self) -> (I2C, D, Option<L>) {
        (self.i2c, self.delay, self.external_led)
    }

    // ── Register access ───────────────────────────────────────

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, &[reg, value])
            .map_err(|_| SensorError::Bus)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, SensorError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(|_| SensorError::Bus)?;
        Ok(buf[0])
    }

    fn modify_reg(&mut self, reg: u8, mask: u8, set: bool) -> Result<(), SensorError> {
        let value = self.read_reg(reg)?;
        let value = if set { value | mask } else { value & !mask };
        self.write_reg(reg, value)
    }

    /// Registers 0x60..=0x74 are only visible with REG_BANK set.
    fn with_high_bank<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, SensorError>,
    ) -> Result<T, SensorError> {
        self.modify_reg(REG_CFG0, CFG0_REG_BANK, true)?;
        let result = f(self);
        let restore = self.modify_reg(REG_CFG0, CFG0_REG_BANK, false);
        let value = result?;
        restore?;
        Ok(value)
    }

    fn probe(&mut self) -> Result<(), SensorError> {
        let id = self.read_reg(REG_WHOAMI).map_err(|_| SensorError::NotConnected)?;
        if id & 0xFC != CHIP_ID << 2 {
            return Err(SensorError::WrongChipId(id));
        }
        Ok(())
    }

    fn ensure_initialized(&mut self) -> Result<(), SensorError> {
        if self.initialized {
            Ok(())
        } else {
            self.begin()
        }
    }

    // ── Measurement ───────────────────────────────────────────

    fn set_spectral_measurement(&mut self, enabled: bool) -> Result<(), SensorError> {
        self.modify_reg(REG_ENABLE, ENABLE_SP_EN, enabled)
    }

    fn load_smux(&mut self, image: &[u8; 20]) -> Result<(), SensorError> {
        self.set_spectral_measurement(false)?;
        self.write_reg(REG_CFG6, CFG6_SMUX_WRITE)?;
        for (reg, &value) in image.iter().enumerate() {
            self.write_reg(reg as u8, value)?;
        }
        self.modify_reg(REG_ENABLE, ENABLE_SMUXEN, true)?;
        for _ in 0..SMUX_POLLS {
            if self.read_reg(REG_ENABLE)? & ENABLE_SMUXEN == 0 {
                return Ok(());
            }
            self.delay.delay_ms(1);
        }
        warn!("AS7341: SMUX load timed out");
        Err(SensorError::Timeout)
    }

    fn wait_for_data(&mut self) -> Result<(), SensorError> {
        let budget = u32::from(self.settings.integration_time_ms) + DATA_POLL_SLACK;
        for _ in 0..budget {
            if self.read_reg(REG_STATUS2)? & STATUS2_AVALID != 0 {
                return Ok(());
            }
            self.delay.delay_ms(1);
        }
        warn!("AS7341: data not ready after {budget} ms");
        Err(SensorError::Timeout)
    }

    /// One SMUX pass: six little-endian 16-bit ADC values.
    fn read_pass(&mut self, image: &[u8; 20]) -> Result<[u16; 6], SensorError> {
        self.load_smux(image)?;
        self.set_spectral_measurement(true)?;
        self.wait_for_data()?;

        let mut raw = [0u8; 12];
        self.i2c
            .write_read(self.address, &[REG_CH0_DATA_L], &mut raw)
            .map_err(|_| SensorError::Bus)?;

        let mut channels = [0u16; 6];
        for (i, pair) in raw.chunks_exact(2).enumerate() {
            channels[i] = u16::from_le_bytes([pair[0], pair[1]]);
        }
        Ok(channels)
    }

    fn apply_led(&mut self) -> Result<(), SensorError> {
        let drive = led_drive_for(self.settings.led_current_ma);
        let enabled = self.led_enabled;
        self.with_high_bank(|s| {
            s.modify_reg(REG_CONFIG, CONFIG_LED_SEL, enabled)?;
            let act = if enabled { LED_ACT } else { 0 };
            s.write_reg(REG_LED, act | drive)
        })
    }
}

impl<I2C, D, L> SpectralSensor for As7341<I2C, D, L>
where
    I2C: I2c,
    D: DelayNs,
    L: OutputPin,
{
    fn begin(&mut self) -> Result<(), SensorError> {
        self.initialized = false;
        self.probe()?;
        self.write_reg(REG_ENABLE, ENABLE_PON)?;

        if let Some(pin) = self.external_led.as_mut() {
            pin.set_low().map_err(|_| SensorError::Bus)?;
        }
        self.external_led_enabled = false;

        self.initialized = true;
        let defaults = self.defaults;
        if let Err(e) = self.configure(defaults) {
            self.initialized = false;
            return Err(e);
        }
        info!("AS7341 initialised");
        Ok(())
    }

    fn configure(&mut self, settings: SensorSettings) -> Result<(), SensorError> {
        self.ensure_initialized()?;

        let gain = settings.gain.min(MAX_GAIN);
        self.write_reg(REG_CFG1, gain)?;

        let astep = astep_for(settings.integration_time_ms).to_le_bytes();
        self.write_reg(REG_ATIME, ATIME)?;
        self.i2c
            .write(self.address, &[REG_ASTEP_L, astep[0], astep[1]])
            .map_err(|_| SensorError::Bus)?;

        self.settings = SensorSettings {
            gain,
            integration_time_ms: settings.integration_time_ms,
            led_current_ma: settings.led_current_ma.min(MAX_LED_CURRENT_MA),
        };
        self.apply_led()?;

        debug!(
            "AS7341 configured: gain={}, integration={} ms, led={} mA",
            gain, settings.integration_time_ms, self.settings.led_current_ma
        );
        Ok(())
    }

    fn read_all_channels(&mut self) -> Result<SpectralReading, SensorError> {
        self.ensure_initialized()?;
        let low = self.read_pass(&SMUX_F1_F4)?;
        let high = self.read_pass(&SMUX_F5_F8)?;
        Ok(SpectralReading {
            f1: low[0],
            f2: low[1],
            f3: low[2],
            f4: low[3],
            f5: high[0],
            f6: high[1],
            f7: high[2],
            f8: high[3],
            clear: high[4],
            nir: high[5],
        })
    }

    fn set_led(&mut self, enabled: bool, current_ma: u8) -> Result<(), SensorError> {
        self.ensure_initialized()?;
        if current_ma > MAX_LED_CURRENT_MA {
            warn!("AS7341: LED current limited to {MAX_LED_CURRENT_MA} mA");
        }
        self.settings.led_current_ma = current_ma.min(MAX_LED_CURRENT_MA);
        self.led_enabled = enabled;
        self.apply_led()
    }

    fn set_external_led(&mut self, enabled: bool) -> Result<(), SensorError> {
        let Some(pin) = self.external_led.as_mut() else {
            return Err(SensorError::ExternalLedUnavailable);
        };
        let result = if enabled { pin.set_high() } else { pin.set_low() };
        result.map_err(|_| SensorError::Bus)?;
        self.external_led_enabled = enabled;
        Ok(())
    }

    fn configuration(&self) -> SensorConfiguration {
        SensorConfiguration {
            gain: self.settings.gain,
            integration_time: self.settings.integration_time_ms,
            led_current: self.settings.led_current_ma,
            led_enabled: self.led_enabled,
            external_led_enabled: self.external_led_enabled,
        }
    }

    fn is_connected(&mut self) -> bool {
        if self.probe().is_err() {
            self.initialized = false;
            return false;
        }
        self.ensure_initialized().is_ok()
    }
}
