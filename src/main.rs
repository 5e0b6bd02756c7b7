//! SpectroNeph firmware entry point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  UartTransport   As7341 (I2C)   EspSystem   PowerManager       │
//! │  (Transport)     (Sensor)       (System)    (Power)            │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  LineFramer · Dispatcher · StreamScheduler             │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Context, Result};
use log::{info, warn};

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, Output, PinDriver};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{self, UartDriver};
use esp_idf_hal::units::Hertz;

use spectroneph::adapters::system::EspSystem;
use spectroneph::adapters::time::MonotonicClock;
use spectroneph::adapters::uart::UartTransport;
use spectroneph::app::ports::SensorSettings;
use spectroneph::app::service::{AppService, Ports};
use spectroneph::config::DeviceConfig;
use spectroneph::diagnostics;
use spectroneph::drivers::as7341::As7341;
use spectroneph::drivers::watchdog::Watchdog;
use spectroneph::pins;
use spectroneph::power::PowerManager;

/// Main loop period.
const LOOP_DELAY_MS: u32 = 1;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;
    diagnostics::install_panic_handler();

    let config = DeviceConfig::default();
    config.validate().context("invalid device config")?;

    info!("╔══════════════════════════════════════╗");
    info!("║  {} v{}", config.device_name, config.firmware_version);
    info!("╚══════════════════════════════════════╝");

    let clock = MonotonicClock::new();
    let peripherals = Peripherals::take()?;

    // ── 2. Host link (UART0) ──────────────────────────────────
    let uart_config = uart::config::Config::default()
        .baudrate(Hertz(config.serial_baud_rate))
        .rx_fifo_size(config.serial_rx_size)
        .tx_fifo_size(config.serial_tx_size);
    // SAFETY: the GPIO numbers in `pins` are reserved for these functions.
    let (tx, rx) = unsafe {
        (
            AnyIOPin::new(pins::UART_TX_GPIO),
            AnyIOPin::new(pins::UART_RX_GPIO),
        )
    };
    let uart = UartDriver::new(
        peripherals.uart0,
        tx,
        rx,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )
    .context("UART0 init failed")?;
    let mut transport = UartTransport::new(uart);

    // ── 3. AS7341 on I2C0 ─────────────────────────────────────
    // SAFETY: as above.
    let (sda, scl) = unsafe {
        (
            AnyIOPin::new(pins::I2C_SDA_GPIO),
            AnyIOPin::new(pins::I2C_SCL_GPIO),
        )
    };
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        sda,
        scl,
        &I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ)),
    )
    .context("I2C0 init failed")?;

    let external_led: Option<PinDriver<'static, AnyOutputPin, Output>> =
        match pins::EXTERNAL_LED_GPIO {
            // SAFETY: as above.
            Some(gpio) => Some(PinDriver::output(unsafe { AnyOutputPin::new(gpio) })?),
            None => None,
        };

    let defaults = SensorSettings {
        gain: config.default_gain,
        integration_time_ms: config.default_integration_time_ms,
        led_current_ma: config.default_led_current_ma,
    };
    let mut sensor =
        As7341::new(i2c, FreeRtos, external_led, defaults).with_address(pins::AS7341_I2C_ADDR);

    // ── 4. Service wiring ─────────────────────────────────────
    let mut system = EspSystem::new();
    let mut power = PowerManager::new(&config);
    let watchdog = Watchdog::new(config.watchdog_timeout_ms);
    let mut service = AppService::new(config)?;

    let mut ports = Ports {
        sensor: &mut sensor,
        system: &mut system,
        power: &mut power,
    };
    service.start(clock.uptime_ms(), &mut transport, &mut ports);

    // ── 5. Main loop ──────────────────────────────────────────
    loop {
        watchdog.feed();
        let summary = service.tick(clock.uptime_ms(), &mut transport, &mut ports);
        if summary.dropped > 0 {
            warn!("main: {} malformed line(s) dropped", summary.dropped);
        }
        if let Some(e) = summary.link_error {
            warn!("main: host link: {e}");
        }
        FreeRtos::delay_ms(LOOP_DELAY_MS);
    }
}
