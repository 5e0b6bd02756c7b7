//! GPIO / peripheral pin assignments for the nephelometer board.
//!
//! Single source of truth: `main.rs` references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// I²C bus (AS7341 spectral sensor)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 4;
pub const I2C_SCL_GPIO: i32 = 5;
/// Standard-mode is enough for one 12-byte burst per readout.
pub const I2C_FREQ_HZ: u32 = 100_000;
/// 7-bit AS7341 address.
pub const AS7341_I2C_ADDR: u8 = 0x39;

// ---------------------------------------------------------------------------
// Host link (UART0, routed to the USB bridge)
// ---------------------------------------------------------------------------

pub const UART_TX_GPIO: i32 = 1;
pub const UART_RX_GPIO: i32 = 3;

// ---------------------------------------------------------------------------
// Optional external illumination LED
// ---------------------------------------------------------------------------

/// GPIO driving an external LED, `None` when the board has none fitted.
pub const EXTERNAL_LED_GPIO: Option<i32> = None;
