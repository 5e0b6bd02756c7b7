//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter  | Implements  | Connects to                     |
//! |----------|-------------|---------------------------------|
//! | `system` | SystemPort  | ESP-IDF chip info, `esp_restart`|
//! | `time`   | (clock)     | ESP32 high-resolution timer     |
//! | `uart`   | Transport   | UART0 host link (target only)   |
//!
//! The AS7341 driver implements `SpectralSensor` directly, and
//! `power::PowerManager` implements `PowerPort`.

pub mod system;
pub mod time;
pub mod uart;
