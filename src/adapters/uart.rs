//! UART0 serial transport.
//!
//! Wraps the ESP-IDF UART driver behind [`Transport`]. Reads never block:
//! the service polls once per loop iteration and an empty FIFO reads as 0.
//! Writes block until the bytes are queued in the driver's TX ring buffer.

#[cfg(target_os = "espidf")]
use esp_idf_hal::{delay::TickType, sys::EspError, uart::UartDriver};

#[cfg(target_os = "espidf")]
use crate::rpc::transport::Transport;

/// Upper bound on waiting for the TX FIFO to drain.
#[cfg(target_os = "espidf")]
const FLUSH_TIMEOUT_MS: u64 = 100;

#[cfg(target_os = "espidf")]
pub struct UartTransport {
    uart: UartDriver<'static>,
}

#[cfg(target_os = "espidf")]
impl UartTransport {
    pub fn new(uart: UartDriver<'static>) -> Self {
        Self { uart }
    }
}

#[cfg(target_os = "espidf")]
impl Transport for UartTransport {
    type Error = EspError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EspError> {
        self.uart.read(buf, 0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, EspError> {
        self.uart.write(data)
    }

    fn flush(&mut self) -> Result<(), EspError> {
        self.uart
            .wait_tx_done(TickType::new_millis(FLUSH_TIMEOUT_MS).ticks())
    }

    fn available(&self) -> bool {
        self.uart.remaining_read().is_ok_and(|n| n > 0)
    }
}
