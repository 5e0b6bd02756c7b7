//! Unified error types for the nephelometer firmware.
//!
//! A single `Error` enum that every subsystem converts into, so the start-up
//! path and the main loop handle failures uniformly. Variants are `Copy` so
//! they pass through the dispatcher and stream producers without allocation.
//! Protocol-level outcomes (status codes sent to the host) are not errors of
//! this kind; see [`crate::rpc::envelope::StatusCode`].

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The spectral sensor failed or is absent.
    Sensor(SensorError),
    /// The byte link to the host failed.
    Transport(TransportError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid.
    Config(&'static str),
    /// No producer exists for a stream's type.
    UnknownStreamType,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::UnknownStreamType => write!(f, "unknown stream type"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// No device answered on the bus.
    NotConnected,
    /// The device answered with an unexpected chip id.
    WrongChipId(u8),
    /// An I2C transaction failed.
    Bus,
    /// Data-ready or SMUX completion never arrived within the poll budget.
    Timeout,
    /// No external LED pin is wired on this board.
    ExternalLedUnavailable,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "sensor not connected"),
            Self::WrongChipId(id) => write!(f, "unexpected chip id 0x{id:02x}"),
            Self::Bus => write!(f, "I2C transaction failed"),
            Self::Timeout => write!(f, "measurement timed out"),
            Self::ExternalLedUnavailable => write!(f, "external LED not configured"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The link reported an error while input was being drained.
    ReadFailed,
    WriteFailed,
    /// The link accepted fewer bytes than a full line.
    ShortWrite,
    FlushFailed,
    /// The outgoing line could not be serialised.
    Encode,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "read failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::ShortWrite => write!(f, "short write"),
            Self::FlushFailed => write!(f, "flush failed"),
            Self::Encode => write!(f, "envelope encoding failed"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
