//! Envelope codec: the four JSON message shapes on the wire.
//!
//! ```text
//! host → device   {"cmd":"ping","id":7,"params":{}}
//! device → host   {"resp":"data","id":7,"status":0,"data":{...}}
//! device → host   {"event":true,"type":"device_ready","timestamp":12,"data":{...}}
//! device → host   {"data":true,"type":"as7341","timestamp":12,"data":{...}}
//! ```
//!
//! Stateless. Numbers stay numbers; unknown keys inside `params` are passed
//! through to handlers untouched.

use core::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::TransportError;

/// Schema-less key → value mapping used for `params` and reply `data`.
pub type Params = Map<String, Value>;

// ───────────────────────────────────────────────────────────────
// Status codes
// ───────────────────────────────────────────────────────────────

/// Result status carried by every response (integer on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0,
    InvalidCommand = 1,
    InvalidParams = 2,
    ExecutionError = 3,
    Timeout = 4,
    Busy = 5,
    NotImplemented = 6,
}

impl StatusCode {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, u8> {
        match raw {
            0 => Ok(Self::Success),
            1 => Ok(Self::InvalidCommand),
            2 => Ok(Self::InvalidParams),
            3 => Ok(Self::ExecutionError),
            4 => Ok(Self::Timeout),
            5 => Ok(Self::Busy),
            6 => Ok(Self::NotImplemented),
            other => Err(other),
        }
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

// ───────────────────────────────────────────────────────────────
// Inbound: Command
// ───────────────────────────────────────────────────────────────

/// One decoded host request. Lives for a single dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    /// Caller-chosen correlation id, echoed verbatim.
    pub id: i64,
    pub params: Params,
    /// The whole decoded record, for handlers that want extra top-level keys.
    pub raw: Value,
}

/// Why a record did not become a [`Command`]. Never answered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Not valid JSON.
    Malformed,
    /// Valid JSON, but not an object.
    NotAnObject,
    /// No `cmd` key.
    MissingCmd,
    /// `cmd` present but not a string.
    InvalidCmd,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed JSON"),
            Self::NotAnObject => write!(f, "record is not a JSON object"),
            Self::MissingCmd => write!(f, "missing 'cmd' field"),
            Self::InvalidCmd => write!(f, "'cmd' is not a string"),
        }
    }
}

/// Decode a framed record into a [`Command`].
///
/// A missing or non-numeric `id` decodes as `0` and a fractional one
/// truncates toward zero. A missing or non-object `params` decodes as an
/// empty map.
pub fn decode_command(record: &[u8]) -> Result<Command, ParseError> {
    let raw: Value = serde_json::from_slice(record).map_err(|_| ParseError::Malformed)?;
    let obj = raw.as_object().ok_or(ParseError::NotAnObject)?;

    let name = match obj.get("cmd") {
        Some(Value::String(name)) => name.clone(),
        Some(_) => return Err(ParseError::InvalidCmd),
        None => return Err(ParseError::MissingCmd),
    };
    let id = obj.get("id").map_or(0, id_value);
    let params = match obj.get("params") {
        Some(Value::Object(map)) => map.clone(),
        _ => Params::new(),
    };

    Ok(Command {
        name,
        id,
        params,
        raw,
    })
}

fn id_value(value: &Value) -> i64 {
    if let Some(id) = value.as_i64() {
        return id;
    }
    match value.as_f64() {
        Some(id) if id.is_finite() && id.abs() < i64::MAX as f64 => id as i64,
        _ => 0,
    }
}

// ───────────────────────────────────────────────────────────────
// Outbound: Response
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Accepted by host tooling; every built-in command answers `data` or `error`.
    Ack,
    Data,
    Error,
}

/// Exactly one of these answers every accepted [`Command`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Response {
    #[serde(rename = "resp")]
    pub kind: ResponseKind,
    pub id: i64,
    pub status: StatusCode,
    pub data: Value,
}

impl Response {
    pub fn data(id: i64, data: Params) -> Self {
        Self {
            kind: ResponseKind::Data,
            id,
            status: StatusCode::Success,
            data: Value::Object(data),
        }
    }

    pub fn error(id: i64, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Error,
            id,
            status,
            data: Value::String(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusCode::Success
    }
}

// ───────────────────────────────────────────────────────────────
// Outbound: Event / Data
// ───────────────────────────────────────────────────────────────

/// Leading marker key of an out-of-band message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Event,
    Data,
}

impl Marker {
    const fn key(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Data => "data",
        }
    }
}

/// Unsolicited message not tied to any command id.
///
/// Serialises as `{"<marker>":true,"type":..,"timestamp":..,"data":{..}}`.
/// For [`Marker::Data`] the `data` key therefore appears twice; the payload
/// comes last.
#[derive(Debug, Clone, Copy)]
pub struct OutOfBand<'a> {
    pub marker: Marker,
    pub kind: &'a str,
    pub timestamp_ms: u64,
    pub data: &'a Params,
}

impl<'a> OutOfBand<'a> {
    pub fn event(kind: &'a str, timestamp_ms: u64, data: &'a Params) -> Self {
        Self {
            marker: Marker::Event,
            kind,
            timestamp_ms,
            data,
        }
    }

    pub fn data(kind: &'a str, timestamp_ms: u64, data: &'a Params) -> Self {
        Self {
            marker: Marker::Data,
            kind,
            timestamp_ms,
            data,
        }
    }
}

impl Serialize for OutOfBand<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry(self.marker.key(), &true)?;
        map.serialize_entry("type", self.kind)?;
        map.serialize_entry("timestamp", &self.timestamp_ms)?;
        map.serialize_entry("data", self.data)?;
        map.end()
    }
}

/// Serialise any envelope to a `\n`-terminated line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>, TransportError> {
    let mut line = serde_json::to_vec(message).map_err(|_| TransportError::Encode)?;
    line.push(b'\n');
    Ok(line)
}
