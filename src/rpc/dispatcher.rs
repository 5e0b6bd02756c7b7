//! Command dispatcher: name → handler registry with fault containment.
//!
//! ```text
//!   Command ──▶ lookup(name) ──▶ handler(ctx, params, &mut data, raw)
//!                   │                        │
//!                   ▼                        ▼
//!        ERROR/INVALID_COMMAND     Ok  → DATA/SUCCESS {data}
//!                                  Err → ERROR/<status> "message"
//!                                  panic → ERROR/EXECUTION_ERROR
//! ```
//!
//! The registry is filled once at start-up and never mutated while traffic
//! is being processed. Every dispatch yields exactly one [`Response`].

use core::fmt;
use std::panic::{self, AssertUnwindSafe};

use heapless::FnvIndexMap;
use log::{debug, error, warn};
use serde_json::Value;

use crate::app::ports::{SpectralSensor, SystemPort};
use crate::config::{DeviceConfig, MAX_COMMANDS};
use crate::diagnostics::panic_reason;
use crate::error::{Error, Result};
use crate::rpc::envelope::{Command, Params, Response, StatusCode};
use crate::rpc::stream::StreamScheduler;

// ───────────────────────────────────────────────────────────────
// Handler contract
// ───────────────────────────────────────────────────────────────

/// A handler's failure: the status to report and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub status: StatusCode,
    pub message: String,
}

impl HandlerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidParams, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(StatusCode::ExecutionError, message)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {})", self.message, self.status.code())
    }
}

pub type HandlerResult = core::result::Result<(), HandlerError>;

/// Everything a handler may touch besides its params and reply data.
pub struct HandlerContext<'a> {
    pub now_ms: u64,
    pub config: &'a DeviceConfig,
    pub sensor: &'a mut dyn SpectralSensor,
    pub system: &'a mut dyn SystemPort,
    pub streams: &'a mut StreamScheduler,
    restart_requested: bool,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        now_ms: u64,
        config: &'a DeviceConfig,
        sensor: &'a mut dyn SpectralSensor,
        system: &'a mut dyn SystemPort,
        streams: &'a mut StreamScheduler,
    ) -> Self {
        Self {
            now_ms,
            config,
            sensor,
            system,
            streams,
            restart_requested: false,
        }
    }

    /// Ask the main loop to restart once the current reply is flushed.
    pub fn request_restart(&mut self) {
        self.restart_requested = true;
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }
}

/// `(ctx, params, out data, raw command)`.
pub type Handler =
    Box<dyn Fn(&mut HandlerContext<'_>, &Params, &mut Params, &Value) -> HandlerResult>;

// ───────────────────────────────────────────────────────────────
// Dispatcher
// ───────────────────────────────────────────────────────────────

pub struct Dispatcher {
    handlers: FnvIndexMap<&'static str, Handler, MAX_COMMANDS>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: FnvIndexMap::new(),
        }
    }

    /// Bind `handler` to `name`, replacing any previous binding.
    pub fn register(&mut self, name: &'static str, handler: Handler) -> Result<()> {
        match self.handlers.insert(name, handler) {
            Ok(Some(_)) => {
                debug!("dispatcher: replaced handler '{name}'");
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(_) => Err(Error::Init("command registry full")),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Route `command` to its handler and wrap the outcome.
    pub fn dispatch(&self, command: &Command, ctx: &mut HandlerContext<'_>) -> Response {
        let Some(handler) = self.handlers.get(command.name.as_str()) else {
            warn!("dispatcher: unknown command '{}'", command.name);
            return Response::error(
                command.id,
                StatusCode::InvalidCommand,
                format!("Unknown command: {}", command.name),
            );
        };

        let mut data = Params::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler(ctx, &command.params, &mut data, &command.raw)
        }));

        match outcome {
            Ok(Ok(())) => Response::data(command.id, data),
            Ok(Err(e)) => {
                warn!("dispatcher: '{}' failed: {e}", command.name);
                Response::error(command.id, e.status, e.message)
            }
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                error!("dispatcher: '{}' panicked: {reason}", command.name);
                Response::error(
                    command.id,
                    StatusCode::ExecutionError,
                    format!("Execution error: {reason}"),
                )
            }
        }
    }
}
