//! Application service: the main-loop body.
//!
//! [`AppService`] owns the framer, the command registry and the stream
//! table. One [`tick`](AppService::tick) drains buffered input, dispatches
//! every complete command in arrival order, then runs one scheduler pass.
//! All I/O flows through the transport and the port traits injected at the
//! call site, so the whole loop is testable with mock adapters.
//!
//! ```text
//!  Transport ──▶ LineFramer ──▶ decode ──▶ Dispatcher ──▶ reply line ──▶ Transport
//!                                             │
//!                                  StreamScheduler.tick ──▶ data lines ──▶ Transport
//! ```

use log::{debug, info, warn};
use serde_json::json;

use crate::config::{DeviceConfig, JSON_BUFFER_SIZE};
use crate::error::{Error, Result, SensorError, TransportError};
use crate::rpc::dispatcher::{Dispatcher, HandlerContext};
use crate::rpc::envelope::{OutOfBand, Params, decode_command, encode_line};
use crate::rpc::framer::LineFramer;
use crate::rpc::stream::{StreamProducer, StreamScheduler};
use crate::rpc::transport::{LineSink, Transport};

use super::commands::{AS7341_STREAM, register_standard_commands};
use super::ports::{PowerPort, SpectralSensor, SystemPort};

/// Bytes pulled from the transport per `read` call.
const READ_CHUNK: usize = 256;

/// Collaborators borrowed for the duration of one call.
pub struct Ports<'a> {
    pub sensor: &'a mut dyn SpectralSensor,
    pub system: &'a mut dyn SystemPort,
    pub power: &'a mut dyn PowerPort,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub bytes_read: usize,
    /// Commands decoded and answered.
    pub commands: usize,
    /// Records dropped because they did not decode.
    pub dropped: usize,
    /// Successful stream fires.
    pub frames: usize,
    /// A `reset` ran and the restart primitive was invoked.
    pub restarted: bool,
    /// Set when draining input stopped on a link error.
    pub link_error: Option<TransportError>,
}

// ───────────────────────────────────────────────────────────────
// Sensor-backed stream producer
// ───────────────────────────────────────────────────────────────

/// Reads the AS7341 and writes one data line per fire.
pub struct SensorStreamProducer<'a> {
    pub sensor: &'a mut dyn SpectralSensor,
    pub sink: &'a mut dyn LineSink,
}

impl StreamProducer for SensorStreamProducer<'_> {
    fn produce(&mut self, stream_type: &str, _params: &Params, now_ms: u64) -> Result<()> {
        if stream_type != AS7341_STREAM {
            return Err(Error::UnknownStreamType);
        }
        if !self.sensor.is_connected() {
            return Err(SensorError::NotConnected.into());
        }
        let reading = self.sensor.read_all_channels()?;
        let data = match serde_json::to_value(reading) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return Err(TransportError::Encode.into()),
        };
        let line = encode_line(&OutOfBand::data(stream_type, now_ms, &data))?;
        self.sink.send_line(&line)?;
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService {
    config: DeviceConfig,
    framer: LineFramer<JSON_BUFFER_SIZE>,
    dispatcher: Dispatcher,
    streams: StreamScheduler,
}

impl AppService {
    /// Validate `config` and build the service with the standard commands.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let mut dispatcher = Dispatcher::new();
        register_standard_commands(&mut dispatcher)?;
        Self::with_dispatcher(config, dispatcher)
    }

    /// Build the service around a caller-populated registry.
    pub fn with_dispatcher(config: DeviceConfig, dispatcher: Dispatcher) -> Result<Self> {
        config.validate()?;
        let streams = StreamScheduler::new(&config);
        Ok(Self {
            config,
            framer: LineFramer::new(),
            dispatcher,
            streams,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn streams(&self) -> &StreamScheduler {
        &self.streams
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring up the sensor and announce `device_ready`.
    pub fn start<T: Transport>(&mut self, now_ms: u64, transport: &mut T, ports: &mut Ports<'_>) {
        if let Err(e) = ports.sensor.begin() {
            warn!("AppService: sensor init failed: {e}");
        }
        let connected = ports.sensor.is_connected();

        let mut data = Params::new();
        data.insert("uptime".into(), json!(now_ms));
        data.insert("sensor_connected".into(), json!(connected));
        match encode_line(&OutOfBand::event("device_ready", now_ms, &data)) {
            Ok(line) => {
                if let Err(e) = transport.send_line(&line) {
                    warn!("AppService: device_ready not sent: {e}");
                }
            }
            Err(e) => warn!("AppService: device_ready not encoded: {e}"),
        }
        ports.power.update_activity(now_ms);
        info!(
            "AppService started: {} v{} (sensor {})",
            self.config.device_name,
            self.config.firmware_version,
            if connected { "connected" } else { "absent" }
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one loop iteration: drain input → dispatch → stream fire.
    pub fn tick<T: Transport>(
        &mut self,
        now_ms: u64,
        transport: &mut T,
        ports: &mut Ports<'_>,
    ) -> TickSummary {
        let mut summary = TickSummary::default();
        let mut chunk = [0u8; READ_CHUNK];

        while summary.bytes_read < self.config.serial_rx_size && transport.available() {
            let want = READ_CHUNK.min(self.config.serial_rx_size - summary.bytes_read);
            let n = match transport.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("AppService: transport read failed: {e:?}");
                    summary.link_error = Some(TransportError::ReadFailed);
                    break;
                }
            };
            summary.bytes_read += n;

            for &byte in &chunk[..n] {
                let Some(record) = self.framer.feed(byte) else {
                    continue;
                };
                self.handle_record(&record, now_ms, transport, ports, &mut summary);
                if summary.restarted {
                    return summary;
                }
            }
        }

        let mut producer = SensorStreamProducer {
            sensor: &mut *ports.sensor,
            sink: transport,
        };
        summary.frames = self.streams.tick(now_ms, &mut producer);

        if summary.commands == 0 {
            ports.power.check_sleep_conditions(now_ms);
        }
        summary
    }

    fn handle_record<T: Transport>(
        &mut self,
        record: &[u8],
        now_ms: u64,
        transport: &mut T,
        ports: &mut Ports<'_>,
        summary: &mut TickSummary,
    ) {
        let command = match decode_command(record) {
            Ok(c) => c,
            Err(e) => {
                debug!("AppService: dropped {}-byte record: {e}", record.len());
                summary.dropped += 1;
                return;
            }
        };
        summary.commands += 1;
        ports.power.update_activity(now_ms);

        let mut ctx = HandlerContext::new(
            now_ms,
            &self.config,
            &mut *ports.sensor,
            &mut *ports.system,
            &mut self.streams,
        );
        let response = self.dispatcher.dispatch(&command, &mut ctx);
        let restart = ctx.restart_requested();

        match encode_line(&response) {
            Ok(line) => {
                if let Err(e) = transport.send_line(&line) {
                    warn!("AppService: reply to '{}' lost: {e}", command.name);
                }
            }
            Err(e) => warn!("AppService: reply to '{}' not encoded: {e}", command.name),
        }

        if restart {
            info!("AppService: restarting on host request");
            ports.system.restart();
            summary.restarted = true;
        }
    }
}
