//! The standard command set.
//!
//! Each handler reads `params`, calls into the collaborators exposed by
//! [`HandlerContext`], and writes its result into `out`. Handlers never
//! touch the transport; `reset` only asks the main loop to restart once its
//! reply has been flushed.
//!
//! Structurally missing arguments are rejected with `INVALID_PARAMS`.
//! Out-of-range sensor settings are replaced and flagged with a `warning`
//! field instead.

use log::{info, warn};
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::{DeviceConfig, MAX_GAIN, MAX_INTEGRATION_TIME_MS, MIN_INTEGRATION_TIME_MS};
use crate::error::Result;
use crate::rpc::dispatcher::{Dispatcher, HandlerContext, HandlerError, HandlerResult};
use crate::rpc::envelope::Params;

use super::ports::SensorSettings;

pub const PING: &str = "ping";
pub const GET_INFO: &str = "get_info";
pub const AS7341_INIT: &str = "as7341_init";
pub const AS7341_CONFIG: &str = "as7341_config";
pub const AS7341_READ: &str = "as7341_read";
pub const AS7341_LED: &str = "as7341_led";
pub const STREAM_START: &str = "stream_start";
pub const STREAM_STOP: &str = "stream_stop";
pub const GET_STREAMS: &str = "get_streams";
pub const RESET: &str = "reset";
pub const DIAGNOSTICS: &str = "diagnostics";

/// Stream type served by the AS7341 producer.
pub const AS7341_STREAM: &str = "as7341";

const CONFIG_WARNING: &str = "Some configuration parameters were invalid";

/// Register every standard command on `dispatcher`.
pub fn register_standard_commands(dispatcher: &mut Dispatcher) -> Result<()> {
    dispatcher.register(PING, Box::new(handle_ping))?;
    dispatcher.register(GET_INFO, Box::new(handle_get_info))?;
    dispatcher.register(AS7341_INIT, Box::new(handle_as7341_init))?;
    dispatcher.register(AS7341_CONFIG, Box::new(handle_as7341_config))?;
    dispatcher.register(AS7341_READ, Box::new(handle_as7341_read))?;
    dispatcher.register(AS7341_LED, Box::new(handle_as7341_led))?;
    dispatcher.register(STREAM_START, Box::new(handle_stream_start))?;
    dispatcher.register(STREAM_STOP, Box::new(handle_stream_stop))?;
    dispatcher.register(GET_STREAMS, Box::new(handle_get_streams))?;
    dispatcher.register(RESET, Box::new(handle_reset))?;
    dispatcher.register(DIAGNOSTICS, Box::new(handle_diagnostics))?;
    info!("commands: {} handlers registered", dispatcher.len());
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

fn to_json<T: Serialize>(value: &T) -> core::result::Result<Value, HandlerError> {
    serde_json::to_value(value).map_err(|e| HandlerError::execution(format!("Encoding failed: {e}")))
}

/// Merge a serialisable struct's fields into `out`.
fn merge_into<T: Serialize>(out: &mut Params, value: &T) -> HandlerResult {
    if let Value::Object(map) = to_json(value)? {
        out.extend(map);
    }
    Ok(())
}

/// `Some(n)` when `key` holds a non-negative integer, `None` when absent.
/// Present but unusable values come back as `Some(Err(()))`.
fn uint_param(params: &Params, key: &str) -> Option<core::result::Result<u64, ()>> {
    params.get(key).map(|v| v.as_u64().ok_or(()))
}

/// Coerce a present `interval_ms` to a millisecond count for clamping.
///
/// Negatives and non-numbers become 0, fractions truncate and anything past
/// `u32::MAX` saturates.
fn interval_param(value: &Value) -> u32 {
    if let Some(ms) = value.as_u64() {
        return u32::try_from(ms).unwrap_or(u32::MAX);
    }
    match value.as_f64() {
        Some(ms) if ms > 0.0 => ms as u32,
        _ => 0,
    }
}

fn bool_param(params: &Params, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn required_str<'p>(params: &'p Params, key: &str) -> core::result::Result<&'p str, HandlerError> {
    match params.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(HandlerError::invalid_params(format!("'{key}' must be a string"))),
        None => Err(HandlerError::invalid_params("Missing stream type")),
    }
}

// ───────────────────────────────────────────────────────────────
// Liveness / identity
// ───────────────────────────────────────────────────────────────

fn handle_ping(ctx: &mut HandlerContext<'_>, _: &Params, out: &mut Params, _: &Value) -> HandlerResult {
    out.insert("pong".into(), Value::Bool(true));
    out.insert("time".into(), json!(ctx.now_ms));
    Ok(())
}

fn handle_get_info(
    ctx: &mut HandlerContext<'_>,
    _: &Params,
    out: &mut Params,
    _: &Value,
) -> HandlerResult {
    out.insert("name".into(), json!(ctx.config.device_name));
    out.insert("version".into(), json!(ctx.config.firmware_version));
    out.insert("uptime".into(), json!(ctx.now_ms));
    out.insert("hardware".into(), to_json(&ctx.system.info())?);

    let connected = ctx.sensor.is_connected();
    let mut sensor = Params::new();
    sensor.insert("type".into(), json!("AS7341"));
    sensor.insert("connected".into(), Value::Bool(connected));
    if connected {
        sensor.insert("config".into(), to_json(&ctx.sensor.configuration())?);
    }
    out.insert("sensor".into(), Value::Object(sensor));
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Sensor
// ───────────────────────────────────────────────────────────────

fn handle_as7341_init(
    ctx: &mut HandlerContext<'_>,
    _: &Params,
    out: &mut Params,
    _: &Value,
) -> HandlerResult {
    let result = ctx.sensor.begin();
    if let Err(e) = result {
        warn!("as7341_init: {e}");
        out.insert("error".into(), json!("Failed to initialize AS7341"));
    }
    out.insert("initialized".into(), Value::Bool(result.is_ok()));
    Ok(())
}

/// Validate the requested settings, replacing bad values.
///
/// Returns the settings to apply and whether anything was replaced.
fn sanitize_settings(cfg: &DeviceConfig, params: &Params) -> (SensorSettings, bool) {
    let mut replaced = false;

    let gain = match uint_param(params, "gain") {
        None => cfg.default_gain,
        Some(Ok(g)) if g <= u64::from(MAX_GAIN) => g as u8,
        Some(_) => {
            warn!("as7341_config: invalid gain, using default {}", cfg.default_gain);
            replaced = true;
            cfg.default_gain
        }
    };

    let range = u64::from(MIN_INTEGRATION_TIME_MS)..=u64::from(MAX_INTEGRATION_TIME_MS);
    let integration_time_ms = match uint_param(params, "integration_time") {
        None => cfg.default_integration_time_ms,
        Some(Ok(t)) if range.contains(&t) => t as u16,
        Some(_) => {
            warn!(
                "as7341_config: integration time out of range, using default {} ms",
                cfg.default_integration_time_ms
            );
            replaced = true;
            cfg.default_integration_time_ms
        }
    };

    let led_current_ma = match uint_param(params, "led_current") {
        None => cfg.default_led_current_ma,
        Some(Ok(c)) if c <= u64::from(cfg.max_led_current_ma) => c as u8,
        Some(_) => {
            warn!("as7341_config: LED current limited to {} mA", cfg.max_led_current_ma);
            replaced = true;
            cfg.max_led_current_ma
        }
    };

    (
        SensorSettings {
            gain,
            integration_time_ms,
            led_current_ma,
        },
        replaced,
    )
}

fn handle_as7341_config(
    ctx: &mut HandlerContext<'_>,
    params: &Params,
    out: &mut Params,
    _: &Value,
) -> HandlerResult {
    let (settings, replaced) = sanitize_settings(ctx.config, params);

    ctx.sensor
        .configure(settings)
        .map_err(|e| HandlerError::execution(format!("Failed to configure AS7341: {e}")))?;

    if replaced {
        out.insert("warning".into(), json!(CONFIG_WARNING));
    }
    merge_into(out, &ctx.sensor.configuration())
}

fn handle_as7341_read(
    ctx: &mut HandlerContext<'_>,
    _: &Params,
    out: &mut Params,
    _: &Value,
) -> HandlerResult {
    let reading = ctx.sensor.read_all_channels().map_err(|e| {
        warn!("as7341_read: {e}");
        HandlerError::execution("Failed to read spectral data")
    })?;
    merge_into(out, &reading)
}

fn handle_as7341_led(
    ctx: &mut HandlerContext<'_>,
    params: &Params,
    out: &mut Params,
    _: &Value,
) -> HandlerResult {
    let enabled = bool_param(params, "enabled");
    let external = bool_param(params, "external");

    let result = if external {
        ctx.sensor.set_external_led(enabled)
    } else {
        let requested = match uint_param(params, "current") {
            Some(Ok(c)) => c.min(u64::from(ctx.config.max_led_current_ma)) as u8,
            _ => ctx.config.default_led_current_ma,
        };
        out.insert("current".into(), json!(requested));
        ctx.sensor.set_led(enabled, requested)
    };

    result.map_err(|e| {
        warn!("as7341_led: {e}");
        HandlerError::execution("Failed to control LED")
    })?;

    out.insert(
        "type".into(),
        json!(if external { "external" } else { "onboard" }),
    );
    out.insert("enabled".into(), Value::Bool(enabled));
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Streams
// ───────────────────────────────────────────────────────────────

fn handle_stream_start(
    ctx: &mut HandlerContext<'_>,
    params: &Params,
    out: &mut Params,
    _: &Value,
) -> HandlerResult {
    let stream_type = required_str(params, "type")?;
    let requested = match params.get("interval_ms") {
        Some(v) => interval_param(v),
        None => ctx.config.default_stream_interval_ms,
    };
    let stream_params = match params.get("params") {
        Some(Value::Object(map)) => map.clone(),
        _ => Params::new(),
    };

    let interval_ms = ctx.streams.clamp_interval(requested);
    let accepted = ctx.streams.start(stream_type, stream_params, requested);
    if !accepted {
        out.insert("error".into(), json!("Failed to start stream"));
    }
    out.insert("type".into(), json!(stream_type));
    out.insert("interval_ms".into(), json!(interval_ms));
    out.insert("active".into(), Value::Bool(accepted));
    Ok(())
}

fn handle_stream_stop(
    ctx: &mut HandlerContext<'_>,
    params: &Params,
    out: &mut Params,
    _: &Value,
) -> HandlerResult {
    let stream_type = required_str(params, "type")?;
    let was_active = ctx.streams.stop(stream_type);
    out.insert("type".into(), json!(stream_type));
    out.insert("was_active".into(), Value::Bool(was_active));
    Ok(())
}

fn handle_get_streams(
    ctx: &mut HandlerContext<'_>,
    _: &Params,
    out: &mut Params,
    _: &Value,
) -> HandlerResult {
    let streams = ctx.streams.snapshot();
    out.insert("count".into(), json!(streams.len()));
    out.insert("streams".into(), to_json(&streams)?);
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Device
// ───────────────────────────────────────────────────────────────

fn handle_reset(ctx: &mut HandlerContext<'_>, _: &Params, out: &mut Params, _: &Value) -> HandlerResult {
    ctx.streams.stop_all();

    // LEDs off is best effort; a missing sensor must not block the reset.
    if let Err(e) = ctx.sensor.set_led(false, 0) {
        warn!("reset: onboard LED off failed: {e}");
    }
    if let Err(e) = ctx.sensor.set_external_led(false) {
        warn!("reset: external LED off failed: {e}");
    }

    out.insert("reset".into(), Value::Bool(true));
    out.insert("message".into(), json!("Device will reset in 1 second"));
    ctx.request_restart();
    Ok(())
}

fn handle_diagnostics(
    ctx: &mut HandlerContext<'_>,
    _: &Params,
    out: &mut Params,
    _: &Value,
) -> HandlerResult {
    out.insert("status".into(), json!("running"));
    out.insert("timestamp".into(), json!(ctx.now_ms));

    let info = ctx.system.info();
    out.insert(
        "system".into(),
        json!({
            "free_heap": info.free_heap,
            "CPU_freq": info.cpu_freq,
            "flash_size": info.flash_size,
            "uptime_ms": ctx.now_ms,
            "status": "pass",
        }),
    );

    // A faulting sensor check degrades to "error" instead of failing the call.
    let sensor = &mut *ctx.sensor;
    let probe = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sensor.is_connected()));
    let sensor_report = match probe {
        Ok(true) => json!({"connected": true, "status": "pass"}),
        Ok(false) => json!({"connected": false, "status": "fail"}),
        Err(_) => json!({"status": "error", "error": "Exception during sensor test"}),
    };
    // An absent sensor is a valid configuration; only a faulting probe fails.
    let sensor_ok = sensor_report["status"] != "error";
    out.insert("sensor".into(), sensor_report);

    out.insert(
        "communication".into(),
        json!({"serial": "pass", "status": "pass"}),
    );
    out.insert(
        "result".into(),
        json!(if sensor_ok { "pass" } else { "fail" }),
    );
    Ok(())
}
