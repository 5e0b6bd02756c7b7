//! Cooperative multi-stream scheduler.
//!
//! Holds the set of named periodic producers and fires the due ones on each
//! tick. The scheduler knows nothing about sensors or transports: when a
//! stream is due it calls a [`StreamProducer`], and the caller decides what
//! a fire means (normally: read the sensor, write one data line).
//!
//! ```text
//!   stream_start ──▶ ┌────────────────────────┐
//!   stream_stop  ──▶ │ StreamScheduler        │   tick(now)
//!   reset        ──▶ │  [as7341 | 100ms | t0] │ ───────────▶ StreamProducer
//!                    │  [other  | 500ms | t1] │               produce(type, params, now)
//!                    └────────────────────────┘
//! ```
//!
//! Entries are kept sorted by type key, so due streams fire in key order
//! regardless of when they were started.

use heapless::{String as KeyString, Vec};
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{DeviceConfig, MAX_STREAM_SLOTS, MAX_STREAM_TYPE_LEN};
use crate::error::Error;
use crate::rpc::envelope::Params;

/// Stream type key.
pub type StreamKey = KeyString<MAX_STREAM_TYPE_LEN>;

/// Callback the scheduler invokes when a stream is due.
pub trait StreamProducer {
    /// Produce one frame for `stream_type`.
    ///
    /// `Err` means nothing was sent; the stream stays due and is retried on
    /// the next tick.
    fn produce(&mut self, stream_type: &str, params: &Params, now_ms: u64) -> Result<(), Error>;
}

/// Introspection view of one active stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    #[serde(rename = "type")]
    pub stream_type: String,
    pub interval_ms: u32,
}

#[derive(Debug, Clone)]
struct StreamEntry {
    key: StreamKey,
    params: Params,
    interval_ms: u32,
    /// `None` until the first successful fire; forces an immediate fire.
    last_fire_ms: Option<u64>,
}

impl StreamEntry {
    fn is_due(&self, now_ms: u64) -> bool {
        match self.last_fire_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= u64::from(self.interval_ms),
        }
    }
}

/// The stream table plus its limits.
pub struct StreamScheduler {
    entries: Vec<StreamEntry, MAX_STREAM_SLOTS>,
    capacity: usize,
    min_interval_ms: u32,
    max_interval_ms: u32,
}

impl StreamScheduler {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            entries: Vec::new(),
            capacity: config.max_data_streams.min(MAX_STREAM_SLOTS),
            min_interval_ms: config.min_stream_interval_ms,
            max_interval_ms: config.max_stream_interval_ms,
        }
    }

    /// The interval that `start` would store for `interval_ms`.
    pub fn clamp_interval(&self, interval_ms: u32) -> u32 {
        interval_ms.clamp(self.min_interval_ms, self.max_interval_ms)
    }

    fn position(&self, stream_type: &str) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|e| e.key.as_str().cmp(stream_type))
    }

    /// Start (or restart) a stream.
    ///
    /// Re-starting an existing type replaces its interval and params in
    /// place and does not count against the cap. A new type is rejected
    /// when the cap is reached or the key is too long.
    pub fn start(&mut self, stream_type: &str, params: Params, interval_ms: u32) -> bool {
        let interval_ms = self.clamp_interval(interval_ms);

        match self.position(stream_type) {
            Ok(idx) => {
                let entry = &mut self.entries[idx];
                entry.params = params;
                entry.interval_ms = interval_ms;
                entry.last_fire_ms = None;
                info!("stream: '{stream_type}' restarted at {interval_ms} ms");
                true
            }
            Err(idx) => {
                if self.entries.len() >= self.capacity {
                    warn!(
                        "stream: '{stream_type}' rejected, {} of {} slots in use",
                        self.entries.len(),
                        self.capacity
                    );
                    return false;
                }
                let Ok(key) = StreamKey::try_from(stream_type) else {
                    warn!("stream: type key longer than {MAX_STREAM_TYPE_LEN} bytes");
                    return false;
                };
                let entry = StreamEntry {
                    key,
                    params,
                    interval_ms,
                    last_fire_ms: None,
                };
                if self.entries.insert(idx, entry).is_err() {
                    return false;
                }
                info!("stream: '{stream_type}' started at {interval_ms} ms");
                true
            }
        }
    }

    /// Remove a stream. Returns whether it existed.
    pub fn stop(&mut self, stream_type: &str) -> bool {
        match self.position(stream_type) {
            Ok(idx) => {
                self.entries.remove(idx);
                info!("stream: '{stream_type}' stopped");
                true
            }
            Err(_) => false,
        }
    }

    pub fn stop_all(&mut self) {
        if !self.entries.is_empty() {
            info!("stream: stopping all {} streams", self.entries.len());
        }
        self.entries.clear();
    }

    /// Fire every due stream, in key order. Returns the number of
    /// successful fires.
    pub fn tick(&mut self, now_ms: u64, producer: &mut dyn StreamProducer) -> usize {
        let mut fired = 0;
        for entry in self.entries.iter_mut() {
            if !entry.is_due(now_ms) {
                continue;
            }
            match producer.produce(&entry.key, &entry.params, now_ms) {
                Ok(()) => {
                    entry.last_fire_ms = Some(now_ms);
                    fired += 1;
                }
                Err(e) => {
                    warn!("stream: '{}' fire failed: {e}", entry.key);
                }
            }
        }
        if fired > 0 {
            debug!("stream: {fired} frame(s) at {now_ms} ms");
        }
        fired
    }

    /// Active streams in key order.
    pub fn snapshot(&self) -> std::vec::Vec<StreamInfo> {
        self.entries
            .iter()
            .map(|e| StreamInfo {
                stream_type: e.key.as_str().into(),
                interval_ms: e.interval_ms,
            })
            .collect()
    }

    pub fn is_active(&self, stream_type: &str) -> bool {
        self.position(stream_type).is_ok()
    }

    pub fn interval_of(&self, stream_type: &str) -> Option<u32> {
        self.position(stream_type)
            .ok()
            .map(|idx| self.entries[idx].interval_ms)
    }

    /// Time of the last successful fire, `None` if absent or never fired.
    pub fn last_fire_ms(&self, stream_type: &str) -> Option<u64> {
        self.position(stream_type)
            .ok()
            .and_then(|idx| self.entries[idx].last_fire_ms)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
