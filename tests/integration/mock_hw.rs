//! Mock adapters for integration tests.
//!
//! Every collaborator records what was asked of it so tests can assert on
//! the wire traffic and the order of side effects without real hardware.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::Value;
use spectroneph::app::ports::{
    PowerPort, SensorConfiguration, SensorSettings, SpectralReading, SpectralSensor, SystemPort,
};
use spectroneph::app::service::{AppService, Ports, TickSummary};
use spectroneph::config::DeviceConfig;
use spectroneph::diagnostics::SystemInfo;
use spectroneph::error::SensorError;
use spectroneph::rpc::transport::Transport;

/// Shared, ordered record of side effects across mocks.
pub type Journal = Rc<RefCell<Vec<&'static str>>>;

pub fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

// ── ScriptedLink ──────────────────────────────────────────────

/// In-memory transport: tests push inbound bytes and read back the lines
/// the device wrote.
pub struct ScriptedLink {
    inbound: VecDeque<u8>,
    pub out: Vec<u8>,
    journal: Option<Journal>,
    /// Report nothing available even while bytes are queued.
    pub held: bool,
    /// The next read fails.
    pub read_fault: bool,
}

#[allow(dead_code)]
impl ScriptedLink {
    pub fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            out: Vec::new(),
            journal: None,
            held: false,
            read_fault: false,
        }
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal: Some(journal),
            ..Self::new()
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    pub fn push_line(&mut self, line: &str) {
        self.push(line.as_bytes());
        self.push(b"\n");
    }

    /// Drain everything written so far as text lines.
    pub fn take_lines(&mut self) -> Vec<String> {
        let text = String::from_utf8(std::mem::take(&mut self.out)).expect("device wrote UTF-8");
        assert!(
            text.is_empty() || text.ends_with('\n'),
            "partial line on the wire: {text:?}"
        );
        text.lines().map(str::to_owned).collect()
    }

    /// Drain everything written so far as JSON values.
    pub fn take_json(&mut self) -> Vec<Value> {
        self.take_lines()
            .iter()
            .map(|l| serde_json::from_str(l).expect("device wrote valid JSON"))
            .collect()
    }
}

impl Default for ScriptedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ScriptedLink {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        if std::mem::take(&mut self.read_fault) {
            return Err(());
        }
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        self.out.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        if let Some(j) = &self.journal {
            j.borrow_mut().push("flush");
        }
        Ok(())
    }

    fn available(&self) -> bool {
        !self.held && (self.read_fault || !self.inbound.is_empty())
    }
}

// ── MockSensor ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SensorCall {
    Begin,
    Configure(SensorSettings),
    Read,
    SetLed { enabled: bool, current_ma: u8 },
    SetExternalLed(bool),
}

pub struct MockSensor {
    pub connected: bool,
    /// Number of upcoming reads that fail with a bus error.
    pub failing_reads: usize,
    /// Make the connectivity probe panic.
    pub panic_on_probe: bool,
    pub reading: SpectralReading,
    pub config: SensorConfiguration,
    pub calls: Vec<SensorCall>,
}

#[allow(dead_code)]
impl MockSensor {
    pub fn new() -> Self {
        Self {
            connected: true,
            failing_reads: 0,
            panic_on_probe: false,
            reading: SpectralReading {
                f1: 11,
                f2: 22,
                f3: 33,
                f4: 44,
                f5: 55,
                f6: 66,
                f7: 77,
                f8: 88,
                clear: 900,
                nir: 12,
            },
            config: SensorConfiguration::default(),
            calls: Vec::new(),
        }
    }

    pub fn absent() -> Self {
        Self {
            connected: false,
            ..Self::new()
        }
    }

    pub fn reads(&self) -> usize {
        self.calls.iter().filter(|c| **c == SensorCall::Read).count()
    }
}

impl Default for MockSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralSensor for MockSensor {
    fn begin(&mut self) -> Result<(), SensorError> {
        self.calls.push(SensorCall::Begin);
        if self.connected {
            Ok(())
        } else {
            Err(SensorError::NotConnected)
        }
    }

    fn configure(&mut self, settings: SensorSettings) -> Result<(), SensorError> {
        self.calls.push(SensorCall::Configure(settings));
        if !self.connected {
            return Err(SensorError::NotConnected);
        }
        self.config.gain = settings.gain;
        self.config.integration_time = settings.integration_time_ms;
        self.config.led_current = settings.led_current_ma;
        Ok(())
    }

    fn read_all_channels(&mut self) -> Result<SpectralReading, SensorError> {
        self.calls.push(SensorCall::Read);
        if !self.connected {
            return Err(SensorError::NotConnected);
        }
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(SensorError::Bus);
        }
        Ok(self.reading)
    }

    fn set_led(&mut self, enabled: bool, current_ma: u8) -> Result<(), SensorError> {
        self.calls.push(SensorCall::SetLed { enabled, current_ma });
        if !self.connected {
            return Err(SensorError::NotConnected);
        }
        self.config.led_enabled = enabled;
        self.config.led_current = current_ma;
        Ok(())
    }

    fn set_external_led(&mut self, enabled: bool) -> Result<(), SensorError> {
        self.calls.push(SensorCall::SetExternalLed(enabled));
        Err(SensorError::ExternalLedUnavailable)
    }

    fn configuration(&self) -> SensorConfiguration {
        self.config
    }

    fn is_connected(&mut self) -> bool {
        if self.panic_on_probe {
            panic!("bus wedged");
        }
        self.connected
    }
}

// ── MockSystem ────────────────────────────────────────────────

pub struct MockSystem {
    pub restarts: u32,
    journal: Option<Journal>,
}

#[allow(dead_code)]
impl MockSystem {
    pub fn new() -> Self {
        Self {
            restarts: 0,
            journal: None,
        }
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            restarts: 0,
            journal: Some(journal),
        }
    }
}

impl Default for MockSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemPort for MockSystem {
    fn info(&self) -> SystemInfo {
        SystemInfo {
            chip: "mock",
            sdk: "v0-test".into(),
            cpu_freq: 160,
            flash_size: 4096,
            free_heap: 123_456,
        }
    }

    fn restart(&mut self) {
        self.restarts += 1;
        if let Some(j) = &self.journal {
            j.borrow_mut().push("restart");
        }
    }
}

// ── MockPower ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MockPower {
    pub activity: Vec<u64>,
    pub idle_checks: Vec<u64>,
}

impl PowerPort for MockPower {
    fn update_activity(&mut self, now_ms: u64) {
        self.activity.push(now_ms);
    }

    fn check_sleep_conditions(&mut self, now_ms: u64) {
        self.idle_checks.push(now_ms);
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// A service wired to a full set of mocks.
pub struct Rig {
    pub app: AppService,
    pub link: ScriptedLink,
    pub sensor: MockSensor,
    pub system: MockSystem,
    pub power: MockPower,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_app(AppService::new(DeviceConfig::default()).expect("default config is valid"))
    }

    pub fn with_app(app: AppService) -> Self {
        Self {
            app,
            link: ScriptedLink::new(),
            sensor: MockSensor::new(),
            system: MockSystem::new(),
            power: MockPower::default(),
        }
    }

    pub fn journaled(journal: &Journal) -> Self {
        Self {
            link: ScriptedLink::with_journal(Rc::clone(journal)),
            system: MockSystem::with_journal(Rc::clone(journal)),
            ..Self::new()
        }
    }

    pub fn start(&mut self, now_ms: u64) {
        let mut ports = Ports {
            sensor: &mut self.sensor,
            system: &mut self.system,
            power: &mut self.power,
        };
        self.app.start(now_ms, &mut self.link, &mut ports);
    }

    pub fn tick(&mut self, now_ms: u64) -> TickSummary {
        let mut ports = Ports {
            sensor: &mut self.sensor,
            system: &mut self.system,
            power: &mut self.power,
        };
        self.app.tick(now_ms, &mut self.link, &mut ports)
    }

    /// Send one command line, run a tick, and return every line written.
    pub fn send(&mut self, now_ms: u64, line: &str) -> Vec<Value> {
        self.link.push_line(line);
        self.tick(now_ms);
        self.link.take_json()
    }

    /// Like [`send`](Self::send) but expects exactly one reply line.
    pub fn request(&mut self, now_ms: u64, line: &str) -> Value {
        let mut lines = self.send(now_ms, line);
        assert_eq!(lines.len(), 1, "expected one reply, got {lines:?}");
        lines.remove(0)
    }
}
