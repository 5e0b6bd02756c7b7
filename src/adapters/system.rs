//! System adapter: chip facts and the restart primitive.
//!
//! On target `restart` never returns. The host build records the request
//! so the service loop can be exercised end to end.

use log::warn;

use crate::app::ports::SystemPort;
use crate::diagnostics::SystemInfo;

#[derive(Debug, Default)]
pub struct EspSystem {
    #[cfg(not(target_os = "espidf"))]
    restarts: u32,
}

impl EspSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart requests seen by the simulation.
    #[cfg(not(target_os = "espidf"))]
    pub fn restarts(&self) -> u32 {
        self.restarts
    }
}

impl SystemPort for EspSystem {
    fn info(&self) -> SystemInfo {
        SystemInfo::collect()
    }

    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        warn!("system: restarting");
        esp_idf_hal::reset::restart();
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        warn!("system: restart requested (sim)");
        self.restarts += 1;
    }
}
