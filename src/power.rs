//! Idle power management.
//!
//! Tracks the time of the last host command. When power saving is enabled
//! and the link has been idle for longer than `sleep_after_idle_ms`, the
//! chip enters light sleep with a timer wake-up, then counts the wake as
//! fresh activity so it does not immediately sleep again.

use log::{debug, info};

use crate::app::ports::PowerPort;
use crate::config::DeviceConfig;

/// Timer wake-up period for each light-sleep episode.
pub const LIGHT_SLEEP_MS: u64 = 5_000;

pub struct PowerManager {
    enabled: bool,
    sleep_after_idle_ms: u64,
    last_activity_ms: u64,
    sleep_count: u32,
}

impl PowerManager {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            enabled: config.enable_power_saving,
            sleep_after_idle_ms: config.sleep_after_idle_ms,
            last_activity_ms: 0,
            sleep_count: 0,
        }
    }

    pub fn sleep_count(&self) -> u32 {
        self.sleep_count
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms
    }

    fn enter_light_sleep(&mut self, duration_ms: u64) {
        info!("Power: idle, entering light sleep for {duration_ms} ms");

        #[cfg(target_os = "espidf")]
        {
            // SAFETY: plain ESP-IDF sleep calls from the main task.
            unsafe {
                esp_idf_sys::esp_sleep_enable_timer_wakeup(duration_ms * 1_000);
                esp_idf_sys::esp_light_sleep_start();
            }
        }

        self.sleep_count += 1;
    }
}

impl PowerPort for PowerManager {
    fn update_activity(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
    }

    fn check_sleep_conditions(&mut self, now_ms: u64) {
        if !self.enabled {
            return;
        }
        let idle = now_ms.saturating_sub(self.last_activity_ms);
        if idle > self.sleep_after_idle_ms {
            self.enter_light_sleep(LIGHT_SLEEP_MS);
            // Waking counts as activity.
            self.update_activity(now_ms + LIGHT_SLEEP_MS);
            debug!("Power: awake after {} sleep(s)", self.sleep_count);
        }
    }
}
