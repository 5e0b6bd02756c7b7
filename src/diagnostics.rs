//! Runtime diagnostics.
//!
//! System metrics (heap, CPU clock, flash size, SDK version) are collected
//! on demand for the `get_info` and `diagnostics` replies. A custom panic
//! hook logs the panic reason before the default handler aborts and the
//! chip resets.

use serde::Serialize;

/// Snapshot of chip-level facts reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub chip: &'static str,
    pub sdk: String,
    /// CPU clock in MHz.
    pub cpu_freq: u32,
    /// Flash size in KiB.
    pub flash_size: u32,
    pub free_heap: u32,
}

impl SystemInfo {
    #[cfg(target_os = "espidf")]
    pub fn collect() -> Self {
        use esp_idf_svc::sys::*;

        // SAFETY: plain getters with no preconditions; the version string
        // is a static NUL-terminated literal owned by ESP-IDF.
        let free_heap = unsafe { esp_get_free_heap_size() };
        let cpu_freq = unsafe { esp_rom_get_cpu_ticks_per_us() };
        let sdk = unsafe { core::ffi::CStr::from_ptr(esp_get_idf_version()) }
            .to_string_lossy()
            .into_owned();

        let mut flash_bytes: u32 = 0;
        // SAFETY: a null chip pointer selects the default flash chip.
        let ret = unsafe { esp_flash_get_size(core::ptr::null_mut(), &mut flash_bytes) };
        let flash_size = if ret == ESP_OK { flash_bytes / 1024 } else { 0 };

        Self {
            chip: "ESP32",
            sdk,
            cpu_freq,
            flash_size,
            free_heap,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn collect() -> Self {
        // Plausible fixed values so host runs produce the same reply shapes.
        Self {
            chip: "host-sim",
            sdk: "sim".into(),
            cpu_freq: 240,
            flash_size: 4096,
            free_heap: 307_200,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Custom panic handler
// ───────────────────────────────────────────────────────────────

/// Extract a printable reason from a panic payload.
pub fn panic_reason(payload: &(dyn core::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

/// Install a panic hook that logs the reason and location.
///
/// Call once during init, after the logger is up.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = panic_reason(info.payload());
        match info.location() {
            Some(loc) => log::error!("PANIC at {}:{}: {}", loc.file(), loc.line(), reason),
            None => log::error!("PANIC: {}", reason),
        }
    }));
}
