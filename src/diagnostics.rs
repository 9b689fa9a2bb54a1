//! Crash logging and health reporting.
//!
//! Crashes persist as a four-slot ring in the NVS "crash" namespace, one
//! postcard blob per slot plus a write index.  A panic hook writes the
//! entry before the reset; the next boot reads the ring back and logs
//! what it finds, which is usually the only forensic record a deployed
//! node leaves behind.
//!
//! [`RuntimeMetrics`] is the one-line health snapshot the link task logs
//! once a minute: uptime, heap headroom and NVS free entries.

use serde::{Deserialize, Serialize};

use crate::app::ports::StoragePort;

const CRASH_NAMESPACE: &str = "crash";
const CRASH_INDEX_KEY: &str = "next";
const CRASH_RING_SLOTS: usize = 4;

/// Largest encoded [`CrashEntry`]; slots are read into a buffer this big.
const CRASH_SLOT_BYTES: usize = 128;

/// One persisted crash record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashEntry {
    /// Seconds since boot when the panic fired.
    pub uptime_secs: u64,
    /// Panic message, truncated to fit the slot.
    pub reason: heapless::String<96>,
}

impl CrashEntry {
    /// Builds an entry, keeping as much of `reason` as fits.  Truncation
    /// is per character, so multi-byte text never splits a boundary.
    pub fn new(uptime_secs: u64, reason: &str) -> Self {
        let mut truncated = heapless::String::new();
        for ch in reason.chars() {
            if truncated.push(ch).is_err() {
                break;
            }
        }
        Self {
            uptime_secs,
            reason: truncated,
        }
    }
}

/// Four-slot crash ring over the [`StoragePort`].
///
/// The write index persists alongside the slots, so the oldest entry is
/// overwritten first even across reboots.
#[derive(Debug, Default)]
pub struct CrashLog {
    write_index: usize,
}

impl CrashLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick up the persisted write index; a missing or short key means a
    /// fresh ring.
    pub fn init(&mut self, storage: &dyn StoragePort) {
        let mut buf = [0u8; 4];
        if let Ok(4) = storage.read(CRASH_NAMESPACE, CRASH_INDEX_KEY, &mut buf) {
            self.write_index = u32::from_le_bytes(buf) as usize % CRASH_RING_SLOTS;
        }
    }

    /// Persist `entry` into the next slot and advance the index.
    ///
    /// Runs in panic context: every storage failure is swallowed, because
    /// there is nothing left to do about it.
    pub fn record(&mut self, storage: &mut dyn StoragePort, entry: &CrashEntry) {
        if let Ok(bytes) = postcard::to_allocvec(entry) {
            let _ = storage.write(CRASH_NAMESPACE, &Self::slot_key(self.write_index), &bytes);
        }

        self.write_index = (self.write_index + 1) % CRASH_RING_SLOTS;
        let index_bytes = (self.write_index as u32).to_le_bytes();
        let _ = storage.write(CRASH_NAMESPACE, CRASH_INDEX_KEY, &index_bytes);
    }

    /// All decodable entries, in slot order.
    pub fn entries(&self, storage: &dyn StoragePort) -> heapless::Vec<CrashEntry, CRASH_RING_SLOTS> {
        let mut entries = heapless::Vec::new();
        for slot in 0..CRASH_RING_SLOTS {
            let mut buf = [0u8; CRASH_SLOT_BYTES];
            if let Ok(len) = storage.read(CRASH_NAMESPACE, &Self::slot_key(slot), &mut buf) {
                if let Ok(entry) = postcard::from_bytes::<CrashEntry>(&buf[..len]) {
                    let _ = entries.push(entry);
                }
            }
        }
        entries
    }

    /// Number of occupied slots.
    pub fn count(&self, storage: &dyn StoragePort) -> usize {
        (0..CRASH_RING_SLOTS)
            .filter(|slot| storage.exists(CRASH_NAMESPACE, &Self::slot_key(*slot)))
            .count()
    }

    /// Erase every slot and the index.
    pub fn clear(&mut self, storage: &mut dyn StoragePort) {
        for slot in 0..CRASH_RING_SLOTS {
            let _ = storage.delete(CRASH_NAMESPACE, &Self::slot_key(slot));
        }
        let _ = storage.delete(CRASH_NAMESPACE, CRASH_INDEX_KEY);
        self.write_index = 0;
    }

    fn slot_key(slot: usize) -> heapless::String<16> {
        let mut key = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut key, format_args!("slot{}", slot));
        key
    }
}

// ───────────────────────────────────────────────────────────────
// Health snapshot
// ───────────────────────────────────────────────────────────────

/// Point-in-time health numbers for the periodic log line.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeMetrics {
    pub uptime_secs: u64,
    pub heap_free: u32,
    pub heap_min_free: u32,
    pub nvs_free_entries: u32,
}

impl RuntimeMetrics {
    #[cfg(target_os = "espidf")]
    pub fn collect(uptime_secs: u64) -> Self {
        use esp_idf_svc::sys::*;

        // SAFETY: heap accounting reads with no preconditions.
        let heap_free = unsafe { esp_get_free_heap_size() };
        let heap_min_free = unsafe { esp_get_minimum_free_heap_size() };

        let mut stats: nvs_stats_t = unsafe { core::mem::zeroed() };
        let nvs_free_entries =
            // SAFETY: "nvs" is the default partition label, NUL-terminated.
            if unsafe { nvs_get_stats(b"nvs\0".as_ptr() as *const _, &mut stats) } == ESP_OK {
                stats.free_entries as u32
            } else {
                0
            };

        Self {
            uptime_secs,
            heap_free,
            heap_min_free,
            nvs_free_entries,
        }
    }

    /// Host build: synthetic numbers with a slow heap decay, so long
    /// simulation runs show the same shrinking-headroom shape a real
    /// node does.
    #[cfg(not(target_os = "espidf"))]
    pub fn collect(uptime_secs: u64) -> Self {
        let base_free: u32 = 307_200;
        let decay = (uptime_secs / 60) as u32 * 512;
        let heap_free = base_free.saturating_sub(decay);

        Self {
            uptime_secs,
            heap_free,
            heap_min_free: (heap_free as f32 * 0.85) as u32,
            nvs_free_entries: 120,
        }
    }
}

impl core::fmt::Display for RuntimeMetrics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "up {}s, heap {} B free ({} B low-water), nvs {} free entries",
            self.uptime_secs, self.heap_free, self.heap_min_free, self.nvs_free_entries
        )
    }
}

// ───────────────────────────────────────────────────────────────
// Panic hook
// ───────────────────────────────────────────────────────────────

/// Install a panic hook that persists a [`CrashEntry`] before the reset.
///
/// Call once during init, after NVS is up.  On the device the hook opens
/// its own NVS session; a failure there is logged and the entry is lost,
/// since flash recovery is not something to attempt mid-panic.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        log::error!("PANIC: {}", reason);

        #[cfg(target_os = "espidf")]
        {
            // SAFETY: esp_timer_get_time is a counter read, safe in panic
            // context.
            let uptime_secs =
                (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000_000;
            let entry = CrashEntry::new(uptime_secs, reason);

            match crate::adapters::nvs::NvsAdapter::new() {
                Ok(mut nvs) => {
                    let mut crash_log = CrashLog::new();
                    crash_log.init(&nvs);
                    crash_log.record(&mut nvs, &entry);
                }
                Err(_) => {
                    log::error!("panic hook: NVS unavailable, crash entry not persisted");
                }
            }
        }
    }));
}
