//! Priority-configured thread spawning for the single-core ESP32-C6.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::spawn` creates a
//! FreeRTOS task with explicit priority and stack size. There is only
//! one core to run on, so unlike dual-core parts nothing is pinned; the
//! priority decides who preempts whom. On non-ESP targets, falls back
//! to plain thread spawn.
//!
//! # ESP-IDF Threading Model
//!
//! ESP-IDF implements `std::thread` via pthreads, which are thin wrappers
//! around FreeRTOS tasks. `esp_pthread_set_cfg()` sets thread-local
//! configuration that applies to the *next* `pthread_create()` call from
//! the calling thread. This means the config→spawn pair must not be
//! interleaved with other thread creation on the same thread.

/// Spawn a thread with explicit FreeRTOS priority and stack size.
///
/// On ESP-IDF, uses `esp_pthread_set_cfg()` to configure priority and
/// stack size before `std::thread::spawn`. The `name` parameter must be
/// a null-terminated string (e.g. `"zb_main\0"`).
///
/// On non-ESP targets, ignores `priority`, using only `stack_kb`.
#[cfg(target_os = "espidf")]
pub fn spawn_task(
    name: &'static str,
    priority: u8,
    stack_kb: usize,
    f: impl FnOnce() + Send + 'static,
) -> std::thread::JoinHandle<()> {
    unsafe {
        let mut cfg = esp_idf_svc::sys::esp_create_default_pthread_config();
        cfg.prio = priority as i32;
        cfg.stack_size = (stack_kb * 1024) as i32;
        cfg.thread_name = name.as_ptr() as *const _;
        let ret = esp_idf_svc::sys::esp_pthread_set_cfg(&cfg);
        assert!(
            ret == esp_idf_svc::sys::ESP_OK as i32,
            "esp_pthread_set_cfg failed: {ret}"
        );
    }

    let display_name = name.trim_end_matches('\0');
    log::info!(
        "Spawning '{}' (pri={}, stack={}KB)",
        display_name,
        priority,
        stack_kb
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .spawn(f)
        .expect("spawn_task: thread creation failed")
}

/// Simulation fallback — ignores priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_task(
    name: &'static str,
    _priority: u8,
    stack_kb: usize,
    f: impl FnOnce() + Send + 'static,
) -> std::thread::JoinHandle<()> {
    let display_name = name.trim_end_matches('\0');
    log::info!("Spawning '{}' (sim, stack={}KB)", display_name, stack_kb);

    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size(stack_kb * 1024)
        .spawn(f)
        .expect("spawn_task(sim): thread creation failed")
}
