//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for the node.
//! The node configuration lives in the "meshnode" namespace; the crash
//! log ring (see `diagnostics`) writes its slots through [`StoragePort`]
//! under its own namespace.
//!
//! - Config validation: all fields are range-checked before persistence,
//!   and again after load so a blob written by older firmware can never
//!   start the node with out-of-range settings.
//! - Namespace isolation: each subsystem uses its own namespace prefix.
//! - Atomic writes: ESP-IDF NVS commits are atomic per nvs_commit().

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::NodeConfig;
use crate::telemetry::ReportPolicy;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "meshnode";
const CONFIG_KEY: &str = "nodecfg";

#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// Returns `Err(ConfigError::IoError)` if flash initialisation fails
    /// unrecoverably. On first boot or after a version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

/// Range-check every configurable field.
///
/// Reporting bounds are delegated to [`ReportPolicy::new`] so the rules
/// live in one place.
pub fn validate_config(cfg: &NodeConfig) -> Result<(), ConfigError> {
    ReportPolicy::new(
        cfg.report_min_interval_s,
        cfg.report_max_interval_s,
        cfg.report_delta_c,
    )?;

    // ZCL application endpoints are 1–240; 0 and 241+ are reserved.
    if !(1..=240).contains(&cfg.endpoint_id) {
        return Err(ConfigError::ValidationFailed("endpoint_id must be 1–240"));
    }
    if !(100..=60_000).contains(&cfg.sample_period_ms) {
        return Err(ConfigError::ValidationFailed(
            "sample_period_ms must be 100–60000",
        ));
    }
    if !cfg.sensor_min_c.is_finite()
        || !cfg.sensor_max_c.is_finite()
        || cfg.sensor_min_c >= cfg.sensor_max_c
    {
        return Err(ConfigError::ValidationFailed(
            "sensor envelope must satisfy min_c < max_c",
        ));
    }
    if !cfg.sensor_tolerance_c.is_finite() || cfg.sensor_tolerance_c <= 0.0 {
        return Err(ConfigError::ValidationFailed(
            "sensor_tolerance_c must be > 0",
        ));
    }
    for (i, line) in cfg.lines.iter().enumerate() {
        // ESP32-C6 exposes GPIO0–GPIO30.
        if line.gpio > 30 {
            return Err(ConfigError::ValidationFailed("input gpio must be 0–30"));
        }
        if cfg.lines[..i].iter().any(|prev| prev.gpio == line.gpio) {
            return Err(ConfigError::ValidationFailed(
                "input lines must use distinct gpios",
            ));
        }
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<NodeConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        let decoded: Option<NodeConfig> = {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            match self.store.borrow().get(&key) {
                Some(bytes) => {
                    Some(postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?)
                }
                None => None,
            }
        };

        #[cfg(target_os = "espidf")]
        let decoded: Option<NodeConfig> = {
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, false, |handle| {
                let key_cstr = b"nodecfg\0";
                let mut size: usize = 0;

                // First call: get size
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Err(ESP_ERR_NVS_NOT_FOUND);
                }
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }

                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    info!("NvsAdapter: loaded config from NVS ({} bytes)", bytes.len());
                    Some(postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => None,
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {}, using defaults", e);
                    None
                }
            }
        };

        match decoded {
            Some(cfg) => match validate_config(&cfg) {
                Ok(()) => {
                    info!("NvsAdapter: stored config validated");
                    Ok(cfg)
                }
                Err(e) => {
                    // A blob from older firmware may violate newer rules;
                    // booting with defaults beats refusing to boot.
                    warn!("NvsAdapter: stored config invalid ({}), using defaults", e);
                    Ok(NodeConfig::default())
                }
            },
            None => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(NodeConfig::default())
            }
        }
    }

    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError> {
        validate_config(config)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
            self.store.borrow_mut().insert(key, bytes);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, true, |handle| {
                let key_cstr = b"nodecfg\0";
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Err(ESP_ERR_NVS_NOT_FOUND);
                }
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let ret = unsafe {
                    nvs_find_key(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}

impl Default for NvsAdapter {
    fn default() -> Self {
        // Falls back to an unbacked adapter when flash init fails; reads
        // then behave as first-boot.
        Self::new().unwrap_or_else(|_| Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }
}
