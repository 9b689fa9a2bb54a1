//! Configuration and crash-ring persistence over the storage adapter's
//! in-memory simulation.  Each adapter instance is its own store, so
//! these tests run without the simulation lock.

use meshnode::adapters::nvs::NvsAdapter;
use meshnode::app::ports::{ConfigError, ConfigPort};
use meshnode::config::{DeviceRole, NodeConfig};
use meshnode::diagnostics::{CrashEntry, CrashLog};

#[test]
fn first_boot_serves_role_defaults() {
    let nvs = NvsAdapter::new().unwrap();
    let cfg = nvs.load().unwrap();
    assert_eq!(cfg.role, DeviceRole::Light);
    assert_eq!(cfg.endpoint_id, 10);
    assert!(cfg.report_min_interval_s > 0 || cfg.report_max_interval_s > 0);
}

#[test]
fn saved_config_reads_back() {
    let nvs = NvsAdapter::new().unwrap();
    let mut cfg = NodeConfig::for_role(DeviceRole::TemperatureSensor);
    cfg.report_min_interval_s = 5;
    cfg.report_max_interval_s = 600;
    cfg.report_delta_c = 0.5;
    cfg.sample_period_ms = 2000;
    nvs.save(&cfg).unwrap();

    let back = nvs.load().unwrap();
    assert_eq!(back.role, DeviceRole::TemperatureSensor);
    assert_eq!(back.endpoint_id, 11);
    assert_eq!(back.report_min_interval_s, 5);
    assert_eq!(back.report_max_interval_s, 600);
    assert_eq!(back.sample_period_ms, 2000);
    assert!((back.report_delta_c - 0.5).abs() < f32::EPSILON);
}

#[test]
fn rejected_config_leaves_the_stored_one() {
    let nvs = NvsAdapter::new().unwrap();
    let good = NodeConfig::for_role(DeviceRole::Switch);
    nvs.save(&good).unwrap();

    // A both-intervals-zero policy must bounce at the validation gate,
    // not overwrite the working config.
    let mut bad = good.clone();
    bad.report_min_interval_s = 0;
    bad.report_max_interval_s = 0;
    assert!(matches!(
        nvs.save(&bad),
        Err(ConfigError::ValidationFailed(_))
    ));

    let back = nvs.load().unwrap();
    assert_eq!(back.role, DeviceRole::Switch);
    assert!(back.report_min_interval_s > 0 || back.report_max_interval_s > 0);
}

#[test]
fn config_and_crash_ring_share_the_store() {
    let mut nvs = NvsAdapter::new().unwrap();
    let cfg = NodeConfig::for_role(DeviceRole::Thermostat);
    nvs.save(&cfg).unwrap();

    let mut ring = CrashLog::new();
    ring.init(&nvs);
    ring.record(&mut nvs, &CrashEntry::new(12, "task overran its deadline"));
    ring.record(&mut nvs, &CrashEntry::new(90, "mesh stack assert"));

    // Neither subsystem clobbered the other's namespace.
    let back = nvs.load().unwrap();
    assert_eq!(back.role, DeviceRole::Thermostat);
    let entries = ring.entries(&nvs);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].uptime_secs, 12);
    assert_eq!(entries[1].reason.as_str(), "mesh stack assert");

    // Clearing the ring leaves the config untouched.
    ring.clear(&mut nvs);
    assert_eq!(ring.count(&nvs), 0);
    assert_eq!(nvs.load().unwrap().role, DeviceRole::Thermostat);
}
