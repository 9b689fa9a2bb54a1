//! Device identity derived from the ESP32 factory MAC address.
//!
//! Produces a stable, human-readable device ID in the form `MN-XXYYZZ`
//! (last 3 bytes of the 6-byte MAC in uppercase hex). This ID is:
//! - Deterministic across reboots (factory-burned eFuse MAC)
//! - Appended to the model string pushed to the mesh coordinator, so
//!   bound devices stay tellable apart in pairing tools
//! - Printed in the boot banner and crash reports

/// Fixed-size device ID string: "MN-XXYYZZ" (9 chars + null = 10 max).
pub type DeviceIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Derive the short device ID from the last 3 MAC bytes.
/// Format: `MN-XXYYZZ` (e.g., `MN-EFCAFE`).
pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    use core::fmt::Write;
    let _ = write!(id, "MN-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}
