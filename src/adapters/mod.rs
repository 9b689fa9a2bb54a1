//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements       | Connects to                  |
//! |-------------|------------------|------------------------------|
//! | `mesh`      | MeshPort         | esp-zigbee-sdk / host sim    |
//! | `log_sink`  | EventSink        | Serial log output            |
//! | `nvs`       | ConfigPort       | NVS / in-memory store        |
//! |             | StoragePort      |                              |
//! | `time`      | uptime source    | ESP32 system timer           |
//! | `device_id` | identity strings | eFuse MAC                    |

pub mod device_id;
pub mod log_sink;
pub mod mesh;
pub mod nvs;
pub mod time;
