//! ESP32-C6 mesh stack backend.
//!
//! Drives the vendor Zigbee SDK (esp-zigbee-lib, pulled in as an extra
//! ESP-IDF component; see Cargo.toml). The crate declares the handful of
//! entry points it needs by hand instead of generating bindings for the
//! whole SDK.
//!
//! Threading model:
//! - `esp_zb_stack_main_loop()` runs on its own pinned thread, spawned
//!   by [`EspMeshStack::begin`].
//! - All attribute writes and command sends from our tasks take the
//!   stack lock (`esp_zb_lock_acquire`).
//! - SDK callbacks (`zb_action_handler`, the app signal handler) run on
//!   the stack thread. They only flip atomics, store into the handler
//!   slots' targets, or push a [`MeshNotice`] — never block.

use core::ffi::c_void;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};
use std::sync::Mutex;

use log::{info, warn};

use crate::app::ports::{EndpointRole, MeshAction, MeshError, MeshMode, MeshPort};

use super::{notify, MeshNotice};

// ───────────────────────────────────────────────────────────────
// Vendor SDK surface
// ───────────────────────────────────────────────────────────────

// ZCL cluster ids.
const CLUSTER_BASIC: u16 = 0x0000;
const CLUSTER_IDENTIFY: u16 = 0x0003;
const CLUSTER_ON_OFF: u16 = 0x0006;
const CLUSTER_LEVEL: u16 = 0x0008;
const CLUSTER_TEMP_MEASUREMENT: u16 = 0x0402;
const CLUSTER_COLOUR: u16 = 0x0300;

// ZCL attribute ids.
const ATTR_BASIC_MANUFACTURER: u16 = 0x0004;
const ATTR_BASIC_MODEL: u16 = 0x0005;
const ATTR_IDENTIFY_TIME: u16 = 0x0000;
const ATTR_ON_OFF_STATE: u16 = 0x0000;
const ATTR_TEMP_VALUE: u16 = 0x0000;
const ATTR_TEMP_MIN: u16 = 0x0001;
const ATTR_TEMP_MAX: u16 = 0x0002;
const ATTR_TEMP_TOLERANCE: u16 = 0x0003;

const CLUSTER_ROLE_SERVER: u8 = 0x01;

// esp_zb_core_action_callback_id_t values.
const ACTION_SET_ATTR_VALUE: u32 = 0x0000;
const ACTION_READ_ATTR_RESP: u32 = 0x1000;
const ACTION_REPORT_ATTR: u32 = 0x2000;

// zb_zdo_app_signal_type_e values delivered to the app signal handler.
const SIGNAL_SKIP_STARTUP: u32 = 1;
const SIGNAL_DEVICE_ANNCE: u32 = 2;
const SIGNAL_LEAVE: u32 = 3;
const SIGNAL_DEVICE_FIRST_START: u32 = 5;
const SIGNAL_DEVICE_REBOOT: u32 = 6;
const SIGNAL_STEERING: u32 = 10;

// esp_zb_bdb_commissioning_mode_mask_t.
const BDB_MODE_INITIALIZATION: u8 = 0;
const BDB_MODE_NETWORK_STEERING: u8 = 2;

// esp_zb_nwk_device_type_t.
const DEVICE_TYPE_ROUTER: u32 = 1;
const DEVICE_TYPE_END_DEVICE: u32 = 2;

// ESP_ZB_APS_ADDR_MODE_DST_ADDR_ENDP_NOT_PRESENT: deliver via binding table.
const ADDR_MODE_BOUND: u32 = 0;

// All 2.4 GHz channels (11–26).
const ALL_CHANNELS_MASK: u32 = 0x07FF_F800;

// esp_zb_zcl_on_off_cmd_id_t.
const ON_OFF_CMD_OFF: u32 = 0;
const ON_OFF_CMD_ON: u32 = 1;
const ON_OFF_CMD_TOGGLE: u32 = 2;

#[repr(C)]
#[derive(Clone, Copy)]
union ZbAddr {
    addr_short: u16,
    addr_long: [u8; 8],
}

#[repr(C)]
struct ZclBasicCmd {
    dst_addr_u: ZbAddr,
    dst_endpoint: u8,
    src_endpoint: u8,
}

#[repr(C)]
struct ZclOnOffCmd {
    zcl_basic_cmd: ZclBasicCmd,
    address_mode: u32,
    on_off_cmd_id: u32,
}

#[repr(C)]
struct ZclLevelStepCmd {
    zcl_basic_cmd: ZclBasicCmd,
    address_mode: u32,
    step_mode: u8,
    step_size: u8,
    transition_time: u16,
}

#[repr(C)]
struct ZclLevelMoveToLevelCmd {
    zcl_basic_cmd: ZclBasicCmd,
    address_mode: u32,
    level: u8,
    transition_time: u16,
}

#[repr(C)]
struct ZclColourMoveToHueCmd {
    zcl_basic_cmd: ZclBasicCmd,
    address_mode: u32,
    hue: u8,
    direction: u8,
    transition_time: u16,
}

#[repr(C)]
struct ZclReadAttrCmd {
    zcl_basic_cmd: ZclBasicCmd,
    address_mode: u32,
    cluster_id: u16,
    attr_number: u8,
    attr_field: *mut u16,
}

#[repr(C)]
struct ZclReportAttrCmd {
    zcl_basic_cmd: ZclBasicCmd,
    address_mode: u32,
    cluster_id: u16,
    cluster_role: u8,
    attribute_id: u16,
}

#[repr(C)]
struct ZbCfg {
    device_type: u32,
    install_code_policy: bool,
    nwk_cfg: ZbNwkCfg,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ZbZczrCfg {
    max_children: u8,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ZbZedCfg {
    ed_timeout: u8,
    keep_alive: u32,
}

#[repr(C)]
union ZbNwkCfg {
    zczr: ZbZczrCfg,
    zed: ZbZedCfg,
}

/// Common prefix of every device-callback message.
#[repr(C)]
struct ZbDeviceCbCommonInfo {
    status: u32,
    dst_endpoint: u8,
    cluster: u16,
}

#[repr(C)]
struct ZbZclAttributeData {
    type_: u32,
    size: u16,
    value: *mut c_void,
}

#[repr(C)]
struct ZbZclAttribute {
    id: u16,
    data: ZbZclAttributeData,
}

/// `esp_zb_zcl_set_attr_value_message_t`.
#[repr(C)]
struct ZclSetAttrValueMessage {
    info: ZbDeviceCbCommonInfo,
    attribute: ZbZclAttribute,
}

#[repr(C)]
#[allow(dead_code)]
struct ZbZclAddr {
    addr_type: u8,
    u: ZbAddr,
}

/// `esp_zb_zcl_report_attr_message_t`.
#[repr(C)]
#[allow(dead_code)]
struct ZclReportAttrMessage {
    status: u32,
    src_address: ZbZclAddr,
    src_endpoint: u8,
    dst_endpoint: u8,
    cluster: u16,
    attribute: ZbZclAttribute,
}

#[repr(C)]
#[allow(dead_code)]
struct ZclFrameHeader {
    fc: u8,
    manuf_code: u16,
    tsn: u8,
    rssi: i8,
}

/// `esp_zb_zcl_cmd_info_t` (fields consumed: `status`, `cluster`; the
/// rest exist for layout).
#[repr(C)]
#[allow(dead_code)]
struct ZbZclCmdInfo {
    status: u32,
    header: ZclFrameHeader,
    src_address: ZbZclAddr,
    dst_address: u16,
    src_endpoint: u8,
    dst_endpoint: u8,
    cluster: u16,
    profile: u16,
    command_id: u8,
    direction: u8,
}

/// Linked list node of `esp_zb_zcl_cmd_read_attr_resp_message_t`.
#[repr(C)]
struct ZclReadAttrRespVariable {
    status: u32,
    attribute: ZbZclAttribute,
    next: *mut ZclReadAttrRespVariable,
}

#[repr(C)]
struct ZclReadAttrRespMessage {
    info: ZbZclCmdInfo,
    variables: *mut ZclReadAttrRespVariable,
}

/// `esp_zb_app_signal_t`.
#[repr(C)]
struct ZbAppSignal {
    p_app_signal: *mut u32,
    esp_err_status: i32,
}

#[repr(C)]
struct ZdoMgmtBindParam {
    start_index: u8,
    dst_addr: u16,
}

#[repr(C)]
#[allow(dead_code)]
struct ZdoBindingTableRecord {
    src_address: [u8; 8],
    src_endp: u8,
    cluster_id: u16,
    dst_addr_mode: u8,
    dst_address: ZbAddr,
    dst_endp: u8,
    next: *mut ZdoBindingTableRecord,
}

#[repr(C)]
struct ZdoBindingTableInfo {
    status: u8,
    index: u8,
    total: u8,
    count: u8,
    record: *mut ZdoBindingTableRecord,
}

unsafe extern "C" {
    fn esp_zb_platform_config(config: *mut c_void) -> i32;
    fn esp_zb_init(cfg: *mut ZbCfg);
    fn esp_zb_set_primary_network_channel_set(channel_mask: u32) -> i32;
    fn esp_zb_on_off_light_ep_create(endpoint_id: u8, cfg: *mut c_void) -> *mut c_void;
    fn esp_zb_on_off_switch_ep_create(endpoint_id: u8, cfg: *mut c_void) -> *mut c_void;
    fn esp_zb_temperature_sensor_ep_create(endpoint_id: u8, cfg: *mut c_void) -> *mut c_void;
    fn esp_zb_thermostat_ep_create(endpoint_id: u8, cfg: *mut c_void) -> *mut c_void;
    fn esp_zb_device_register(ep_list: *mut c_void) -> i32;
    fn esp_zb_core_action_handler_register(
        cb: Option<unsafe extern "C" fn(u32, *const c_void) -> i32>,
    );
    fn esp_zb_start(autostart: bool) -> i32;
    fn esp_zb_stack_main_loop();
    fn esp_zb_bdb_dev_joined() -> bool;
    fn esp_zb_bdb_start_top_level_commissioning(mode_mask: u8) -> i32;
    fn esp_zb_bdb_open_network(permit_duration: u8) -> i32;
    fn esp_zb_factory_reset();
    fn esp_zb_scheduler_alarm(cb: Option<unsafe extern "C" fn(u8)>, param: u8, time_ms: u32);
    fn esp_zb_lock_acquire(block_ticks: u32) -> bool;
    fn esp_zb_lock_release();
    fn esp_zb_get_short_address() -> u16;
    fn esp_zb_zcl_set_attribute_val(
        endpoint: u8,
        cluster_id: u16,
        cluster_role: u8,
        attr_id: u16,
        value_p: *mut c_void,
        check: bool,
    ) -> u8;
    fn esp_zb_zcl_report_attr_cmd_req(cmd: *mut ZclReportAttrCmd) -> i32;
    fn esp_zb_zcl_on_off_cmd_req(cmd: *mut ZclOnOffCmd) -> u8;
    fn esp_zb_zcl_level_step_cmd_req(cmd: *mut ZclLevelStepCmd) -> u8;
    fn esp_zb_zcl_level_move_to_level_cmd_req(cmd: *mut ZclLevelMoveToLevelCmd) -> u8;
    fn esp_zb_zcl_color_move_to_hue_cmd_req(cmd: *mut ZclColourMoveToHueCmd) -> u8;
    fn esp_zb_zcl_read_attr_cmd_req(cmd: *mut ZclReadAttrCmd) -> u8;
    fn esp_zb_zdo_binding_table_req(
        req: *mut ZdoMgmtBindParam,
        cb: Option<unsafe extern "C" fn(*const ZdoBindingTableInfo, *mut c_void)>,
        user_ctx: *mut c_void,
    );
}

// ───────────────────────────────────────────────────────────────
// Static state bridging SDK callbacks → adapter
// ───────────────────────────────────────────────────────────────

static CONNECTED: AtomicBool = AtomicBool::new(false);
static BOUND: AtomicBool = AtomicBool::new(false);
static OPEN_NETWORK_S: AtomicU16 = AtomicU16::new(0);
static LEVEL_PRESET: AtomicU8 = AtomicU8::new(0);
static HUE: AtomicU8 = AtomicU8::new(0);

// Handler slots. SDK callbacks run on the stack task (not ISR), so a
// std mutex is safe there.
static LIGHT_HANDLER: Mutex<Option<fn(bool)>> = Mutex::new(None);
static IDENTIFY_HANDLER: Mutex<Option<fn(u16)>> = Mutex::new(None);
static SENSOR_CONFIG_HANDLER: Mutex<Option<fn(f32, f32, f32)>> = Mutex::new(None);

// Partial answer to a settings query; the three attributes arrive in one
// or more read responses.
static QUERY_ACC: Mutex<(Option<f32>, Option<f32>, Option<f32>)> = Mutex::new((None, None, None));

unsafe extern "C" fn retry_steering(_param: u8) {
    unsafe {
        esp_zb_bdb_start_top_level_commissioning(BDB_MODE_NETWORK_STEERING);
    }
}

/// Application signal handler; the SDK links against this exact symbol.
#[unsafe(no_mangle)]
unsafe extern "C" fn esp_zb_app_signal_handler(signal: *mut ZbAppSignal) {
    let (sig_type, err_status) = unsafe { (*(*signal).p_app_signal, (*signal).esp_err_status) };

    match sig_type {
        SIGNAL_SKIP_STARTUP => unsafe {
            esp_zb_bdb_start_top_level_commissioning(BDB_MODE_INITIALIZATION);
        },
        SIGNAL_DEVICE_FIRST_START | SIGNAL_DEVICE_REBOOT => {
            if err_status == 0 {
                if unsafe { esp_zb_bdb_dev_joined() } {
                    log::info!("mesh: rejoined stored network");
                    CONNECTED.store(true, Ordering::Relaxed);
                    open_network_if_configured();
                } else {
                    unsafe {
                        esp_zb_bdb_start_top_level_commissioning(BDB_MODE_NETWORK_STEERING);
                    }
                }
            } else {
                log::warn!("mesh: stack init failed ({}), retrying in 1s", err_status);
                unsafe {
                    esp_zb_scheduler_alarm(Some(retry_steering), BDB_MODE_NETWORK_STEERING, 1000);
                }
            }
        }
        SIGNAL_STEERING => {
            if err_status == 0 {
                log::info!("mesh: joined network (steering complete)");
                CONNECTED.store(true, Ordering::Relaxed);
                open_network_if_configured();
            } else {
                log::warn!("mesh: steering failed ({}), retrying in 1s", err_status);
                unsafe {
                    esp_zb_scheduler_alarm(Some(retry_steering), BDB_MODE_NETWORK_STEERING, 1000);
                }
            }
        }
        SIGNAL_DEVICE_ANNCE => {
            log::info!("mesh: device announced on network");
        }
        SIGNAL_LEAVE => {
            log::warn!("mesh: left network");
            CONNECTED.store(false, Ordering::Relaxed);
            BOUND.store(false, Ordering::Relaxed);
        }
        other => {
            log::debug!("mesh: signal {} (status {})", other, err_status);
        }
    }
}

fn open_network_if_configured() {
    let secs = OPEN_NETWORK_S.load(Ordering::Relaxed);
    if secs > 0 {
        let capped = secs.min(254) as u8;
        log::info!("mesh: opening network for {}s", capped);
        unsafe {
            esp_zb_bdb_open_network(capped);
        }
    }
}

unsafe fn handle_set_attr(message: *const ZclSetAttrValueMessage) {
    let msg = unsafe { &*message };
    if msg.info.status != 0 || msg.attribute.data.value.is_null() {
        return;
    }
    match (msg.info.cluster, msg.attribute.id) {
        (CLUSTER_ON_OFF, ATTR_ON_OFF_STATE) => {
            let on = unsafe { *(msg.attribute.data.value as *const u8) } != 0;
            if let Ok(slot) = LIGHT_HANDLER.lock() {
                if let Some(handler) = *slot {
                    handler(on);
                }
            }
        }
        (CLUSTER_IDENTIFY, ATTR_IDENTIFY_TIME) => {
            let seconds = unsafe { *(msg.attribute.data.value as *const u16) };
            if let Ok(slot) = IDENTIFY_HANDLER.lock() {
                if let Some(handler) = *slot {
                    handler(seconds);
                }
            }
        }
        (CLUSTER_LEVEL, _) | (CLUSTER_COLOUR, _) => {
            // Deployed nodes are driven through on/off + identify; level
            // and colour writes land in the data model but need no app
            // reaction here.
            log::debug!("mesh: attribute write on cluster {:#06x}", msg.info.cluster);
        }
        _ => {}
    }
}

unsafe fn handle_read_attr_resp(message: *const ZclReadAttrRespMessage) {
    let msg = unsafe { &*message };
    if msg.info.status != 0 || msg.info.cluster != CLUSTER_TEMP_MEASUREMENT {
        return;
    }
    let Ok(mut acc) = QUERY_ACC.lock() else {
        return;
    };
    let mut variable = msg.variables;
    while !variable.is_null() {
        let var = unsafe { &*variable };
        if var.status == 0 && !var.attribute.data.value.is_null() {
            match var.attribute.id {
                // Signed 0.01 °C units on the wire.
                ATTR_TEMP_MIN => {
                    let raw = unsafe { *(var.attribute.data.value as *const i16) };
                    acc.0 = Some(f32::from(raw) / 100.0);
                }
                ATTR_TEMP_MAX => {
                    let raw = unsafe { *(var.attribute.data.value as *const i16) };
                    acc.1 = Some(f32::from(raw) / 100.0);
                }
                ATTR_TEMP_TOLERANCE => {
                    let raw = unsafe { *(var.attribute.data.value as *const u16) };
                    acc.2 = Some(f32::from(raw) / 100.0);
                }
                _ => {}
            }
        }
        variable = var.next;
    }
    if let (Some(min_c), Some(max_c), Some(tolerance_c)) = *acc {
        *acc = (None, None, None);
        drop(acc);
        notify(MeshNotice::SensorConfig {
            min_c,
            max_c,
            tolerance_c,
        });
        if let Ok(slot) = SENSOR_CONFIG_HANDLER.lock() {
            if let Some(handler) = *slot {
                handler(min_c, max_c, tolerance_c);
            }
        }
    }
}

unsafe fn handle_report_attr(message: *const ZclReportAttrMessage) {
    let msg = unsafe { &*message };
    if msg.status != 0 || msg.cluster != CLUSTER_TEMP_MEASUREMENT {
        return;
    }
    // First report from a bound sensor proves the binding works.
    BOUND.store(true, Ordering::Relaxed);
    if msg.attribute.id == ATTR_TEMP_VALUE && !msg.attribute.data.value.is_null() {
        let raw = unsafe { *(msg.attribute.data.value as *const i16) };
        log::info!(
            "mesh: bound sensor reported {:.2}\u{00b0}C",
            f32::from(raw) / 100.0
        );
    }
}

unsafe extern "C" fn zb_action_handler(callback_id: u32, message: *const c_void) -> i32 {
    if message.is_null() {
        return 0;
    }
    match callback_id {
        ACTION_SET_ATTR_VALUE => unsafe { handle_set_attr(message.cast()) },
        ACTION_READ_ATTR_RESP => unsafe { handle_read_attr_resp(message.cast()) },
        ACTION_REPORT_ATTR => unsafe { handle_report_attr(message.cast()) },
        other => {
            log::debug!("mesh: unhandled action callback {:#06x}", other);
        }
    }
    0
}

unsafe extern "C" fn binding_table_cb(info: *const ZdoBindingTableInfo, _ctx: *mut c_void) {
    if info.is_null() {
        return;
    }
    let info = unsafe { &*info };
    if info.status != 0 {
        log::warn!("mesh: binding table read failed ({})", info.status);
        return;
    }
    log::info!("mesh: {} bound device(s)", info.total);
    let mut record = info.record;
    while !record.is_null() {
        let rec = unsafe { &*record };
        log::info!(
            "mesh:   cluster {:#06x} -> endpoint {}",
            rec.cluster_id,
            rec.dst_endp
        );
        record = rec.next;
    }
    if info.total > 0 {
        BOUND.store(true, Ordering::Relaxed);
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

/// Production [`MeshPort`] backend for the ESP32-C6 radio.
pub struct EspMeshStack {
    endpoints: heapless::Vec<(u8, EndpointRole), 4>,
    manufacturer: heapless::String<32>,
    model: heapless::String<32>,
    open_network_s: u16,
    started: bool,
}

impl EspMeshStack {
    pub fn new(open_network_s: u16) -> Self {
        Self {
            endpoints: heapless::Vec::new(),
            manufacturer: heapless::String::new(),
            model: heapless::String::new(),
            open_network_s,
            started: false,
        }
    }

    fn primary_endpoint(&self) -> u8 {
        self.endpoints.first().map_or(1, |(id, _)| *id)
    }

    /// Write a length-prefixed ZCL string attribute on the basic cluster.
    fn set_basic_string(&self, endpoint: u8, attr: u16, value: &str) {
        let mut buf = [0u8; 33];
        let len = value.len().min(32);
        buf[0] = len as u8;
        buf[1..=len].copy_from_slice(&value.as_bytes()[..len]);
        unsafe {
            esp_zb_zcl_set_attribute_val(
                endpoint,
                CLUSTER_BASIC,
                CLUSTER_ROLE_SERVER,
                attr,
                buf.as_mut_ptr().cast(),
                false,
            );
        }
    }

    /// Command skeleton addressed to the binding table; the destination
    /// fields stay zero because the stack resolves bound targets itself.
    fn bound_cmd(&self) -> ZclBasicCmd {
        ZclBasicCmd {
            dst_addr_u: ZbAddr { addr_short: 0 },
            dst_endpoint: 0,
            src_endpoint: self.primary_endpoint(),
        }
    }
}

impl MeshPort for EspMeshStack {
    fn set_device_info(&mut self, manufacturer: &str, model: &str) {
        self.manufacturer.clear();
        let _ = self.manufacturer.push_str(manufacturer);
        self.model.clear();
        let _ = self.model.push_str(model);
    }

    fn add_endpoint(&mut self, id: u8, role: EndpointRole) -> Result<(), MeshError> {
        if self.started || self.endpoints.iter().any(|(eid, _)| *eid == id) {
            return Err(MeshError::EndpointRejected);
        }
        self.endpoints
            .push((id, role))
            .map_err(|_| MeshError::EndpointRejected)
    }

    fn begin(&mut self, mode: MeshMode) -> Result<(), MeshError> {
        if self.endpoints.is_empty() {
            return Err(MeshError::StackStartFailed);
        }

        OPEN_NETWORK_S.store(self.open_network_s, Ordering::Relaxed);

        // Zeroed platform config selects the native 15.4 radio and no
        // host connection; sized past the real struct.
        let mut platform_cfg = [0u8; 128];
        let ret = unsafe { esp_zb_platform_config(platform_cfg.as_mut_ptr().cast()) };
        if ret != 0 {
            warn!("mesh: platform config failed ({})", ret);
            return Err(MeshError::StackStartFailed);
        }

        let mut cfg = ZbCfg {
            device_type: match mode {
                MeshMode::Router => DEVICE_TYPE_ROUTER,
                MeshMode::EndDevice => DEVICE_TYPE_END_DEVICE,
            },
            install_code_policy: false,
            nwk_cfg: match mode {
                MeshMode::Router => ZbNwkCfg {
                    zczr: ZbZczrCfg { max_children: 10 },
                },
                MeshMode::EndDevice => ZbNwkCfg {
                    zed: ZbZedCfg {
                        // Aging timeout index 8 = 64 min; keep-alive 3 s.
                        ed_timeout: 8,
                        keep_alive: 3000,
                    },
                },
            },
        };
        unsafe {
            esp_zb_init(&mut cfg);
            esp_zb_set_primary_network_channel_set(ALL_CHANNELS_MASK);
        }

        // Register the endpoint. One device carries one application
        // endpoint; extras would need a merged endpoint list.
        let (ep_id, role) = self.endpoints[0];
        if self.endpoints.len() > 1 {
            warn!("mesh: only the first endpoint is registered on hardware");
        }
        let mut ep_cfg = [0u8; 64];
        let ep_list = unsafe {
            match role {
                EndpointRole::Light => {
                    esp_zb_on_off_light_ep_create(ep_id, ep_cfg.as_mut_ptr().cast())
                }
                EndpointRole::Switch => {
                    esp_zb_on_off_switch_ep_create(ep_id, ep_cfg.as_mut_ptr().cast())
                }
                EndpointRole::TemperatureSensor { .. } => {
                    esp_zb_temperature_sensor_ep_create(ep_id, ep_cfg.as_mut_ptr().cast())
                }
                EndpointRole::Thermostat => {
                    esp_zb_thermostat_ep_create(ep_id, ep_cfg.as_mut_ptr().cast())
                }
            }
        };
        let ret = unsafe { esp_zb_device_register(ep_list) };
        if ret != 0 {
            warn!("mesh: endpoint registration failed ({})", ret);
            return Err(MeshError::EndpointRejected);
        }

        unsafe {
            esp_zb_core_action_handler_register(Some(zb_action_handler));
        }

        if !self.manufacturer.is_empty() {
            self.set_basic_string(ep_id, ATTR_BASIC_MANUFACTURER, &self.manufacturer);
        }
        if !self.model.is_empty() {
            self.set_basic_string(ep_id, ATTR_BASIC_MODEL, &self.model);
        }

        let ret = unsafe { esp_zb_start(false) };
        if ret != 0 {
            warn!("mesh: stack start failed ({})", ret);
            return Err(MeshError::StackStartFailed);
        }

        // The stack main loop owns its own thread and never returns;
        // the handle is deliberately dropped to detach it.
        let _zb_main = crate::drivers::task_spawn::spawn_task("zb_main\0", 5, 8, || unsafe {
            esp_zb_stack_main_loop();
        });

        self.started = true;
        info!(
            "mesh: stack started as {:?}, endpoint {} ({:?})",
            mode, ep_id, role
        );
        Ok(())
    }

    fn connected(&self) -> bool {
        CONNECTED.load(Ordering::Relaxed) || unsafe { esp_zb_bdb_dev_joined() }
    }

    fn bound(&self) -> bool {
        BOUND.load(Ordering::Relaxed)
    }

    fn report_temperature(&mut self, celsius: f32) -> Result<(), MeshError> {
        if !self.started {
            return Err(MeshError::NotConnected);
        }
        // ZCL temperature measurement is signed 0.01 °C.
        let mut raw = (celsius * 100.0) as i16;
        let ep = self.primary_endpoint();

        unsafe {
            esp_zb_lock_acquire(u32::MAX);
        }
        let status = unsafe {
            esp_zb_zcl_set_attribute_val(
                ep,
                CLUSTER_TEMP_MEASUREMENT,
                CLUSTER_ROLE_SERVER,
                ATTR_TEMP_VALUE,
                (&mut raw as *mut i16).cast(),
                false,
            )
        };
        let mut cmd = ZclReportAttrCmd {
            zcl_basic_cmd: self.bound_cmd(),
            address_mode: ADDR_MODE_BOUND,
            cluster_id: CLUSTER_TEMP_MEASUREMENT,
            cluster_role: CLUSTER_ROLE_SERVER,
            attribute_id: ATTR_TEMP_VALUE,
        };
        let send = unsafe { esp_zb_zcl_report_attr_cmd_req(&mut cmd) };
        unsafe {
            esp_zb_lock_release();
        }

        if status != 0 {
            return Err(MeshError::AttributeWriteFailed);
        }
        if send != 0 {
            return Err(MeshError::CommandSendFailed);
        }
        Ok(())
    }

    fn send_action(&mut self, action: MeshAction) -> Result<(), MeshError> {
        if !self.started {
            return Err(MeshError::NotConnected);
        }

        unsafe {
            esp_zb_lock_acquire(u32::MAX);
        }
        // The cmd_req calls return the ZCL transaction sequence number;
        // delivery failures come back asynchronously through the action
        // handler, so there is nothing to check here.
        let tsn = match action {
            MeshAction::On | MeshAction::Off | MeshAction::Toggle => {
                let mut cmd = ZclOnOffCmd {
                    zcl_basic_cmd: self.bound_cmd(),
                    address_mode: ADDR_MODE_BOUND,
                    on_off_cmd_id: match action {
                        MeshAction::On => ON_OFF_CMD_ON,
                        MeshAction::Off => ON_OFF_CMD_OFF,
                        _ => ON_OFF_CMD_TOGGLE,
                    },
                };
                unsafe { esp_zb_zcl_on_off_cmd_req(&mut cmd) }
            }
            MeshAction::LevelUp | MeshAction::LevelDown => {
                let mut cmd = ZclLevelStepCmd {
                    zcl_basic_cmd: self.bound_cmd(),
                    address_mode: ADDR_MODE_BOUND,
                    step_mode: if action == MeshAction::LevelUp { 0 } else { 1 },
                    step_size: 32,
                    transition_time: 5,
                };
                unsafe { esp_zb_zcl_level_step_cmd_req(&mut cmd) }
            }
            MeshAction::LevelCycle => {
                let preset = LEVEL_PRESET.fetch_add(1, Ordering::Relaxed) % 4;
                let mut cmd = ZclLevelMoveToLevelCmd {
                    zcl_basic_cmd: self.bound_cmd(),
                    address_mode: ADDR_MODE_BOUND,
                    level: [64, 128, 192, 255][preset as usize],
                    transition_time: 5,
                };
                unsafe { esp_zb_zcl_level_move_to_level_cmd_req(&mut cmd) }
            }
            MeshAction::ColourCycle => {
                let hue = HUE.fetch_add(32, Ordering::Relaxed);
                let mut cmd = ZclColourMoveToHueCmd {
                    zcl_basic_cmd: self.bound_cmd(),
                    address_mode: ADDR_MODE_BOUND,
                    hue,
                    direction: 0,
                    transition_time: 5,
                };
                unsafe { esp_zb_zcl_color_move_to_hue_cmd_req(&mut cmd) }
            }
        };
        unsafe {
            esp_zb_lock_release();
        }

        log::debug!("mesh: {:?} sent to bound devices (tsn {})", action, tsn);
        Ok(())
    }

    fn query_sensor_settings(&mut self) -> Result<(), MeshError> {
        if !self.started {
            return Err(MeshError::NotConnected);
        }
        if let Ok(mut acc) = QUERY_ACC.lock() {
            *acc = (None, None, None);
        }

        let mut attrs = [ATTR_TEMP_MIN, ATTR_TEMP_MAX, ATTR_TEMP_TOLERANCE];
        let mut cmd = ZclReadAttrCmd {
            zcl_basic_cmd: self.bound_cmd(),
            address_mode: ADDR_MODE_BOUND,
            cluster_id: CLUSTER_TEMP_MEASUREMENT,
            attr_number: attrs.len() as u8,
            attr_field: attrs.as_mut_ptr(),
        };

        unsafe {
            esp_zb_lock_acquire(u32::MAX);
        }
        let tsn = unsafe { esp_zb_zcl_read_attr_cmd_req(&mut cmd) };
        unsafe {
            esp_zb_lock_release();
        }

        // The responses land in handle_read_attr_resp; a missing peer
        // simply never answers.
        log::debug!("mesh: settings query sent (tsn {})", tsn);
        Ok(())
    }

    fn log_bound_devices(&self) {
        let mut req = ZdoMgmtBindParam {
            start_index: 0,
            dst_addr: unsafe { esp_zb_get_short_address() },
        };
        unsafe {
            esp_zb_zdo_binding_table_req(&mut req, Some(binding_table_cb), core::ptr::null_mut());
        }
    }

    fn factory_reset(&mut self) {
        warn!("mesh: factory reset, erasing pairing state and rebooting");
        unsafe {
            esp_zb_factory_reset();
            esp_idf_svc::sys::esp_restart();
        }
    }

    fn on_light_change(&mut self, handler: fn(bool)) {
        if let Ok(mut slot) = LIGHT_HANDLER.lock() {
            *slot = Some(handler);
        }
    }

    fn on_identify(&mut self, handler: fn(u16)) {
        if let Ok(mut slot) = IDENTIFY_HANDLER.lock() {
            *slot = Some(handler);
        }
    }

    fn on_sensor_config(&mut self, handler: fn(f32, f32, f32)) {
        if let Ok(mut slot) = SENSOR_CONFIG_HANDLER.lock() {
            *slot = Some(handler);
        }
    }
}
