//! Device configuration, plain and advanced, per device family

use crate::codec::{DecodeError, PaddedString, Reader, Wire, Writer};
use crate::model::{Model, OpenerButtonAction, SmartLockButtonAction};
use crate::types::{AdvertisingMode, BatteryType, DateTime, Time};

wire_struct! {
    pub struct SmartLockConfig {
        pub nuki_id: u32,
        pub name: PaddedString<32>,
        pub latitude: f32,
        pub longitude: f32,
        pub auto_unlatch: u8,
        pub pairing_enabled: u8,
        pub button_enabled: u8,
        pub led_enabled: u8,
        pub led_brightness: u8,
        pub current_time: DateTime,
        pub timezone_offset: i16,
        pub dst_mode: u8,
        pub has_fob: u8,
        pub fob_action_1: u8,
        pub fob_action_2: u8,
        pub fob_action_3: u8,
        pub single_lock: u8,
        pub advertising_mode: AdvertisingMode,
        pub has_keypad: u8,
        pub firmware_version: [u8; 3],
        pub hardware_revision: [u8; 2],
        pub homekit_status: u8,
        pub timezone_id: u16,
        pub undocumented: Option<u8>,
        pub undocumented2: Option<u8>,
        pub has_keypad_v2: Option<u8>,
    }
}

wire_struct! {
    pub struct OpenerConfig {
        pub nuki_id: u32,
        pub name: PaddedString<32>,
        pub latitude: f32,
        pub longitude: f32,
        pub capabilities: u8,
        pub pairing_enabled: u8,
        pub button_enabled: u8,
        pub led_enabled: u8,
        pub current_time: DateTime,
        pub timezone_offset: i16,
        pub dst_mode: u8,
        pub has_fob: u8,
        pub fob_action_1: u8,
        pub fob_action_2: u8,
        pub fob_action_3: u8,
        pub operating_mode: u8,
        pub advertising_mode: AdvertisingMode,
        pub has_keypad: u8,
        pub firmware_version: [u8; 3],
        pub hardware_revision: [u8; 2],
        pub timezone_id: u16,
        pub undocumented: Option<u8>,
        pub undocumented2: Option<u8>,
        pub has_keypad_v2: Option<u8>,
    }
}

/// Configuration as returned by `CONFIG`
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Config {
    SmartLock(SmartLockConfig),
    Opener(OpenerConfig),
}

impl Config {
    pub fn model(&self) -> Model {
        match self {
            Config::SmartLock(_) => Model::SmartLock,
            Config::Opener(_) => Model::Opener,
        }
    }

    pub fn nuki_id(&self) -> u32 {
        match self {
            Config::SmartLock(c) => c.nuki_id,
            Config::Opener(c) => c.nuki_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Config::SmartLock(c) => c.name.as_str(),
            Config::Opener(c) => c.name.as_str(),
        }
    }

    pub fn coordinates(&self) -> (f32, f32) {
        match self {
            Config::SmartLock(c) => (c.latitude, c.longitude),
            Config::Opener(c) => (c.latitude, c.longitude),
        }
    }

    pub fn pairing_enabled(&self) -> bool {
        match self {
            Config::SmartLock(c) => c.pairing_enabled != 0,
            Config::Opener(c) => c.pairing_enabled != 0,
        }
    }

    pub fn button_enabled(&self) -> bool {
        match self {
            Config::SmartLock(c) => c.button_enabled != 0,
            Config::Opener(c) => c.button_enabled != 0,
        }
    }

    pub fn led_enabled(&self) -> bool {
        match self {
            Config::SmartLock(c) => c.led_enabled != 0,
            Config::Opener(c) => c.led_enabled != 0,
        }
    }

    pub fn has_keypad(&self) -> bool {
        let (v1, v2) = match self {
            Config::SmartLock(c) => (c.has_keypad, c.has_keypad_v2),
            Config::Opener(c) => (c.has_keypad, c.has_keypad_v2),
        };
        v1 != 0 || v2.is_some_and(|v| v != 0)
    }

    /// Firmware version formatted as `major.minor.patch`
    pub fn firmware_version(&self) -> String {
        let v = match self {
            Config::SmartLock(c) => c.firmware_version,
            Config::Opener(c) => c.firmware_version,
        };
        format!("{}.{}.{}", v[0], v[1], v[2])
    }

    pub fn hardware_revision(&self) -> String {
        let v = match self {
            Config::SmartLock(c) => c.hardware_revision,
            Config::Opener(c) => c.hardware_revision,
        };
        format!("{}.{}", v[0], v[1])
    }
}

impl Wire for Config {
    fn encode(&self, w: &mut Writer) {
        match self {
            Config::SmartLock(c) => c.encode(w),
            Config::Opener(c) => c.encode(w),
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(match r.model() {
            Model::SmartLock => Config::SmartLock(SmartLockConfig::decode(r)?),
            Model::Opener => Config::Opener(OpenerConfig::decode(r)?),
        })
    }
}

wire_struct! {
    pub struct SmartLockAdvancedConfig {
        pub total_degrees: u16,
        pub unlocked_position_offset_degrees: i16,
        pub locked_position_offset_degrees: i16,
        pub single_locked_position_offset_degrees: i16,
        pub unlocked_to_locked_transition_offset_degrees: i16,
        pub lock_n_go_timeout: u8,
        pub single_button_press_action: SmartLockButtonAction,
        pub double_button_press_action: SmartLockButtonAction,
        pub detached_cylinder: u8,
        pub battery_type: BatteryType,
        pub automatic_battery_type_detection: u8,
        pub unlatch_duration: u8,
        pub auto_lock_timeout: u16,
        pub auto_unlock_disabled: u8,
        pub night_mode_enabled: u8,
        pub night_mode_start_time: Time,
        pub night_mode_end_time: Time,
        pub night_mode_auto_lock_enabled: u8,
        pub night_mode_auto_unlock_disabled: u8,
        pub night_mode_immediate_lock_on_start: u8,
        pub auto_lock_enabled: u8,
        pub immediate_auto_lock_enabled: u8,
        pub auto_update_enabled: u8,
    }
}

wire_struct! {
    pub struct OpenerAdvancedConfig {
        pub intercom_id: u16,
        pub bus_mode_switch: u8,
        pub short_circuit_duration: u16,
        pub electric_strike_delay: u16,
        pub random_electric_strike_delay: u8,
        pub electric_strike_duration: u16,
        pub disable_rto_after_ring: u8,
        pub rto_timeout: u8,
        pub unknown: u8,
        pub doorbell_suppression: u8,
        pub doorbell_suppression_duration: u16,
        pub sound_ring: u8,
        pub sound_open: u8,
        pub sound_rto: u8,
        pub sound_cm: u8,
        pub sound_confirmation: u8,
        pub sound_level: u8,
        pub single_button_press_action: OpenerButtonAction,
        pub double_button_press_action: OpenerButtonAction,
        pub battery_type: BatteryType,
        pub automatic_battery_type_detection: u8,
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum AdvancedConfig {
    SmartLock(SmartLockAdvancedConfig),
    Opener(OpenerAdvancedConfig),
}

impl AdvancedConfig {
    pub fn battery_type(&self) -> BatteryType {
        match self {
            AdvancedConfig::SmartLock(c) => c.battery_type,
            AdvancedConfig::Opener(c) => c.battery_type,
        }
    }
}

impl Wire for AdvancedConfig {
    fn encode(&self, w: &mut Writer) {
        match self {
            AdvancedConfig::SmartLock(c) => c.encode(w),
            AdvancedConfig::Opener(c) => c.encode(w),
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(match r.model() {
            Model::SmartLock => AdvancedConfig::SmartLock(SmartLockAdvancedConfig::decode(r)?),
            Model::Opener => AdvancedConfig::Opener(OpenerAdvancedConfig::decode(r)?),
        })
    }
}
