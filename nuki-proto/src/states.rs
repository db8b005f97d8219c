use crate::model::{LockAction, LockState};
use crate::types::{ActionTrigger, BatteryState, CompletionStatus, DateTime, DoorSensorState, NukiState};

wire_struct! {
    /// Snapshot of the keyturner, sent on request and pushed unsolicited
    pub struct KeyturnerStates {
        pub nuki_state: NukiState,
        pub lock_state: LockState,
        pub trigger: ActionTrigger,
        pub current_time: DateTime,
        pub timezone_offset: i16,
        pub critical_battery_state: BatteryState,
        pub config_update_count: u8,
        /// Lock 'n' Go timer on a Smart Lock, ring to open timer on an Opener
        pub lock_n_go_timer: u8,
        pub last_lock_action: LockAction,
        pub last_lock_action_trigger: ActionTrigger,
        pub last_lock_action_completion_status: CompletionStatus,
        pub door_sensor_state: DoorSensorState,
        pub nightmode_active: Option<u16>,
        pub accessory_battery_state: Option<u8>,
    }
}
