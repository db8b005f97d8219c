//! Enums and small records shared by both device families

use crate::codec::{DecodeError, Reader, Wire, Writer};

wire_enum! {
    /// Operating mode of the device
    open pub enum NukiState: u8 {
        Uninitialized = 0x00,
        PairingMode = 0x01,
        DoorMode = 0x02,
        ContinuousMode = 0x03,
        MaintenanceMode = 0x04,
    }
}

wire_enum! {
    open pub enum ActionTrigger: u8 {
        System = 0x00,
        Manual = 0x01,
        Button = 0x02,
        Automatic = 0x03,
        AutoLock = 0x06,
    }
}

wire_enum! {
    open pub enum CompletionStatus: u8 {
        Success = 0x00,
        MotorBlocked = 0x01,
        Canceled = 0x02,
        TooRecent = 0x03,
        Busy = 0x04,
        LowMotorVoltage = 0x05,
        ClutchFailure = 0x06,
        MotorPowerFailure = 0x07,
        Incomplete = 0x08,
        OtherError = 0xfe,
        Unknown = 0xff,
    }
}

wire_enum! {
    open pub enum DoorSensorState: u8 {
        Unavailable = 0,
        Deactivated = 1,
        DoorClosed = 2,
        DoorOpened = 3,
        DoorStateUnknown = 4,
        Calibrating = 5,
        Uncalibrated = 16,
        Removed = 240,
        Unknown = 255,
    }
}

wire_enum! {
    /// Result carried by a `STATUS` message
    pub enum StatusCode: u8 {
        Completed = 0x00,
        Accepted = 0x01,
    }
}

wire_enum! {
    pub enum ClientType: u8 {
        App = 0x00,
        Bridge = 0x01,
        Fob = 0x02,
        Keypad = 0x03,
    }
}

wire_enum! {
    pub enum LogEntryType: u8 {
        LoggingEnabled = 0x01,
        LockAction = 0x02,
        Calibration = 0x03,
        InitializationRun = 0x04,
        KeypadAction = 0x05,
        DoorSensor = 0x06,
        DoorSensorLoggingEnabled = 0x07,
    }
}

wire_enum! {
    open pub enum BatteryType: u8 {
        Alkali = 0x00,
        Accumulators = 0x01,
        Lithium = 0x02,
    }
}

wire_enum! {
    open pub enum AdvertisingMode: u8 {
        Automatic = 0x00,
        Normal = 0x01,
        Slow = 0x02,
        Slowest = 0x03,
    }
}

wire_enum! {
    pub enum SortOrder: u8 {
        Ascending = 0x00,
        Descending = 0x01,
    }
}

wire_struct! {
    #[derive(Default)]
    pub struct DateTime {
        pub year: u16,
        pub month: u8,
        pub day: u8,
        pub hour: u8,
        pub minute: u8,
        pub second: u8,
    }
}

impl std::fmt::Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

wire_struct! {
    #[derive(Default)]
    pub struct Time {
        pub hour: u8,
        pub minute: u8,
    }
}

bitflags::bitflags! {
    /// Weekday mask, Monday in bit 6 down to Sunday in bit 0
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    pub struct Weekdays: u8 {
        const MONDAY = 1 << 6;
        const TUESDAY = 1 << 5;
        const WEDNESDAY = 1 << 4;
        const THURSDAY = 1 << 3;
        const FRIDAY = 1 << 2;
        const SATURDAY = 1 << 1;
        const SUNDAY = 1 << 0;
    }
}

impl Wire for Weekdays {
    fn encode(&self, w: &mut Writer) {
        self.bits().encode(w);
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Weekdays::from_bits_truncate(u8::decode(r)?))
    }
}

/// Battery byte of the keyturner states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct BatteryState(pub u8);

impl BatteryState {
    pub fn is_critical(self) -> bool {
        self.0 & 0x01 != 0
    }

    pub fn is_charging(self) -> bool {
        self.0 & 0x02 != 0
    }

    /// Charge level in percent, reported in steps of two
    pub fn percentage(self) -> u8 {
        ((self.0 & 0xfc) >> 2) * 2
    }
}

impl Wire for BatteryState {
    fn encode(&self, w: &mut Writer) {
        self.0.encode(w);
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        u8::decode(r).map(BatteryState)
    }
}
