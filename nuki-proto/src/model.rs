//! Device families and the enums whose legal values differ between them

use uuid::Uuid;

use crate::ble;
use crate::codec::{DecodeError, Reader, Wire, Writer};

/// Device family, selected once when the device type is known
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    #[default]
    SmartLock,
    Opener,
}

impl Model {
    pub fn pairing_service(self) -> Uuid {
        match self {
            Model::SmartLock => ble::LOCK_PAIRING_SERVICE,
            Model::Opener => ble::OPENER_PAIRING_SERVICE,
        }
    }

    pub fn pairing_char(self) -> Uuid {
        match self {
            Model::SmartLock => ble::LOCK_PAIRING_CHAR,
            Model::Opener => ble::OPENER_PAIRING_CHAR,
        }
    }

    pub fn service(self) -> Uuid {
        match self {
            Model::SmartLock => ble::LOCK_SERVICE,
            Model::Opener => ble::OPENER_SERVICE,
        }
    }

    pub fn char(self) -> Uuid {
        match self {
            Model::SmartLock => ble::LOCK_CHAR,
            Model::Opener => ble::OPENER_CHAR,
        }
    }
}

wire_enum! {
    pub enum DeviceType: u8 {
        SmartLock12 = 0,
        Opener = 2,
        SmartDoor = 3,
        SmartLock3 = 4,
    }
}

impl DeviceType {
    pub fn model(self) -> Model {
        match self {
            DeviceType::Opener => Model::Opener,
            _ => Model::SmartLock,
        }
    }
}

wire_enum! {
    open pub enum SmartLockState: u8 {
        Uncalibrated = 0x00,
        Locked = 0x01,
        Unlocking = 0x02,
        Unlocked = 0x03,
        Locking = 0x04,
        Unlatched = 0x05,
        UnlockedLockNGo = 0x06,
        Unlatching = 0x07,
        Calibration = 0xfc,
        BootRun = 0xfd,
        MotorBlocked = 0xfe,
        Undefined = 0xff,
    }
}

wire_enum! {
    open pub enum OpenerState: u8 {
        Uncalibrated = 0x00,
        Locked = 0x01,
        RtoActive = 0x03,
        Open = 0x05,
        Opening = 0x07,
        Undefined = 0xff,
    }
}

wire_enum! {
    open pub enum SmartLockAction: u8 {
        None = 0x00,
        Unlock = 0x01,
        Lock = 0x02,
        Unlatch = 0x03,
        LockNGo = 0x04,
        LockNGoUnlatch = 0x05,
        FullLock = 0x06,
        FobAction1 = 0x81,
        FobAction2 = 0x82,
        FobAction3 = 0x83,
    }
}

wire_enum! {
    open pub enum OpenerAction: u8 {
        None = 0x00,
        ActivateRto = 0x01,
        DeactivateRto = 0x02,
        ElectricStrikeActuation = 0x03,
        ActivateCm = 0x04,
        DeactivateCm = 0x05,
        FobAction1 = 0x81,
        FobAction2 = 0x82,
        FobAction3 = 0x83,
    }
}

wire_enum! {
    open pub enum SmartLockButtonAction: u8 {
        NoAction = 0x00,
        Intelligent = 0x01,
        Unlock = 0x02,
        Lock = 0x03,
        Unlatch = 0x04,
        LockNGo = 0x05,
        ShowStatus = 0x06,
    }
}

wire_enum! {
    open pub enum OpenerButtonAction: u8 {
        NoAction = 0x00,
        ToggleRto = 0x01,
        ActivateRto = 0x02,
        DeactivateRto = 0x03,
        ToggleCm = 0x04,
        ActivateCm = 0x05,
        DeactivateCm = 0x06,
        Open = 0x07,
    }
}

/// Declares an enum over the two families' value sets, decoded according to
/// the reader's model.
macro_rules! model_enum {
    ($(#[$meta:meta])* $name:ident { $lock:ty, $opener:ty }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
        #[serde(untagged)]
        pub enum $name {
            SmartLock($lock),
            Opener($opener),
        }

        impl $name {
            pub fn model(self) -> Model {
                match self {
                    Self::SmartLock(_) => Model::SmartLock,
                    Self::Opener(_) => Model::Opener,
                }
            }

            pub fn value(self) -> u8 {
                match self {
                    Self::SmartLock(v) => v.value(),
                    Self::Opener(v) => v.value(),
                }
            }
        }

        impl From<$lock> for $name {
            fn from(v: $lock) -> Self {
                Self::SmartLock(v)
            }
        }

        impl From<$opener> for $name {
            fn from(v: $opener) -> Self {
                Self::Opener(v)
            }
        }

        impl Wire for $name {
            fn encode(&self, w: &mut Writer) {
                self.value().encode(w);
            }

            fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
                Ok(match r.model() {
                    Model::SmartLock => Self::SmartLock(<$lock>::decode(r)?),
                    Model::Opener => Self::Opener(<$opener>::decode(r)?),
                })
            }
        }
    };
}

model_enum! {
    /// Motor state reported in keyturner states
    LockState { SmartLockState, OpenerState }
}

model_enum! {
    LockAction { SmartLockAction, OpenerAction }
}

impl LockState {
    /// True while the motor is moving towards a new position
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            LockState::SmartLock(
                SmartLockState::Locking | SmartLockState::Unlocking | SmartLockState::Unlatching
            ) | LockState::Opener(OpenerState::Opening)
        )
    }
}
