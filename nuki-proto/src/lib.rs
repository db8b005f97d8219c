//! Nuki BLE wire protocol - message types, codec and framing
//!
//! Everything here is transport agnostic: bytes in, typed messages out.
//! Encryption lives in `nuki-crypto`, the session in `nuki-device`.

#[macro_use]
mod macros;

pub mod ble;
pub mod codec;
pub mod command;
pub mod config;
pub mod frame;
pub mod log;
pub mod message;
pub mod model;
pub mod request;
pub mod states;
pub mod types;

pub use codec::{DecodeError, PaddedString, Reader, Wire, Writer};
pub use command::{Command, ErrorCode};
pub use config::{AdvancedConfig, Config, OpenerAdvancedConfig, OpenerConfig, SmartLockAdvancedConfig, SmartLockConfig};
pub use frame::{EncryptedFrame, build_envelope, build_plain, check_crc, crc16};
pub use log::{AuthorizationEntry, LogEntry, LogEntryCount, LogEntryData};
pub use message::{AuthorizationId, BatteryReport, Challenge, ErrorReport, Message, Payload, Status};
pub use model::{
    DeviceType, LockAction, LockState, Model, OpenerAction, OpenerButtonAction, OpenerState,
    SmartLockAction, SmartLockButtonAction, SmartLockState,
};
pub use request::{
    AuthorizationAuthenticator, AuthorizationData, AuthorizationIdConfirmation, LockActionRequest,
    RequestAuthorizationEntries, RequestConfig, RequestData, RequestLogEntries, VerifySecurityPin,
};
pub use states::KeyturnerStates;
pub use types::{
    ActionTrigger, AdvertisingMode, BatteryState, BatteryType, ClientType, CompletionStatus,
    DateTime, DoorSensorState, NukiState, SortOrder, StatusCode, Time, Weekdays,
};
