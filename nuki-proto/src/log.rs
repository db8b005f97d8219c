//! Activity log and authorization entries

use crate::codec::{DecodeError, PaddedString, Reader, Wire, Writer};
use crate::model::LockAction;
use crate::types::{ActionTrigger, CompletionStatus, DateTime, LogEntryType, Time, Weekdays};

/// Type specific tail of a log entry
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEntryData {
    LoggingEnabled {
        logging_enabled: u8,
    },
    LockAction {
        lock_action: LockAction,
        trigger: ActionTrigger,
        flags: u8,
        completion_status: CompletionStatus,
    },
    KeypadAction {
        lock_action: LockAction,
        source: u8,
        completion_status: CompletionStatus,
        code_id: u16,
    },
    DoorSensor {
        door_status: u8,
    },
}

impl LogEntryData {
    fn encode(&self, w: &mut Writer) {
        match self {
            LogEntryData::LoggingEnabled { logging_enabled } => logging_enabled.encode(w),
            LogEntryData::LockAction {
                lock_action,
                trigger,
                flags,
                completion_status,
            } => {
                lock_action.encode(w);
                trigger.encode(w);
                flags.encode(w);
                completion_status.encode(w);
            }
            LogEntryData::KeypadAction {
                lock_action,
                source,
                completion_status,
                code_id,
            } => {
                lock_action.encode(w);
                source.encode(w);
                completion_status.encode(w);
                code_id.encode(w);
            }
            LogEntryData::DoorSensor { door_status } => door_status.encode(w),
        }
    }

    fn decode(kind: LogEntryType, r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(match kind {
            LogEntryType::LoggingEnabled | LogEntryType::DoorSensorLoggingEnabled => {
                LogEntryData::LoggingEnabled {
                    logging_enabled: u8::decode(r)?,
                }
            }
            LogEntryType::LockAction | LogEntryType::Calibration | LogEntryType::InitializationRun => {
                LogEntryData::LockAction {
                    lock_action: LockAction::decode(r)?,
                    trigger: ActionTrigger::decode(r)?,
                    flags: u8::decode(r)?,
                    completion_status: CompletionStatus::decode(r)?,
                }
            }
            LogEntryType::KeypadAction => LogEntryData::KeypadAction {
                lock_action: LockAction::decode(r)?,
                source: u8::decode(r)?,
                completion_status: CompletionStatus::decode(r)?,
                code_id: u16::decode(r)?,
            },
            LogEntryType::DoorSensor => LogEntryData::DoorSensor {
                door_status: u8::decode(r)?,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LogEntry {
    pub index: u32,
    pub timestamp: DateTime,
    pub auth_id: u32,
    pub name: PaddedString<32>,
    #[serde(rename = "type")]
    pub kind: LogEntryType,
    pub data: LogEntryData,
}

impl Wire for LogEntry {
    fn encode(&self, w: &mut Writer) {
        self.index.encode(w);
        self.timestamp.encode(w);
        self.auth_id.encode(w);
        self.name.encode(w);
        self.kind.encode(w);
        self.data.encode(w);
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let index = u32::decode(r)?;
        let timestamp = DateTime::decode(r)?;
        let auth_id = u32::decode(r)?;
        let name = PaddedString::decode(r)?;
        let kind = LogEntryType::decode(r)?;
        let data = LogEntryData::decode(kind, r)?;
        Ok(Self {
            index,
            timestamp,
            auth_id,
            name,
            kind,
            data,
        })
    }
}

wire_struct! {
    pub struct LogEntryCount {
        pub logging_enabled: u8,
        pub count: u16,
        pub door_sensor_enabled: u8,
        pub door_sensor_logging_enabled: u8,
    }
}

wire_struct! {
    pub struct AuthorizationEntry {
        pub auth_id: u32,
        pub id_type: u8,
        pub name: PaddedString<32>,
        pub enabled: u8,
        pub remote_allowed: u8,
        pub date_created: DateTime,
        pub date_last_active: DateTime,
        pub lock_count: u16,
        pub time_limited: u8,
        pub allowed_from_date: DateTime,
        pub allowed_until_date: DateTime,
        pub allowed_weekdays: Weekdays,
        pub allowed_from_time: Time,
        pub allowed_until_time: Time,
    }
}
