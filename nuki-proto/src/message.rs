//! Decoded messages: a command identifier and the payload it selects

use crate::codec::{DecodeError, Reader, Wire, Writer};
use crate::command::{Command, ErrorCode};
use crate::config::{AdvancedConfig, Config};
use crate::frame::{build_envelope, build_plain, check_crc};
use crate::log::{AuthorizationEntry, LogEntry, LogEntryCount};
use crate::model::{LockAction, Model};
use crate::states::KeyturnerStates;
use crate::types::StatusCode;

wire_struct! {
    pub struct PublicKey {
        pub public_key: [u8; 32],
    }
}

wire_struct! {
    pub struct Challenge {
        pub nonce: [u8; 32],
    }
}

wire_struct! {
    /// Device's answer to `AUTHORIZATION_DATA`
    pub struct AuthorizationId {
        pub authenticator: [u8; 32],
        pub auth_id: [u8; 4],
        pub uuid: [u8; 16],
        pub nonce: [u8; 32],
    }
}

wire_struct! {
    pub struct Status {
        pub status: StatusCode,
    }
}

wire_struct! {
    /// Error code is kept raw so unknown firmware codes still reach the caller
    pub struct ErrorReport {
        pub error_code: u8,
        pub command: u16,
    }
}

impl ErrorReport {
    pub fn code(&self) -> Option<ErrorCode> {
        ErrorCode::from_value(self.error_code)
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_value(self.command)
    }
}

wire_struct! {
    pub struct BatteryReport {
        pub battery_drain: u16,
        pub battery_voltage: u16,
        pub critical_battery_state: u8,
        pub lock_action: LockAction,
        pub start_voltage: u16,
        pub lowest_voltage: u16,
        pub lock_distance: u16,
        pub start_temperature: i8,
        pub max_turn_current: u16,
        pub battery_resistance: u16,
    }
}

/// Payload selected by the command identifier
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Payload {
    PublicKey(PublicKey),
    Challenge(Challenge),
    AuthorizationId(AuthorizationId),
    KeyturnerStates(KeyturnerStates),
    Status(Status),
    ErrorReport(ErrorReport),
    Config(Config),
    AdvancedConfig(AdvancedConfig),
    LogEntry(LogEntry),
    LogEntryCount(LogEntryCount),
    AuthorizationEntry(AuthorizationEntry),
    AuthorizationEntryCount(u16),
    BatteryReport(BatteryReport),
    /// Commands whose payload has no decoded form here
    Raw(Vec<u8>),
}

impl Payload {
    pub fn decode(command: Command, r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(match command {
            Command::PublicKey => Payload::PublicKey(PublicKey::decode(r)?),
            Command::Challenge => Payload::Challenge(Challenge::decode(r)?),
            Command::AuthorizationId => Payload::AuthorizationId(AuthorizationId::decode(r)?),
            Command::KeyturnerStates => Payload::KeyturnerStates(KeyturnerStates::decode(r)?),
            Command::Status => Payload::Status(Status::decode(r)?),
            Command::ErrorReport => Payload::ErrorReport(ErrorReport::decode(r)?),
            Command::Config => Payload::Config(Config::decode(r)?),
            Command::AdvancedConfig => Payload::AdvancedConfig(AdvancedConfig::decode(r)?),
            Command::LogEntry => Payload::LogEntry(LogEntry::decode(r)?),
            Command::LogEntryCount => Payload::LogEntryCount(LogEntryCount::decode(r)?),
            Command::AuthorizationEntry => {
                Payload::AuthorizationEntry(AuthorizationEntry::decode(r)?)
            }
            Command::AuthorizationEntryCount => Payload::AuthorizationEntryCount(u16::decode(r)?),
            Command::BatteryReport => Payload::BatteryReport(BatteryReport::decode(r)?),
            _ => Payload::Raw(r.rest().to_vec()),
        })
    }

    pub fn encode(&self, w: &mut Writer) {
        match self {
            Payload::PublicKey(p) => p.encode(w),
            Payload::Challenge(p) => p.encode(w),
            Payload::AuthorizationId(p) => p.encode(w),
            Payload::KeyturnerStates(p) => p.encode(w),
            Payload::Status(p) => p.encode(w),
            Payload::ErrorReport(p) => p.encode(w),
            Payload::Config(p) => p.encode(w),
            Payload::AdvancedConfig(p) => p.encode(w),
            Payload::LogEntry(p) => p.encode(w),
            Payload::LogEntryCount(p) => p.encode(w),
            Payload::AuthorizationEntry(p) => p.encode(w),
            Payload::AuthorizationEntryCount(p) => p.encode(w),
            Payload::BatteryReport(p) => p.encode(w),
            Payload::Raw(bytes) => w.put(bytes),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.into_bytes()
    }
}

/// A CRC-checked message
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Message {
    pub command: Command,
    pub payload: Payload,
}

impl Message {
    pub fn new(command: Command, payload: Payload) -> Self {
        Self { command, payload }
    }

    /// Decodes `command || payload || crc` received on the pairing characteristic
    pub fn decode_plain(data: &[u8], model: Model) -> Result<Self, DecodeError> {
        let body = check_crc(data)?;
        Self::decode_body(&mut Reader::with_model(body, model))
    }

    /// Decodes the opened plaintext of an encrypted frame,
    /// `auth_id || command || payload || crc`
    pub fn decode_envelope(data: &[u8], model: Model) -> Result<([u8; 4], Self), DecodeError> {
        let body = check_crc(data)?;
        let mut r = Reader::with_model(body, model);
        let auth_id = r.array()?;
        Ok((auth_id, Self::decode_body(&mut r)?))
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let command = Command::decode(r)?;
        let payload = Payload::decode(command, r)?;
        Ok(Self { command, payload })
    }

    pub fn to_plain(&self) -> Vec<u8> {
        build_plain(self.command, &self.payload.to_bytes())
    }

    pub fn to_envelope(&self, auth_id: [u8; 4]) -> Vec<u8> {
        build_envelope(auth_id, self.command, &self.payload.to_bytes())
    }
}
