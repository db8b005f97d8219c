use std::time::Duration;

use nuki_crypto::CryptoError;
use nuki_proto::{Command, DecodeError, ErrorCode, StatusCode};
use uuid::Uuid;

use crate::config::ConfigError;

/// Failure reported by a [`BleTransport`](crate::BleTransport)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport operation timed out")]
    Timeout,
    /// Transient failure of the host Bluetooth stack
    #[error("bluetooth bus error: {0}")]
    Bus(String),
    #[error("not connected")]
    NotConnected,
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("device {0} not found")]
    DeviceNotFound(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Timeouts and bus errors are retried after the short backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Bus(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed message: {0}")]
    Malformed(#[from] DecodeError),
    #[error("decryption failed")]
    DecryptionFailed,
    /// Error report sent by the device
    #[error("device reported {} for {}", describe_code(.code), describe_command(.command))]
    Protocol { code: u8, command: u16 },
    #[error("device is not in pairing mode")]
    PairingRequired,
    /// The device's pairing answer does not carry a valid authenticator
    #[error("device authenticator mismatch")]
    BadAuthenticator,
    #[error("pairing ended with {0:?}")]
    PairingIncomplete(StatusCode),
    #[error("no response within {0:?}")]
    ResponseTimeout(Duration),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("device is not paired")]
    NotPaired,
    #[error("unexpected response {0}")]
    UnexpectedResponse(Command),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// The error code carried by a device error report
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Error::Protocol { code, .. } => ErrorCode::from_value(*code),
            _ => None,
        }
    }

    /// Errors that consume a retry attempt instead of failing the request
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            Error::ResponseTimeout(_) | Error::DecryptionFailed => true,
            Error::Transport(_) => true,
            _ => false,
        }
    }
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptionFailed => Error::DecryptionFailed,
            CryptoError::Malformed(e) => Error::Malformed(e),
        }
    }
}

fn describe_code(code: &u8) -> String {
    match ErrorCode::from_value(*code) {
        Some(c) => c.to_string(),
        None => format!("error 0x{code:02x}"),
    }
}

fn describe_command(command: &u16) -> String {
    match Command::from_value(*command) {
        Some(c) => c.to_string(),
        None => format!("command 0x{command:04x}"),
    }
}
