//! Payloads the client sends

use crate::codec::{DecodeError, PaddedString, Reader, Wire, Writer};
use crate::command::Command;
use crate::model::LockAction;
use crate::types::{ClientType, SortOrder};

wire_struct! {
    /// `REQUEST_DATA`: asks the device to send the given command
    pub struct RequestData {
        pub command: Command,
    }
}

wire_struct! {
    pub struct AuthorizationAuthenticator {
        pub authenticator: [u8; 32],
    }
}

wire_struct! {
    pub struct AuthorizationData {
        pub authenticator: [u8; 32],
        pub id_type: ClientType,
        pub app_id: u32,
        pub name: PaddedString<32>,
        pub nonce: [u8; 32],
    }
}

impl AuthorizationData {
    /// Bytes covered by the authenticator, followed by the device nonce
    pub fn authenticated_part(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(69);
        self.id_type.encode(&mut w);
        self.app_id.encode(&mut w);
        self.name.encode(&mut w);
        self.nonce.encode(&mut w);
        w.into_bytes()
    }
}

wire_struct! {
    pub struct AuthorizationIdConfirmation {
        pub authenticator: [u8; 32],
        pub auth_id: [u8; 4],
    }
}

/// `LOCK_ACTION` payload
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LockActionRequest {
    pub lock_action: LockAction,
    pub app_id: u32,
    pub flags: u8,
    /// Appended to the client name in the device's activity log
    pub name_suffix: Option<PaddedString<20>>,
    pub nonce: [u8; 32],
}

impl Wire for LockActionRequest {
    fn encode(&self, w: &mut Writer) {
        self.lock_action.encode(w);
        self.app_id.encode(w);
        self.flags.encode(w);
        self.name_suffix.encode(w);
        self.nonce.encode(w);
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let lock_action = LockAction::decode(r)?;
        let app_id = u32::decode(r)?;
        let flags = u8::decode(r)?;
        let name_suffix = if r.remaining() >= 20 + 32 {
            Some(PaddedString::decode(r)?)
        } else {
            None
        };
        let nonce = r.array()?;
        Ok(Self {
            lock_action,
            app_id,
            flags,
            name_suffix,
            nonce,
        })
    }
}

wire_struct! {
    /// `REQUEST_CONFIG` and `REQUEST_ADVANCED_CONFIG`
    pub struct RequestConfig {
        pub nonce: [u8; 32],
    }
}

wire_struct! {
    pub struct VerifySecurityPin {
        pub nonce: [u8; 32],
        pub pin: u16,
    }
}

wire_struct! {
    pub struct RequestLogEntries {
        pub start_index: u32,
        pub count: u16,
        pub sort_order: SortOrder,
        /// Non-zero asks for a `LOG_ENTRY_COUNT` before the entries
        pub total_count: u8,
        pub nonce: [u8; 32],
        pub pin: u16,
    }
}

wire_struct! {
    pub struct RequestAuthorizationEntries {
        pub offset: u16,
        pub count: u16,
        pub nonce: [u8; 32],
        pub pin: u16,
    }
}
