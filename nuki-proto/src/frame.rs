//! CRC and frame layouts
//!
//! Plain frame: `command || payload || crc16`.
//! Encrypted frame: `nonce(24) || auth_id(4) || len(2) || ciphertext`, where
//! the ciphertext opens to `auth_id || command || payload || crc16`.

use crate::codec::{DecodeError, Reader, Wire, Writer};
use crate::command::Command;

/// CRC-16 with polynomial 0x1021, initial value 0xffff, no reflection
const CRC16: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);

pub const NONCE_LEN: usize = 24;
pub const AUTH_ID_LEN: usize = 4;
pub const HEADER_LEN: usize = NONCE_LEN + AUTH_ID_LEN + 2;

pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Appends the little-endian CRC of everything already in `buf`
pub fn append_crc(buf: &mut Vec<u8>) {
    let crc = crc16(buf);
    buf.extend_from_slice(&crc.to_le_bytes());
}

/// Verifies the trailing CRC and returns the bytes it covers
pub fn check_crc(data: &[u8]) -> Result<&[u8], DecodeError> {
    if data.len() < 2 {
        return Err(DecodeError::Truncated {
            needed: 2,
            remaining: data.len(),
        });
    }
    let (body, tail) = data.split_at(data.len() - 2);
    let expected = u16::from_le_bytes([tail[0], tail[1]]);
    let actual = crc16(body);
    if expected != actual {
        return Err(DecodeError::CrcMismatch { expected, actual });
    }
    Ok(body)
}

/// Unauthenticated frame for the pairing characteristic
pub fn build_plain(command: Command, payload: &[u8]) -> Vec<u8> {
    let mut w = Writer::with_capacity(payload.len() + 4);
    command.encode(&mut w);
    w.put(payload);
    let mut buf = w.into_bytes();
    append_crc(&mut buf);
    buf
}

/// Inner plaintext of an authenticated frame, before encryption
pub fn build_envelope(auth_id: [u8; 4], command: Command, payload: &[u8]) -> Vec<u8> {
    let mut w = Writer::with_capacity(payload.len() + 8);
    w.put(&auth_id);
    command.encode(&mut w);
    w.put(payload);
    let mut buf = w.into_bytes();
    append_crc(&mut buf);
    buf
}

/// Outer layout of an authenticated message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFrame {
    pub nonce: [u8; NONCE_LEN],
    pub auth_id: [u8; AUTH_ID_LEN],
    /// Secretbox output, authentication tag first
    pub ciphertext: Vec<u8>,
}

impl EncryptedFrame {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(HEADER_LEN + self.ciphertext.len());
        w.put(&self.nonce);
        w.put(&self.auth_id);
        (self.ciphertext.len() as u16).encode(&mut w);
        w.put(&self.ciphertext);
        w.into_bytes()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let nonce = r.array()?;
        let auth_id = r.array()?;
        let len = u16::decode(&mut r)? as usize;
        if r.remaining() < len {
            return Err(DecodeError::LengthMismatch {
                declared: len,
                actual: r.remaining(),
            });
        }
        let ciphertext = r.take(len)?.to_vec();
        Ok(Self {
            nonce,
            auth_id,
            ciphertext,
        })
    }
}
