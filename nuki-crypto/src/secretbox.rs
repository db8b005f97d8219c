//! XSalsa20-Poly1305 secretbox and authenticated frames

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use rand::RngCore;

use nuki_proto::frame::{NONCE_LEN, build_envelope};
use nuki_proto::{Command, DecodeError, EncryptedFrame, Message, Model};

use crate::keys::SharedKey;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Authentication tag did not verify: corrupted frame, wrong key or tampering
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("malformed frame: {0}")]
    Malformed(#[from] DecodeError),
}

impl SharedKey {
    fn cipher(&self) -> XSalsa20Poly1305 {
        XSalsa20Poly1305::new(Key::from_slice(self.as_bytes()))
    }

    /// Returns `tag || ciphertext`
    pub fn encrypt(&self, nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Vec<u8> {
        self.cipher()
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .expect("secretbox encryption is infallible for in-memory buffers")
    }

    pub fn decrypt(&self, nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

pub fn random_nonce<const N: usize>() -> [u8; N] {
    let mut nonce = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Builds `nonce || auth_id || len || secretbox(auth_id || command || payload || crc)`
pub fn build_authenticated(auth_id: [u8; 4], key: &SharedKey, command: Command, payload: &[u8]) -> Vec<u8> {
    seal(auth_id, key, &build_envelope(auth_id, command, payload))
}

/// Encrypts an already built envelope under a fresh nonce
pub fn seal(auth_id: [u8; 4], key: &SharedKey, envelope: &[u8]) -> Vec<u8> {
    let nonce = random_nonce();
    EncryptedFrame {
        nonce,
        auth_id,
        ciphertext: key.encrypt(&nonce, envelope),
    }
    .to_bytes()
}

/// Opens an encrypted frame and decodes the message inside
pub fn open_authenticated(key: &SharedKey, data: &[u8], model: Model) -> Result<([u8; 4], Message), CryptoError> {
    let frame = EncryptedFrame::from_bytes(data)?;
    let plaintext = key.decrypt(&frame.nonce, &frame.ciphertext)?;
    Ok(Message::decode_envelope(&plaintext, model)?)
}
