//! Nuki key material and the NaCl box construction the devices speak
//!
//! The client and the device each hold a Curve25519 key pair. The shared key
//! is `crypto_box_beforenm` of the two, used both for the XSalsa20-Poly1305
//! secretbox around every authenticated frame and as the HMAC-SHA256 key of
//! the pairing authenticators.

mod keys;
mod secretbox;

pub use keys::{KeyError, PublicKey, SecretKey, SharedKey};
pub use secretbox::{CryptoError, build_authenticated, open_authenticated, random_nonce, seal};
