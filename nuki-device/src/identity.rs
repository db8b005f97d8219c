//! Key material held for one device, and the NUKI_HOME directory

use std::fs;
use std::path::PathBuf;

use nuki_crypto::{PublicKey, SecretKey, SharedKey};

use crate::config::ConfigError;
use crate::error::Error;

/// Get NUKI_HOME directory, creating it if needed
pub fn nuki_home() -> Result<PathBuf, ConfigError> {
    let home = match std::env::var_os("NUKI_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir().ok_or(ConfigError::NoHome)?.join(".nuki"),
    };

    if !home.exists() {
        fs::create_dir_all(&home)?;
    }

    Ok(home)
}

/// Client key pair, device public key and authorization id.
///
/// The shared key is derived whenever the client key or the device public
/// key changes, so it never goes stale.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    client: SecretKey,
    device_public_key: Option<PublicKey>,
    shared_key: Option<SharedKey>,
    auth_id: Option<[u8; 4]>,
}

impl KeyMaterial {
    pub fn new(client: SecretKey) -> Self {
        Self {
            client,
            device_public_key: None,
            shared_key: None,
            auth_id: None,
        }
    }

    /// Key material of an already paired device
    pub fn paired(client: SecretKey, device_public_key: PublicKey, auth_id: [u8; 4]) -> Self {
        let mut keys = Self::new(client);
        keys.set_device_public_key(device_public_key);
        keys.auth_id = Some(auth_id);
        keys
    }

    pub fn client_key(&self) -> &SecretKey {
        &self.client
    }

    pub fn client_public_key(&self) -> PublicKey {
        self.client.public_key()
    }

    pub fn device_public_key(&self) -> Option<PublicKey> {
        self.device_public_key
    }

    pub fn auth_id(&self) -> Option<[u8; 4]> {
        self.auth_id
    }

    pub fn shared_key(&self) -> Option<&SharedKey> {
        self.shared_key.as_ref()
    }

    pub fn set_client_key(&mut self, client: SecretKey) {
        self.client = client;
        self.derive();
    }

    pub fn set_device_public_key(&mut self, key: PublicKey) {
        self.device_public_key = Some(key);
        self.derive();
    }

    pub fn set_auth_id(&mut self, auth_id: [u8; 4]) {
        self.auth_id = Some(auth_id);
    }

    /// Auth id and shared key, both required for encrypted commands
    pub fn authenticated(&self) -> Result<([u8; 4], &SharedKey), Error> {
        match (self.auth_id, &self.shared_key) {
            (Some(auth_id), Some(key)) => Ok((auth_id, key)),
            _ => Err(Error::NotPaired),
        }
    }

    fn derive(&mut self) {
        self.shared_key = self
            .device_public_key
            .map(|device| self.client.shared_key(&device));
    }
}
