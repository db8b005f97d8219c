//! Session tuning and the per-device record persisted in NUKI_HOME

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nuki_crypto::{PublicKey, SecretKey};
use nuki_proto::{ClientType, DeviceType};
use serde::{Deserialize, Serialize};

use crate::identity::KeyMaterial;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no home directory, set NUKI_HOME")]
    NoHome,
    #[error("failed to access device record: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid device record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Retry budget, timeouts and backoff of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Attempts per request, counting the first
    pub retries: u32,
    pub response_timeout: Duration,
    pub connection_timeout: Duration,
    /// Backoff after a timeout or bus error
    pub timeout_backoff: Duration,
    /// Backoff after any other transport error
    pub transport_backoff: Duration,
    /// Age of the cached state after which a poll is due
    pub poll_interval: Duration,
    /// Delay before an opener's failed completion status reads as success again
    pub opener_status_reset: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            response_timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(30),
            timeout_backoff: Duration::from_millis(200),
            transport_backoff: Duration::from_millis(700),
            poll_interval: Duration::from_secs(300),
            opener_status_reset: Duration::from_secs(30),
        }
    }
}

/// Everything needed to talk to a paired device again
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    pub app_id: u32,
    pub client_name: String,
    #[serde(default = "default_client_type")]
    pub client_type: ClientType,
    /// Appended to the client name in the activity log of lock actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_suffix: Option<String>,
    pub client_key: SecretKey,
    #[serde(default)]
    pub device_public_key: Option<PublicKey>,
    #[serde(default, with = "hex_auth_id")]
    pub auth_id: Option<[u8; 4]>,
}

fn default_client_type() -> ClientType {
    ClientType::Bridge
}

impl DeviceRecord {
    /// Record for a device that is yet to be paired, with a fresh client key
    pub fn new(address: &str, app_id: u32, client_name: &str) -> Self {
        Self {
            address: address.to_string(),
            device_type: None,
            app_id,
            client_name: client_name.to_string(),
            client_type: default_client_type(),
            name_suffix: None,
            client_key: SecretKey::generate(),
            device_public_key: None,
            auth_id: None,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.device_public_key.is_some() && self.auth_id.is_some()
    }

    pub fn key_material(&self) -> KeyMaterial {
        let mut keys = KeyMaterial::new(self.client_key.clone());
        if let Some(device) = self.device_public_key {
            keys.set_device_public_key(device);
        }
        if let Some(auth_id) = self.auth_id {
            keys.set_auth_id(auth_id);
        }
        keys
    }

    /// `<home>/devices/<address>.json`, address without separators
    pub fn path(home: &Path, address: &str) -> PathBuf {
        let name: String = address
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        home.join("devices").join(format!("{name}.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Every record saved under `home`
    pub fn list(home: &Path) -> Result<Vec<Self>, ConfigError> {
        let dir = home.join("devices");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                records.push(Self::load(&path)?);
            }
        }
        records.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(records)
    }
}

mod hex_auth_id {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(opt: &Option<[u8; 4]>, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        match opt {
            Some(bytes) => serializer.serialize_some(&data_encoding::HEXLOWER.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 4]>, D::Error>
    where D: Deserializer<'de> {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => {
                let bytes = data_encoding::HEXLOWER_PERMISSIVE.decode(s.as_bytes())
                    .map_err(serde::de::Error::custom)?;
                let arr: [u8; 4] = bytes.try_into()
                    .map_err(|_| serde::de::Error::custom("expected 4 bytes"))?;
                Ok(Some(arr))
            }
            None => Ok(None),
        }
    }
}
