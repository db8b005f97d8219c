//! Nuki Smart Lock and Opener client over an abstract BLE transport
//!
//! [`NukiDevice`] drives one device: pairing, state and configuration
//! queries, lock actions and log retrieval. It talks through a
//! [`Session`], which owns the connection, the single pending request slot
//! and the retry loop, and reports everything it learns to a
//! [`StateStore`] whose snapshots subscribers receive.
//!
//! The GATT link itself is a [`BleTransport`], implemented by `nuki-ble`
//! for real hardware.

mod advertisement;
mod config;
mod device;
mod error;
mod identity;
mod session;
mod state;
mod transport;

pub use advertisement::{Advertisement, BEACON_DEDUPE_WINDOW, Beacon, BeaconFilter, parse_beacon};
pub use config::{ConfigError, DeviceRecord, SessionConfig};
pub use device::{LOG_PAGE_SIZE, NukiDevice};
pub use error::{Error, TransportError};
pub use identity::{KeyMaterial, nuki_home};
pub use session::{Channel, LinkState, Session};
pub use state::{Callback, DeviceSnapshot, StateStore, Subscription};
pub use transport::{BleTransport, NotificationHandler};

pub use nuki_crypto::{PublicKey, SecretKey};
pub use nuki_proto;
