//! btleplug backed BLE transport for Nuki devices
//!
//! # Example
//!
//! ```ignore
//! use nuki_ble::ble;
//! use nuki_device::{DeviceRecord, NukiDevice, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = ble::get_adapter().await?;
//!     for adv in ble::scan(&adapter, 5).await? {
//!         println!("{} {:?}", adv.address, adv.rssi);
//!     }
//!
//!     let record = DeviceRecord::new("54:D2:72:AB:CD:EF", 0x0c0ffee, "nuki-ctl");
//!     let transport = ble::connect_transport(&adapter, &record.address).await?;
//!     let lock = NukiDevice::from_record(transport, &record, SessionConfig::default());
//!     lock.pair().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod ble;

pub use ble::BtleplugTransport;
