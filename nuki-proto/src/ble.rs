//! BLE GATT service and characteristic UUIDs
//!
//! Each device family exposes a plaintext pairing service and an encrypted
//! keyturner service. Both have a single characteristic used for writes and
//! indications.

use uuid::Uuid;

/// Smart Lock pairing service: a92ee100-5501-11e4-916c-0800200c9a66
pub const LOCK_PAIRING_SERVICE_UUID: &str = "a92ee100-5501-11e4-916c-0800200c9a66";
/// Smart Lock pairing characteristic (plaintext, write/indicate)
pub const LOCK_PAIRING_CHAR_UUID: &str = "a92ee101-5501-11e4-916c-0800200c9a66";
/// Smart Lock keyturner service
pub const LOCK_SERVICE_UUID: &str = "a92ee200-5501-11e4-916c-0800200c9a66";
/// Smart Lock user-specific data input/output characteristic (encrypted)
pub const LOCK_CHAR_UUID: &str = "a92ee202-5501-11e4-916c-0800200c9a66";

pub const OPENER_PAIRING_SERVICE_UUID: &str = "a92ae100-5501-11e4-916c-0800200c9a66";
pub const OPENER_PAIRING_CHAR_UUID: &str = "a92ae101-5501-11e4-916c-0800200c9a66";
pub const OPENER_SERVICE_UUID: &str = "a92ae200-5501-11e4-916c-0800200c9a66";
pub const OPENER_CHAR_UUID: &str = "a92ae202-5501-11e4-916c-0800200c9a66";

pub const LOCK_PAIRING_SERVICE: Uuid = Uuid::from_u128(0xa92ee100_5501_11e4_916c_0800200c9a66);
pub const LOCK_PAIRING_CHAR: Uuid = Uuid::from_u128(0xa92ee101_5501_11e4_916c_0800200c9a66);
pub const LOCK_SERVICE: Uuid = Uuid::from_u128(0xa92ee200_5501_11e4_916c_0800200c9a66);
pub const LOCK_CHAR: Uuid = Uuid::from_u128(0xa92ee202_5501_11e4_916c_0800200c9a66);

pub const OPENER_PAIRING_SERVICE: Uuid = Uuid::from_u128(0xa92ae100_5501_11e4_916c_0800200c9a66);
pub const OPENER_PAIRING_CHAR: Uuid = Uuid::from_u128(0xa92ae101_5501_11e4_916c_0800200c9a66);
pub const OPENER_SERVICE: Uuid = Uuid::from_u128(0xa92ae200_5501_11e4_916c_0800200c9a66);
pub const OPENER_CHAR: Uuid = Uuid::from_u128(0xa92ae202_5501_11e4_916c_0800200c9a66);

/// Apple company identifier carrying the iBeacon advertisement
pub const APPLE_COMPANY_ID: u16 = 0x004c;

/// First manufacturer-data byte of an iBeacon frame; HomeKit frames differ
pub const IBEACON_TYPE: u8 = 0x02;
