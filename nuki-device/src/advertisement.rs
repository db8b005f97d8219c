//! iBeacon advertisements broadcast by Nuki devices

use std::collections::HashMap;
use std::time::Duration;

use nuki_proto::ble::{APPLE_COMPANY_ID, IBEACON_TYPE, OPENER_PAIRING_SERVICE};
use nuki_proto::DeviceType;
use tokio::time::Instant;
use uuid::Uuid;

/// Beacons closer together than this are the same broadcast
pub const BEACON_DEDUPE_WINDOW: Duration = Duration::from_secs(1);

/// One advertisement as reported by the scanner
#[derive(Debug, Clone, Default)]
pub struct Advertisement {
    pub address: String,
    pub rssi: Option<i16>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub service_uuids: Vec<Uuid>,
}

/// What a Nuki iBeacon says without connecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beacon {
    /// Device type guessed from the advertised services
    pub device_type: DeviceType,
    /// The device has news since it was last polled
    pub state_changed: bool,
    pub rssi: Option<i16>,
}

/// Parses the Apple manufacturer data of `adv`. HomeKit advertisements and
/// advertisements without manufacturer data yield `None`.
pub fn parse_beacon(adv: &Advertisement) -> Option<Beacon> {
    let data = adv.manufacturer_data.get(&APPLE_COMPANY_ID)?;
    if data.first() != Some(&IBEACON_TYPE) {
        return None;
    }
    // last byte is the tx power, bit 0 flags a state change
    let tx_power = *data.last()?;
    let device_type = if adv.service_uuids.contains(&OPENER_PAIRING_SERVICE) {
        DeviceType::Opener
    } else {
        DeviceType::SmartLock12
    };
    Some(Beacon {
        device_type,
        state_changed: tx_power & 0x01 != 0,
        rssi: adv.rssi,
    })
}

/// Drops repeated beacons of one broadcast burst
#[derive(Debug, Default)]
pub struct BeaconFilter {
    last: Option<Instant>,
}

impl BeaconFilter {
    /// True when a beacon was accepted less than a second before `now`.
    /// Only accepted beacons restart the window.
    pub fn seen_recently(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) <= BEACON_DEDUPE_WINDOW => true,
            _ => {
                self.last = Some(now);
                false
            }
        }
    }
}
