//! Scanning and GATT access through btleplug
//!
//! [`BtleplugTransport`] adapts one btleplug peripheral to
//! [`BleTransport`]. Indications arrive on a single btleplug stream per
//! peripheral; a spawned task forwards them to the session's handler.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use nuki_device::{Advertisement, BleTransport, Beacon, NotificationHandler, TransportError, parse_beacon};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long [`connect_transport`] looks for the device
pub const FIND_TIMEOUT: Duration = Duration::from_secs(10);

const FIND_POLL: Duration = Duration::from_millis(500);

/// A device seen during a scan
#[derive(Debug, Clone)]
pub struct Discovered {
    pub name: String,
    pub advertisement: Advertisement,
    pub beacon: Option<Beacon>,
}

impl Discovered {
    pub fn is_nuki(&self) -> bool {
        self.beacon.is_some() || self.name.starts_with("Nuki")
    }
}

fn bus(e: btleplug::Error) -> TransportError {
    match e {
        btleplug::Error::NotConnected => TransportError::NotConnected,
        btleplug::Error::TimedOut(_) => TransportError::Timeout,
        btleplug::Error::DeviceNotFound => TransportError::DeviceNotFound(String::new()),
        e => TransportError::Bus(e.to_string()),
    }
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new().await.map_err(bus)?;
    let adapters = manager.adapters().await.map_err(bus)?;
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::Other("no Bluetooth adapter found".into()))
}

async fn discovered(peripheral: &Peripheral) -> Result<Option<Discovered>, TransportError> {
    let Some(props) = peripheral.properties().await.map_err(bus)? else {
        return Ok(None);
    };
    let advertisement = Advertisement {
        address: peripheral.address().to_string(),
        rssi: props.rssi,
        manufacturer_data: props.manufacturer_data,
        service_uuids: props.services,
    };
    Ok(Some(Discovered {
        name: props.local_name.unwrap_or_default(),
        beacon: parse_beacon(&advertisement),
        advertisement,
    }))
}

/// Scans for `duration_secs` and returns every Nuki device seen
pub async fn scan(adapter: &Adapter, duration_secs: u64) -> Result<Vec<Discovered>, TransportError> {
    adapter.start_scan(ScanFilter::default()).await.map_err(bus)?;
    tokio::time::sleep(Duration::from_secs(duration_secs)).await;

    let peripherals = adapter.peripherals().await.map_err(bus)?;
    let mut devices = Vec::new();
    for peripheral in peripherals {
        if let Some(device) = discovered(&peripheral).await? {
            if device.is_nuki() {
                devices.push(device);
            }
        }
    }

    adapter.stop_scan().await.map_err(bus)?;
    debug!(count = devices.len(), "scan finished");
    Ok(devices)
}

/// Sends every Nuki advertisement to `tx` until the receiver is dropped
pub async fn watch(adapter: &Adapter, tx: mpsc::UnboundedSender<Advertisement>) -> Result<(), TransportError> {
    let mut events = adapter.events().await.map_err(bus)?;
    adapter.start_scan(ScanFilter::default()).await.map_err(bus)?;

    while let Some(event) = events.next().await {
        let id = match event {
            CentralEvent::ManufacturerDataAdvertisement { id, .. } => id,
            CentralEvent::DeviceUpdated(id) => id,
            _ => continue,
        };
        let peripheral = adapter.peripheral(&id).await.map_err(bus)?;
        let Some(device) = discovered(&peripheral).await? else {
            continue;
        };
        if device.beacon.is_some() && tx.send(device.advertisement).is_err() {
            break;
        }
    }

    adapter.stop_scan().await.map_err(bus)
}

/// Find a device by address
pub async fn find_device(adapter: &Adapter, address: &str, timeout: Duration) -> Result<Peripheral, TransportError> {
    adapter.start_scan(ScanFilter::default()).await.map_err(bus)?;
    let deadline = tokio::time::Instant::now() + timeout;

    let found = loop {
        let peripherals = adapter.peripherals().await.map_err(bus)?;
        if let Some(peripheral) = peripherals
            .into_iter()
            .find(|p| p.address().to_string().eq_ignore_ascii_case(address))
        {
            break Some(peripheral);
        }
        if tokio::time::Instant::now() >= deadline {
            break None;
        }
        tokio::time::sleep(FIND_POLL).await;
    };

    adapter.stop_scan().await.map_err(bus)?;
    found.ok_or_else(|| TransportError::DeviceNotFound(address.to_string()))
}

/// Finds the device at `address` and wraps it in a transport
pub async fn connect_transport(adapter: &Adapter, address: &str) -> Result<BtleplugTransport, TransportError> {
    let peripheral = find_device(adapter, address, FIND_TIMEOUT).await?;
    info!(address, "found device");
    Ok(BtleplugTransport::new(peripheral))
}

pub struct BtleplugTransport {
    peripheral: Peripheral,
    handler: Arc<Mutex<Option<NotificationHandler>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugTransport {
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            handler: Arc::new(Mutex::new(None)),
            listener: Mutex::new(None),
        }
    }

    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }

    async fn listen(&self) -> Result<(), TransportError> {
        let mut notifications = self.peripheral.notifications().await.map_err(bus)?;
        let handler = self.handler.clone();
        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let handler = handler
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                match handler {
                    Some(handler) => handler(notification.uuid, &notification.value),
                    None => debug!(uuid = %notification.uuid, "notification without handler"),
                }
            }
            debug!("notification stream ended");
        });
        self.stop_listening();
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(())
    }

    fn stop_listening(&self) {
        if let Some(task) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if !self.is_connected().await {
            self.peripheral.connect().await.map_err(bus)?;
        }
        self.peripheral.discover_services().await.map_err(bus)?;
        self.listen().await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.stop_listening();
        self.peripheral.disconnect().await.map_err(bus)
    }

    async fn is_connected(&self) -> bool {
        match self.peripheral.is_connected().await {
            Ok(connected) => connected,
            Err(e) => {
                warn!(%e, "connection state unknown");
                false
            }
        }
    }

    async fn characteristics(&self) -> Result<Vec<Uuid>, TransportError> {
        Ok(self
            .peripheral
            .characteristics()
            .iter()
            .map(|c| c.uuid)
            .collect())
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<(), TransportError> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral
            .write(&characteristic, data, WriteType::WithResponse)
            .await
            .map_err(bus)
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<(), TransportError> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral.subscribe(&characteristic).await.map_err(bus)
    }

    fn set_notification_handler(&self, handler: NotificationHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        self.stop_listening();
    }
}
