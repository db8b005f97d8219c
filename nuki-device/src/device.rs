//! High level operations on one Nuki device

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use nuki_crypto::{PublicKey, random_nonce};
use nuki_proto::{
    AdvancedConfig, AuthorizationAuthenticator, AuthorizationData, AuthorizationEntry,
    AuthorizationIdConfirmation, BatteryReport, ClientType, Command, Config, DeviceType, ErrorCode,
    LockAction, LockActionRequest, LockState, LogEntry, Message, Model, OpenerAction, OpenerState,
    PaddedString, Payload, RequestAuthorizationEntries, RequestConfig, RequestData,
    RequestLogEntries, SmartLockAction, SmartLockState, SortOrder, StatusCode, VerifySecurityPin,
    Wire,
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};

use crate::advertisement::{Advertisement, BeaconFilter, parse_beacon};
use crate::config::{DeviceRecord, SessionConfig};
use crate::error::Error;
use crate::session::{Channel, LinkState, Session};
use crate::state::{Callback, DeviceSnapshot, Subscription};
use crate::transport::BleTransport;

/// Entries requested per page by [`NukiDevice::request_log_history`]
pub const LOG_PAGE_SIZE: u16 = 20;

/// Takes the payload variant out of a message, or fails with the command
/// that arrived instead
macro_rules! payload {
    ($msg:expr, $variant:ident) => {{
        let msg: Message = $msg;
        match msg.payload {
            Payload::$variant(p) => Ok(p),
            _ => Err(Error::UnexpectedResponse(msg.command)),
        }
    }};
}

/// Who this client is to the device
#[derive(Debug, Clone)]
struct Client {
    app_id: u32,
    name: String,
    client_type: ClientType,
    name_suffix: Option<String>,
}

/// A Nuki Smart Lock or Opener.
///
/// Public operations are serialized by an operation lock, so challenge and
/// command of one operation are never interleaved with another's.
/// `update_state` and `update_config` are single flight: a call made while
/// one is running returns at once.
pub struct NukiDevice<T: BleTransport> {
    address: String,
    client: Client,
    session: Session<T>,
    operation: AsyncMutex<()>,
    updating_state: AsyncMutex<()>,
    updating_config: AsyncMutex<()>,
    beacons: Mutex<BeaconFilter>,
    poll_requested: AtomicBool,
}

impl<T: BleTransport> NukiDevice<T> {
    pub fn from_record(transport: T, record: &DeviceRecord, config: SessionConfig) -> Self {
        Self {
            address: record.address.clone(),
            client: Client {
                app_id: record.app_id,
                name: record.client_name.clone(),
                client_type: record.client_type,
                name_suffix: record.name_suffix.clone(),
            },
            session: Session::new(transport, record.key_material(), record.device_type, config),
            operation: AsyncMutex::new(()),
            updating_state: AsyncMutex::new(()),
            updating_config: AsyncMutex::new(()),
            beacons: Mutex::new(BeaconFilter::default()),
            poll_requested: AtomicBool::new(false),
        }
    }

    /// Current keys and identity, for persisting after pairing
    pub fn to_record(&self) -> DeviceRecord {
        let keys = self.session.keys();
        DeviceRecord {
            address: self.address.clone(),
            device_type: self.session.device_type(),
            app_id: self.client.app_id,
            client_name: self.client.name.clone(),
            client_type: self.client.client_type,
            name_suffix: self.client.name_suffix.clone(),
            client_key: keys.client_key().clone(),
            device_public_key: keys.device_public_key(),
            auth_id: keys.auth_id(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        self.session.device_type()
    }

    pub fn model(&self) -> Model {
        self.session.model()
    }

    pub fn is_paired(&self) -> bool {
        self.session.keys().authenticated().is_ok()
    }

    pub fn link_state(&self) -> LinkState {
        self.session.link_state()
    }

    pub fn state(&self) -> Arc<DeviceSnapshot> {
        self.session.store().snapshot()
    }

    pub fn lock_state(&self) -> Option<LockState> {
        self.state().lock_state
    }

    pub fn config(&self) -> Option<Config> {
        self.state().config.clone()
    }

    pub fn rssi(&self) -> Option<i16> {
        self.state().rssi
    }

    pub fn last_action_status(&self) -> Option<StatusCode> {
        self.state().last_action_status
    }

    pub fn battery_percentage(&self) -> Option<u8> {
        self.state().battery_percentage()
    }

    /// Registers a callback fired after every state change
    pub fn subscribe(&self, callback: Callback) -> Subscription {
        self.session.store().subscribe(callback)
    }

    pub async fn connect(&self) -> Result<(), Error> {
        let _op = self.operation.lock().await;
        self.session.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), Error> {
        let _op = self.operation.lock().await;
        self.session.disconnect().await
    }

    /// Whether the scheduler should call [`update_state`](Self::update_state)
    pub fn poll_needed(&self, since_last_poll: Option<Duration>) -> bool {
        self.poll_requested.load(Ordering::SeqCst)
            || self.state().keyturner.is_none()
            || since_last_poll.is_none_or(|age| age >= self.session.config().poll_interval)
    }

    /// Takes what an advertisement of this device says without connecting.
    /// Returns true when the device state should be fetched.
    pub fn parse_advertisement_data(&self, adv: &Advertisement) -> bool {
        if !adv.address.eq_ignore_ascii_case(&self.address) {
            return false;
        }
        let Some(beacon) = parse_beacon(adv) else {
            debug!(address = %adv.address, "not a Nuki beacon");
            return false;
        };
        let duplicate = self
            .beacons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .seen_recently(tokio::time::Instant::now());
        if duplicate {
            debug!(address = %adv.address, "ignoring duplicate beacon");
            return false;
        }

        info!(address = %adv.address, rssi = ?beacon.rssi, changed = beacon.state_changed, "beacon");
        if self.session.device_type().is_none() {
            self.session.set_device_type(beacon.device_type);
        }
        let store = self.session.store();
        store.update(|s| s.rssi = beacon.rssi);
        store.notify();

        let needed = beacon.state_changed || store.snapshot().keyturner.is_none();
        if needed {
            self.poll_requested.store(true, Ordering::SeqCst);
        }
        needed
    }

    /// [`parse_advertisement_data`](Self::parse_advertisement_data), then
    /// polls if the beacon asks for it. Returns true when it polled.
    pub async fn handle_advertisement(&self, adv: &Advertisement) -> Result<bool, Error> {
        if !self.parse_advertisement_data(adv) {
            return Ok(false);
        }
        self.update_state().await?;
        Ok(true)
    }

    /// Fetches the keyturner states, then the configuration if it changed
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn update_state(&self) -> Result<(), Error> {
        let Ok(_flight) = self.updating_state.try_lock() else {
            debug!("state update already running");
            return Ok(());
        };

        {
            let _op = self.operation.lock().await;
            let request = RequestData {
                command: Command::KeyturnerStates,
            };
            // cached by the notification handler
            self.session
                .request(
                    Channel::Keyturner,
                    Command::RequestData,
                    &request.to_bytes(),
                    Command::KeyturnerStates,
                )
                .await?;
            self.poll_requested.store(false, Ordering::SeqCst);
        }

        if self.session.store().config_refresh_needed() {
            self.update_config().await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn update_config(&self) -> Result<(), Error> {
        let Ok(_flight) = self.updating_config.try_lock() else {
            debug!("config update already running");
            return Ok(());
        };
        let _op = self.operation.lock().await;

        let nonce = self.challenge().await?;
        let msg = self
            .session
            .request(
                Channel::Keyturner,
                Command::RequestConfig,
                &RequestConfig { nonce }.to_bytes(),
                Command::Config,
            )
            .await?;
        let config = payload!(msg, Config)?;
        info!(name = config.name(), firmware = %config.firmware_version(), "configuration");

        let store = self.session.store();
        store.set_config(config);
        store.notify();
        Ok(())
    }

    pub async fn request_advanced_config(&self) -> Result<AdvancedConfig, Error> {
        let _op = self.operation.lock().await;

        let nonce = self.challenge().await?;
        let msg = self
            .session
            .request(
                Channel::Keyturner,
                Command::RequestAdvancedConfig,
                &RequestConfig { nonce }.to_bytes(),
                Command::AdvancedConfig,
            )
            .await?;
        let config = payload!(msg, AdvancedConfig)?;

        let store = self.session.store();
        let cached = config.clone();
        store.update(|s| s.advanced_config = Some(cached));
        store.notify();
        Ok(config)
    }

    pub async fn request_battery_report(&self) -> Result<BatteryReport, Error> {
        let _op = self.operation.lock().await;
        let request = RequestData {
            command: Command::BatteryReport,
        };
        let msg = self
            .session
            .request(
                Channel::Keyturner,
                Command::RequestData,
                &request.to_bytes(),
                Command::BatteryReport,
            )
            .await?;
        payload!(msg, BatteryReport)
    }

    /// Performs `action`. `transitional` is shown as the lock state from the
    /// moment the device hands out the challenge.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn lock_action(
        &self,
        action: LockAction,
        transitional: Option<LockState>,
    ) -> Result<StatusCode, Error> {
        let _op = self.operation.lock().await;
        info!("lock action");

        let nonce = self.challenge().await?;
        let store = self.session.store();
        if let Some(state) = transitional {
            store.update(|s| s.lock_state = Some(state));
            store.notify();
        }

        let request = LockActionRequest {
            lock_action: action,
            app_id: self.client.app_id,
            flags: 0,
            name_suffix: self.client.name_suffix.as_deref().map(PaddedString::new),
            nonce,
        };
        let msg = self
            .session
            .request(
                Channel::Keyturner,
                Command::LockAction,
                &request.to_bytes(),
                Command::Status,
            )
            .await?;
        let status = payload!(msg, Status)?.status;

        store.update(|s| s.last_action_status = Some(status));
        store.notify();
        Ok(status)
    }

    /// Locks a smart lock; deactivates ring to open on an opener
    pub async fn lock(&self) -> Result<StatusCode, Error> {
        let (action, transitional) = match self.model() {
            Model::SmartLock => (
                SmartLockAction::Lock.into(),
                Some(SmartLockState::Locking.into()),
            ),
            Model::Opener => (OpenerAction::DeactivateRto.into(), None),
        };
        self.lock_action(action, transitional).await
    }

    /// Unlocks a smart lock; activates ring to open on an opener
    pub async fn unlock(&self) -> Result<StatusCode, Error> {
        let (action, transitional) = match self.model() {
            Model::SmartLock => (
                SmartLockAction::Unlock.into(),
                Some(SmartLockState::Unlocking.into()),
            ),
            Model::Opener => (OpenerAction::ActivateRto.into(), None),
        };
        self.lock_action(action, transitional).await
    }

    /// Unlatches a smart lock; actuates the electric strike of an opener
    pub async fn unlatch(&self) -> Result<StatusCode, Error> {
        let (action, transitional) = match self.model() {
            Model::SmartLock => (
                SmartLockAction::Unlatch.into(),
                Some(SmartLockState::Unlatching.into()),
            ),
            Model::Opener => (
                OpenerAction::ElectricStrikeActuation.into(),
                Some(OpenerState::Opening.into()),
            ),
        };
        self.lock_action(action, transitional).await
    }

    /// True if the device accepts `pin`
    pub async fn verify_pin(&self, pin: u16) -> Result<bool, Error> {
        let _op = self.operation.lock().await;

        let nonce = self.challenge().await?;
        let request = VerifySecurityPin { nonce, pin };
        match self
            .session
            .request(
                Channel::Keyturner,
                Command::VerifySecurityPin,
                &request.to_bytes(),
                Command::Status,
            )
            .await
        {
            Ok(msg) => Ok(payload!(msg, Status)?.status == StatusCode::Completed),
            Err(e) if e.error_code() == Some(ErrorCode::BadPin) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn request_last_log_entry(&self, pin: u16) -> Result<Option<LogEntry>, Error> {
        let entries = self
            .request_log_entries(pin, 0, 1, SortOrder::Descending)
            .await?;
        Ok(entries.into_iter().next())
    }

    /// One page of the activity log
    pub async fn request_log_entries(
        &self,
        pin: u16,
        start_index: u32,
        count: u16,
        sort_order: SortOrder,
    ) -> Result<Vec<LogEntry>, Error> {
        let _op = self.operation.lock().await;

        let nonce = self.challenge().await?;
        let request = RequestLogEntries {
            start_index,
            count,
            sort_order,
            total_count: 0,
            nonce,
            pin,
        };
        let messages = self
            .session
            .collect(
                Command::RequestLogEntries,
                &request.to_bytes(),
                &[Command::LogEntry, Command::LogEntryCount],
            )
            .await?;
        Ok(messages
            .into_iter()
            .filter_map(|m| match m.payload {
                Payload::LogEntry(entry) => Some(entry),
                _ => None,
            })
            .collect())
    }

    /// Up to `limit` most recent log entries, fetched page by page
    pub async fn request_log_history(&self, pin: u16, limit: usize) -> Result<Vec<LogEntry>, Error> {
        let mut entries = Vec::new();
        while entries.len() < limit {
            let wanted = (limit - entries.len()).min(usize::from(LOG_PAGE_SIZE));
            let start = u32::try_from(entries.len()).unwrap_or(u32::MAX);
            let page = self
                .request_log_entries(pin, start, wanted as u16, SortOrder::Descending)
                .await?;
            let last_page = page.len() < wanted;
            entries.extend(page);
            if last_page {
                break;
            }
        }
        Ok(entries)
    }

    pub async fn request_authorization_entries(
        &self,
        pin: u16,
        offset: u16,
        count: u16,
    ) -> Result<Vec<AuthorizationEntry>, Error> {
        let _op = self.operation.lock().await;

        let nonce = self.challenge().await?;
        let request = RequestAuthorizationEntries {
            offset,
            count,
            nonce,
            pin,
        };
        let messages = self
            .session
            .collect(
                Command::RequestAuthorizationEntries,
                &request.to_bytes(),
                &[Command::AuthorizationEntry, Command::AuthorizationEntryCount],
            )
            .await?;
        Ok(messages
            .into_iter()
            .filter_map(|m| match m.payload {
                Payload::AuthorizationEntry(entry) => Some(entry),
                _ => None,
            })
            .collect())
    }

    /// Authorizes this client with a device in pairing mode and returns the
    /// new authorization id.
    ///
    /// Fails with [`Error::PairingRequired`] when the device is not in
    /// pairing mode, and with [`Error::BadAuthenticator`] when its answer
    /// is not keyed with the shared secret.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn pair(&self) -> Result<[u8; 4], Error> {
        let _op = self.operation.lock().await;
        info!("pairing");
        let session = &self.session;

        let request = RequestData {
            command: Command::PublicKey,
        };
        let msg = session
            .request(
                Channel::Pairing,
                Command::RequestData,
                &request.to_bytes(),
                Command::PublicKey,
            )
            .await?;
        let device_key = PublicKey::from(payload!(msg, PublicKey)?.public_key);
        session.update_keys(|k| k.set_device_public_key(device_key));

        let keys = session.keys();
        let client_key = keys.client_public_key();
        let shared = keys.shared_key().cloned().ok_or(Error::NotPaired)?;

        let msg = session
            .request(
                Channel::Pairing,
                Command::PublicKey,
                client_key.as_bytes(),
                Command::Challenge,
            )
            .await?;
        let nonce = payload!(msg, Challenge)?.nonce;

        let authenticator =
            shared.authenticator(&[client_key.as_bytes(), device_key.as_bytes(), &nonce]);
        let msg = session
            .request(
                Channel::Pairing,
                Command::AuthorizationAuthenticator,
                &AuthorizationAuthenticator { authenticator }.to_bytes(),
                Command::Challenge,
            )
            .await?;
        let nonce = payload!(msg, Challenge)?.nonce;

        let mut data = AuthorizationData {
            authenticator: [0; 32],
            id_type: self.client.client_type,
            app_id: self.client.app_id,
            name: PaddedString::new(&self.client.name),
            nonce: random_nonce(),
        };
        data.authenticator = shared.authenticator(&[&data.authenticated_part(), &nonce]);
        let msg = session
            .request(
                Channel::Pairing,
                Command::AuthorizationData,
                &data.to_bytes(),
                Command::AuthorizationId,
            )
            .await?;
        let authorization = payload!(msg, AuthorizationId)?;
        let genuine = shared.verify_authenticator(
            &[&authorization.auth_id, &authorization.uuid, &authorization.nonce],
            &authorization.authenticator,
        );
        if !genuine {
            warn!("authorization id with a bad authenticator");
            return Err(Error::BadAuthenticator);
        }

        let confirmation = AuthorizationIdConfirmation {
            authenticator: shared.authenticator(&[&authorization.auth_id, &authorization.nonce]),
            auth_id: authorization.auth_id,
        };
        let msg = session
            .request(
                Channel::Pairing,
                Command::AuthorizationIdConfirmation,
                &confirmation.to_bytes(),
                Command::Status,
            )
            .await?;
        let status = payload!(msg, Status)?.status;
        if status != StatusCode::Completed {
            return Err(Error::PairingIncomplete(status));
        }

        session.update_keys(|k| k.set_auth_id(authorization.auth_id));
        info!(auth_id = u32::from_le_bytes(authorization.auth_id), "paired");
        Ok(authorization.auth_id)
    }

    async fn challenge(&self) -> Result<[u8; 32], Error> {
        let request = RequestData {
            command: Command::Challenge,
        };
        let msg = self
            .session
            .request(
                Channel::Keyturner,
                Command::RequestData,
                &request.to_bytes(),
                Command::Challenge,
            )
            .await?;
        Ok(payload!(msg, Challenge)?.nonce)
    }
}
