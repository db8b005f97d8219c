//! A simulated Nuki device speaking the device side of the protocol.
//!
//! Replies are delivered from a spawned task after a short delay, the way a
//! real BLE stack hands indications to the host.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nuki_crypto::{PublicKey, SecretKey, SharedKey, build_authenticated, open_authenticated, random_nonce};
use nuki_device::{
    BleTransport, DeviceRecord, NotificationHandler, NukiDevice, SessionConfig, TransportError,
};
use nuki_proto::types::LogEntryType;
use nuki_proto::{
    ActionTrigger, AdvancedConfig, AdvertisingMode, AuthorizationAuthenticator, AuthorizationData,
    AuthorizationEntry, AuthorizationId, AuthorizationIdConfirmation, BatteryReport, BatteryState,
    BatteryType, Challenge, Command, CompletionStatus, Config, DateTime, DoorSensorState,
    ErrorCode, ErrorReport, KeyturnerStates, LockAction, LockActionRequest, LockState, LogEntry,
    LogEntryData, Message, Model, NukiState, OpenerAction, OpenerAdvancedConfig,
    OpenerButtonAction, OpenerConfig, OpenerState, PaddedString, RequestAuthorizationEntries,
    RequestConfig, RequestData, RequestLogEntries, SmartLockAction, SmartLockAdvancedConfig,
    SmartLockButtonAction, SmartLockConfig, SmartLockState, Status, StatusCode, Time,
    VerifySecurityPin, Weekdays, Wire, build_plain,
};
use uuid::Uuid;

pub const ADDRESS: &str = "54:D2:72:AB:CD:EF";
pub const APP_ID: u32 = 0x0c0ffee;
pub const AUTH_ID: [u8; 4] = [0x2a, 0, 0, 0];
pub const PIN: u16 = 1234;

/// Gap before each reply
pub const REPLY_DELAY: Duration = Duration::from_millis(20);
/// Time the motor takes to finish a lock action
pub const MOTOR_DELAY: Duration = Duration::from_millis(500);

pub struct Device {
    pub model: Model,
    pub key: SecretKey,
    pub client_key: Option<PublicKey>,
    pub pairing_mode: bool,
    pub states: KeyturnerStates,
    pub config: Config,
    pub advanced_config: AdvancedConfig,
    pub battery: BatteryReport,
    pub pin: u16,
    pub log: Vec<LogEntry>,
    pub authorizations: Vec<AuthorizationEntry>,
    /// Requests to swallow without an answer
    pub silent: usize,
    /// Replies to encrypt under a key the client does not have
    pub garble: usize,
    /// Decoded commands in arrival order
    pub received: Vec<Command>,
    pub paired_name: Option<String>,
    /// Sign the authorization id with a key the client does not share
    pub forge_authorization: bool,
    /// Status closing a successful pairing
    pub pairing_status: StatusCode,
    nonce: [u8; 32],
}

type Reply = (Duration, Uuid, Vec<u8>);

impl Device {
    fn new(model: Model) -> Self {
        Self {
            model,
            key: SecretKey::generate(),
            client_key: None,
            pairing_mode: false,
            states: states(model),
            config: config(model),
            advanced_config: advanced_config(model),
            battery: battery_report(model),
            pin: PIN,
            log: Vec::new(),
            authorizations: Vec::new(),
            silent: 0,
            garble: 0,
            received: Vec::new(),
            paired_name: None,
            forge_authorization: false,
            pairing_status: StatusCode::Completed,
            nonce: [0; 32],
        }
    }

    fn shared(&self) -> SharedKey {
        let client = self.client_key.expect("client key known");
        self.key.shared_key(&client)
    }

    fn handle(&mut self, characteristic: Uuid, data: &[u8]) -> Vec<Reply> {
        if self.silent > 0 {
            self.silent -= 1;
            return Vec::new();
        }
        if characteristic == self.model.pairing_char() {
            self.handle_pairing(data)
        } else if characteristic == self.model.char() {
            self.handle_encrypted(data)
        } else {
            Vec::new()
        }
    }

    fn plain(&self, command: Command, payload: &[u8]) -> Reply {
        (REPLY_DELAY, self.model.pairing_char(), build_plain(command, payload))
    }

    fn encrypted(&mut self, delay: Duration, command: Command, payload: &[u8]) -> Reply {
        let key = if self.garble > 0 {
            self.garble -= 1;
            SecretKey::generate().shared_key(&self.key.public_key())
        } else {
            self.shared()
        };
        (delay, self.model.char(), build_authenticated(AUTH_ID, &key, command, payload))
    }

    fn error(code: ErrorCode, command: Command) -> Vec<u8> {
        ErrorReport {
            error_code: code.value(),
            command: command.value(),
        }
        .to_bytes()
    }

    fn handle_pairing(&mut self, data: &[u8]) -> Vec<Reply> {
        let msg = Message::decode_plain(data, self.model).expect("plain frame");
        self.received.push(msg.command);
        let payload = msg.payload.to_bytes();

        if !self.pairing_mode {
            return vec![self.plain(Command::ErrorReport, &Self::error(ErrorCode::PairingNotPairing, msg.command))];
        }

        match msg.command {
            Command::RequestData => {
                let request = RequestData::from_bytes(&payload).expect("request data");
                assert_eq!(request.command, Command::PublicKey);
                let public_key = nuki_proto::message::PublicKey {
                    public_key: self.key.public_key().0,
                };
                vec![self.plain(Command::PublicKey, &public_key.to_bytes())]
            }
            Command::PublicKey => {
                let bytes: [u8; 32] = payload.try_into().expect("32 byte key");
                self.client_key = Some(PublicKey::from(bytes));
                self.challenge_plain()
            }
            Command::AuthorizationAuthenticator => {
                let request = AuthorizationAuthenticator::from_bytes(&payload).expect("authenticator");
                let client = self.client_key.expect("client key");
                let expected = self.shared().authenticator(&[
                    client.as_bytes(),
                    self.key.public_key().as_bytes(),
                    &self.nonce,
                ]);
                if request.authenticator != expected {
                    return vec![self.plain(
                        Command::ErrorReport,
                        &Self::error(ErrorCode::PairingBadAuthenticator, msg.command),
                    )];
                }
                self.challenge_plain()
            }
            Command::AuthorizationData => {
                let request = AuthorizationData::from_bytes(&payload).expect("authorization data");
                let expected = self
                    .shared()
                    .authenticator(&[&request.authenticated_part(), &self.nonce]);
                if request.authenticator != expected {
                    return vec![self.plain(
                        Command::ErrorReport,
                        &Self::error(ErrorCode::PairingBadAuthenticator, msg.command),
                    )];
                }
                self.paired_name = Some(request.name.as_str().to_string());
                self.nonce = random_nonce();
                let uuid = [7; 16];
                let signer = if self.forge_authorization {
                    SecretKey::generate().shared_key(&self.key.public_key())
                } else {
                    self.shared()
                };
                let reply = AuthorizationId {
                    authenticator: signer.authenticator(&[&AUTH_ID, &uuid, &self.nonce]),
                    auth_id: AUTH_ID,
                    uuid,
                    nonce: self.nonce,
                };
                vec![self.plain(Command::AuthorizationId, &reply.to_bytes())]
            }
            Command::AuthorizationIdConfirmation => {
                let request = AuthorizationIdConfirmation::from_bytes(&payload).expect("confirmation");
                let expected = self.shared().authenticator(&[&request.auth_id, &self.nonce]);
                assert_eq!(request.authenticator, expected);
                self.pairing_mode = false;
                vec![self.plain(Command::Status, &[self.pairing_status.value()])]
            }
            other => panic!("unexpected pairing command {other}"),
        }
    }

    fn challenge_plain(&mut self) -> Vec<Reply> {
        self.nonce = random_nonce();
        vec![self.plain(Command::Challenge, &Challenge { nonce: self.nonce }.to_bytes())]
    }

    fn handle_encrypted(&mut self, data: &[u8]) -> Vec<Reply> {
        let (auth_id, msg) = open_authenticated(&self.shared(), data, self.model).expect("client frame");
        assert_eq!(auth_id, AUTH_ID);
        self.received.push(msg.command);
        let payload = msg.payload.to_bytes();

        match msg.command {
            Command::RequestData => {
                let request = RequestData::from_bytes(&payload).expect("request data");
                match request.command {
                    Command::KeyturnerStates => {
                        let states = self.states.to_bytes();
                        vec![self.encrypted(REPLY_DELAY, Command::KeyturnerStates, &states)]
                    }
                    Command::Challenge => {
                        self.nonce = random_nonce();
                        let challenge = Challenge { nonce: self.nonce }.to_bytes();
                        vec![self.encrypted(REPLY_DELAY, Command::Challenge, &challenge)]
                    }
                    Command::BatteryReport => {
                        let report = self.battery.to_bytes();
                        vec![self.encrypted(REPLY_DELAY, Command::BatteryReport, &report)]
                    }
                    other => panic!("unexpected data request {other}"),
                }
            }
            Command::RequestConfig => {
                let request = RequestConfig::from_bytes(&payload).expect("request config");
                if let Some(reply) = self.check_nonce(request.nonce, msg.command) {
                    return reply;
                }
                let config = self.config.to_bytes();
                vec![self.encrypted(REPLY_DELAY, Command::Config, &config)]
            }
            Command::RequestAdvancedConfig => {
                let request = RequestConfig::from_bytes(&payload).expect("request advanced config");
                if let Some(reply) = self.check_nonce(request.nonce, msg.command) {
                    return reply;
                }
                let config = self.advanced_config.to_bytes();
                vec![self.encrypted(REPLY_DELAY, Command::AdvancedConfig, &config)]
            }
            Command::RequestAuthorizationEntries => {
                let request =
                    RequestAuthorizationEntries::from_bytes(&payload).expect("authorization request");
                if let Some(reply) = self.check_nonce(request.nonce, msg.command) {
                    return reply;
                }
                if request.pin != self.pin {
                    let error = Self::error(ErrorCode::BadPin, msg.command);
                    return vec![self.encrypted(REPLY_DELAY, Command::ErrorReport, &error)];
                }
                let total = self.authorizations.len() as u16;
                let page: Vec<Vec<u8>> = self
                    .authorizations
                    .iter()
                    .skip(usize::from(request.offset))
                    .take(usize::from(request.count))
                    .map(Wire::to_bytes)
                    .collect();
                let mut replies =
                    vec![self.encrypted(REPLY_DELAY, Command::AuthorizationEntryCount, &total.to_bytes())];
                for entry in &page {
                    replies.push(self.encrypted(REPLY_DELAY, Command::AuthorizationEntry, entry));
                }
                replies.push(self.encrypted(
                    REPLY_DELAY,
                    Command::Status,
                    &[StatusCode::Completed.value()],
                ));
                replies
            }
            Command::LockAction => {
                let request =
                    LockActionRequest::from_bytes_for(&payload, self.model).expect("lock action");
                if let Some(reply) = self.check_nonce(request.nonce, msg.command) {
                    return reply;
                }
                let accepted = Status {
                    status: StatusCode::Accepted,
                };
                let mut replies = vec![self.encrypted(REPLY_DELAY, Command::Status, &accepted.to_bytes())];

                self.states.lock_state = final_state(request.lock_action);
                self.states.last_lock_action = request.lock_action;
                let states = self.states.to_bytes();
                replies.push(self.encrypted(MOTOR_DELAY, Command::KeyturnerStates, &states));
                replies.push(self.encrypted(
                    REPLY_DELAY,
                    Command::Status,
                    &[StatusCode::Completed.value()],
                ));
                replies
            }
            Command::VerifySecurityPin => {
                let request = VerifySecurityPin::from_bytes(&payload).expect("verify pin");
                if let Some(reply) = self.check_nonce(request.nonce, msg.command) {
                    return reply;
                }
                if request.pin != self.pin {
                    let error = Self::error(ErrorCode::BadPin, msg.command);
                    return vec![self.encrypted(REPLY_DELAY, Command::ErrorReport, &error)];
                }
                vec![self.encrypted(REPLY_DELAY, Command::Status, &[StatusCode::Completed.value()])]
            }
            Command::RequestLogEntries => {
                let request = RequestLogEntries::from_bytes(&payload).expect("log request");
                if let Some(reply) = self.check_nonce(request.nonce, msg.command) {
                    return reply;
                }
                if request.pin != self.pin {
                    let error = Self::error(ErrorCode::BadPin, msg.command);
                    return vec![self.encrypted(REPLY_DELAY, Command::ErrorReport, &error)];
                }
                let mut entries = self.log.clone();
                if request.sort_order == nuki_proto::SortOrder::Descending {
                    entries.reverse();
                }
                let page: Vec<Vec<u8>> = entries
                    .iter()
                    .skip(request.start_index as usize)
                    .take(usize::from(request.count))
                    .map(Wire::to_bytes)
                    .collect();
                let mut replies: Vec<Reply> = page
                    .iter()
                    .map(|entry| self.encrypted(REPLY_DELAY, Command::LogEntry, entry))
                    .collect();
                replies.push(self.encrypted(
                    REPLY_DELAY,
                    Command::Status,
                    &[StatusCode::Completed.value()],
                ));
                replies
            }
            other => panic!("unexpected command {other}"),
        }
    }

    fn check_nonce(&mut self, nonce: [u8; 32], command: Command) -> Option<Vec<Reply>> {
        if nonce == self.nonce {
            return None;
        }
        let error = Self::error(ErrorCode::BadNonce, command);
        Some(vec![self.encrypted(REPLY_DELAY, Command::ErrorReport, &error)])
    }
}

fn final_state(action: LockAction) -> LockState {
    match action {
        LockAction::SmartLock(SmartLockAction::Lock) => SmartLockState::Locked.into(),
        LockAction::SmartLock(SmartLockAction::Unlatch) => SmartLockState::Unlatched.into(),
        LockAction::SmartLock(_) => SmartLockState::Unlocked.into(),
        LockAction::Opener(OpenerAction::ActivateRto) => OpenerState::RtoActive.into(),
        LockAction::Opener(OpenerAction::ElectricStrikeActuation) => OpenerState::Open.into(),
        LockAction::Opener(_) => OpenerState::Locked.into(),
    }
}

pub fn states(model: Model) -> KeyturnerStates {
    let (lock_state, last_lock_action, trailing) = match model {
        Model::SmartLock => (
            LockState::from(SmartLockState::Unlocked),
            LockAction::from(SmartLockAction::Unlock),
            Some(0),
        ),
        Model::Opener => (
            LockState::from(OpenerState::Locked),
            LockAction::from(OpenerAction::DeactivateRto),
            None,
        ),
    };
    KeyturnerStates {
        nuki_state: NukiState::DoorMode,
        lock_state,
        trigger: ActionTrigger::Manual,
        current_time: DateTime::default(),
        timezone_offset: 60,
        critical_battery_state: BatteryState(0b1011_0000),
        config_update_count: 1,
        lock_n_go_timer: 0,
        last_lock_action,
        last_lock_action_trigger: ActionTrigger::Manual,
        last_lock_action_completion_status: CompletionStatus::Success,
        door_sensor_state: DoorSensorState::DoorClosed,
        nightmode_active: trailing.map(u16::from),
        accessory_battery_state: trailing,
    }
}

pub fn config(model: Model) -> Config {
    match model {
        Model::SmartLock => Config::SmartLock(SmartLockConfig {
            nuki_id: 0x1a2b3c4d,
            name: PaddedString::new("Front door"),
            latitude: 48.2,
            longitude: 16.37,
            auto_unlatch: 0,
            pairing_enabled: 1,
            button_enabled: 1,
            led_enabled: 1,
            led_brightness: 3,
            current_time: DateTime::default(),
            timezone_offset: 60,
            dst_mode: 1,
            has_fob: 0,
            fob_action_1: 1,
            fob_action_2: 2,
            fob_action_3: 3,
            single_lock: 0,
            advertising_mode: AdvertisingMode::Automatic,
            has_keypad: 0,
            firmware_version: [3, 2, 1],
            hardware_revision: [4, 1],
            homekit_status: 0,
            timezone_id: 37,
            undocumented: Some(0),
            undocumented2: Some(0),
            has_keypad_v2: Some(0),
        }),
        Model::Opener => Config::Opener(OpenerConfig {
            nuki_id: 0x5e6f7a8b,
            name: PaddedString::new("Intercom"),
            latitude: 48.2,
            longitude: 16.37,
            capabilities: 1,
            pairing_enabled: 1,
            button_enabled: 1,
            led_enabled: 1,
            current_time: DateTime::default(),
            timezone_offset: 60,
            dst_mode: 1,
            has_fob: 0,
            fob_action_1: 0,
            fob_action_2: 0,
            fob_action_3: 0,
            operating_mode: 0,
            advertising_mode: AdvertisingMode::Normal,
            has_keypad: 0,
            firmware_version: [1, 8, 2],
            hardware_revision: [2, 0],
            timezone_id: 37,
            undocumented: None,
            undocumented2: None,
            has_keypad_v2: None,
        }),
    }
}

pub fn advanced_config(model: Model) -> AdvancedConfig {
    match model {
        Model::SmartLock => AdvancedConfig::SmartLock(SmartLockAdvancedConfig {
            total_degrees: 1440,
            unlocked_position_offset_degrees: 0,
            locked_position_offset_degrees: -90,
            single_locked_position_offset_degrees: 0,
            unlocked_to_locked_transition_offset_degrees: 0,
            lock_n_go_timeout: 20,
            single_button_press_action: SmartLockButtonAction::Intelligent,
            double_button_press_action: SmartLockButtonAction::LockNGo,
            detached_cylinder: 0,
            battery_type: BatteryType::Lithium,
            automatic_battery_type_detection: 1,
            unlatch_duration: 3,
            auto_lock_timeout: 300,
            auto_unlock_disabled: 0,
            night_mode_enabled: 1,
            night_mode_start_time: Time { hour: 22, minute: 0 },
            night_mode_end_time: Time { hour: 6, minute: 30 },
            night_mode_auto_lock_enabled: 1,
            night_mode_auto_unlock_disabled: 1,
            night_mode_immediate_lock_on_start: 0,
            auto_lock_enabled: 1,
            immediate_auto_lock_enabled: 0,
            auto_update_enabled: 1,
        }),
        Model::Opener => AdvancedConfig::Opener(OpenerAdvancedConfig {
            intercom_id: 12,
            bus_mode_switch: 0,
            short_circuit_duration: 0,
            electric_strike_delay: 500,
            random_electric_strike_delay: 0,
            electric_strike_duration: 3000,
            disable_rto_after_ring: 1,
            rto_timeout: 20,
            unknown: 0,
            doorbell_suppression: 0,
            doorbell_suppression_duration: 500,
            sound_ring: 1,
            sound_open: 1,
            sound_rto: 1,
            sound_cm: 1,
            sound_confirmation: 1,
            sound_level: 255,
            single_button_press_action: OpenerButtonAction::ToggleRto,
            double_button_press_action: OpenerButtonAction::Open,
            battery_type: BatteryType::Alkali,
            automatic_battery_type_detection: 1,
        }),
    }
}

pub fn battery_report(model: Model) -> BatteryReport {
    let lock_action = match model {
        Model::SmartLock => LockAction::from(SmartLockAction::Lock),
        Model::Opener => LockAction::from(OpenerAction::ActivateRto),
    };
    BatteryReport {
        battery_drain: 42,
        battery_voltage: 5820,
        critical_battery_state: 0,
        lock_action,
        start_voltage: 5900,
        lowest_voltage: 5410,
        lock_distance: 1350,
        start_temperature: -3,
        max_turn_current: 610,
        battery_resistance: 180,
    }
}

pub fn authorization(auth_id: u32, name: &str) -> AuthorizationEntry {
    AuthorizationEntry {
        auth_id,
        id_type: 0,
        name: PaddedString::new(name),
        enabled: 1,
        remote_allowed: 0,
        date_created: DateTime::default(),
        date_last_active: DateTime::default(),
        lock_count: 3,
        time_limited: 0,
        allowed_from_date: DateTime::default(),
        allowed_until_date: DateTime::default(),
        allowed_weekdays: Weekdays::all(),
        allowed_from_time: Time { hour: 0, minute: 0 },
        allowed_until_time: Time { hour: 23, minute: 59 },
    }
}

pub fn log_entry(index: u32, action: SmartLockAction) -> LogEntry {
    LogEntry {
        index,
        timestamp: DateTime::default(),
        auth_id: u32::from_le_bytes(AUTH_ID),
        name: PaddedString::new("nuki-ctl"),
        kind: LogEntryType::LockAction,
        data: LogEntryData::LockAction {
            lock_action: action.into(),
            trigger: ActionTrigger::System,
            flags: 0,
            completion_status: CompletionStatus::Success,
        },
    }
}

struct Shared {
    device: Mutex<Device>,
    handler: Mutex<Option<NotificationHandler>>,
    connected: AtomicBool,
    connects: Mutex<usize>,
}

/// Transport whose peer is a simulated device
#[derive(Clone)]
pub struct MockLock {
    shared: Arc<Shared>,
}

impl MockLock {
    fn with_device(device: Device) -> Self {
        Self {
            shared: Arc::new(Shared {
                device: Mutex::new(device),
                handler: Mutex::new(None),
                connected: AtomicBool::new(false),
                connects: Mutex::new(0),
            }),
        }
    }

    /// A device that already knows this client, and the client's record
    pub fn paired(model: Model) -> (Self, DeviceRecord) {
        let mut record = DeviceRecord::new(ADDRESS, APP_ID, "nuki-ctl");
        let mut device = Device::new(model);
        device.client_key = Some(record.client_key.public_key());
        record.device_type = Some(match model {
            Model::SmartLock => nuki_proto::DeviceType::SmartLock3,
            Model::Opener => nuki_proto::DeviceType::Opener,
        });
        record.device_public_key = Some(device.key.public_key());
        record.auth_id = Some(AUTH_ID);
        (Self::with_device(device), record)
    }

    /// A device that has never seen this client
    pub fn unpaired(model: Model, pairing_mode: bool) -> (Self, DeviceRecord) {
        let record = DeviceRecord::new(ADDRESS, APP_ID, "nuki-ctl");
        let mut device = Device::new(model);
        device.pairing_mode = pairing_mode;
        (Self::with_device(device), record)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Device) -> R) -> R {
        f(&mut self.shared.device.lock().unwrap())
    }

    pub fn received(&self) -> Vec<Command> {
        self.with(|d| d.received.clone())
    }

    pub fn connects(&self) -> usize {
        *self.shared.connects.lock().unwrap()
    }

    /// Sends the current keyturner states without being asked
    pub fn push_states(&self) {
        let reply = self.with(|d| {
            let states = d.states.to_bytes();
            d.encrypted(REPLY_DELAY, Command::KeyturnerStates, &states)
        });
        self.deliver(vec![reply]);
    }

    fn deliver(&self, replies: Vec<Reply>) {
        if replies.is_empty() {
            return;
        }
        let handler = self.shared.handler.lock().unwrap().clone();
        tokio::spawn(async move {
            for (delay, characteristic, frame) in replies {
                tokio::time::sleep(delay).await;
                if let Some(handler) = &handler {
                    handler(characteristic, &frame);
                }
            }
        });
    }
}

#[async_trait]
impl BleTransport for MockLock {
    async fn connect(&self) -> Result<(), TransportError> {
        if !self.shared.connected.swap(true, Ordering::SeqCst) {
            *self.shared.connects.lock().unwrap() += 1;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.shared.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn characteristics(&self) -> Result<Vec<Uuid>, TransportError> {
        let model = self.with(|d| d.model);
        Ok(vec![model.pairing_char(), model.char()])
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<(), TransportError> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let replies = self.with(|d| d.handle(characteristic, data));
        self.deliver(replies);
        Ok(())
    }

    async fn subscribe(&self, _: Uuid) -> Result<(), TransportError> {
        Ok(())
    }

    fn set_notification_handler(&self, handler: NotificationHandler) {
        *self.shared.handler.lock().unwrap() = Some(handler);
    }
}

pub fn device(mock: &MockLock, record: &DeviceRecord) -> NukiDevice<MockLock> {
    NukiDevice::from_record(mock.clone(), record, SessionConfig::default())
}
