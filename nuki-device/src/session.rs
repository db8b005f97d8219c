//! Transport session: connection lifecycle, the pending request slot and
//! the retry loop.
//!
//! Every request is one write followed by a wait for the matching
//! notification. A single waiter slot holds the expected response; the
//! notification handler resolves it, or updates the state store for
//! messages nobody waits for.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use nuki_crypto::{build_authenticated, open_authenticated};
use nuki_proto::ble::{OPENER_CHAR, OPENER_PAIRING_CHAR};
use nuki_proto::{
    Command, CompletionStatus, DeviceType, ErrorCode, KeyturnerStates, Message, Model, Payload,
    build_plain,
};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{Error, TransportError};
use crate::identity::KeyMaterial;
use crate::state::StateStore;
use crate::transport::BleTransport;

/// Which characteristic a request travels on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Plaintext, used for pairing only
    Pairing,
    /// Encrypted with the shared key
    Keyturner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expect {
    Single(Command),
    /// Every message with one of these commands, until a STATUS ends the list
    Collect(Vec<Command>),
}

type Reply = Result<Vec<Message>, Error>;

struct Waiter {
    id: u64,
    channel: Channel,
    expect: Expect,
    collected: Vec<Message>,
    tx: oneshot::Sender<Reply>,
}

enum Slot {
    Ignore,
    Push,
    Finish,
}

pub struct Session<T: BleTransport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    transport: T,
    config: SessionConfig,
    device_type: RwLock<Option<DeviceType>>,
    keys: RwLock<KeyMaterial>,
    store: Arc<StateStore>,
    link: Mutex<LinkState>,
    connect_lock: AsyncMutex<()>,
    send_lock: AsyncMutex<()>,
    request_lock: AsyncMutex<()>,
    pending: Mutex<Option<Waiter>>,
    next_waiter: AtomicU64,
    status_reset: Mutex<Option<JoinHandle<()>>>,
}

impl<T: BleTransport> Session<T> {
    pub fn new(
        transport: T,
        keys: KeyMaterial,
        device_type: Option<DeviceType>,
        config: SessionConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            transport,
            config,
            device_type: RwLock::new(device_type),
            keys: RwLock::new(keys),
            store: Arc::new(StateStore::new()),
            link: Mutex::new(LinkState::Disconnected),
            connect_lock: AsyncMutex::new(()),
            send_lock: AsyncMutex::new(()),
            request_lock: AsyncMutex::new(()),
            pending: Mutex::new(None),
            next_waiter: AtomicU64::new(0),
            status_reset: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        inner
            .transport
            .set_notification_handler(Arc::new(move |uuid: Uuid, data: &[u8]| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_notification(uuid, data);
                }
            }));

        Self { inner }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.inner.store
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        self.inner.device_type()
    }

    pub fn set_device_type(&self, device_type: DeviceType) {
        *self
            .inner
            .device_type
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(device_type);
    }

    /// Smart lock until the device type is known
    pub fn model(&self) -> Model {
        self.inner.model()
    }

    pub fn keys(&self) -> KeyMaterial {
        self.inner
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_keys(&self, f: impl FnOnce(&mut KeyMaterial)) {
        f(&mut self
            .inner
            .keys
            .write()
            .unwrap_or_else(PoisonError::into_inner));
    }

    pub fn link_state(&self) -> LinkState {
        self.inner.link_state()
    }

    pub async fn connect(&self) -> Result<(), Error> {
        self.inner.connect().await
    }

    /// Best effort: transport errors are logged, the link is marked down
    /// regardless
    pub async fn disconnect(&self) -> Result<(), Error> {
        let inner = &self.inner;
        let _guard = inner.connect_lock.lock().await;
        if inner.transport.is_connected().await {
            match inner.transport.disconnect().await {
                Ok(()) => info!("disconnected"),
                Err(e) => warn!(%e, "disconnect failed"),
            }
        }
        inner.set_link(LinkState::Disconnected);
        Ok(())
    }

    /// Sends `command` and waits for the first `response` on `channel`
    pub async fn request(
        &self,
        channel: Channel,
        command: Command,
        payload: &[u8],
        response: Command,
    ) -> Result<Message, Error> {
        let frame = self.frame(channel, command, payload)?;
        let messages = self
            .inner
            .exchange(channel, &frame, Expect::Single(response))
            .await?;
        messages
            .into_iter()
            .next()
            .ok_or(Error::UnexpectedResponse(response))
    }

    /// Sends an encrypted `command` and collects every message whose command
    /// is in `items` until the device ends the list with STATUS
    pub async fn collect(
        &self,
        command: Command,
        payload: &[u8],
        items: &[Command],
    ) -> Result<Vec<Message>, Error> {
        let frame = self.frame(Channel::Keyturner, command, payload)?;
        self.inner
            .exchange(Channel::Keyturner, &frame, Expect::Collect(items.to_vec()))
            .await
    }

    fn frame(&self, channel: Channel, command: Command, payload: &[u8]) -> Result<Vec<u8>, Error> {
        match channel {
            Channel::Pairing => Ok(build_plain(command, payload)),
            Channel::Keyturner => {
                let keys = self.inner.keys.read().unwrap_or_else(PoisonError::into_inner);
                let (auth_id, key) = keys.authenticated()?;
                Ok(build_authenticated(auth_id, key, command, payload))
            }
        }
    }

    /// Feeds a notification to the session as if the transport delivered it
    pub fn handle_notification(&self, characteristic: Uuid, data: &[u8]) {
        self.inner.handle_notification(characteristic, data);
    }
}

impl<T: BleTransport> Inner<T> {
    fn device_type(&self) -> Option<DeviceType> {
        *self.device_type.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn model(&self) -> Model {
        self.device_type().map(DeviceType::model).unwrap_or_default()
    }

    fn link_state(&self) -> LinkState {
        *self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_link(&self, state: LinkState) {
        *self.link.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn pending(&self) -> MutexGuard<'_, Option<Waiter>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn characteristic(&self, channel: Channel) -> Uuid {
        let model = self.model();
        match channel {
            Channel::Pairing => model.pairing_char(),
            Channel::Keyturner => model.char(),
        }
    }

    async fn connect(&self) -> Result<(), Error> {
        let _guard = self.connect_lock.lock().await;
        if self.link_state() == LinkState::Connected && self.transport.is_connected().await {
            return Ok(());
        }

        self.set_link(LinkState::Connecting);
        let result = match tokio::time::timeout(self.config.connection_timeout, self.establish()).await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout.into()),
        };
        match result {
            Ok(()) => {
                self.set_link(LinkState::Connected);
                info!(model = ?self.model(), "connected");
                Ok(())
            }
            Err(e) => {
                self.set_link(LinkState::Disconnected);
                warn!(%e, "connection failed");
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<(), Error> {
        self.transport.connect().await?;
        let characteristics = self.transport.characteristics().await?;

        if self.device_type().is_none() {
            let opener = characteristics
                .iter()
                .any(|c| *c == OPENER_PAIRING_CHAR || *c == OPENER_CHAR);
            let detected = if opener {
                DeviceType::Opener
            } else {
                DeviceType::SmartLock12
            };
            debug!(?detected, "device type from characteristics");
            *self.device_type.write().unwrap_or_else(PoisonError::into_inner) = Some(detected);
        }

        let model = self.model();
        if !characteristics.contains(&model.pairing_char()) {
            return Err(TransportError::CharacteristicNotFound(model.pairing_char()).into());
        }
        for characteristic in [model.pairing_char(), model.char()] {
            if characteristics.contains(&characteristic) {
                self.transport.subscribe(characteristic).await?;
            } else {
                warn!(%characteristic, "characteristic missing, not subscribing");
            }
        }
        Ok(())
    }

    /// One request with its retry budget. Holds the request lock for the
    /// whole write-then-await cycle.
    async fn exchange(&self, channel: Channel, frame: &[u8], expect: Expect) -> Result<Vec<Message>, Error> {
        let _request = self.request_lock.lock().await;
        let attempts = self.config.retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (guard, rx) = self.arm(channel, expect.clone());
            let outcome = match self.write(channel, frame).await {
                Ok(()) => self.wait(rx).await,
                Err(e) => Err(e),
            };
            drop(guard);

            match outcome {
                Ok(messages) => return Ok(messages),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let backoff = self.backoff(&e);
                    warn!(%e, attempt, ?backoff, "request failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Installs the waiter before anything is written, so a fast response
    /// cannot be missed
    fn arm(&self, channel: Channel, expect: Expect) -> (PendingGuard<'_, T>, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        let previous = self.pending().replace(Waiter {
            id,
            channel,
            expect,
            collected: Vec::new(),
            tx,
        });
        if previous.is_some() {
            warn!("replaced a stale pending request");
        }
        (PendingGuard { inner: self, id }, rx)
    }

    /// Write phase, under the send lock
    async fn write(&self, channel: Channel, frame: &[u8]) -> Result<(), Error> {
        let _send = self.send_lock.lock().await;
        self.connect().await?;
        let characteristic = self.characteristic(channel);
        debug!(?channel, len = frame.len(), "write");
        if let Err(e) = self.transport.write(characteristic, frame).await {
            if !self.transport.is_connected().await {
                self.set_link(LinkState::Disconnected);
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn wait(&self, rx: oneshot::Receiver<Reply>) -> Reply {
        let timeout = self.config.response_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            // waiter dropped without an answer
            Ok(Err(_)) => Err(Error::ResponseTimeout(timeout)),
            Err(_) => Err(Error::ResponseTimeout(timeout)),
        }
    }

    fn backoff(&self, e: &Error) -> Duration {
        match e {
            Error::Transport(t) if !t.is_transient() => self.config.transport_backoff,
            _ => self.config.timeout_backoff,
        }
    }

    fn handle_notification(&self, characteristic: Uuid, data: &[u8]) {
        let model = self.model();
        let (channel, decoded) = if characteristic == model.pairing_char() {
            (Channel::Pairing, Message::decode_plain(data, model).map_err(Error::from))
        } else if characteristic == model.char() {
            (Channel::Keyturner, self.open(data, model))
        } else {
            debug!(%characteristic, "notification on unknown characteristic");
            return;
        };

        match decoded {
            Ok(message) => self.dispatch(channel, message),
            Err(Error::DecryptionFailed) => {
                warn!("failed to decrypt notification");
                self.reject(channel, Error::DecryptionFailed);
            }
            Err(e) => warn!(%e, "discarding notification"),
        }
    }

    fn open(&self, data: &[u8], model: Model) -> Result<Message, Error> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        let key = keys.shared_key().ok_or(Error::NotPaired)?;
        let (auth_id, message) = open_authenticated(key, data, model)?;
        if keys.auth_id() != Some(auth_id) {
            debug!(?auth_id, "notification for another authorization");
        }
        Ok(message)
    }

    fn dispatch(&self, channel: Channel, message: Message) {
        debug!(command = %message.command, "received");

        if let Payload::ErrorReport(report) = &message.payload {
            let err = if report.code() == Some(ErrorCode::PairingNotPairing) {
                Error::PairingRequired
            } else {
                Error::Protocol {
                    code: report.error_code,
                    command: report.command,
                }
            };
            if !self.reject(channel, err) {
                error!(code = report.error_code, command = report.command, "unhandled device error");
                let report = report.clone();
                self.store.update(|s| s.last_error = Some(report));
                self.store.notify();
            }
            return;
        }

        if let Payload::KeyturnerStates(states) = &message.payload {
            if self.store.apply_keyturner_states(states.clone()) {
                debug!(count = states.config_update_count, "configuration changed");
            }
            self.schedule_status_reset(states);
            self.store.notify();
        }

        let Some(message) = self.resolve(channel, message) else {
            return;
        };
        match message.payload {
            Payload::KeyturnerStates(_) => {}
            Payload::Status(status) => {
                debug!(status = ?status.status, "action status");
                self.store.update(|s| s.last_action_status = Some(status.status));
                self.store.notify();
            }
            _ => debug!(command = %message.command, "unsolicited message"),
        }
    }

    /// Hands `message` to the waiter if it expects it; otherwise returns it
    fn resolve(&self, channel: Channel, message: Message) -> Option<Message> {
        let mut pending = self.pending();
        let slot = match pending.as_ref() {
            Some(w) if w.channel == channel => match &w.expect {
                Expect::Single(command) if *command == message.command => Slot::Finish,
                Expect::Collect(items) if items.contains(&message.command) => Slot::Push,
                Expect::Collect(_) if message.command == Command::Status => Slot::Finish,
                _ => Slot::Ignore,
            },
            _ => Slot::Ignore,
        };

        match slot {
            Slot::Ignore => Some(message),
            Slot::Push => {
                if let Some(waiter) = pending.as_mut() {
                    waiter.collected.push(message);
                }
                None
            }
            Slot::Finish => {
                if let Some(mut waiter) = pending.take() {
                    if matches!(waiter.expect, Expect::Single(_)) {
                        waiter.collected.push(message);
                    }
                    let _ = waiter.tx.send(Ok(waiter.collected));
                }
                None
            }
        }
    }

    /// Fails the waiter on `channel`. Returns false if nobody was waiting.
    fn reject(&self, channel: Channel, err: Error) -> bool {
        let mut pending = self.pending();
        if !pending.as_ref().is_some_and(|w| w.channel == channel) {
            return false;
        }
        if let Some(waiter) = pending.take() {
            let _ = waiter.tx.send(Err(err));
        }
        true
    }

    /// An opener keeps reporting a failed action until the next one; after a
    /// while the cached status reads as success again
    fn schedule_status_reset(&self, states: &KeyturnerStates) {
        if self.model() != Model::Opener
            || states.last_lock_action_completion_status == CompletionStatus::Success
        {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = Arc::downgrade(&self.store);
        let delay = self.config.opener_status_reset;
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(store) = store.upgrade() {
                store.update(|s| {
                    if let Some(k) = s.keyturner.as_mut() {
                        k.last_lock_action_completion_status = CompletionStatus::Success;
                    }
                });
                store.notify();
            }
        });
        let previous = self
            .status_reset
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(task) = self
            .status_reset
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

/// Clears the pending slot on every exit path, including cancellation
struct PendingGuard<'a, T: BleTransport> {
    inner: &'a Inner<T>,
    id: u64,
}

impl<T: BleTransport> Drop for PendingGuard<'_, T> {
    fn drop(&mut self) {
        let mut pending = self.inner.pending();
        if pending.as_ref().is_some_and(|w| w.id == self.id) {
            *pending = None;
        }
    }
}
