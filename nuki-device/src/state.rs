//! Cached device state and its subscribers

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use nuki_proto::{
    AdvancedConfig, CompletionStatus, Config, DoorSensorState, ErrorReport, KeyturnerStates,
    LockState, StatusCode,
};
use serde::Serialize;

/// Immutable view of everything known about a device.
///
/// Every mutation produces a new snapshot with a higher `version`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceSnapshot {
    pub version: u64,
    pub keyturner: Option<KeyturnerStates>,
    /// Follows the keyturner states, and the transitional state while an
    /// action is being performed
    pub lock_state: Option<LockState>,
    pub config: Option<Config>,
    pub advanced_config: Option<AdvancedConfig>,
    pub last_action_status: Option<StatusCode>,
    pub last_error: Option<ErrorReport>,
    pub rssi: Option<i16>,
}

impl DeviceSnapshot {
    pub fn battery_percentage(&self) -> Option<u8> {
        self.keyturner
            .as_ref()
            .map(|s| s.critical_battery_state.percentage())
    }

    pub fn is_battery_critical(&self) -> Option<bool> {
        self.keyturner
            .as_ref()
            .map(|s| s.critical_battery_state.is_critical())
    }

    pub fn is_battery_charging(&self) -> Option<bool> {
        self.keyturner
            .as_ref()
            .map(|s| s.critical_battery_state.is_charging())
    }

    pub fn door_sensor_state(&self) -> Option<DoorSensorState> {
        self.keyturner.as_ref().map(|s| s.door_sensor_state)
    }

    pub fn last_completion_status(&self) -> Option<CompletionStatus> {
        self.keyturner
            .as_ref()
            .map(|s| s.last_lock_action_completion_status)
    }
}

pub type Callback = Arc<dyn Fn(&DeviceSnapshot) + Send + Sync>;

/// Owner of the device snapshot.
///
/// Readers get `Arc` snapshots; writers replace the snapshot under a short
/// lock, never across an await.
pub struct StateStore {
    current: RwLock<Arc<DeviceSnapshot>>,
    subscribers: Mutex<Vec<(u64, Callback)>>,
    next_subscriber: AtomicU64,
    config_refresh: AtomicBool,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(DeviceSnapshot::default())),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
            config_refresh: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> Arc<DeviceSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies `f` to a copy of the current snapshot and publishes it.
    /// Subscribers are not called; see [`StateStore::notify`].
    pub fn update(&self, f: impl FnOnce(&mut DeviceSnapshot)) -> Arc<DeviceSnapshot> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = DeviceSnapshot::clone(&current);
        f(&mut next);
        next.version = current.version + 1;
        *current = Arc::new(next);
        current.clone()
    }

    /// Caches new keyturner states. Returns true when the device
    /// configuration must be fetched again.
    pub fn apply_keyturner_states(&self, states: KeyturnerStates) -> bool {
        let mut refresh = false;
        self.update(|s| {
            let previous = s.keyturner.as_ref().map(|k| k.config_update_count);
            refresh = s.config.is_none() || previous != Some(states.config_update_count);
            s.lock_state = Some(states.lock_state);
            s.keyturner = Some(states);
        });
        if refresh {
            self.config_refresh.store(true, Ordering::SeqCst);
        }
        refresh
    }

    pub fn set_config(&self, config: Config) {
        self.update(|s| s.config = Some(config));
        self.config_refresh.store(false, Ordering::SeqCst);
    }

    pub fn config_refresh_needed(&self) -> bool {
        self.config_refresh.load(Ordering::SeqCst)
    }

    /// Registers `callback`, called with the new snapshot after every
    /// externally visible change
    pub fn subscribe(self: &Arc<Self>, callback: Callback) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        Subscription {
            store: Arc::downgrade(self),
            id,
        }
    }

    /// Calls every subscriber with the current snapshot
    pub fn notify(&self) {
        let snapshot = self.snapshot();
        // callbacks may subscribe or unsubscribe
        let subscribers: Vec<Callback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in subscribers {
            callback(&snapshot);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sid, _)| *sid != id);
    }
}

/// Handle returned by [`StateStore::subscribe`]. Dropping it keeps the
/// callback registered.
#[derive(Debug)]
pub struct Subscription {
    store: Weak<StateStore>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}
