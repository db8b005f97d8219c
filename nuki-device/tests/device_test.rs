//! End to end behaviour of [`NukiDevice`] against a simulated lock.
//!
//! The clock is paused, so retry backoffs and response timeouts cost
//! nothing while still running in order.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{
    ADDRESS, AUTH_ID, MockLock, PIN, advanced_config, authorization, battery_report, device,
    log_entry,
};
use nuki_device::{Advertisement, DeviceSnapshot, Error, LinkState};
use nuki_proto::ble::APPLE_COMPANY_ID;
use nuki_proto::{
    ActionTrigger, BatteryType, Command, CompletionStatus, ErrorCode, LockState, Model,
    OpenerState, SmartLockAction, SmartLockState, StatusCode,
};

fn count(commands: &[Command], command: Command) -> usize {
    commands.iter().filter(|c| **c == command).count()
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn pairing_handshake() {
    let (mock, record) = MockLock::unpaired(Model::SmartLock, true);
    let lock = device(&mock, &record);
    assert!(!lock.is_paired());

    let auth_id = lock.pair().await.unwrap();
    assert_eq!(auth_id, AUTH_ID);
    assert!(lock.is_paired());
    assert_eq!(
        mock.received(),
        vec![
            Command::RequestData,
            Command::PublicKey,
            Command::AuthorizationAuthenticator,
            Command::AuthorizationData,
            Command::AuthorizationIdConfirmation,
        ]
    );
    assert_eq!(mock.with(|d| d.paired_name.clone()).as_deref(), Some("nuki-ctl"));

    let saved = lock.to_record();
    assert!(saved.is_paired());
    assert_eq!(saved.auth_id, Some(AUTH_ID));

    // the new keys are good for encrypted traffic
    lock.update_state().await.unwrap();
    assert!(lock.state().keyturner.is_some());
}

#[tokio::test(start_paused = true)]
async fn pairing_outside_pairing_mode() {
    let (mock, record) = MockLock::unpaired(Model::SmartLock, false);
    let lock = device(&mock, &record);

    let err = lock.pair().await.unwrap_err();
    assert!(matches!(err, Error::PairingRequired), "{err:?}");
    // not retried
    assert_eq!(mock.received(), vec![Command::RequestData]);
    assert!(!lock.is_paired());
}

#[tokio::test(start_paused = true)]
async fn pairing_rejects_forged_authorization_id() {
    let (mock, record) = MockLock::unpaired(Model::SmartLock, true);
    mock.with(|d| d.forge_authorization = true);
    let lock = device(&mock, &record);

    let err = lock.pair().await.unwrap_err();
    assert!(matches!(err, Error::BadAuthenticator), "{err:?}");
    assert!(!lock.is_paired());
    assert!(!mock.received().contains(&Command::AuthorizationIdConfirmation));
}

#[tokio::test(start_paused = true)]
async fn pairing_needs_completed_status() {
    let (mock, record) = MockLock::unpaired(Model::SmartLock, true);
    mock.with(|d| d.pairing_status = StatusCode::Accepted);
    let lock = device(&mock, &record);

    let err = lock.pair().await.unwrap_err();
    assert!(
        matches!(err, Error::PairingIncomplete(StatusCode::Accepted)),
        "{err:?}"
    );
    assert!(!lock.is_paired());
}

#[tokio::test(start_paused = true)]
async fn encrypted_request_before_pairing() {
    let (mock, record) = MockLock::unpaired(Model::SmartLock, true);
    let lock = device(&mock, &record);

    assert!(matches!(lock.update_state().await, Err(Error::NotPaired)));
    assert!(mock.received().is_empty());
}

#[tokio::test(start_paused = true)]
async fn config_follows_update_counter() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    let lock = device(&mock, &record);

    lock.update_state().await.unwrap();
    assert_eq!(lock.link_state(), LinkState::Connected);
    assert_eq!(lock.config().unwrap().name(), "Front door");
    assert_eq!(count(&mock.received(), Command::RequestConfig), 1);

    lock.update_state().await.unwrap();
    assert_eq!(count(&mock.received(), Command::RequestConfig), 1);

    mock.with(|d| d.states.config_update_count = 2);
    lock.update_state().await.unwrap();
    assert_eq!(count(&mock.received(), Command::RequestConfig), 2);
    assert_eq!(mock.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_updates_are_single_flight() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    let lock = device(&mock, &record);

    let (a, b) = tokio::join!(lock.update_state(), lock.update_state());
    a.unwrap();
    b.unwrap();

    let received = mock.received();
    // one for the states, one for the config challenge
    assert_eq!(count(&received, Command::RequestData), 2);
    assert_eq!(count(&received, Command::RequestConfig), 1);
}

#[tokio::test(start_paused = true)]
async fn operations_do_not_interleave() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    let lock = device(&mock, &record);

    let (status, valid) = tokio::join!(lock.lock(), lock.verify_pin(PIN));
    assert_eq!(status.unwrap(), StatusCode::Accepted);
    assert!(valid.unwrap());

    // every command directly follows its own challenge
    let received = mock.received();
    assert_eq!(received.len(), 4);
    assert_eq!(received[0], Command::RequestData);
    assert_eq!(received[2], Command::RequestData);
    assert!(received.contains(&Command::LockAction));
    assert!(received.contains(&Command::VerifySecurityPin));
}

#[tokio::test(start_paused = true)]
async fn lock_reports_transitional_state() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    let lock = device(&mock, &record);
    lock.update_state().await.unwrap();
    assert_eq!(lock.lock_state(), Some(SmartLockState::Unlocked.into()));

    let seen: Arc<Mutex<Vec<(Option<LockState>, Option<StatusCode>)>>> = Arc::default();
    let sink = seen.clone();
    lock.subscribe(Arc::new(move |s: &DeviceSnapshot| {
        sink.lock().unwrap().push((s.lock_state, s.last_action_status))
    }));

    assert_eq!(lock.lock().await.unwrap(), StatusCode::Accepted);
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (Some(SmartLockState::Locking.into()), None));
        assert_eq!(
            seen.last(),
            Some(&(Some(SmartLockState::Locking.into()), Some(StatusCode::Accepted)))
        );
    }

    settle().await;
    assert_eq!(lock.lock_state(), Some(SmartLockState::Locked.into()));
    assert_eq!(lock.last_action_status(), Some(StatusCode::Completed));
}

#[tokio::test(start_paused = true)]
async fn opener_actions() {
    let (mock, record) = MockLock::paired(Model::Opener);
    let lock = device(&mock, &record);
    assert_eq!(lock.model(), Model::Opener);

    lock.unlock().await.unwrap();
    settle().await;
    assert_eq!(lock.lock_state(), Some(OpenerState::RtoActive.into()));

    let seen: Arc<Mutex<Vec<Option<LockState>>>> = Arc::default();
    let sink = seen.clone();
    lock.subscribe(Arc::new(move |s: &DeviceSnapshot| {
        sink.lock().unwrap().push(s.lock_state)
    }));
    lock.unlatch().await.unwrap();
    assert_eq!(seen.lock().unwrap()[0], Some(OpenerState::Opening.into()));
    settle().await;
    assert_eq!(lock.lock_state(), Some(OpenerState::Open.into()));

    lock.lock().await.unwrap();
    settle().await;
    assert_eq!(lock.lock_state(), Some(OpenerState::Locked.into()));
}

#[tokio::test(start_paused = true)]
async fn verify_pin() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    let lock = device(&mock, &record);

    assert!(!lock.verify_pin(4321).await.unwrap());
    assert!(lock.verify_pin(PIN).await.unwrap());
    // a rejected pin is an answer, not a failure worth retrying
    assert_eq!(count(&mock.received(), Command::VerifySecurityPin), 2);
}

#[tokio::test(start_paused = true)]
async fn log_history_is_paged() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    mock.with(|d| {
        d.log = (1..=25).map(|i| log_entry(i, SmartLockAction::Unlock)).collect();
    });
    let lock = device(&mock, &record);

    let entries = lock.request_log_history(PIN, 25).await.unwrap();
    assert_eq!(entries.len(), 25);
    assert_eq!(entries[0].index, 25);
    assert_eq!(entries[24].index, 1);
    assert_eq!(count(&mock.received(), Command::RequestLogEntries), 2);

    let last = lock.request_last_log_entry(PIN).await.unwrap().unwrap();
    assert_eq!(last.index, 25);

    // the STATUS closing the list is not an action status
    assert_eq!(lock.last_action_status(), None);
}

#[tokio::test(start_paused = true)]
async fn log_with_wrong_pin() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    mock.with(|d| d.log = vec![log_entry(1, SmartLockAction::Lock)]);
    let lock = device(&mock, &record);

    let err = lock
        .request_log_entries(1111, 0, 10, nuki_proto::SortOrder::Descending)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::BadPin));
    assert!(matches!(err, Error::Protocol { code: 0x21, .. }));
}

#[tokio::test(start_paused = true)]
async fn silent_device_times_out() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    let lock = device(&mock, &record);
    mock.with(|d| d.silent = 5);

    let err = lock.update_state().await.unwrap_err();
    assert!(matches!(err, Error::ResponseTimeout(_)), "{err:?}");
    assert!(mock.received().is_empty());

    // the next request starts from a clean slot
    lock.update_state().await.unwrap();
    assert!(lock.state().keyturner.is_some());
}

#[tokio::test(start_paused = true)]
async fn garbled_response_is_retried() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    let lock = device(&mock, &record);
    mock.with(|d| d.garble = 1);

    lock.update_state().await.unwrap();
    assert_eq!(
        mock.received(),
        vec![
            Command::RequestData,
            Command::RequestData,
            Command::RequestData,
            Command::RequestConfig,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unsolicited_states_reach_subscribers() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    let lock = device(&mock, &record);
    let versions: Arc<Mutex<Vec<u64>>> = Arc::default();
    let sink = versions.clone();
    let subscription = lock.subscribe(Arc::new(move |s: &DeviceSnapshot| {
        sink.lock().unwrap().push(s.version)
    }));

    mock.with(|d| d.states.lock_state = SmartLockState::Locked.into());
    mock.push_states();
    settle().await;

    assert_eq!(lock.lock_state(), Some(SmartLockState::Locked.into()));
    assert_eq!(versions.lock().unwrap().len(), 1);

    subscription.unsubscribe();
    mock.push_states();
    settle().await;
    assert_eq!(versions.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn opener_failure_status_expires() {
    let (mock, record) = MockLock::paired(Model::Opener);
    mock.with(|d| d.states.last_lock_action_completion_status = CompletionStatus::Busy);
    let lock = device(&mock, &record);

    lock.update_state().await.unwrap();
    assert_eq!(lock.state().last_completion_status(), Some(CompletionStatus::Busy));

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(lock.state().last_completion_status(), Some(CompletionStatus::Busy));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(lock.state().last_completion_status(), Some(CompletionStatus::Success));
}

#[tokio::test(start_paused = true)]
async fn cancelled_update_leaves_no_waiter() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    let lock = device(&mock, &record);

    let cancelled = tokio::time::timeout(Duration::from_millis(5), lock.update_state()).await;
    assert!(cancelled.is_err());
    // the late answer is taken as unsolicited
    settle().await;
    assert!(lock.state().keyturner.is_some());

    lock.update_state().await.unwrap();
    assert_eq!(count(&mock.received(), Command::RequestConfig), 1);
}

#[tokio::test(start_paused = true)]
async fn states_with_unnamed_values_are_cached() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    mock.with(|d| {
        d.states.trigger = ActionTrigger::Other(0x04);
        d.states.last_lock_action_completion_status = CompletionStatus::Other(0x09);
    });
    let lock = device(&mock, &record);

    lock.update_state().await.unwrap();
    let states = lock.state().keyturner.clone().unwrap();
    assert_eq!(states.trigger, ActionTrigger::Other(0x04));
    assert_eq!(lock.lock_state(), Some(SmartLockState::Unlocked.into()));
    assert_eq!(count(&mock.received(), Command::RequestData), 2);
}

#[tokio::test(start_paused = true)]
async fn battery_report_and_advanced_config() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    let lock = device(&mock, &record);

    let report = lock.request_battery_report().await.unwrap();
    assert_eq!(report, battery_report(Model::SmartLock));
    assert_eq!(report.start_temperature, -3);

    let config = lock.request_advanced_config().await.unwrap();
    assert_eq!(config, advanced_config(Model::SmartLock));
    assert_eq!(config.battery_type(), BatteryType::Lithium);
    assert_eq!(lock.state().advanced_config, Some(config));
    assert_eq!(
        mock.received(),
        vec![
            Command::RequestData,
            Command::RequestData,
            Command::RequestAdvancedConfig,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn opener_advanced_config() {
    let (mock, record) = MockLock::paired(Model::Opener);
    let lock = device(&mock, &record);

    let config = lock.request_advanced_config().await.unwrap();
    assert_eq!(config, advanced_config(Model::Opener));
}

#[tokio::test(start_paused = true)]
async fn authorization_entries_window() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    mock.with(|d| {
        d.authorizations = ["Phone", "Bridge", "Keypad", "Watch"]
            .iter()
            .enumerate()
            .map(|(i, name)| authorization(i as u32 + 1, name))
            .collect();
    });
    let lock = device(&mock, &record);

    let entries = lock.request_authorization_entries(PIN, 1, 2).await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["Bridge", "Keypad"]);
    assert_eq!(entries[0].auth_id, 2);

    let err = lock
        .request_authorization_entries(4321, 0, 10)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::BadPin));
    // the STATUS closing the list is not an action status
    assert_eq!(lock.last_action_status(), None);
}

fn beacon(state_changed: bool) -> Advertisement {
    let tx_power = if state_changed { 0xc5 } else { 0xc4 };
    Advertisement {
        address: ADDRESS.to_lowercase(),
        rssi: Some(-61),
        manufacturer_data: HashMap::from([(APPLE_COMPANY_ID, vec![0x02, 0x15, tx_power])]),
        service_uuids: Vec::new(),
    }
}

#[tokio::test(start_paused = true)]
async fn beacons_trigger_polls() {
    let (mock, record) = MockLock::paired(Model::SmartLock);
    let lock = device(&mock, &record);

    // nothing cached yet
    assert!(lock.handle_advertisement(&beacon(false)).await.unwrap());
    assert_eq!(lock.rssi(), Some(-61));
    // same broadcast burst
    assert!(!lock.handle_advertisement(&beacon(true)).await.unwrap());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!lock.handle_advertisement(&beacon(false)).await.unwrap());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(lock.handle_advertisement(&beacon(true)).await.unwrap());

    let received = mock.received();
    assert_eq!(count(&received, Command::RequestData), 3);
    assert_eq!(count(&received, Command::RequestConfig), 1);
}
