//! Command line client for Nuki Smart Locks and Openers
//!
//! Pairs with a device over BLE, keeps the credentials under `$NUKI_HOME`
//! and runs lock actions and queries against paired devices.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use nuki_ble::{BtleplugTransport, ble};
use nuki_device::{DeviceRecord, NukiDevice, SessionConfig, nuki_home};
use nuki_proto::{LogEntryData, SortOrder, StatusCode};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "nuki-ctl")]
#[command(about = "Command line client for Nuki Smart Locks and Openers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for Nuki devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// List paired devices
    Devices,
    /// Pair with a device in pairing mode
    Pair {
        /// Device address
        address: String,
        /// Name shown in the device's activity log
        #[arg(short, long, default_value = "nuki-ctl")]
        name: String,
        /// Appended to the name for lock actions
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Print the keyturner states
    Status { address: String },
    /// Print the device configuration
    Config {
        address: String,
        /// Also fetch the advanced configuration
        #[arg(short, long)]
        advanced: bool,
    },
    /// Print the battery report
    Battery { address: String },
    /// Lock; deactivates ring to open on an Opener
    Lock { address: String },
    /// Unlock; activates ring to open on an Opener
    Unlock { address: String },
    /// Unlatch; opens the door on an Opener
    Unlatch { address: String },
    /// Check a security PIN
    VerifyPin { address: String, pin: u16 },
    /// Print the most recent activity log entries
    Logs {
        address: String,
        pin: u16,
        /// Number of entries
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Print the authorizations known to the device
    Authorizations {
        address: String,
        pin: u16,
        #[arg(short, long, default_value = "20")]
        count: u16,
    },
    /// Follow beacons of a paired device and poll it when it reports a change
    Watch { address: String },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let home = nuki_home()?;

    match cli.command {
        Commands::Scan { duration } => scan_devices(duration).await?,
        Commands::Devices => {
            for record in DeviceRecord::list(&home)? {
                let paired = if record.is_paired() { "paired" } else { "not paired" };
                println!(
                    "{} {:?} app id {:#010x} ({paired})",
                    record.address, record.device_type, record.app_id
                );
            }
        }
        Commands::Pair {
            address,
            name,
            suffix,
        } => pair_device(&home, &address, &name, suffix).await?,
        Commands::Status { address } => {
            let lock = open(&home, &address).await?;
            lock.update_state().await?;
            println!("{}", serde_json::to_string_pretty(&*lock.state())?);
            save(&home, &lock)?;
        }
        Commands::Config { address, advanced } => {
            let lock = open(&home, &address).await?;
            lock.update_config().await?;
            if let Some(config) = lock.config() {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            if advanced {
                let config = lock.request_advanced_config().await?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
        Commands::Battery { address } => {
            let lock = open(&home, &address).await?;
            let report = lock.request_battery_report().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Lock { address } => {
            let lock = open(&home, &address).await?;
            report_action(&lock, lock.lock().await?).await;
        }
        Commands::Unlock { address } => {
            let lock = open(&home, &address).await?;
            report_action(&lock, lock.unlock().await?).await;
        }
        Commands::Unlatch { address } => {
            let lock = open(&home, &address).await?;
            report_action(&lock, lock.unlatch().await?).await;
        }
        Commands::VerifyPin { address, pin } => {
            let lock = open(&home, &address).await?;
            if lock.verify_pin(pin).await? {
                println!("PIN accepted");
            } else {
                println!("PIN rejected");
            }
        }
        Commands::Logs {
            address,
            pin,
            limit,
        } => {
            let lock = open(&home, &address).await?;
            for entry in lock.request_log_history(pin, limit).await? {
                let detail = match &entry.data {
                    LogEntryData::LockAction {
                        lock_action,
                        completion_status,
                        ..
                    } => format!("{lock_action:?} {completion_status:?}"),
                    data => format!("{data:?}"),
                };
                println!(
                    "#{:<5} {} {:<20} {detail}",
                    entry.index,
                    entry.timestamp,
                    entry.name.as_str()
                );
            }
        }
        Commands::Authorizations {
            address,
            pin,
            count,
        } => {
            let lock = open(&home, &address).await?;
            let entries = lock.request_authorization_entries(pin, 0, count).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Commands::Watch { address } => watch_device(&home, &address).await?,
    }

    Ok(())
}

fn record_path(home: &std::path::Path, address: &str) -> PathBuf {
    DeviceRecord::path(home, address)
}

async fn open(home: &std::path::Path, address: &str) -> CliResult<NukiDevice<BtleplugTransport>> {
    let path = record_path(home, address);
    let record = DeviceRecord::load(&path)
        .map_err(|e| format!("{address} is not paired ({e}), run `nuki-ctl pair {address}`"))?;
    let adapter = ble::get_adapter().await?;
    let transport = ble::connect_transport(&adapter, &record.address).await?;
    Ok(NukiDevice::from_record(
        transport,
        &record,
        SessionConfig::default(),
    ))
}

fn save(home: &std::path::Path, lock: &NukiDevice<BtleplugTransport>) -> CliResult<()> {
    lock.to_record()
        .save(&record_path(home, lock.address()))?;
    Ok(())
}

async fn scan_devices(duration: u64) -> CliResult<()> {
    println!("Scanning for Nuki devices ({duration} seconds)...");
    let adapter = ble::get_adapter().await?;
    let devices = ble::scan(&adapter, duration).await?;

    println!("\nFound {} devices:", devices.len());
    for device in devices {
        let rssi = device
            .advertisement
            .rssi
            .map(|r| format!("{r} dBm"))
            .unwrap_or_else(|| "N/A".to_string());
        let kind = device
            .beacon
            .map(|b| format!(" {:?}", b.device_type))
            .unwrap_or_default();
        println!(
            "  {} ({}) RSSI: {rssi}{kind}",
            device.name, device.advertisement.address
        );
    }
    Ok(())
}

async fn pair_device(
    home: &std::path::Path,
    address: &str,
    name: &str,
    suffix: Option<String>,
) -> CliResult<()> {
    let mut record = DeviceRecord::new(address, rand::random(), name);
    record.name_suffix = suffix;

    let adapter = ble::get_adapter().await?;
    let transport = ble::connect_transport(&adapter, address).await?;
    let lock = NukiDevice::from_record(transport, &record, SessionConfig::default());

    println!("Pairing with {address}, the device must be in pairing mode...");
    let auth_id = lock.pair().await?;
    save(home, &lock)?;
    println!(
        "Paired as authorization {}",
        u32::from_le_bytes(auth_id)
    );

    lock.update_state().await?;
    if let Some(config) = lock.config() {
        println!("{} ({:?}), firmware {}", config.name(), lock.device_type(), config.firmware_version());
    }
    save(home, &lock)?;
    lock.disconnect().await?;
    Ok(())
}

async fn report_action(lock: &NukiDevice<BtleplugTransport>, status: StatusCode) {
    println!("{status:?}");
    if status != StatusCode::Accepted {
        return;
    }
    // the device reports completion with an unsolicited STATUS
    let deadline = Instant::now() + Duration::from_secs(30);
    while Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(250)).await;
        if lock.last_action_status() == Some(StatusCode::Completed) {
            println!("Completed, now {:?}", lock.lock_state());
            return;
        }
    }
    warn!("no completion reported");
}

async fn watch_device(home: &std::path::Path, address: &str) -> CliResult<()> {
    let lock = open(home, address).await?;
    let _subscription = lock.subscribe(std::sync::Arc::new(|s: &nuki_device::DeviceSnapshot| {
        println!(
            "[{}] {:?} battery {:?}% rssi {:?}",
            s.version,
            s.lock_state,
            s.battery_percentage(),
            s.rssi
        );
    }));

    let adapter = ble::get_adapter().await?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let scanner = tokio::spawn(async move { ble::watch(&adapter, tx).await });

    let mut last_poll: Option<Instant> = None;
    let mut tick = tokio::time::interval(Duration::from_secs(10));
    loop {
        tokio::select! {
            adv = rx.recv() => {
                let Some(adv) = adv else { break };
                match lock.handle_advertisement(&adv).await {
                    Ok(true) => last_poll = Some(Instant::now()),
                    Ok(false) => {}
                    Err(e) => warn!(%e, "beacon poll failed"),
                }
                continue;
            }
            _ = tick.tick() => {}
        }
        if lock.poll_needed(last_poll.map(|t| t.elapsed())) {
            info!(address, "polling");
            match lock.update_state().await {
                Ok(()) => last_poll = Some(Instant::now()),
                Err(e) => warn!(%e, "poll failed"),
            }
        }
    }

    scanner.await??;
    Ok(())
}
