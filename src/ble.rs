//! BLE transport for the MXW01: scan, connect, characteristic discovery and
//! notification delivery over `btleplug`.
//!
//! The printer exposes one service (`ae30`) with three characteristics:
//! `ae01` for framed commands, `ae02` for notifications, `ae03` for raw
//! pixel data.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::bleuuid::uuid_from_u16;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Error;
use crate::printer::Transport;

pub const SERVICE_UUID: Uuid = uuid_from_u16(0xAE30);
pub const COMMAND_CHAR_UUID: Uuid = uuid_from_u16(0xAE01);
pub const NOTIFY_CHAR_UUID: Uuid = uuid_from_u16(0xAE02);
pub const DATA_CHAR_UUID: Uuid = uuid_from_u16(0xAE03);

/// Advertised device name of the target printer family.
pub const TARGET_NAME: &str = "MXW01";

const SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Scans for an advertising printer matching the target name, or the given
/// MAC address when one is supplied.
pub async fn find_printer(address: Option<&str>) -> Result<Peripheral, Error> {
    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or(Error::NoAdapter)?;

    if let Some(addr) = address {
        log::info!("scanning for printer at address {addr}");
    } else {
        log::info!("scanning for printer named {TARGET_NAME}");
    }
    adapter.start_scan(ScanFilter::default()).await?;
    let found = tokio::time::timeout(SCAN_TIMEOUT, wait_for_match(&adapter, address)).await;
    let _ = adapter.stop_scan().await;

    match found {
        Ok(result) => result,
        Err(_elapsed) => Err(Error::PrinterNotFound),
    }
}

async fn wait_for_match(adapter: &Adapter, address: Option<&str>) -> Result<Peripheral, Error> {
    let mut events = adapter.events().await?;
    while let Some(event) = events.next().await {
        let id = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
            _ => continue,
        };
        let peripheral = adapter.peripheral(&id).await?;
        let Some(props) = peripheral.properties().await? else {
            continue;
        };
        let matched = match address {
            Some(addr) => props.address.to_string().eq_ignore_ascii_case(addr),
            None => props.local_name.as_deref() == Some(TARGET_NAME),
        };
        if matched {
            log::info!("found target printer at {}", props.address);
            return Ok(peripheral);
        }
    }
    Err(Error::PrinterNotFound)
}

/// A connected printer with its command and data channels resolved.
///
/// Missing command or data characteristics are fatal at connect time; the
/// notify characteristic is only required once notifications are requested.
pub struct BleTransport {
    peripheral: Peripheral,
    command: Characteristic,
    data: Characteristic,
    notify: Option<Characteristic>,
}

impl BleTransport {
    /// Connects and discovers the printer's GATT layout.
    pub async fn connect(peripheral: Peripheral) -> Result<Self, Error> {
        log::info!("connecting...");
        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();
        let find = |uuid: Uuid| {
            characteristics
                .iter()
                .find(|c| c.uuid == uuid && c.service_uuid == SERVICE_UUID)
                .cloned()
        };
        let command = find(COMMAND_CHAR_UUID).ok_or(Error::MissingCharacteristic("command"))?;
        let data = find(DATA_CHAR_UUID).ok_or(Error::MissingCharacteristic("data"))?;
        let notify = find(NOTIFY_CHAR_UUID);
        log::debug!("characteristics resolved (notify present: {})", notify.is_some());

        Ok(Self {
            peripheral,
            command,
            data,
            notify,
        })
    }

    /// Subscribes to printer notifications and returns a channel of raw
    /// frame bytes. The forwarding task ends when the connection drops or
    /// the receiver is closed.
    pub async fn subscribe(&self) -> Result<mpsc::Receiver<Vec<u8>>, Error> {
        let notify = self
            .notify
            .as_ref()
            .ok_or(Error::MissingCharacteristic("notify"))?;
        self.peripheral.subscribe(notify).await?;
        log::info!("subscribed to printer notifications");

        let mut stream = self.peripheral.notifications().await?;
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid != NOTIFY_CHAR_UUID {
                    continue;
                }
                if tx.send(notification.value).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    /// Tears the connection down. Errors are ignored; the device times out
    /// abandoned state on its own.
    pub async fn disconnect(&self) {
        let _ = self.peripheral.disconnect().await;
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn write_command(&self, frame: &[u8]) -> Result<(), Error> {
        self.peripheral
            .write(&self.command, frame, WriteType::WithResponse)
            .await
            .map_err(Error::from)
    }

    async fn write_data(&self, chunk: &[u8]) -> Result<(), Error> {
        self.peripheral
            .write(&self.data, chunk, WriteType::WithResponse)
            .await
            .map_err(Error::from)
    }
}
