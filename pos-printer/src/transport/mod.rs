//! Printer transports
//!
//! Supports:
//! - Network printers (raw TCP, port 9100 by default)
//! - USB printers (bulk OUT endpoint, gated by OS permission)
//! - Bluetooth classic printers (RFCOMM serial port profile)
//!
//! Every transport follows the same contract: `open`, `write`, `close`.
//! `close` is idempotent and safe to call on a transport that never opened.

pub mod bluetooth;
pub mod network;
pub mod usb;

use crate::error::PrintResult;
use crate::model::ConnectionType;

pub use bluetooth::{BluetoothHost, BluetoothTransport, BluezHost, BondedDevice};
pub use network::NetworkTransport;
pub use usb::{NusbHost, UsbDeviceInfo, UsbEvent, UsbHost, UsbLink, UsbTransport};

/// Trait for transport adapters
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Establish the connection
    async fn open(&mut self) -> PrintResult<()>;

    /// Send raw bytes over the open connection
    async fn write(&mut self, data: &[u8]) -> PrintResult<()>;

    /// Release the connection. Never fails, may be called repeatedly.
    async fn close(&mut self);
}

/// An open (or opening) printer connection, one per print operation
pub enum Connection {
    Network(NetworkTransport),
    Usb(UsbTransport),
    Bluetooth(BluetoothTransport),
}

impl Connection {
    pub fn connection_type(&self) -> ConnectionType {
        match self {
            Connection::Network(_) => ConnectionType::Network,
            Connection::Usb(_) => ConnectionType::Usb,
            Connection::Bluetooth(_) => ConnectionType::Bluetooth,
        }
    }
}

impl Transport for Connection {
    async fn open(&mut self) -> PrintResult<()> {
        match self {
            Connection::Network(t) => t.open().await,
            Connection::Usb(t) => t.open().await,
            Connection::Bluetooth(t) => t.open().await,
        }
    }

    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        match self {
            Connection::Network(t) => t.write(data).await,
            Connection::Usb(t) => t.write(data).await,
            Connection::Bluetooth(t) => t.write(data).await,
        }
    }

    async fn close(&mut self) {
        match self {
            Connection::Network(t) => t.close().await,
            Connection::Usb(t) => t.close().await,
            Connection::Bluetooth(t) => t.close().await,
        }
    }
}
