//! Bluetooth classic transport (RFCOMM, serial port profile)
//!
//! Printers must already be paired with the host. The transport opens an
//! RFCOMM socket directly instead of binding `/dev/rfcommN`, so no root
//! privileges are needed.

use super::Transport;
use crate::config::PrinterConfig;
use crate::error::{PrintError, PrintResult};
use crate::model::is_valid_mac;
use std::io::{self, Write};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A device paired (bonded) with the local adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondedDevice {
    pub address: String,
    pub name: Option<String>,
}

/// Platform Bluetooth adapter services
///
/// Implementations may block on IPC; callers run them off the async workers.
pub trait BluetoothHost: Send + Sync {
    /// Adapter present and powered on
    fn is_available(&self) -> bool;

    /// Devices paired with the adapter
    fn bonded_devices(&self) -> PrintResult<Vec<BondedDevice>>;

    /// Whether `address` is paired
    fn is_bonded(&self, address: &str) -> bool {
        self.bonded_devices()
            .map(|devices| devices.iter().any(|d| d.address.eq_ignore_ascii_case(address)))
            .unwrap_or(false)
    }

    /// Stop any running inquiry; an active scan slows RFCOMM connects
    fn cancel_discovery(&self);
}

/// [`BluetoothHost`] backed by BlueZ through `bluetoothctl`
#[derive(Debug, Clone, Copy, Default)]
pub struct BluezHost;

impl BluezHost {
    fn run(args: &[&str]) -> io::Result<String> {
        let output = Command::new("bluetoothctl").args(args).output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "bluetoothctl {} exited with {}",
                args.join(" "),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl BluetoothHost for BluezHost {
    fn is_available(&self) -> bool {
        match Self::run(&["show"]) {
            Ok(out) => out.lines().any(|l| l.trim() == "Powered: yes"),
            Err(e) => {
                debug!(error = %e, "BLUETOOTH: adapter query failed");
                false
            }
        }
    }

    fn bonded_devices(&self) -> PrintResult<Vec<BondedDevice>> {
        // Older BlueZ only knows `paired-devices`
        let out = Self::run(&["devices", "Paired"]).or_else(|_| Self::run(&["paired-devices"]))?;
        Ok(parse_device_list(&out))
    }

    fn cancel_discovery(&self) {
        if let Err(e) = Self::run(&["scan", "off"]) {
            debug!(error = %e, "BLUETOOTH: cancel discovery failed");
        }
    }
}

/// Parse `Device XX:XX:XX:XX:XX:XX Name` lines from `bluetoothctl`
pub fn parse_device_list(output: &str) -> Vec<BondedDevice> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Device ")?;
            let (address, name) = match rest.split_once(' ') {
                Some((address, name)) => (address, Some(name.trim())),
                None => (rest, None),
            };
            if !is_valid_mac(address) {
                return None;
            }
            Some(BondedDevice {
                address: address.to_uppercase(),
                name: name.filter(|n| !n.is_empty()).map(str::to_string),
            })
        })
        .collect()
}

/// Bluetooth printer connection
pub struct BluetoothTransport {
    address: String,
    channel: u8,
    connect_timeout: Duration,
    io_timeout: Duration,
    host: Arc<dyn BluetoothHost>,
    socket: Option<socket2::Socket>,
}

impl BluetoothTransport {
    pub fn new(address: &str, host: Arc<dyn BluetoothHost>, config: &PrinterConfig) -> Self {
        Self {
            address: address.trim().to_uppercase(),
            channel: config.bluetooth_channel,
            connect_timeout: config.bluetooth_connect_timeout,
            io_timeout: config.io_timeout,
            host,
            socket: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Transport for BluetoothTransport {
    #[instrument(skip(self), fields(address = %self.address, channel = self.channel))]
    async fn open(&mut self) -> PrintResult<()> {
        if !is_valid_mac(&self.address) {
            return Err(PrintError::InvalidArgument(format!(
                "invalid bluetooth address: {}",
                self.address
            )));
        }
        info!(target: "printer", "BLUETOOTH: connecting to {}", self.address);

        let host = self.host.clone();
        let address = self.address.clone();
        let (channel, connect_timeout, io_timeout) = (self.channel, self.connect_timeout, self.io_timeout);
        let socket = tokio::task::spawn_blocking(move || {
            host.cancel_discovery();
            let socket = rfcomm::connect(&address, channel, connect_timeout)?;
            socket.set_write_timeout(Some(io_timeout))?;
            Ok::<_, io::Error>(socket)
        })
        .await
        .map_err(|e| PrintError::Io(io::Error::other(e)))?
        .map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut => PrintError::ConnectTimeout(format!("{}: {}", self.address, e)),
            _ => PrintError::DeviceNotFound(format!("{}: {}", self.address, e)),
        })?;

        info!(target: "printer", "BLUETOOTH: connected");
        self.socket = Some(socket);
        Ok(())
    }

    #[instrument(skip(self, data), fields(address = %self.address, data_len = data.len()))]
    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let socket = self
            .socket
            .take()
            .ok_or_else(|| PrintError::WriteFailed("connection not open".to_string()))?;

        let len = data.len();
        let data = data.to_vec();
        // If this future is dropped, the socket closes once the blocking write returns
        let (socket, result) = tokio::task::spawn_blocking(move || {
            let result = (&socket).write_all(&data).and_then(|_| (&socket).flush());
            (socket, result)
        })
        .await
        .map_err(|e| PrintError::Io(io::Error::other(e)))?;

        self.socket = Some(socket);
        result.map_err(|e| PrintError::WriteFailed(e.to_string()))?;

        info!(target: "printer", "BLUETOOTH: sent {} bytes", len);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            if let Err(e) = socket.shutdown(std::net::Shutdown::Both) {
                warn!(error = %e, "BLUETOOTH close error");
            }
            info!(target: "printer", "BLUETOOTH: socket closed");
        }
    }
}

/// Parse `AA:BB:CC:DD:EE:FF` into the little-endian `bdaddr_t` layout
fn parse_bdaddr(address: &str) -> io::Result<[u8; 6]> {
    let mut bytes = [0u8; 6];
    let mut parts = address.split(':');
    for slot in bytes.iter_mut().rev() {
        let part = parts
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "short bluetooth address"))?;
        *slot = u8::from_str_radix(part, 16)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    }
    if parts.next().is_some() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "long bluetooth address"));
    }
    Ok(bytes)
}

#[cfg(target_os = "linux")]
mod rfcomm {
    use super::parse_bdaddr;
    use socket2::{Domain, Protocol, SockAddr, Socket, Type};
    use std::io;
    use std::mem;
    use std::time::Duration;

    const BTPROTO_RFCOMM: libc::c_int = 3;

    /// `struct sockaddr_rc` from `<bluetooth/rfcomm.h>`
    #[repr(C)]
    struct SockaddrRc {
        rc_family: libc::sa_family_t,
        rc_bdaddr: [u8; 6],
        rc_channel: u8,
    }

    pub fn connect(address: &str, channel: u8, timeout: Duration) -> io::Result<Socket> {
        let bdaddr = parse_bdaddr(address)?;
        let socket = Socket::new(
            Domain::from(libc::AF_BLUETOOTH),
            Type::STREAM,
            Some(Protocol::from(BTPROTO_RFCOMM)),
        )?;

        let sockaddr = SockaddrRc {
            rc_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            rc_bdaddr: bdaddr,
            rc_channel: channel,
        };
        // SAFETY: an all-zero sockaddr_storage is valid
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        // SAFETY: sockaddr_storage is larger than SockaddrRc and at least as aligned
        unsafe {
            std::ptr::write(
                (&mut storage as *mut libc::sockaddr_storage).cast::<SockaddrRc>(),
                sockaddr,
            );
        }
        // SAFETY: storage holds an initialized sockaddr_rc of the given length
        let addr = unsafe { SockAddr::new(storage, mem::size_of::<SockaddrRc>() as libc::socklen_t) };

        socket.connect_timeout(&addr, timeout)?;
        Ok(socket)
    }
}

#[cfg(not(target_os = "linux"))]
mod rfcomm {
    use socket2::Socket;
    use std::io;
    use std::time::Duration;

    pub fn connect(_address: &str, _channel: u8, _timeout: Duration) -> io::Result<Socket> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "RFCOMM sockets are not supported on this platform",
        ))
    }
}
