//! Device, paper and document types shared by every layer

use crate::error::{PrintError, PrintResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport family of a printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Network,
    Usb,
    Bluetooth,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionType::Network => "network",
            ConnectionType::Usb => "usb",
            ConnectionType::Bluetooth => "bluetooth",
        })
    }
}

fn default_port() -> u16 {
    9100
}

/// Transport-specific reachability info
///
/// Serialized with a `connectionType` tag so host payloads such as
/// `{"connectionType":"network","ipAddress":"10.0.0.5","port":9100}`
/// deserialize directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "connectionType",
    rename_all = "lowercase",
    rename_all_fields = "camelCase"
)]
pub enum ConnectionParams {
    Network {
        ip_address: String,
        #[serde(default = "default_port")]
        port: u16,
    },
    Usb {
        /// Stable `VID:PID` (uppercase hex) or a legacy numeric device id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usb_device_id: Option<String>,
        /// Transient OS device path, e.g. `/dev/bus/usb/001/004`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        platform_specific_id: Option<String>,
    },
    Bluetooth {
        bluetooth_address: String,
    },
}

impl ConnectionParams {
    pub fn connection_type(&self) -> ConnectionType {
        match self {
            ConnectionParams::Network { .. } => ConnectionType::Network,
            ConnectionParams::Usb { .. } => ConnectionType::Usb,
            ConnectionParams::Bluetooth { .. } => ConnectionType::Bluetooth,
        }
    }

    /// Reject params that cannot possibly address a device
    pub fn validate(&self) -> PrintResult<()> {
        match self {
            ConnectionParams::Network { ip_address, port } => {
                if ip_address.trim().is_empty() {
                    return Err(PrintError::InvalidArgument("ipAddress required".into()));
                }
                if *port == 0 {
                    return Err(PrintError::InvalidArgument("port must be non-zero".into()));
                }
            }
            ConnectionParams::Usb {
                usb_device_id,
                platform_specific_id,
            } => {
                let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
                if blank(usb_device_id) && blank(platform_specific_id) {
                    return Err(PrintError::InvalidArgument(
                        "usbDeviceId or platformSpecificId required".into(),
                    ));
                }
            }
            ConnectionParams::Bluetooth { bluetooth_address } => {
                if !is_valid_mac(bluetooth_address) {
                    return Err(PrintError::InvalidArgument(format!(
                        "invalid bluetoothAddress: {}",
                        bluetooth_address
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Point-in-time reachability of a printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterStatus {
    Online,
    Offline,
    Unknown,
    /// The status request itself was malformed
    Error,
}

/// One physical printer candidate produced by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterDevice {
    pub id: String,
    pub display_name: String,
    pub model_hint: String,
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub status: PrinterStatus,
    /// Advisory UI label, never used to filter or gate printing
    #[serde(default)]
    pub likely_printer: bool,
}

impl PrinterDevice {
    /// Build a device record for a network printer supplied out of band
    pub fn network(ip: &str, port: u16) -> Self {
        Self {
            id: format!("net_{}_{}", ip, port),
            display_name: format!("{}:{}", ip, port),
            model_hint: "Network Printer".to_string(),
            connection: ConnectionParams::Network {
                ip_address: ip.to_string(),
                port,
            },
            status: PrinterStatus::Unknown,
            likely_printer: true,
        }
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection.connection_type()
    }
}

/// Paper width class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperWidth {
    #[serde(rename = "mm58")]
    Mm58,
    #[default]
    #[serde(rename = "mm80")]
    Mm80,
}

/// Printer physical/format configuration
///
/// `chars_per_line` is fixed at construction and drives every padding width
/// of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaperProfile {
    width: PaperWidth,
    chars_per_line: usize,
}

impl PaperProfile {
    /// Print head resolution assumed for every supported printer
    pub const DPI: u32 = 203;

    pub fn new(width: PaperWidth) -> Self {
        let chars_per_line = match width {
            PaperWidth::Mm58 => 32,
            PaperWidth::Mm80 => 48,
        };
        Self {
            width,
            chars_per_line,
        }
    }

    /// Parse the host's `paperSize` string; anything unrecognized is 80mm
    pub fn from_paper_size(size: Option<&str>) -> Self {
        match size {
            Some("mm58") => Self::new(PaperWidth::Mm58),
            _ => Self::new(PaperWidth::Mm80),
        }
    }

    pub fn width(&self) -> PaperWidth {
        self.width
    }

    pub fn chars_per_line(&self) -> usize {
        self.chars_per_line
    }

    pub fn dpi(&self) -> u32 {
        Self::DPI
    }

    pub fn width_mm(&self) -> f32 {
        match self.width {
            PaperWidth::Mm58 => 58.0,
            PaperWidth::Mm80 => 80.0,
        }
    }
}

impl Default for PaperProfile {
    fn default() -> Self {
        Self::new(PaperWidth::default())
    }
}

fn default_title() -> String {
    "RECEIPT".to_string()
}

/// Receipt payload as sent by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptDocument {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ReceiptDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Timestamp to print, if any; an empty string counts as absent
    pub fn printable_timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref().filter(|t| !t.is_empty())
    }
}
