//! Printer timeouts and connection defaults

use serde::Deserialize;
use std::time::Duration;

/// Bounds applied to every suspension point of a print or probe.
///
/// Defaults match what generic thermal printers tolerate; any field can be
/// overridden from the environment with [`PrinterConfig::from_env`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrinterConfig {
    /// Port used when a network device omits one
    pub default_port: u16,
    /// TCP connect timeout
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Socket read/write timeout after connect
    #[serde(with = "millis")]
    pub io_timeout: Duration,
    /// Wall clock for one complete network print
    #[serde(with = "millis")]
    pub network_budget: Duration,
    /// Connect timeout of a network status probe
    #[serde(with = "millis")]
    pub status_connect_timeout: Duration,
    /// Wall clock for one network status probe
    #[serde(with = "millis")]
    pub status_budget: Duration,
    /// How long a USB permission prompt may stay unanswered
    #[serde(with = "millis")]
    pub usb_permission_timeout: Duration,
    /// RFCOMM connect timeout
    #[serde(with = "millis")]
    pub bluetooth_connect_timeout: Duration,
    /// RFCOMM channel of the serial port profile
    pub bluetooth_channel: u8,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            default_port: 9100,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(10),
            network_budget: Duration::from_secs(15),
            status_connect_timeout: Duration::from_secs(5),
            status_budget: Duration::from_secs(6),
            usb_permission_timeout: Duration::from_secs(4),
            bluetooth_connect_timeout: Duration::from_secs(10),
            bluetooth_channel: 1,
        }
    }
}

impl PrinterConfig {
    /// Build a config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            default_port: env_parse("PRINTER_DEFAULT_PORT").unwrap_or(d.default_port),
            connect_timeout: env_millis("PRINTER_CONNECT_TIMEOUT_MS").unwrap_or(d.connect_timeout),
            io_timeout: env_millis("PRINTER_IO_TIMEOUT_MS").unwrap_or(d.io_timeout),
            network_budget: env_millis("PRINTER_NETWORK_BUDGET_MS").unwrap_or(d.network_budget),
            status_connect_timeout: env_millis("PRINTER_STATUS_TIMEOUT_MS")
                .unwrap_or(d.status_connect_timeout),
            status_budget: env_millis("PRINTER_STATUS_BUDGET_MS").unwrap_or(d.status_budget),
            usb_permission_timeout: env_millis("PRINTER_USB_PERMISSION_TIMEOUT_MS")
                .unwrap_or(d.usb_permission_timeout),
            bluetooth_connect_timeout: env_millis("PRINTER_BT_CONNECT_TIMEOUT_MS")
                .unwrap_or(d.bluetooth_connect_timeout),
            bluetooth_channel: env_parse("PRINTER_BT_CHANNEL").unwrap_or(d.bluetooth_channel),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
