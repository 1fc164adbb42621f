//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Connecting to the printer did not complete within the connect timeout
    #[error("Connect timeout: {0}")]
    ConnectTimeout(String),

    /// No device matches the supplied identifier
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The OS refused (or never granted) access to the device
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Sending bytes over an open connection failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// The formatting backend could not render the document
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Malformed or missing input field
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation's overall wall-clock budget elapsed
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO error not covered by a more specific variant
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrintError {
    /// Stable short code used by host bridges and diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            PrintError::ConnectTimeout(_) => "CONNECT_TIMEOUT",
            PrintError::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            PrintError::PermissionDenied(_) => "PERMISSION_DENIED",
            PrintError::WriteFailed(_) => "WRITE_FAILED",
            PrintError::Encoding(_) => "ENCODING_FAILED",
            PrintError::InvalidArgument(_) => "INVALID_ARGUMENT",
            PrintError::Timeout(_) => "TIMEOUT",
            PrintError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
