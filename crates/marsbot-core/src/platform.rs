//! Platform detection
//!
//! Chooses the serial port the co-processor is normally attached to. On the
//! robot that is the Raspberry Pi's primary UART (GPIO14/15, header pins 8
//! and 10); on a desktop the Nano is usually plugged in over USB.

use std::path::Path;

use crate::protocol::ProtocolError;

/// Device-tree model file present on Raspberry Pi kernels
pub const RPI_MODEL_FILE: &str = "/sys/firmware/devicetree/base/model";

/// Host platforms with a known default port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Raspberry Pi; the co-processor sits on the GPIO UART
    RaspberryPi,
    /// Any other Linux host
    Linux,
    /// macOS, Nano on a USB serial adapter
    MacOs,
    /// Windows, Nano on a COM port
    Windows,
    /// No known default port
    Other,
}

impl Platform {
    /// Detect the platform this process is running on
    pub fn detect() -> Self {
        if cfg!(target_os = "linux") {
            if is_raspberry_pi(Path::new(RPI_MODEL_FILE)) {
                Platform::RaspberryPi
            } else {
                Platform::Linux
            }
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Other
        }
    }

    /// Usual serial port for the co-processor on this platform
    pub fn default_port(&self) -> Option<&'static str> {
        match self {
            // /dev/serial0 links to whichever UART is primary on this Pi model
            Platform::RaspberryPi => Some("/dev/serial0"),
            Platform::Linux => Some("/dev/ttyUSB0"),
            Platform::MacOs => Some("/dev/cu.usbserial-1420"),
            Platform::Windows => Some("COM3"),
            Platform::Other => None,
        }
    }
}

/// Checks the device-tree model string for "Raspberry"
pub fn is_raspberry_pi(model_file: &Path) -> bool {
    std::fs::read_to_string(model_file)
        .map(|model| model.contains("Raspberry"))
        .unwrap_or(false)
}

/// Explicit port if given, else the platform default
pub fn resolve_port(explicit: Option<&str>, platform: Platform) -> Result<String, ProtocolError> {
    if let Some(port) = explicit {
        return Ok(port.to_string());
    }
    platform
        .default_port()
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::PortNotFound("unknown platform, no default port".into()))
}
