//! Serial port handling
//!
//! Provides low-level serial port access for the co-processor link.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;
use tracing::debug;

use super::{ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/serial0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb_info) => Self {
                name: info.port_name,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                product: usb_info.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Sort key: Pi UART aliases first, then USB serial adapters numerically,
/// then everything else by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("serial") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (2, num, basename.to_string());
    }
    (3, 0, basename.to_string())
}

/// List available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // The Pi's /dev/serialN aliases are symlinks the enumerator skips
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("serial") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open a serial port with the link's read timeout
pub fn open_port(
    name: &str,
    baud_rate: Option<u32>,
    timeout: Option<Duration>,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
    let timeout = timeout.unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS));

    serialport::new(name, baud)
        .timeout(timeout)
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(name.to_string()),
            _ => ProtocolError::SerialError(e.to_string()),
        })
}

/// Configure a serial port for the co-processor: 8N1, no flow control
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

    // Toggling DTR resets a USB-attached Nano into its bootloader; hold it steady.
    // GPIO UARTs have no DTR line, so failure here is not an error.
    if let Err(e) = port.write_data_terminal_ready(true) {
        debug!(error = %e, "could not assert DTR (continuing)");
    }

    Ok(())
}
