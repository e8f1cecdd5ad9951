//! Serial Protocol Communication
//!
//! Implements the half-duplex, line-oriented command protocol spoken by the
//! robot's Arduino Nano co-processor.
//!
//! Layers, lowest first: [`stream`] (byte channel), [`frame`] (newline
//! framing), [`classify`] and [`unsolicited`] (what a frame means),
//! [`engine`] (one command in flight), [`resync`] (getting the device into
//! a known state) and [`Connection`] (lifecycle).

pub mod classify;
pub mod commands;
mod connection;
pub mod engine;
mod error;
pub mod frame;
pub mod resync;
pub mod serial;
pub mod stream;
pub mod unsolicited;

pub use classify::{classify, Classification};
pub use commands::{Command, ReplyKind};
pub use connection::{flush_stale_input, Connection, ConnectionState};
pub use engine::{LinkState, Reply, Session};
pub use error::{ProtocolError, SyncFaultKind};
pub use frame::Frame;
pub use resync::{ResyncReport, ResyncState, Resynchronizer};
pub use serial::{configure_port, list_ports, open_port, PortInfo};
pub use stream::{LineChannel, SerialChannel};
pub use unsolicited::{LogSink, NotificationSink};

/// Default baud rate for co-processor communication
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Longest line accepted before its terminator
pub const MAX_FRAME_LEN: usize = 256;
