//! # MarsBot Core Library
//!
//! Host-side driver for the UKMarsBot's Arduino Nano co-processor.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Newline framing and reply classification for the co-processor's line protocol
//! - A half-duplex command/reply engine with unsolicited-message handling
//! - The resynchronization sequence that brings the co-processor to a known state
//! - Serial port selection per platform
//! - A simulated co-processor for running without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use marsbot_core::{config::LinkConfig, protocol::Connection};
//!
//! let mut conn = Connection::new(LinkConfig::default());
//! let report = conn.connect()?;
//! println!("Co-processor {}", report.version);
//!
//! let battery = conn.read_battery()?;
//! println!("Battery: {}", battery);
//! ```

pub mod config;
pub mod platform;
pub mod protocol;
pub mod simulator;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::LinkConfig;
    pub use crate::platform::Platform;
    pub use crate::protocol::{
        Command, Connection, ConnectionState, LineChannel, LinkState, ProtocolError, Reply,
        ResyncReport, ResyncState, Resynchronizer, Session,
    };
    pub use crate::simulator::SimulatedCoprocessor;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
