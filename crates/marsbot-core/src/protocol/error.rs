//! Protocol errors

use std::fmt;
use thiserror::Error;

/// Why a frame could not be reconciled with the expected protocol state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncFaultKind {
    /// A frame arrived that matches neither the expected reply nor the
    /// unsolicited namespace
    UnexpectedFrame,
    /// The device reported `@Error:<code>` while a reply was pending
    DeviceError {
        /// Raw code text following `@Error:`
        code: String,
    },
}

impl fmt::Display for SyncFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncFaultKind::UnexpectedFrame => write!(f, "unexpected reply"),
            SyncFaultKind::DeviceError { code } => write!(f, "device reported error {}", code),
        }
    }
}

/// Errors that can occur during protocol communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// No newline terminator arrived inside the read window
    #[error("No frame terminator within {window_ms}ms ({} bytes discarded)", .partial.len())]
    Timeout {
        /// Bytes read before the window elapsed; never treated as a frame
        partial: Vec<u8>,
        /// Length of the read window in milliseconds
        window_ms: u64,
    },

    /// Reply stream out of step with the command in flight
    #[error("Lost synchronization with co-processor: {kind} (frame {frame:?})")]
    Synchronization {
        /// What went wrong
        kind: SyncFaultKind,
        /// The offending frame, lossily decoded, terminator stripped
        frame: String,
    },

    /// Reset acknowledgement never arrived
    #[error("Co-processor did not acknowledge reset after {attempts} attempts")]
    LinkUnresponsive {
        /// Number of reset commands sent
        attempts: u32,
    },

    /// Frame exceeded the configured length before its terminator
    #[error("Frame exceeded {limit} bytes without a terminator")]
    FrameTooLong {
        /// Configured maximum frame length
        limit: usize,
    },

    /// The channel reported end of stream
    #[error("Channel closed")]
    ChannelClosed,

    /// Serial port error
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Named port does not exist or could not be chosen
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Operation needs an open link
    #[error("Not connected to co-processor")]
    NotConnected,

    /// Connect called twice
    #[error("Already connected")]
    AlreadyConnected,

    /// Invalid link configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Build a synchronization fault from the raw frame bytes
    pub fn sync(kind: SyncFaultKind, raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        ProtocolError::Synchronization {
            kind,
            frame: text.trim_end_matches(['\n', '\r']).to_string(),
        }
    }

    /// True for a TimeoutFault
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::Timeout { .. })
    }

    /// True for a SynchronizationFault (including escalated device errors)
    pub fn is_sync_fault(&self) -> bool {
        matches!(self, ProtocolError::Synchronization { .. })
    }

    /// Whether the only sanctioned recovery is a full resynchronization
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            ProtocolError::Timeout { .. }
                | ProtocolError::Synchronization { .. }
                | ProtocolError::FrameTooLong { .. }
        )
    }
}
