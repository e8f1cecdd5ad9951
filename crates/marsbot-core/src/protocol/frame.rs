//! Frame reader
//!
//! Delimits the raw byte stream into newline-terminated frames. Bytes are
//! pulled one at a time so nothing beyond the terminator is consumed; a read
//! that times out discards whatever it had collected.

use std::fmt;
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use tracing::trace;

use super::commands::{NEWLINE, UNSOLICITED_PREFIX};
use super::ProtocolError;

/// One newline-terminated unit of protocol data
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    raw: Vec<u8>,
}

impl Frame {
    /// Wrap raw bytes; the last byte must be the newline terminator
    pub(crate) fn from_raw(raw: Vec<u8>) -> Self {
        debug_assert_eq!(raw.last(), Some(&NEWLINE));
        Self { raw }
    }

    /// Raw bytes as read, terminator included
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Content without the terminator (and without a trailing carriage return)
    pub fn line(&self) -> &[u8] {
        let body = &self.raw[..self.raw.len() - 1];
        body.strip_suffix(b"\r").unwrap_or(body)
    }

    /// Content decoded lossily, terminator stripped
    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.line()).into_owned()
    }

    /// Prefix match on the raw bytes
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.raw.starts_with(prefix)
    }

    /// Frame sits in the reserved `@` namespace
    pub fn is_unsolicited(&self) -> bool {
        self.starts_with(UNSOLICITED_PREFIX)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:?})", String::from_utf8_lossy(&self.raw))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Read one frame, failing with [`ProtocolError::Timeout`] if no terminator
/// arrives within `timeout`.
pub fn read_frame<R: Read + ?Sized>(
    reader: &mut R,
    timeout: Duration,
    max_len: usize,
) -> Result<Frame, ProtocolError> {
    let deadline = Instant::now() + timeout;
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Err(ProtocolError::ChannelClosed),
            Ok(_) => {
                raw.push(byte[0]);
                if byte[0] == NEWLINE {
                    let frame = Frame::from_raw(raw);
                    trace!(?frame, "rx");
                    return Ok(frame);
                }
                if raw.len() >= max_len {
                    return Err(ProtocolError::FrameTooLong { limit: max_len });
                }
            }
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(ProtocolError::Timeout {
                        partial: raw,
                        window_ms: timeout.as_millis() as u64,
                    });
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(ProtocolError::IoError(e)),
        }
    }
}

/// Like [`read_frame`], but a timeout is an ordinary `None` result
pub fn try_read_frame<R: Read + ?Sized>(
    reader: &mut R,
    timeout: Duration,
    max_len: usize,
) -> Result<Option<Frame>, ProtocolError> {
    match read_frame(reader, timeout, max_len) {
        Ok(frame) => Ok(Some(frame)),
        Err(ProtocolError::Timeout { partial, .. }) => {
            if !partial.is_empty() {
                trace!(partial = ?String::from_utf8_lossy(&partial), "discarding partial frame");
            }
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
