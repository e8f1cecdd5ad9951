//! Line channel adapter
//!
//! The byte stream the protocol runs over: a serial port on the robot, a
//! simulator or a scripted mock in tests.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Byte-stream duplex channel to the co-processor
///
/// Reads block for at most the configured timeout and then fail with
/// [`io::ErrorKind::TimedOut`]. A read returning `Ok(0)` means the channel
/// has been closed.
pub trait LineChannel: Read + Write + Send {
    /// Set timeout for read operations
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Get number of bytes available to read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Discard anything in the input buffer
    fn clear_input_buffer(&mut self) -> io::Result<()>;
}

impl<C: LineChannel + ?Sized> LineChannel for Box<C> {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        (**self).set_timeout(timeout)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        (**self).bytes_to_read()
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        (**self).clear_input_buffer()
    }
}

/// Serial port wrapper implementing LineChannel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened, configured port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl LineChannel for SerialChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::other)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::other)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }
}
