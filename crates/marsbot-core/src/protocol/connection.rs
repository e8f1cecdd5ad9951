//! Connection management
//!
//! Handles the link lifecycle: open the port, flush whatever the co-processor
//! sent before we were listening, resynchronize, then run commands. A fault
//! that needs resynchronization moves the connection to `Error` until
//! [`Connection::resync`] succeeds.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    resync::{ResyncReport, ResyncState, Resynchronizer},
    serial::{configure_port, list_ports, open_port, PortInfo},
    Command, LineChannel, LinkState, ProtocolError, Reply, SerialChannel, Session,
};
use crate::config::LinkConfig;
use crate::platform::{resolve_port, Platform};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Resynchronization in progress
    Connecting,
    /// Co-processor ready for commands
    Connected,
    /// Link faulted; needs a resync
    Error,
}

/// Read and discard anything already waiting on a freshly opened channel.
///
/// Returns the number of bytes thrown away.
pub fn flush_stale_input(
    channel: &mut dyn LineChannel,
    settle: Duration,
) -> Result<usize, ProtocolError> {
    if !settle.is_zero() {
        std::thread::sleep(settle);
    }

    let waiting = channel.bytes_to_read()? as usize;
    if waiting == 0 {
        return Ok(0);
    }

    let mut incoming = vec![0u8; waiting];
    let mut got = 0;
    while got < waiting {
        match channel.read(&mut incoming[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => return Err(e.into()),
        }
    }
    incoming.truncate(got);
    // whatever arrived while reading is just as stale
    channel.clear_input_buffer()?;
    info!(
        bytes = got,
        data = ?String::from_utf8_lossy(&incoming),
        "flushed bytes waiting on open"
    );
    Ok(got)
}

/// Co-processor connection
pub struct Connection {
    session: Option<Session<Box<dyn LineChannel>>>,
    state: ConnectionState,
    config: LinkConfig,
    resync: Resynchronizer,
    version: Option<String>,
}

impl Connection {
    /// Create a new connection (not yet connected)
    pub fn new(config: LinkConfig) -> Self {
        Self {
            session: None,
            state: ConnectionState::Disconnected,
            config,
            resync: Resynchronizer::new(),
            version: None,
        }
    }

    /// List available serial ports
    pub fn list_ports() -> Vec<PortInfo> {
        list_ports()
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Firmware version reported by the last successful resync
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Link state of the open session
    pub fn link_state(&self) -> Option<LinkState> {
        self.session.as_ref().map(Session::link_state)
    }

    /// Where the resynchronization sequence currently stands
    pub fn resync_state(&self) -> ResyncState {
        self.resync.state()
    }

    /// Open the configured (or platform default) serial port and resynchronize
    pub fn connect(&mut self) -> Result<ResyncReport, ProtocolError> {
        if self.session.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }

        let port_name = resolve_port(self.config.port_name.as_deref(), Platform::detect())?;
        info!(port = %port_name, baud = self.config.baud_rate, "opening co-processor port");

        let mut port = open_port(
            &port_name,
            Some(self.config.baud_rate),
            Some(self.config.read_timeout()),
        )?;
        configure_port(port.as_mut())?;

        self.connect_channel(Box::new(SerialChannel::new(port)))
    }

    /// Attach an already-open channel, flush stale input and resynchronize
    pub fn connect_channel(
        &mut self,
        mut channel: Box<dyn LineChannel>,
    ) -> Result<ResyncReport, ProtocolError> {
        if self.session.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }

        self.config.validate()?;
        flush_stale_input(channel.as_mut(), self.config.open_settle())?;
        self.session = Some(Session::new(channel, self.config.clone())?);
        self.resync()
    }

    /// Run the resynchronization sequence on the open link.
    ///
    /// Safe to call from `Connected`: the device is reset and brought back to
    /// ready.
    pub fn resync(&mut self) -> Result<ResyncReport, ProtocolError> {
        let session = self.session.as_mut().ok_or(ProtocolError::NotConnected)?;
        self.state = ConnectionState::Connecting;

        match self.resync.run(session) {
            Ok(report) => {
                self.version = Some(report.version.clone());
                self.state = ConnectionState::Connected;
                Ok(report)
            }
            Err(e) => {
                self.state = ConnectionState::Error;
                Err(e)
            }
        }
    }

    /// Disconnect from the co-processor
    pub fn disconnect(&mut self) {
        if self.session.take().is_some() {
            debug!("co-processor link closed");
        }
        self.version = None;
        self.resync = Resynchronizer::new();
        self.state = ConnectionState::Disconnected;
    }

    /// Run one command on a ready link
    pub fn execute(&mut self, cmd: Command) -> Result<Reply, ProtocolError> {
        self.with_session(|session| session.execute(cmd))
    }

    /// Acknowledgement test
    pub fn ok_test(&mut self) -> Result<(), ProtocolError> {
        self.with_session(Session::ok_test)
    }

    /// Raw switch reading
    pub fn read_switches(&mut self) -> Result<String, ProtocolError> {
        self.with_session(Session::read_switches)
    }

    /// Raw battery reading
    pub fn read_battery(&mut self) -> Result<String, ProtocolError> {
        self.with_session(Session::read_battery)
    }

    /// Stop any motor action in progress
    pub fn stop_motors(&mut self) -> Result<(), ProtocolError> {
        self.with_session(Session::stop_motors)
    }

    /// The co-processor's command listing
    pub fn help(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.with_session(Session::help)
    }

    /// Run `f` against the ready session.
    ///
    /// A fault that needs resynchronization moves the connection to `Error`,
    /// the same as for [`execute`](Self::execute).
    pub fn with_session<T>(
        &mut self,
        f: impl FnOnce(&mut Session<Box<dyn LineChannel>>) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        if self.state != ConnectionState::Connected || !self.resync.is_ready() {
            return Err(ProtocolError::NotConnected);
        }
        let session = self.session.as_mut().ok_or(ProtocolError::NotConnected)?;
        let result = f(session);
        self.note_result(&result);
        result
    }

    fn note_result<T>(&mut self, result: &Result<T, ProtocolError>) {
        if let Err(e) = result {
            if e.requires_resync() || matches!(e, ProtocolError::ChannelClosed) {
                warn!(error = %e, "link needs resynchronization");
                self.state = ConnectionState::Error;
            }
        }
    }
}
