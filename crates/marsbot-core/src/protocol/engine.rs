//! Command/reply engine
//!
//! Half-duplex request/response over a [`LineChannel`]: one command in flight,
//! replies consumed strictly in arrival order, unsolicited frames handled
//! inline while waiting.

use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{debug, info};

use super::classify::{classify, Classification};
use super::commands::{Command, ReplyKind, OK_RESULT_NUMERIC, OK_RESULT_VERBOSE};
use super::frame;
use super::unsolicited::{self, LogSink, NotificationSink};
use super::{Frame, LineChannel, ProtocolError, SyncFaultKind};
use crate::config::LinkConfig;

/// Mode flags the co-processor is known to be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkState {
    /// Device echoes every received line back
    pub echo_enabled: bool,
    /// Device reports results as `@Error:<n>` instead of text
    pub numeric_error_mode: bool,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            echo_enabled: true,
            numeric_error_mode: false,
        }
    }
}

impl LinkState {
    /// Success token for the current error-reporting mode
    pub fn ok_token(&self) -> &'static [u8] {
        if self.numeric_error_mode {
            OK_RESULT_NUMERIC
        } else {
            OK_RESULT_VERBOSE
        }
    }
}

/// Outcome of [`Session::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Success token received
    Acknowledged,
    /// Single payload line, terminator included
    Payload(Frame),
    /// Lines received before the channel went quiet
    Listing(Vec<Frame>),
    /// Replies drained and ignored
    Drained,
    /// Written, nothing read back
    Sent,
}

/// One link to the co-processor: channel, link state and notification sink
pub struct Session<C: LineChannel> {
    channel: C,
    state: LinkState,
    config: LinkConfig,
    sink: Box<dyn NotificationSink>,
}

impl<C: LineChannel> Session<C> {
    /// Wrap a channel; the channel's read timeout is set from `config`
    pub fn new(mut channel: C, config: LinkConfig) -> Result<Self, ProtocolError> {
        channel.set_timeout(config.read_timeout())?;
        Ok(Self {
            channel,
            state: LinkState::default(),
            config,
            sink: Box::new(LogSink),
        })
    }

    /// Replace the sink that receives informational unsolicited frames
    pub fn with_sink(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Modes the device is currently believed to be in
    pub fn link_state(&self) -> LinkState {
        self.state
    }

    /// Forget what is known about the device's modes
    pub fn reset_link_state(&mut self) {
        self.state = LinkState::default();
    }

    /// Timing and retry parameters of this link
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Underlying channel, for flushing or inspection
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Single blocking write of a command's fixed bytes. Never retried.
    pub fn write_command(&mut self, cmd: Command) -> Result<(), ProtocolError> {
        debug!(command = cmd.mnemonic(), "tx");
        self.channel.write_all(cmd.bytes())?;
        self.channel.flush()?;
        Ok(())
    }

    /// Read one frame within the configured window
    pub fn read_frame(&mut self) -> Result<Frame, ProtocolError> {
        frame::read_frame(
            &mut self.channel,
            self.config.read_timeout(),
            self.config.max_frame_len,
        )
    }

    /// Read one frame; `None` when the window elapsed first
    pub fn try_read_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        frame::try_read_frame(
            &mut self.channel,
            self.config.read_timeout(),
            self.config.max_frame_len,
        )
    }

    /// Wait until a frame starting with `token` arrives.
    ///
    /// Unsolicited frames are handled and skipped. An error notification or
    /// any other frame is a synchronization fault; silence is a timeout fault.
    pub fn wait_for_exact(&mut self, token: &[u8]) -> Result<(), ProtocolError> {
        loop {
            let frame = self.read_frame()?;
            match classify(&frame, Some(token)) {
                Classification::Expected => return Ok(()),
                Classification::Unsolicited | Classification::ErrorNotification => {
                    unsolicited::handle(&frame, self.sink.as_mut())?
                }
                Classification::Unexpected => {
                    debug!(%frame, expected = %String::from_utf8_lossy(token), "unexpected reply");
                    return Err(ProtocolError::sync(
                        SyncFaultKind::UnexpectedFrame,
                        frame.as_bytes(),
                    ));
                }
            }
        }
    }

    /// Wait for the success token of the current error-reporting mode
    pub fn wait_for_ack(&mut self) -> Result<(), ProtocolError> {
        let token = self.state.ok_token();
        self.wait_for_exact(token)
    }

    /// Return the first frame outside the `@` namespace, verbatim
    pub fn wait_for_any_reply(&mut self) -> Result<Frame, ProtocolError> {
        loop {
            let frame = self.read_frame()?;
            if frame.is_unsolicited() {
                unsolicited::handle(&frame, self.sink.as_mut())?;
            } else {
                return Ok(frame);
            }
        }
    }

    /// Read until a window passes with no complete frame.
    ///
    /// Unsolicited frames go through the handler, so a device error still
    /// faults. The numeric success token is a reply, not an error, whatever
    /// the current mode: a `V0` toggle is answered in the mode it switches to.
    /// Replies are returned to the caller, who usually ignores them.
    pub fn drain_until_silence(&mut self) -> Result<Vec<Frame>, ProtocolError> {
        let mut drained = Vec::new();
        while let Some(frame) = self.try_read_frame()? {
            match classify(&frame, Some(OK_RESULT_NUMERIC)) {
                Classification::Unsolicited | Classification::ErrorNotification => {
                    unsolicited::handle(&frame, self.sink.as_mut())?
                }
                Classification::Expected | Classification::Unexpected => drained.push(frame),
            }
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "drained replies");
        }
        Ok(drained)
    }

    /// Send one command and consume its reply according to [`Command::reply_kind`]
    pub fn execute(&mut self, cmd: Command) -> Result<Reply, ProtocolError> {
        self.write_command(cmd)?;
        match cmd.reply_kind() {
            ReplyKind::Acknowledge => {
                self.wait_for_ack()?;
                Ok(Reply::Acknowledged)
            }
            ReplyKind::Payload => Ok(Reply::Payload(self.wait_for_any_reply()?)),
            ReplyKind::Listing => Ok(Reply::Listing(self.drain_until_silence()?)),
            ReplyKind::Ignored => {
                self.drain_until_silence()?;
                self.apply_mode_change(cmd);
                Ok(Reply::Drained)
            }
            ReplyKind::None => Ok(Reply::Sent),
        }
    }

    fn apply_mode_change(&mut self, cmd: Command) {
        match cmd {
            Command::EchoOff => self.state.echo_enabled = false,
            Command::EchoOn => self.state.echo_enabled = true,
            Command::VerboseOff => self.state.numeric_error_mode = true,
            Command::VerboseOn => self.state.numeric_error_mode = false,
            _ => return,
        }
        debug!(state = ?self.state, "link state updated");
    }

    /// Basic command that always gets a reply; used for connection testing
    pub fn ok_test(&mut self) -> Result<(), ProtocolError> {
        self.execute(Command::OkTest).map(|_| ())
    }

    /// Firmware version line, terminator stripped
    pub fn version(&mut self) -> Result<String, ProtocolError> {
        let version = self.payload(Command::Version)?;
        info!(%version, "co-processor version");
        Ok(version)
    }

    /// Suppress echo; replies are ignored on purpose
    pub fn set_echo_off(&mut self) -> Result<(), ProtocolError> {
        self.execute(Command::EchoOff).map(|_| ())
    }

    /// Echo received lines back
    pub fn set_echo_on(&mut self) -> Result<(), ProtocolError> {
        self.execute(Command::EchoOn).map(|_| ())
    }

    /// Switch to `@Error:<n>` result reporting
    pub fn set_numeric_error_codes(&mut self) -> Result<(), ProtocolError> {
        self.execute(Command::VerboseOff).map(|_| ())
    }

    /// Switch to text result reporting
    pub fn set_text_error_codes(&mut self) -> Result<(), ProtocolError> {
        self.execute(Command::VerboseOn).map(|_| ())
    }

    /// Help listing, one entry per line
    pub fn help(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.write_command(Command::Help)?;
        let lines = self.drain_until_silence()?;
        Ok(lines.iter().map(Frame::text).collect())
    }

    /// Raw switch reading
    pub fn read_switches(&mut self) -> Result<String, ProtocolError> {
        self.payload(Command::ReadSwitches)
    }

    /// Raw battery reading
    pub fn read_battery(&mut self) -> Result<String, ProtocolError> {
        self.payload(Command::ReadBattery)
    }

    /// Stop any motor action in progress
    pub fn stop_motors(&mut self) -> Result<(), ProtocolError> {
        self.execute(Command::MotorStop).map(|_| ())
    }

    fn payload(&mut self, cmd: Command) -> Result<String, ProtocolError> {
        self.write_command(cmd)?;
        Ok(self.wait_for_any_reply()?.text())
    }
}
