//! Resynchronization sequencer
//!
//! Brings the co-processor from an unknown state (power-up, lost link,
//! previous fault) to a known idle state with echo off and numeric error
//! reporting, validating the link on the way.
//!
//! Each [`ResyncState`] names the last stage that completed. Any fault resets
//! the sequencer to [`ResyncState::Unknown`]; the caller restarts it from there.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::commands::{Command, RESET_STATE_RETURN};
use super::{LineChannel, ProtocolError, Session};

/// Sequencer states, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResyncState {
    /// Nothing known about the device
    Unknown,
    /// Partially entered line aborted, interpreter reset requested
    AbortingLine,
    /// Reset acknowledged
    Resetting,
    /// Stale output drained, echo switched off
    LinkVerified,
    /// Acknowledgement test passed
    EchoSuppressed,
    /// Version reported
    ProtocolConfirmed,
    /// Numeric error mode confirmed; robot commands may be issued
    Ready,
}

/// What a successful run found out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncReport {
    /// Reset commands sent before `RST` came back
    pub reset_attempts: u32,
    /// Version line reported by the firmware
    pub version: String,
}

/// Drives a [`Session`] through the resynchronization sequence
#[derive(Debug, Clone)]
pub struct Resynchronizer {
    state: ResyncState,
    furthest: ResyncState,
}

impl Default for Resynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Resynchronizer {
    /// Sequencer in `Unknown`, nothing run yet
    pub fn new() -> Self {
        Self {
            state: ResyncState::Unknown,
            furthest: ResyncState::Unknown,
        }
    }

    /// Current state
    pub fn state(&self) -> ResyncState {
        self.state
    }

    /// Furthest state reached by the last run, useful after a failure
    pub fn furthest(&self) -> ResyncState {
        self.furthest
    }

    /// Last run completed and no fault has been seen since
    pub fn is_ready(&self) -> bool {
        self.state == ResyncState::Ready
    }

    /// Run the full sequence from `Unknown`.
    pub fn run<C: LineChannel>(
        &mut self,
        session: &mut Session<C>,
    ) -> Result<ResyncReport, ProtocolError> {
        self.state = ResyncState::Unknown;
        self.furthest = ResyncState::Unknown;

        let result = self.drive(session);
        if let Err(ref e) = result {
            warn!(error = %e, reached = ?self.furthest, "resynchronization failed");
            self.state = ResyncState::Unknown;
        }
        result
    }

    fn drive<C: LineChannel>(
        &mut self,
        session: &mut Session<C>,
    ) -> Result<ResyncReport, ProtocolError> {
        let settle = session.config().settle_delay();
        session.write_command(Command::AbortLine)?;
        pause(settle);
        session.write_command(Command::AbortAndReset)?;
        pause(settle);
        self.advance(ResyncState::AbortingLine);

        let reset_attempts = reset_until_acknowledged(session)?;
        self.advance(ResyncState::Resetting);

        session.drain_until_silence()?;
        // twice, in case one acknowledgement is lost
        session.set_echo_off()?;
        session.set_echo_off()?;
        self.advance(ResyncState::LinkVerified);

        session.ok_test()?;
        self.advance(ResyncState::EchoSuppressed);

        let version = session.version()?;
        self.advance(ResyncState::ProtocolConfirmed);

        session.set_numeric_error_codes()?;
        session.ok_test()?;
        self.advance(ResyncState::Ready);

        info!(reset_attempts, %version, "co-processor ready");
        Ok(ResyncReport {
            reset_attempts,
            version,
        })
    }

    fn advance(&mut self, next: ResyncState) {
        debug!(from = ?self.state, to = ?next, "resync transition");
        self.state = next;
        self.furthest = next;
    }
}

/// Send `^` until some line in the poll window starts with `RST`.
///
/// Returns the number of reset commands sent. Silence inside a poll window
/// is the normal way the window ends and never an error here.
fn reset_until_acknowledged<C: LineChannel>(
    session: &mut Session<C>,
) -> Result<u32, ProtocolError> {
    let poll_interval = session.config().reset_poll_interval();
    let warn_after = session.config().reset_attempts_before_warning;
    let limit = session.config().reset_attempt_limit;
    let mut attempts = 0u32;

    loop {
        if let Some(limit) = limit {
            if attempts >= limit {
                return Err(ProtocolError::LinkUnresponsive { attempts });
            }
        }

        session.write_command(Command::Reset)?;
        attempts += 1;
        pause(poll_interval);

        if scan_for_reset_ack(session)? {
            info!(attempts, "co-processor reset");
            session.reset_link_state();
            return Ok(attempts);
        }

        if warn_after > 0 && attempts % warn_after == 0 {
            warn!(attempts, "having problems resetting co-processor");
        }
    }
}

/// Read every line available in the window; true if any starts with `RST`
fn scan_for_reset_ack<C: LineChannel>(session: &mut Session<C>) -> Result<bool, ProtocolError> {
    let mut found = false;
    loop {
        match session.try_read_frame() {
            Ok(Some(frame)) => {
                if frame.starts_with(RESET_STATE_RETURN) {
                    found = true;
                } else {
                    debug!(%frame, "ignored while resetting");
                }
            }
            Ok(None) => return Ok(found),
            // line noise while the interpreter is in an unknown state
            Err(ProtocolError::FrameTooLong { limit }) => {
                debug!(limit, "overlong line while resetting");
            }
            Err(e) => return Err(e),
        }
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}
