//! Protocol commands
//!
//! Defines the fixed command set understood by the co-processor's line interpreter.
//! Commands are sent verbatim; there is no dynamic command construction.

use serde::{Deserialize, Serialize};

/// Line terminator for every frame in both directions
pub const NEWLINE: u8 = b'\n';

/// ETX: aborts the line currently being entered
pub const CONTROL_C_ETX: u8 = 0x03;

/// CAN: aborts the current line and resets the interpreter
pub const CONTROL_X_CAN: u8 = 0x18;

/// Prefix of every unsolicited frame
pub const UNSOLICITED_PREFIX: &[u8] = b"@";

/// Prefix of device error notifications
pub const ERROR_PREFIX: &[u8] = b"@Error:";

/// Reset acknowledgement
pub const RESET_STATE_RETURN: &[u8] = b"RST";

/// Success token in verbose error mode
pub const OK_RESULT_VERBOSE: &[u8] = b"OK";

/// Success token in numeric error mode
pub const OK_RESULT_NUMERIC: &[u8] = b"@Error:0";

/// How the co-processor answers a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyKind {
    /// A single success token (`OK` or `@Error:0`, depending on error mode)
    Acknowledge,
    /// One payload line returned verbatim
    Payload,
    /// Several lines followed by silence
    Listing,
    /// Replies are drained and discarded
    Ignored,
    /// Nothing is read back
    None,
}

/// Commands for co-processor communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Reset interpreter state ('^')
    Reset,
    /// Query firmware version ('v')
    Version,
    /// Numeric error reporting ('V0')
    VerboseOff,
    /// Text error reporting ('V1')
    VerboseOn,
    /// Stop echoing input ('E0')
    EchoOff,
    /// Echo input back ('E1')
    EchoOn,
    /// Generic acknowledgement test ('?')
    OkTest,
    /// Command listing ('h')
    Help,
    /// Read switches ('s')
    ReadSwitches,
    /// Read battery voltage ('b')
    ReadBattery,
    /// Stop motor action ('x')
    MotorStop,
    /// Abort current line (ETX, no terminator)
    AbortLine,
    /// Abort line and reset interpreter (CAN, no terminator)
    AbortAndReset,
}

impl Command {
    /// Every command in the set
    pub const ALL: [Command; 13] = [
        Command::Reset,
        Command::Version,
        Command::VerboseOff,
        Command::VerboseOn,
        Command::EchoOff,
        Command::EchoOn,
        Command::OkTest,
        Command::Help,
        Command::ReadSwitches,
        Command::ReadBattery,
        Command::MotorStop,
        Command::AbortLine,
        Command::AbortAndReset,
    ];

    /// Exact bytes written to the wire, terminator included where applicable
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Command::Reset => b"^\n",
            Command::Version => b"v\n",
            Command::VerboseOff => b"V0\n",
            Command::VerboseOn => b"V1\n",
            Command::EchoOff => b"E0\n",
            Command::EchoOn => b"E1\n",
            Command::OkTest => b"?\n",
            Command::Help => b"h\n",
            Command::ReadSwitches => b"s\n",
            Command::ReadBattery => b"b\n",
            Command::MotorStop => b"x\n",
            Command::AbortLine => &[CONTROL_C_ETX],
            Command::AbortAndReset => &[CONTROL_X_CAN],
        }
    }

    /// Command text without terminator, for logging
    pub fn mnemonic(&self) -> &'static str {
        let bytes = self.bytes();
        if self.is_control() {
            return if bytes[0] == CONTROL_C_ETX { "^C" } else { "^X" };
        }
        std::str::from_utf8(&bytes[..bytes.len() - 1]).unwrap_or("?")
    }

    /// How the reply to this command is consumed
    pub fn reply_kind(&self) -> ReplyKind {
        match self {
            Command::OkTest | Command::MotorStop => ReplyKind::Acknowledge,
            Command::Version | Command::ReadSwitches | Command::ReadBattery => ReplyKind::Payload,
            Command::Help => ReplyKind::Listing,
            Command::EchoOff | Command::EchoOn | Command::VerboseOff | Command::VerboseOn => {
                ReplyKind::Ignored
            }
            Command::Reset | Command::AbortLine | Command::AbortAndReset => ReplyKind::None,
        }
    }

    /// Control bytes go out without a newline terminator
    pub fn is_control(&self) -> bool {
        matches!(self, Command::AbortLine | Command::AbortAndReset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(Command::Reset.bytes(), b"^\n");
        assert_eq!(Command::VerboseOff.bytes(), b"V0\n");
        assert_eq!(Command::AbortLine.bytes(), &[0x03]);
        assert_eq!(Command::AbortAndReset.bytes(), &[0x18]);
    }

    #[test]
    fn test_line_commands_are_newline_terminated() {
        for cmd in Command::ALL {
            let bytes = cmd.bytes();
            if cmd.is_control() {
                assert_eq!(bytes.len(), 1);
                assert!(!bytes.contains(&NEWLINE));
            } else {
                assert_eq!(bytes.last(), Some(&NEWLINE), "{:?}", cmd);
                assert_eq!(bytes.iter().filter(|b| **b == NEWLINE).count(), 1);
            }
        }
    }

    #[test]
    fn test_mnemonics() {
        assert_eq!(Command::EchoOff.mnemonic(), "E0");
        assert_eq!(Command::OkTest.mnemonic(), "?");
        assert_eq!(Command::AbortLine.mnemonic(), "^C");
        assert_eq!(Command::AbortAndReset.mnemonic(), "^X");
    }

    #[test]
    fn test_reply_kinds() {
        assert_eq!(Command::OkTest.reply_kind(), ReplyKind::Acknowledge);
        assert_eq!(Command::Version.reply_kind(), ReplyKind::Payload);
        assert_eq!(Command::EchoOff.reply_kind(), ReplyKind::Ignored);
        assert_eq!(Command::Help.reply_kind(), ReplyKind::Listing);
        assert_eq!(Command::Reset.reply_kind(), ReplyKind::None);
    }

    #[test]
    fn test_numeric_ok_lives_in_error_namespace() {
        assert!(OK_RESULT_NUMERIC.starts_with(ERROR_PREFIX));
        assert!(ERROR_PREFIX.starts_with(UNSOLICITED_PREFIX));
    }
}
