//! Message classifier
//!
//! Prefix-based, order-sensitive classification of received frames.

use serde::{Deserialize, Serialize};

use super::commands::{ERROR_PREFIX, UNSOLICITED_PREFIX};
use super::Frame;

/// Exactly one of these applies to every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// Matches the reply the caller is waiting for
    Expected,
    /// `@`-prefixed, not an error
    Unsolicited,
    /// `@Error:`-prefixed
    ErrorNotification,
    /// Anything else
    Unexpected,
}

/// Classify a frame against an optional expected reply prefix.
///
/// The error check runs before the expected-prefix check, so an `@Error:`
/// frame can never satisfy a plain token. The one exception is a token that
/// lives inside the error namespace itself (the numeric success token
/// `@Error:0`): it is matched by exact equality first.
pub fn classify(frame: &Frame, expected: Option<&[u8]>) -> Classification {
    let line = frame.line();

    if let Some(token) = expected {
        if token.starts_with(ERROR_PREFIX) && line == token {
            return Classification::Expected;
        }
    }

    if line.starts_with(ERROR_PREFIX) {
        return Classification::ErrorNotification;
    }

    if let Some(token) = expected {
        if line.starts_with(token) {
            return Classification::Expected;
        }
    }

    if line.starts_with(UNSOLICITED_PREFIX) {
        Classification::Unsolicited
    } else {
        Classification::Unexpected
    }
}

/// Error code text following `@Error:`, if the frame is an error notification
pub fn error_code(frame: &Frame) -> Option<&[u8]> {
    frame.line().strip_prefix(ERROR_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::commands::{OK_RESULT_NUMERIC, OK_RESULT_VERBOSE};

    fn frame(bytes: &[u8]) -> Frame {
        Frame::from_raw(bytes.to_vec())
    }

    #[test]
    fn test_expected_prefix() {
        assert_eq!(
            classify(&frame(b"OK\n"), Some(OK_RESULT_VERBOSE)),
            Classification::Expected
        );
        assert_eq!(
            classify(&frame(b"OK\r\n"), Some(OK_RESULT_VERBOSE)),
            Classification::Expected
        );
    }

    #[test]
    fn test_error_precedes_expected() {
        assert_eq!(
            classify(&frame(b"@Error:5\n"), Some(b"@")),
            Classification::ErrorNotification
        );
        assert_eq!(
            classify(&frame(b"@Error:5\n"), Some(OK_RESULT_VERBOSE)),
            Classification::ErrorNotification
        );
    }

    #[test]
    fn test_numeric_success_token() {
        assert_eq!(
            classify(&frame(b"@Error:0\n"), Some(OK_RESULT_NUMERIC)),
            Classification::Expected
        );
        assert_eq!(
            classify(&frame(b"@Error:05\n"), Some(OK_RESULT_NUMERIC)),
            Classification::ErrorNotification
        );
        assert_eq!(
            classify(&frame(b"@Error:0\n"), Some(OK_RESULT_VERBOSE)),
            Classification::ErrorNotification
        );
    }

    #[test]
    fn test_unsolicited_and_unexpected() {
        assert_eq!(
            classify(&frame(b"@Defaulting Params\n"), Some(OK_RESULT_VERBOSE)),
            Classification::Unsolicited
        );
        assert_eq!(
            classify(&frame(b"@Low battery\n"), None),
            Classification::Unsolicited
        );
        assert_eq!(
            classify(&frame(b"hello\n"), Some(OK_RESULT_VERBOSE)),
            Classification::Unexpected
        );
        assert_eq!(classify(&frame(b"V2.1\n"), None), Classification::Unexpected);
    }

    #[test]
    fn test_error_code() {
        assert_eq!(error_code(&frame(b"@Error:12\n")), Some(&b"12"[..]));
        assert_eq!(error_code(&frame(b"OK\n")), None);
    }
}
