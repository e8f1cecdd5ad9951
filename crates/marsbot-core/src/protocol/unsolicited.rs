//! Unsolicited frame handling
//!
//! Frames in the `@` namespace that are not the reply being waited for end
//! up here. Error notifications are fatal to the command in progress;
//! everything else is handed to a [`NotificationSink`] and dropped.

use tracing::{info, warn};

use super::classify::error_code;
use super::{Frame, ProtocolError, SyncFaultKind};

/// Receives informational unsolicited frames
pub trait NotificationSink: Send {
    /// Called once per informational frame, in arrival order
    fn notify(&mut self, frame: &Frame);
}

/// Default sink: log and discard
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&mut self, frame: &Frame) {
        info!(notification = %frame, "unsolicited data unhandled");
    }
}

/// Route one unsolicited frame.
pub fn handle(frame: &Frame, sink: &mut dyn NotificationSink) -> Result<(), ProtocolError> {
    if let Some(code) = error_code(frame) {
        warn!(frame = %frame, "co-processor reported an error");
        return Err(ProtocolError::sync(
            SyncFaultKind::DeviceError {
                code: String::from_utf8_lossy(code).into_owned(),
            },
            frame.as_bytes(),
        ));
    }
    sink.notify(frame);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Vec<String>);

    impl NotificationSink for Collect {
        fn notify(&mut self, frame: &Frame) {
            self.0.push(frame.text());
        }
    }

    #[test]
    fn test_informational_goes_to_sink() {
        let mut sink = Collect::default();
        handle(&Frame::from_raw(b"@Defaulting Params\n".to_vec()), &mut sink).unwrap();
        assert_eq!(sink.0, vec!["@Defaulting Params".to_string()]);
    }

    #[test]
    fn test_error_escalates() {
        let mut sink = Collect::default();
        let err = handle(&Frame::from_raw(b"@Error:7\n".to_vec()), &mut sink).unwrap_err();
        match err {
            ProtocolError::Synchronization {
                kind: SyncFaultKind::DeviceError { code },
                frame,
            } => {
                assert_eq!(code, "7");
                assert_eq!(frame, "@Error:7");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(sink.0.is_empty());
    }
}
