use marsbot_core::config::LinkConfig;
use marsbot_core::protocol::{
    Command, Frame, LineChannel, NotificationSink, ProtocolError, Reply, ResyncState,
    Resynchronizer, Session, SyncFaultKind,
};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock serial port for testing
///
/// Each written command pops the next scripted reply for that command into
/// the receive buffer. An empty receive buffer reads as a timeout.
struct MockSerial {
    recv_buffer: VecDeque<u8>,
    script: Vec<(Vec<u8>, VecDeque<Vec<u8>>)>,
    send_buffer: Arc<Mutex<Vec<u8>>>,
}

impl MockSerial {
    fn new() -> Self {
        Self {
            recv_buffer: VecDeque::new(),
            script: Vec::new(),
            send_buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn reply(mut self, command: &[u8], response: &[u8]) -> Self {
        match self.script.iter_mut().find(|(c, _)| c == command) {
            Some((_, queue)) => queue.push_back(response.to_vec()),
            None => self
                .script
                .push((command.to_vec(), VecDeque::from([response.to_vec()]))),
        }
        self
    }

    fn sent(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.send_buffer)
    }
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.recv_buffer.pop_front() {
            Some(byte) if !buf.is_empty() => {
                buf[0] = byte;
                Ok(1)
            }
            _ => Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
        }
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send_buffer.lock().unwrap().extend_from_slice(buf);
        if let Some((_, queue)) = self.script.iter_mut().find(|(c, _)| c == buf) {
            if let Some(response) = queue.pop_front() {
                self.recv_buffer.extend(response);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LineChannel for MockSerial {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.recv_buffer.len() as u32)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.recv_buffer.clear();
        Ok(())
    }
}

/// Collects informational notifications so tests can see what was discarded
#[derive(Clone, Default)]
struct Notifications(Arc<Mutex<Vec<String>>>);

impl NotificationSink for Notifications {
    fn notify(&mut self, frame: &Frame) {
        self.0.lock().unwrap().push(frame.text());
    }
}

fn session(mock: MockSerial) -> Session<MockSerial> {
    Session::new(mock, LinkConfig::immediate()).unwrap()
}

fn healthy_device() -> MockSerial {
    MockSerial::new()
        .reply(b"^\n", b"^\nRST\n")
        .reply(b"E0\n", b"E0\nOK\n")
        .reply(b"E0\n", b"OK\n")
        .reply(b"?\n", b"OK\n")
        .reply(b"v\n", b"V2.1\n")
        .reply(b"V0\n", b"@Error:0\n")
        .reply(b"?\n", b"@Error:0\n")
}

#[test]
fn test_scenario_a_reset_acknowledged_on_first_attempt() {
    let mut s = session(healthy_device());
    let mut resync = Resynchronizer::new();
    let report = resync.run(&mut s).unwrap();

    assert_eq!(report.reset_attempts, 1);
    assert!(resync.furthest() >= ResyncState::LinkVerified);
    assert_eq!(resync.state(), ResyncState::Ready);
}

#[test]
fn test_scenario_b_numeric_ok() {
    let mock = MockSerial::new()
        .reply(b"V0\n", b"@Error:0\n")
        .reply(b"?\n", b"@Error:0\n");
    let mut s = session(mock);
    s.set_numeric_error_codes().unwrap();
    s.write_command(Command::OkTest).unwrap();
    s.wait_for_exact(b"@Error:0").unwrap();
}

#[test]
fn test_scenario_c_device_error_is_sync_fault() {
    let mut s = session(MockSerial::new().reply(b"?\n", b"@Error:5\n"));
    s.write_command(Command::OkTest).unwrap();
    match s.wait_for_ack() {
        Err(ProtocolError::Synchronization {
            kind: SyncFaultKind::DeviceError { code },
            frame,
        }) => {
            assert_eq!(code, "5");
            assert_eq!(frame, "@Error:5");
        }
        other => panic!("expected sync fault, got {:?}", other),
    }
}

#[test]
fn test_scenario_d_unsolicited_skipped_before_payload() {
    let notes = Notifications::default();
    let mut s = session(MockSerial::new().reply(b"v\n", b"@Low battery\nV2.1\n"))
        .with_sink(notes.clone());
    s.write_command(Command::Version).unwrap();
    let reply = s.wait_for_any_reply().unwrap();

    assert_eq!(reply.as_bytes(), b"V2.1\n");
    assert_eq!(*notes.0.lock().unwrap(), vec!["@Low battery".to_string()]);
}

#[test]
fn test_scenario_e_silence_is_timeout() {
    let mut s = session(MockSerial::new());
    match s.execute(Command::ReadSwitches) {
        Err(ProtocolError::Timeout { partial, .. }) => assert!(partial.is_empty()),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[test]
fn test_partial_frame_is_never_a_reply() {
    let mut s = session(MockSerial::new().reply(b"?\n", b"OK"));
    s.write_command(Command::OkTest).unwrap();
    match s.wait_for_ack() {
        Err(ProtocolError::Timeout { partial, .. }) => assert_eq!(partial, b"OK"),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[test]
fn test_acknowledged_commands_in_both_modes() {
    for cmd in Command::ALL
        .into_iter()
        .filter(|c| c.reply_kind() == marsbot_core::protocol::ReplyKind::Acknowledge)
    {
        let mut s = session(MockSerial::new().reply(cmd.bytes(), b"OK\n"));
        assert_eq!(s.execute(cmd).unwrap(), Reply::Acknowledged);

        let mock = MockSerial::new()
            .reply(b"V0\n", b"OK\n")
            .reply(cmd.bytes(), b"OK\n");
        let mut s = session(mock);
        s.set_numeric_error_codes().unwrap();
        assert!(s.execute(cmd).unwrap_err().is_sync_fault(), "{:?}", cmd);
    }
}

#[test]
fn test_unsolicited_does_not_end_wait() {
    let notes = Notifications::default();
    let mock = MockSerial::new().reply(b"x\n", b"@Bump left\n@Bump right\nOK\n");
    let mut s = session(mock).with_sink(notes.clone());
    s.stop_motors().unwrap();
    assert_eq!(notes.0.lock().unwrap().len(), 2);
}

#[test]
fn test_echo_off_twice_is_idempotent() {
    let mock = MockSerial::new()
        .reply(b"E0\n", b"E0\nOK\n")
        .reply(b"E0\n", b"OK\n");
    let mut s = session(mock);
    s.set_echo_off().unwrap();
    s.set_echo_off().unwrap();
    assert!(!s.link_state().echo_enabled);
}

#[test]
fn test_sequence_writes_expected_bytes() {
    let mock = healthy_device();
    let sent = mock.sent();
    let mut s = session(mock);
    Resynchronizer::new().run(&mut s).unwrap();

    let mut expected = vec![0x03, 0x18];
    expected.extend_from_slice(b"^\nE0\nE0\n?\nv\nV0\n?\n");
    assert_eq!(*sent.lock().unwrap(), expected);
}

#[test]
fn test_sync_fault_mid_sequence_propagates() {
    let mock = MockSerial::new()
        .reply(b"^\n", b"RST\n")
        .reply(b"?\n", b"OK\n")
        .reply(b"v\n", b"@Error:3\n");
    let mut s = session(mock);
    let mut resync = Resynchronizer::new();
    assert!(resync.run(&mut s).unwrap_err().is_sync_fault());
    assert_eq!(resync.state(), ResyncState::Unknown);
    assert_eq!(resync.furthest(), ResyncState::EchoSuppressed);
}
