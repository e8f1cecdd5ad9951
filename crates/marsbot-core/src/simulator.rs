//! Simulated co-processor
//!
//! An in-process [`LineChannel`] that behaves like the Nano firmware's line
//! interpreter: echo, reset acknowledgement, verbose and numeric result
//! reporting, and unsolicited `@` notifications. Used for demo mode and for
//! exercising the protocol engine without hardware.
//!
//! Replies are produced synchronously as lines are written, so reads never
//! wait: an empty output queue reports a timeout immediately.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::protocol::commands::{CONTROL_C_ETX, CONTROL_X_CAN, NEWLINE};
use crate::protocol::LineChannel;

const HELP_LINES: &[&str] = &[
    "^ reset state",
    "v show version",
    "V0/V1 verbose off/on",
    "E0/E1 echo off/on",
    "? ok test",
    "h help",
    "s read switches",
    "b read battery",
    "x stop motor action",
];

/// Simulated Nano co-processor
pub struct SimulatedCoprocessor {
    version: String,
    echo: bool,
    numeric: bool,
    line: Vec<u8>,
    output: VecDeque<u8>,
    notifications: VecDeque<String>,
    resets_to_ignore: u32,
    silent: bool,
    disconnected: bool,
    switches: u8,
    battery_volts: f64,
    received: Vec<String>,
    rng: StdRng,
}

impl Default for SimulatedCoprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCoprocessor {
    /// Freshly reset firmware: echo on, verbose results, nothing pending
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Same as [`new`](Self::new) with a reproducible battery reading
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            version: "V1.3".to_string(),
            echo: true,
            numeric: false,
            line: Vec::new(),
            output: VecDeque::new(),
            notifications: VecDeque::new(),
            resets_to_ignore: 0,
            silent: false,
            disconnected: false,
            switches: 0,
            battery_volts: 7.4,
            received: Vec::new(),
            rng,
        }
    }

    /// Firmware just powered up: boot notification plus a half-sent line in the buffer
    pub fn powered_up(mut self) -> Self {
        self.output.extend(b"@Defaulting Params\n\x00\xffOK".iter().copied());
        self
    }

    /// Version line answered to `v`
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Pretend the interpreter is busy for the next `count` reset commands
    pub fn ignore_resets(mut self, count: u32) -> Self {
        self.resets_to_ignore = count;
        self
    }

    /// Emit `@<text>` ahead of the next reply
    pub fn queue_notification(&mut self, text: &str) {
        self.notifications.push_back(format!("@{}", text));
    }

    /// Inject raw bytes as if the firmware had sent them
    pub fn inject(&mut self, bytes: &[u8]) {
        self.output.extend(bytes.iter().copied());
    }

    /// Stop answering anything
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Simulate the cable being pulled
    pub fn disconnect(&mut self) {
        self.disconnected = true;
    }

    /// Value reported by `s`
    pub fn set_switches(&mut self, switches: u8) {
        self.switches = switches;
    }

    /// Whether the firmware currently echoes input
    pub fn echo_enabled(&self) -> bool {
        self.echo
    }

    /// Whether the firmware currently reports numeric results
    pub fn numeric_results(&self) -> bool {
        self.numeric
    }

    /// Every complete line received, in order
    pub fn received(&self) -> &[String] {
        &self.received
    }

    fn emit(&mut self, line: &str) {
        if self.silent {
            return;
        }
        self.output.extend(line.as_bytes());
        self.output.push_back(NEWLINE);
    }

    fn emit_ok(&mut self) {
        let token = if self.numeric { "@Error:0" } else { "OK" };
        self.emit(token);
    }

    fn emit_error(&mut self, code: u8, text: &str) {
        let line = if self.numeric {
            format!("@Error:{}", code)
        } else {
            format!("@Error:{}", text)
        };
        self.emit(&line);
    }

    fn reset_interpreter(&mut self) {
        self.line.clear();
        self.echo = true;
        self.numeric = false;
    }

    fn accept(&mut self, byte: u8) {
        match byte {
            CONTROL_C_ETX => self.line.clear(),
            CONTROL_X_CAN => self.reset_interpreter(),
            b'\r' => {}
            NEWLINE => {
                let line = String::from_utf8_lossy(&self.line).into_owned();
                self.line.clear();
                self.received.push(line.clone());
                if self.echo {
                    self.emit(&line);
                }
                self.execute(&line);
            }
            other => self.line.push(other),
        }
    }

    fn execute(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        while let Some(note) = self.notifications.pop_front() {
            self.emit(&note);
        }
        match line {
            "^" => {
                if self.resets_to_ignore > 0 {
                    self.resets_to_ignore -= 1;
                } else {
                    self.reset_interpreter();
                    self.emit("RST");
                }
            }
            "v" => {
                let version = self.version.clone();
                self.emit(&version);
            }
            "V0" => {
                self.numeric = true;
                self.emit_ok();
            }
            "V1" => {
                self.numeric = false;
                self.emit_ok();
            }
            "E0" => {
                self.echo = false;
                self.emit_ok();
            }
            "E1" => {
                self.echo = true;
                self.emit_ok();
            }
            "?" | "x" => self.emit_ok(),
            "h" => {
                for entry in HELP_LINES {
                    self.emit(entry);
                }
            }
            "s" => {
                let switches = self.switches.to_string();
                self.emit(&switches);
            }
            "b" => {
                let volts = self.battery_volts + self.rng.gen_range(-0.05..0.05);
                self.emit(&format!("{:.2}", volts));
            }
            _ => self.emit_error(1, "Unknown command"),
        }
    }
}

impl Read for SimulatedCoprocessor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut n = 0;
        while n < buf.len() {
            match self.output.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        if n > 0 {
            Ok(n)
        } else if self.disconnected {
            Ok(0)
        } else {
            Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
        }
    }
}

impl Write for SimulatedCoprocessor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.disconnected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "disconnected"));
        }
        for &byte in buf {
            self.accept(byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LineChannel for SimulatedCoprocessor {
    /// Replies are already queued when a read starts, so there is nothing to wait for
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.output.len() as u32)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.output.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(sim: &mut SimulatedCoprocessor) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while let Ok(n) = sim.read(&mut buf) {
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    #[test]
    fn test_echo_and_ok() {
        let mut sim = SimulatedCoprocessor::with_seed(1);
        sim.write_all(b"?\n").unwrap();
        assert_eq!(drain(&mut sim), "?\nOK\n");

        sim.write_all(b"E0\n").unwrap();
        assert_eq!(drain(&mut sim), "E0\nOK\n");
        sim.write_all(b"?\n").unwrap();
        assert_eq!(drain(&mut sim), "OK\n");
    }

    #[test]
    fn test_numeric_results() {
        let mut sim = SimulatedCoprocessor::with_seed(1);
        sim.write_all(b"E0\nV0\n?\nzz\n").unwrap();
        assert_eq!(
            drain(&mut sim),
            "E0\nOK\n@Error:0\n@Error:0\n@Error:1\n"
        );
        assert!(sim.numeric_results());
    }

    #[test]
    fn test_abort_bytes() {
        let mut sim = SimulatedCoprocessor::with_seed(1);
        sim.write_all(b"E0\n").unwrap();
        drain(&mut sim);
        sim.write_all(b"garb\x03?\n").unwrap();
        assert_eq!(drain(&mut sim), "OK\n");

        sim.write_all(b"half\x18").unwrap();
        assert!(sim.echo_enabled());
        sim.write_all(b"^\n").unwrap();
        assert_eq!(drain(&mut sim), "^\nRST\n");
    }

    #[test]
    fn test_ignored_resets_and_notifications() {
        let mut sim = SimulatedCoprocessor::with_seed(1).ignore_resets(1);
        sim.write_all(b"E0\n").unwrap();
        drain(&mut sim);
        sim.write_all(b"^\n").unwrap();
        assert_eq!(drain(&mut sim), "");

        sim.queue_notification("Low battery");
        sim.write_all(b"^\n").unwrap();
        assert_eq!(drain(&mut sim), "@Low battery\nRST\n");
        assert_eq!(sim.received(), &["E0", "^", "^"]);
    }

    #[test]
    fn test_battery_reading_is_plausible() {
        let mut sim = SimulatedCoprocessor::with_seed(7);
        sim.write_all(b"E0\n").unwrap();
        drain(&mut sim);
        sim.write_all(b"b\n").unwrap();
        let volts: f64 = drain(&mut sim).trim().parse().unwrap();
        assert!((7.3..7.5).contains(&volts));
    }

    #[test]
    fn test_disconnect() {
        let mut sim = SimulatedCoprocessor::with_seed(1);
        sim.disconnect();
        assert!(sim.write_all(b"?\n").is_err());
        assert_eq!(sim.read(&mut [0u8; 4]).unwrap(), 0);
    }
}
