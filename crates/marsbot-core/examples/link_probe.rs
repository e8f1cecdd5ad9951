//! Co-processor Link Probe
//!
//! A standalone tool to debug the serial link to the co-processor. Opens the
//! port, flushes and logs whatever was waiting, then runs the resynchronization sequence
//! with debug logging and prints each stage it reached.
//!
//! Usage:
//!   cargo run --example link_probe -- [OPTIONS] [PORT]
//!
//! Options:
//!   --baud RATE       Baud rate (default: 115200)
//!   --attempts N      Give up after N reset attempts (default: 250)
//!   --sim             Probe the simulated co-processor instead of a port

use marsbot_core::platform::resolve_port;
use marsbot_core::prelude::*;
use marsbot_core::protocol::{configure_port, flush_stale_input, open_port, SerialChannel};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut config = LinkConfig::default();
    let mut simulated = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--baud" | "-b" => {
                i += 1;
                if i < args.len() {
                    config.baud_rate = args[i].parse().unwrap_or(config.baud_rate);
                }
            }
            "--attempts" => {
                i += 1;
                if i < args.len() {
                    match args[i].parse::<u32>() {
                        Ok(n) => config.reset_attempt_limit = Some(n),
                        Err(e) => {
                            eprintln!("invalid --attempts {:?}: {}", args[i], e);
                            std::process::exit(2);
                        }
                    }
                }
            }
            "--sim" => simulated = true,
            other if !other.starts_with('-') => config.port_name = Some(other.to_string()),
            other => eprintln!("ignoring unknown option {}", other),
        }
        i += 1;
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("marsbot_core=debug"))
        .init();

    let mut channel: Box<dyn LineChannel> = if simulated {
        config = LinkConfig {
            reset_attempt_limit: config.reset_attempt_limit,
            ..LinkConfig::immediate()
        };
        Box::new(SimulatedCoprocessor::new().powered_up())
    } else {
        let port_name = match resolve_port(config.port_name.as_deref(), Platform::detect()) {
            Ok(name) => name,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(2);
            }
        };
        println!("Opening {} at {} baud", port_name, config.baud_rate);
        let opened = open_port(
            &port_name,
            Some(config.baud_rate),
            Some(config.read_timeout()),
        );
        let mut port = match opened {
            Ok(port) => port,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        };
        if let Err(e) = configure_port(port.as_mut()) {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Box::new(SerialChannel::new(port))
    };

    match flush_stale_input(channel.as_mut(), config.open_settle()) {
        Ok(0) => println!("Nothing waiting on open"),
        Ok(n) => println!("Flushed {} stale byte(s)", n),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }

    let mut session = match Session::new(channel, config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let mut resync = Resynchronizer::new();
    match resync.run(&mut session) {
        Ok(report) => {
            println!(
                "Ready after {} reset attempt(s), firmware {}",
                report.reset_attempts, report.version
            );
            match session.help() {
                Ok(lines) => lines.iter().for_each(|line| println!("  {}", line)),
                Err(e) => println!("help failed: {}", e),
            }
        }
        Err(e) => {
            println!("Failed: {}", e);
            println!("Furthest stage reached: {:?}", resync.furthest());
            std::process::exit(1);
        }
    }
}
