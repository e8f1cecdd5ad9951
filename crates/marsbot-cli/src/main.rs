//! # MarsBot CLI
//!
//! Brings the robot's co-processor into a known state and runs single
//! commands against it.
//!
//! ```bash
//! # Reset and verify the link on the platform's default port
//! marsbot connect
//!
//! # Read the battery over a specific port
//! marsbot --port /dev/ttyUSB1 battery
//!
//! # Try everything against the built-in simulator
//! marsbot --demo listing
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use marsbot_core::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "marsbot")]
#[command(about = "Serial link driver for the MarsBot co-processor", long_about = None)]
#[command(version)]
struct Cli {
    /// Serial port (defaults to the platform's usual port)
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Link configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Talk to a simulated co-processor instead of a serial port
    #[arg(long, global = true)]
    demo: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports
    Ports,
    /// Resynchronize and report the firmware version
    Connect,
    /// Run the acknowledgement test
    Ok,
    /// Read the switches
    Switches,
    /// Read the battery
    Battery,
    /// Stop motor action
    Stop,
    /// Show the co-processor's own command list
    Listing,
    /// Write the effective link configuration to a file
    SaveConfig {
        /// Destination path
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // covers marsbot_core too: targets match by prefix
    let directive = if cli.verbose { "marsbot=debug" } else { "marsbot=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().context("invalid log directive")?),
        )
        .init();

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Ports => {
            for port in Connection::list_ports() {
                match &port.product {
                    Some(product) => println!("{}\t{}", port.name, product),
                    None => println!("{}", port.name),
                }
            }
            return Ok(());
        }
        Commands::SaveConfig { path } => {
            config
                .save(path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Saved {}", path.display());
            return Ok(());
        }
        _ => {}
    }

    let mut conn = Connection::new(config);
    let report = if cli.demo {
        conn.connect_channel(Box::new(SimulatedCoprocessor::new().powered_up()))
    } else {
        conn.connect()
    }
    .context("co-processor did not resynchronize")?;
    info!(
        attempts = report.reset_attempts,
        stage = ?conn.resync_state(),
        link = ?conn.link_state(),
        "link ready"
    );

    match cli.command {
        Commands::Connect => {
            println!("{}", conn.version().unwrap_or(report.version.as_str()))
        }
        Commands::Ok => {
            conn.ok_test()?;
            println!("OK");
        }
        Commands::Switches => println!("{}", conn.read_switches()?),
        Commands::Battery => println!("{}", conn.read_battery()?),
        Commands::Stop => {
            conn.stop_motors()?;
            println!("Stopped");
        }
        Commands::Listing => {
            for line in conn.help()? {
                println!("{}", line);
            }
        }
        Commands::Ports | Commands::SaveConfig { .. } => unreachable!(),
    }

    conn.disconnect();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<LinkConfig> {
    let mut config = match &cli.config {
        Some(path) => LinkConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => LinkConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.port_name = Some(port.clone());
    }
    if let Some(baud) = cli.baud {
        config.baud_rate = baud;
    }
    if cli.demo {
        config = LinkConfig {
            port_name: config.port_name,
            ..LinkConfig::immediate()
        };
    }
    config.validate()?;
    Ok(config)
}
