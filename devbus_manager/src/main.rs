//! # devbus Manager Binary
//!
//! Registers the configured peripherals, self-tests them, and optionally keeps
//! them registered until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Register + self-test against the simulated bus
//! devbus_manager --simulate
//!
//! # Real hardware, keep devices registered until Ctrl-C
//! devbus_manager --config /etc/devbus/devbus.toml --hold
//!
//! # Single register access
//! devbus_manager read --device ads1115 --register 0x00 --length 2
//! devbus_manager write --device pcf8574 --register 0x00 0x04
//! ```

use clap::{Parser, Subcommand};
use devbus_common::config::LogLevel;
use devbus_common::consts::DEFAULT_CONFIG_PATH;
use devbus_manager::adapters::host_for;
use devbus_manager::core::{ConfigSource, DeviceManager, StartReport};
use devbus_manager::device_registry::RegistrationOutcome;
use std::path::PathBuf;
use std::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// devbus Manager - bus device registry with startup self-test
#[derive(Parser, Debug)]
#[command(name = "devbus_manager")]
#[command(version)]
#[command(about = "Registers bus peripherals and self-tests them at startup")]
#[command(long_about = None)]
struct Args {
    /// Path to devbus.toml (reference board is used if the file is missing)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use the simulated bus instead of /dev/i2c-*
    #[arg(short = 's', long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    /// Print the startup report as JSON on stdout
    #[arg(long)]
    report_json: bool,

    /// Skip the startup self-test
    #[arg(long)]
    skip_self_test: bool,

    /// Keep devices registered until Ctrl-C
    #[arg(long)]
    hold: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read register bytes from one device
    Read {
        /// Device name from the catalog
        #[arg(short, long)]
        device: String,

        /// Register address (decimal or 0x-prefixed hex)
        #[arg(short, long, value_parser = parse_byte)]
        register: u8,

        /// Number of bytes to read
        #[arg(short, long, default_value_t = 1)]
        length: usize,
    },
    /// Write register bytes to one device
    Write {
        /// Device name from the catalog
        #[arg(short, long)]
        device: String,

        /// Register address (decimal or 0x-prefixed hex)
        #[arg(short, long, value_parser = parse_byte)]
        register: u8,

        /// Payload bytes (decimal or 0x-prefixed hex)
        #[arg(required = true, value_parser = parse_byte)]
        data: Vec<u8>,
    },
}

/// Parse `0x1f`, `0X1F` or `31` into a byte.
fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("'{s}' is not a byte: {e}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("devbus startup failed: {}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (mut config, source) = DeviceManager::load_config(&args.config)?;
    setup_tracing(&args, config.shared.log_level);

    info!("devbus Manager v{} starting...", env!("CARGO_PKG_VERSION"));
    match source {
        ConfigSource::File => info!("Loaded configuration from {}", args.config.display()),
        ConfigSource::Reference => warn!(
            "No configuration at {}, using reference catalog",
            args.config.display()
        ),
    }

    // A single register access does not need the self-test.
    if args.skip_self_test || args.command.is_some() {
        config.self_test.enabled = false;
    }

    let host = host_for(&config, args.simulate);
    let mut manager = DeviceManager::new(config, host)?;
    let report = manager.start();

    let outcome = match &args.command {
        None => {
            print_report(&report, args.report_json)?;
            if args.hold {
                wait_for_interrupt()?;
            }
            Ok(())
        }
        Some(Command::Read {
            device,
            register,
            length,
        }) => manager.read(device, *register, *length).map(|bytes| {
            let hex: Vec<String> = bytes.iter().map(|b| format!("0x{b:02x}")).collect();
            println!("{}", hex.join(" "));
        }),
        Some(Command::Write {
            device,
            register,
            data,
        }) => manager.write(device, *register, data),
    };

    manager.stop();
    info!("devbus Manager shutdown complete");
    outcome?;
    Ok(())
}

/// Route SIGINT, SIGTERM and SIGHUP to the returned channel.
///
/// Can be installed once per process.
fn shutdown_signal() -> Result<mpsc::Receiver<()>, ctrlc::Error> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    Ok(rx)
}

/// Block until SIGINT/SIGTERM.
fn wait_for_interrupt() -> Result<(), Box<dyn std::error::Error>> {
    let rx = shutdown_signal()?;
    info!("Devices registered; press Ctrl-C to deregister and exit");
    let _ = rx.recv();
    info!("Received shutdown signal");
    Ok(())
}

/// Print the startup report on stdout.
fn print_report(report: &StartReport, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for entry in report.registration.iter() {
        match &entry.outcome {
            RegistrationOutcome::Registered(_) => {
                println!("{:<10} {}  registered", entry.name, entry.address)
            }
            RegistrationOutcome::Failed(e) => {
                println!("{:<10} {}  FAILED ({}, code {})", entry.name, entry.address, e, e.code())
            }
        }
    }
    if let Some(self_test) = &report.self_test {
        for result in &self_test.results {
            let bytes: Vec<String> = result
                .completed
                .iter()
                .map(|r| {
                    r.bytes
                        .iter()
                        .map(|b| format!("{b:02x}"))
                        .collect::<String>()
                })
                .collect();
            match &result.error {
                None => println!("{:<10} self-test ok    [{}]", result.device, bytes.join(", ")),
                Some(e) => println!("{:<10} self-test FAILED: {}", result.device, e),
            }
        }
    }
    Ok(())
}

/// Filter directives: `--verbose` forces DEBUG, otherwise `RUST_LOG` wins
/// over the configured level.
fn filter_directives(verbose: bool, configured: LogLevel, rust_log: Option<String>) -> String {
    if verbose {
        return tracing::Level::DEBUG.as_str().to_string();
    }
    match rust_log {
        Some(directives) if !directives.trim().is_empty() => directives,
        _ => tracing::Level::from(configured).as_str().to_string(),
    }
}

/// Setup tracing subscriber based on CLI arguments and config.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = EnvFilter::new(filter_directives(args.verbose, configured, rust_log));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_byte_accepts_hex_and_decimal() {
        assert_eq!(parse_byte("0x48"), Ok(0x48));
        assert_eq!(parse_byte("0XFF"), Ok(0xFF));
        assert_eq!(parse_byte("33"), Ok(33));
        assert!(parse_byte("0x100").is_err());
        assert!(parse_byte("abc").is_err());
    }

    #[test]
    fn rust_log_overrides_configured_level() {
        assert_eq!(
            filter_directives(false, LogLevel::Info, Some("debug".to_string())),
            "debug"
        );
        assert_eq!(
            filter_directives(false, LogLevel::Warn, Some("devbus_manager=trace".to_string())),
            "devbus_manager=trace"
        );
    }

    #[test]
    fn configured_level_is_the_default() {
        assert_eq!(filter_directives(false, LogLevel::Warn, None), "WARN");
        assert_eq!(filter_directives(false, LogLevel::Error, Some("  ".to_string())), "ERROR");
    }

    #[test]
    fn verbose_forces_debug() {
        assert_eq!(
            filter_directives(true, LogLevel::Error, Some("warn".to_string())),
            "DEBUG"
        );
    }

    // Only test in this binary that installs the process-wide handler.
    #[cfg(unix)]
    #[test]
    fn sigterm_reaches_shutdown_channel() {
        use std::time::Duration;

        let rx = shutdown_signal().unwrap();
        // SAFETY: the handler above is installed, so SIGTERM is caught.
        let rc = unsafe { libc::raise(libc::SIGTERM) };
        assert_eq!(rc, 0);
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn cli_parses_write_command() {
        let args = Args::try_parse_from([
            "devbus_manager",
            "-s",
            "write",
            "--device",
            "pcf8574",
            "--register",
            "0x00",
            "0x04",
            "7",
        ])
        .unwrap();
        assert!(args.simulate);
        match args.command {
            Some(Command::Write {
                device,
                register,
                data,
            }) => {
                assert_eq!(device, "pcf8574");
                assert_eq!(register, 0);
                assert_eq!(data, vec![0x04, 7]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
