//! # Water Telemetry Collector Entry Point
//!
//! This binary wires configuration, the serial line source, the REST sink and the
//! collector loop together. It supports production mode (serial port) and a
//! development mode that reads telemetry lines from standard input.
//!
//! Flags:
//! - `--config <path>`: configuration file (default `water-telemetry.toml`)
//! - `--stdin`: read `temperature,pH,quality` lines from standard input
//! - `--list-ports`: print available serial ports and exit
//! - `-v` / `-vv`: debug / trace logging; `-q`: errors only

use anyhow::Context;
use std::env;
use std::io::BufReader;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;
use water_telemetry_lib::collector::{Collector, Shutdown};
use water_telemetry_lib::config::{Config, DEFAULT_CONFIG_FILE};
use water_telemetry_lib::delivery::RestSink;
use water_telemetry_lib::line_source::{LineSource, ThreadedLineSource};

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: usize, quiet: bool) -> anyhow::Result<()> {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("water_telemetry={}", level).parse()?)
        .add_directive(format!("water_telemetry_lib={}", level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

/// Open the configured line source, or `None` if the sensor is unavailable.
fn open_source(config: &Config, stdin_mode: bool) -> Option<Box<dyn LineSource>> {
    if stdin_mode {
        info!("Development mode: reading telemetry from stdin");
        // Stdin has no read timeout; poll it from a helper thread so Ctrl-C is noticed
        return Some(Box::new(ThreadedLineSource::spawn(
            BufReader::new(std::io::stdin()),
            "stdin",
            Duration::from_millis(config.serial.read_timeout_ms),
        )));
    }

    #[cfg(feature = "hardware")]
    {
        match water_telemetry_lib::line_source::open_serial(&config.serial) {
            Ok(source) => Some(Box::new(source)),
            Err(e) => {
                error!("Error opening serial port {}: {}", config.serial.port, e);
                error!("Check the connection and serial.port in the config, or use --list-ports");
                None
            }
        }
    }

    #[cfg(not(feature = "hardware"))]
    {
        warn!(
            "Serial support not enabled for port {}. Rebuild with --features hardware, or use --stdin.",
            config.serial.port
        );
        None
    }
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let verbose = args
        .iter()
        .map(|a| match a.as_str() {
            "-v" => 1,
            "-vv" => 2,
            _ => 0,
        })
        .sum();
    let quiet = args.iter().any(|a| a == "-q");
    init_logging(verbose, quiet)?;

    if args.iter().any(|a| a == "--list-ports") {
        #[cfg(feature = "hardware")]
        water_telemetry_lib::line_source::list_ports();
        #[cfg(not(feature = "hardware"))]
        eprintln!("Serial support not enabled. Rebuild with --features hardware.");
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|idx| args.get(idx + 1))
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_FILE);
    let config = Config::load_from_path(config_path);
    config
        .validate()
        .with_context(|| format!("configuration in {}", config_path))?;

    let shutdown = Shutdown::new();
    let handle = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        handle.trigger();
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let sink = RestSink::new(&config.endpoint).context("building HTTP client")?;
    let source = open_source(&config, args.iter().any(|a| a == "--stdin"));
    let collector = Collector::new(config, sink, source, shutdown)?;

    // Single-threaded runtime: the loop is strictly sequential
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match rt.block_on(collector.run()) {
        Ok(stats) => {
            info!("Collector stopped after {} delivered reading(s)", stats.delivered);
            Ok(())
        }
        Err(e) => {
            error!("Collector terminated: {}", e);
            Err(e.into())
        }
    }
}
