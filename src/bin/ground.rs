use clap::{App, Arg};
use colored::*;
use satlink::config::{self, GroundConfig};
use satlink::GroundStation;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let ground_default = config::default_ground_addr().to_string();
    let spacecraft_default = config::default_spacecraft_addr().to_string();
    let timeout_default = config::DEFAULT_GROUND_RECV_TIMEOUT_MS.to_string();

    let matches = App::new("satlink-ground")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Space Systems Engineering Team")
        .about("📡 Ground station: receives telemetry and requests spacecraft logs")
        .arg(
            Arg::with_name("addr")
                .long("addr")
                .value_name("IP:PORT")
                .help("Address the ground station listens on")
                .takes_value(true)
                .default_value(&ground_default),
        )
        .arg(
            Arg::with_name("spacecraft")
                .long("spacecraft")
                .value_name("IP:PORT")
                .help("Address of the spacecraft")
                .takes_value(true)
                .default_value(&spacecraft_default),
        )
        .arg(
            Arg::with_name("log-file")
                .long("log-file")
                .value_name("PATH")
                .help("Ground station log file")
                .takes_value(true)
                .default_value(config::DEFAULT_GROUND_LOG),
        )
        .arg(
            Arg::with_name("recv-timeout")
                .long("recv-timeout")
                .value_name("MS")
                .help("Receive timeout in milliseconds")
                .takes_value(true)
                .default_value(&timeout_default)
                .validator(|v| match v.parse::<u64>() {
                    Ok(ms) if ms > 0 => Ok(()),
                    _ => Err("Timeout must be a positive number of milliseconds".into()),
                }),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging"),
        )
        .get_matches();

    init_tracing(matches.is_present("verbose"));

    let mut ground_config = GroundConfig::default();
    if let Some(addr) = matches.value_of("addr") {
        ground_config.bind_addr = config::parse_addr(addr)?;
    }
    if let Some(addr) = matches.value_of("spacecraft") {
        ground_config.spacecraft_addr = config::parse_addr(addr)?;
    }
    if let Some(path) = matches.value_of("log-file") {
        ground_config.log_path = PathBuf::from(path);
    }
    if let Some(ms) = matches.value_of("recv-timeout") {
        ground_config.recv_timeout = Duration::from_millis(ms.parse()?);
    }

    let station = match GroundStation::bind(ground_config).await {
        Ok(station) => station,
        Err(e) => {
            eprintln!("{} {}", "❌".red(), e.to_string().bright_red());
            exit(1);
        }
    };

    if let Err(e) = station.run().await {
        eprintln!("{} {}", "❌".red(), e.to_string().bright_red());
        exit(1);
    }

    // stdin reads may still be parked on a blocking thread; don't wait for them
    exit(0);
}

/// configures a tracing subscriber that logs to STDERR
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
}
