use clap::{App, Arg};
use colored::*;
use satlink::config::{self, SpacecraftConfig};
use satlink::Spacecraft;
use std::path::PathBuf;
use std::process::exit;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let spacecraft_default = config::default_spacecraft_addr().to_string();
    let ground_default = config::default_ground_addr().to_string();

    let matches = App::new("satlink-spacecraft")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Space Systems Engineering Team")
        .about("🛰️  Spacecraft: streams telemetry and serves recorder logs")
        .arg(
            Arg::with_name("addr")
                .long("addr")
                .value_name("IP:PORT")
                .help("Address the spacecraft listens on for commands")
                .takes_value(true)
                .default_value(&spacecraft_default),
        )
        .arg(
            Arg::with_name("ground")
                .long("ground")
                .value_name("IP:PORT")
                .help("Address of the ground station")
                .takes_value(true)
                .default_value(&ground_default),
        )
        .arg(
            Arg::with_name("log-file")
                .long("log-file")
                .value_name("PATH")
                .help("Recorder log file")
                .takes_value(true)
                .default_value(config::DEFAULT_SPACECRAFT_LOG),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging"),
        )
        .get_matches();

    init_tracing(matches.is_present("verbose"));

    let mut spacecraft_config = SpacecraftConfig::default();
    if let Some(addr) = matches.value_of("addr") {
        spacecraft_config.bind_addr = config::parse_addr(addr)?;
    }
    if let Some(addr) = matches.value_of("ground") {
        spacecraft_config.ground_addr = config::parse_addr(addr)?;
    }
    if let Some(path) = matches.value_of("log-file") {
        spacecraft_config.log_path = PathBuf::from(path);
    }

    println!("{}", "🛰️  Spacecraft Log System".bright_blue().bold());
    println!("{} {}", "Listening on:".bright_white(), spacecraft_config.bind_addr);
    println!("{} {}", "Ground station:".bright_white(), spacecraft_config.ground_addr);

    let spacecraft = match Spacecraft::bind(spacecraft_config).await {
        Ok(spacecraft) => spacecraft,
        Err(e) => {
            eprintln!("{} {}", "❌".red(), e.to_string().bright_red());
            exit(1);
        }
    };

    info!("Spacecraft running, press Ctrl+C to stop");
    if let Err(e) = spacecraft.run().await {
        eprintln!("{} {}", "❌".red(), e.to_string().bright_red());
        exit(1);
    }

    println!("{}", "🚀 Spacecraft stopped".dimmed());
    Ok(())
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
