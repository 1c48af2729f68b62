use crate::error::{LinkError, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GROUND_PORT: u16 = 5001;
pub const DEFAULT_SPACECRAFT_PORT: u16 = 5002;
pub const DEFAULT_GROUND_LOG: &str = "ground.log";
pub const DEFAULT_SPACECRAFT_LOG: &str = "spacecraft.log";

// Ground receive bound; keeps the dispatch timer within one poll of its deadline
pub const DEFAULT_GROUND_RECV_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_SPACECRAFT_RECV_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
pub const DEFAULT_DISPATCH_INTERVAL_MS: u64 = 3000;

pub fn default_ground_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_GROUND_PORT))
}

pub fn default_spacecraft_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_SPACECRAFT_PORT))
}

pub fn parse_addr(value: &str) -> Result<SocketAddr> {
    value
        .trim()
        .parse()
        .map_err(|_| LinkError::Config(format!("could not parse {} into an IP address and port", value)))
}

/// Settings for a [`GroundStation`](crate::GroundStation).
#[derive(Debug, Clone)]
pub struct GroundConfig {
    /// Address the ground socket binds to
    pub bind_addr: SocketAddr,
    /// Where log requests are sent
    pub spacecraft_addr: SocketAddr,
    pub log_path: PathBuf,
    pub recv_timeout: Duration,
    /// Pause between receiver iterations
    pub poll_interval: Duration,
    /// Minimum spacing between two dispatched commands
    pub dispatch_interval: Duration,
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_ground_addr(),
            spacecraft_addr: default_spacecraft_addr(),
            log_path: PathBuf::from(DEFAULT_GROUND_LOG),
            recv_timeout: Duration::from_millis(DEFAULT_GROUND_RECV_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            dispatch_interval: Duration::from_millis(DEFAULT_DISPATCH_INTERVAL_MS),
        }
    }
}

/// Settings for a [`Spacecraft`](crate::Spacecraft).
#[derive(Debug, Clone)]
pub struct SpacecraftConfig {
    pub bind_addr: SocketAddr,
    /// Where telemetry and log bursts are sent
    pub ground_addr: SocketAddr,
    pub log_path: PathBuf,
    /// Upper bound on the wait for a command in each generation cycle
    pub recv_timeout: Duration,
    /// Pause between two outbound transmissions
    pub send_interval: Duration,
}

impl Default for SpacecraftConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_spacecraft_addr(),
            ground_addr: default_ground_addr(),
            log_path: PathBuf::from(DEFAULT_SPACECRAFT_LOG),
            recv_timeout: Duration::from_millis(DEFAULT_SPACECRAFT_RECV_TIMEOUT_MS),
            send_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}
