//! # Satellite Telemetry Link
//!
//! A ground station and a spacecraft endpoint exchanging telemetry and log excerpts over UDP.
//!
//! ## Features
//!
//! - **Live telemetry**: the spacecraft streams voltage readings to the ground station
//! - **Integrity checks**: every reading carries a checksum; corrupt datagrams are dropped
//! - **Log retrieval**: `getlog` requests return recorder history framed by start/end markers
//! - **Rate-limited dispatch**: queued ground requests leave at most once per window
//! - **Failure accounting**: per-device error and warning counts for the current session
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use satlink::{GroundConfig, GroundStation};
//!
//! # async fn example() -> satlink::Result<()> {
//! let station = GroundStation::bind(GroundConfig::default()).await?;
//!
//! // Queue a request for the last 5 seconds of temperature logs from device 3
//! station.handle_console_line("5 3 temperature")?;
//!
//! // Run the receiver and the stdin console until Ctrl-C
//! station.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`checksum`] - Integrity value over a reading's content fields
//! - [`protocol`] - Readings, commands and their JSON datagrams
//! - [`queue`] - The FIFO shared by an endpoint's two workers
//! - [`log_store`] - Append-only endpoint logs and their record formats
//! - [`telemetry`] - Synthetic sensors and the temperature fault model
//! - [`ground`] - Ground station receiver, dispatcher and console
//! - [`spacecraft`] - Spacecraft control loop and telemetry sender

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod checksum;
pub mod config;
pub mod error;
pub mod ground;
pub mod log_store;
pub mod protocol;
pub mod queue;
pub mod spacecraft;
pub mod telemetry;

// Re-export main public types for convenience
pub use config::{GroundConfig, SpacecraftConfig};
pub use error::{LinkError, Result};
pub use ground::GroundStation;
pub use protocol::{CommandRequest, LogRequest, OutboundEnvelope, Reading, Source};
pub use queue::FifoQueue;
pub use spacecraft::Spacecraft;
