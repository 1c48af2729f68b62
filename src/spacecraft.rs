use crate::config::SpacecraftConfig;
use crate::error::{LinkError, Result};
use crate::log_store::LogStore;
use crate::protocol::{CommandRequest, OutboundEnvelope, Reading, LOG_END, LOG_START, MARKER_SENSOR, MAX_DATAGRAM_SIZE};
use crate::queue::FifoQueue;
use crate::telemetry::SensorSimulator;
use chrono::{Local, NaiveDateTime, TimeDelta};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Selects the recorder lines answering `request` and frames them for transmission.
///
/// A line matches when it is younger than `request.interval` seconds at `now` and its device
/// and sensor equal the request's. A non-empty match set is returned between a `log_start`
/// and a `log_end` marker. Both markers carry the date, time and source of the last line
/// scanned and the requested device. No matches means an empty burst.
pub fn build_log_burst(lines: &[String], request: &CommandRequest, now: NaiveDateTime) -> Vec<Reading> {
    let window = TimeDelta::seconds(i64::from(request.interval));
    let device = request.device.to_string();

    let mut matches = Vec::new();
    let mut last_scanned = None;
    for line in lines {
        let reading = match Reading::from_line(line) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Skipping log line {:?}: {}", line, e);
                continue;
            }
        };
        let timestamp = match reading.timestamp() {
            Ok(timestamp) => timestamp,
            Err(e) => {
                warn!("Skipping log line {:?}: {}", line, e);
                continue;
            }
        };

        if now - timestamp < window && reading.device() == device && reading.sensor() == request.sensor {
            matches.push(reading.clone());
        }
        last_scanned = Some(reading);
    }

    let Some(anchor) = last_scanned.filter(|_| !matches.is_empty()) else {
        return Vec::new();
    };

    let marker = |value: &str| {
        Reading::new(anchor.date(), anchor.time(), anchor.source(), device.as_str(), MARKER_SENSOR, value)
    };

    let mut burst = Vec::with_capacity(matches.len() + 2);
    burst.push(marker(LOG_START));
    burst.extend(matches);
    burst.push(marker(LOG_END));
    burst
}

/// Drains the outbound queue toward the ground station, one envelope per interval.
pub struct TelemetrySender {
    socket: Arc<UdpSocket>,
    outbound: FifoQueue<OutboundEnvelope>,
    ground_addr: SocketAddr,
    send_interval: Duration,
}

impl TelemetrySender {
    /// Transmits the oldest queued envelope, if any.
    pub async fn send_next(&self) -> Result<Option<OutboundEnvelope>> {
        let Some(envelope) = self.outbound.pop() else {
            return Ok(None);
        };

        let datagram = envelope.encode()?;
        self.socket.send_to(datagram.as_bytes(), self.ground_addr).await?;
        debug!("Sent: {}", envelope.message);
        Ok(Some(envelope))
    }

    pub async fn run(self, stop: watch::Receiver<bool>) {
        while !*stop.borrow() {
            sleep(self.send_interval).await;
            match self.send_next().await {
                Ok(_) => {}
                // Unreachable peers surface as socket errors; the envelope is dropped.
                Err(LinkError::Io(e)) => debug!("Send failed: {}", e),
                Err(e) => warn!("Dropping envelope: {}", e),
            }
        }
        debug!("Telemetry sender stopped");
    }
}

/// Spacecraft side of the link.
///
/// The control loop ([`Spacecraft::step`]) samples sensors, records the temperature log, queues
/// live telemetry and answers `getlog` commands. The [`TelemetrySender`] worker drains the
/// outbound queue.
pub struct Spacecraft {
    config: SpacecraftConfig,
    socket: Arc<UdpSocket>,
    outbound: FifoQueue<OutboundEnvelope>,
    log: LogStore,
    sensors: SensorSimulator,
}

impl Spacecraft {
    pub async fn bind(config: SpacecraftConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        let log = LogStore::open(&config.log_path)?;
        info!(
            "Spacecraft bound to {}, ground station at {}",
            socket.local_addr()?,
            config.ground_addr
        );

        Ok(Self {
            config,
            socket: Arc::new(socket),
            outbound: FifoQueue::new(),
            log,
            sensors: SensorSimulator::new(),
        })
    }

    pub fn with_sensors(mut self, sensors: SensorSimulator) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn config(&self) -> &SpacecraftConfig {
        &self.config
    }

    pub fn outbound(&self) -> &FifoQueue<OutboundEnvelope> {
        &self.outbound
    }

    pub fn log(&self) -> &LogStore {
        &self.log
    }

    pub fn sender(&self) -> TelemetrySender {
        TelemetrySender {
            socket: Arc::clone(&self.socket),
            outbound: self.outbound.clone(),
            ground_addr: self.config.ground_addr,
            send_interval: self.config.send_interval,
        }
    }

    /// Samples both sensors once: queues the voltage reading and records the temperature reading.
    ///
    /// The voltage reading is queued even when recording fails.
    pub fn generate(&mut self) -> Result<()> {
        let now = Local::now();
        let online = self.sensors.online_reading(now.naive_local());
        let recorded = self.sensors.log_reading(now.naive_local());

        self.outbound.push(OutboundEnvelope::new(&online, now.timestamp()));
        self.log.append(&recorded.to_line())
    }

    /// Waits up to the configured timeout for a command. Timeouts are silent.
    pub async fn receive_command(&self) -> Option<CommandRequest> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let (len, peer) = match timeout(self.config.recv_timeout, self.socket.recv_from(&mut buf)).await {
            Err(_) => return None,
            Ok(Err(e)) => {
                debug!("Receive failed: {}", e);
                return None;
            }
            Ok(Ok(received)) => received,
        };

        match CommandRequest::decode(&buf[..len]) {
            Ok(command) => {
                info!(
                    "command: getlog | interval: {} | device: {} | sensor: {} | from: {}",
                    command.interval, command.device, command.sensor, peer
                );
                Some(command)
            }
            Err(e) => {
                warn!("Dropping command from {}: {}", peer, e);
                None
            }
        }
    }

    /// Scans the recorder log and queues the framed result. Returns how many envelopes were queued.
    pub fn serve_log_request(&self, request: &CommandRequest) -> Result<usize> {
        let lines = self.log.lines()?;
        let now = Local::now();
        let recv_time = now.timestamp();

        let burst = build_log_burst(&lines, request, now.naive_local());
        let queued = self
            .outbound
            .push_burst(burst.iter().map(|reading| OutboundEnvelope::new(reading, recv_time)));
        Ok(queued)
    }

    /// One control iteration: generate, then poll for and serve a command.
    ///
    /// A failed log append is logged and the iteration carries on, so the bounded receive
    /// always paces the loop.
    pub async fn step(&mut self) -> Result<()> {
        if let Err(e) = self.generate() {
            error!("Failed to record log reading: {}", e);
        }

        if let Some(command) = self.receive_command().await {
            let queued = self.serve_log_request(&command)?;
            info!("Queued {} log envelopes for device {}", queued, command.device);
        }
        Ok(())
    }

    /// Runs the control loop and the sender worker until Ctrl-C.
    pub async fn run(mut self) -> Result<()> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let sender = tokio::spawn(self.sender().run(stop_rx));

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Interrupt received");
                    break;
                }
                result = self.step() => {
                    if let Err(e) = result {
                        error!("Spacecraft cycle failed: {}", e);
                    }
                }
            }
        }

        let _ = stop_tx.send(true);
        if let Err(e) = sender.await {
            error!("Telemetry sender task failed: {}", e);
        }
        Ok(())
    }
}
