use crate::config::GroundConfig;
use crate::error::Result;
use crate::log_store::{GroundRecord, LogStore};
use crate::protocol::{
    decode_telemetry, CommandRequest, LogRequest, ProtocolError, Reading, Source, MAX_DATAGRAM_SIZE,
};
use crate::queue::FifoQueue;
use chrono::{Local, NaiveDateTime};
use colored::*;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// What the operator sees for an accepted reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryView {
    pub device: String,
    pub sensor: String,
    #[serde(flatten)]
    pub observation: Observation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Observation {
    Value(String),
    Failure(String),
}

impl TelemetryView {
    fn new(reading: &Reading, observation: Observation) -> Self {
        Self {
            device: reading.device().to_string(),
            sensor: reading.sensor().to_string(),
            observation,
        }
    }
}

impl core::fmt::Display for TelemetryView {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (key, value) = match &self.observation {
            Observation::Value(v) => ("value", v),
            Observation::Failure(v) => ("failure", v),
        };
        write!(f, "{{device: {}, sensor: {}, {}: {}}}", self.device, self.sensor, key, value)
    }
}

/// Routes a validated reading by source. Live readings always show their value; recorder
/// readings that report a warning or error show it as a failure; anything else is ignored.
pub fn classify(reading: &Reading) -> Option<TelemetryView> {
    let value = reading.value().to_string();
    match reading.source() {
        Source::Online => Some(TelemetryView::new(reading, Observation::Value(value))),
        Source::Log if reading.is_failure() => Some(TelemetryView::new(reading, Observation::Failure(value))),
        Source::Log => Some(TelemetryView::new(reading, Observation::Value(value))),
        Source::System => None,
    }
}

/// A line typed at the ground console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `<interval> <device> <sensor>`
    RequestLog(LogRequest),
    /// `<device>`
    FailureCount { device: u32 },
}

impl ConsoleCommand {
    /// Returns `None` for anything that matches neither form.
    pub fn parse(line: &str) -> Option<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [interval, device, sensor] => {
                let interval = parse_unsigned(interval)?;
                let device = parse_unsigned(device)?;
                Some(ConsoleCommand::RequestLog(LogRequest::new(interval, device, *sensor)))
            }
            [device] => Some(ConsoleCommand::FailureCount {
                device: parse_unsigned(device)?,
            }),
            _ => None,
        }
    }
}

fn parse_unsigned(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureCount {
    pub errors: u32,
    pub warnings: u32,
}

impl core::fmt::Display for FailureCount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Session errors: {} || Session warnings: {}", self.errors, self.warnings)
    }
}

/// Counts error and warning telemetry for `device` recorded strictly after `since`.
///
/// A value containing "error" counts as an error even when it also contains "warning".
/// Lines that do not parse as ground records are skipped.
pub fn count_failures(lines: &[String], device: u32, since: NaiveDateTime) -> FailureCount {
    let mut count = FailureCount::default();

    for line in lines {
        let record = match GroundRecord::parse(line) {
            Ok(record) => record,
            Err(e) => {
                debug!("Skipping log line {:?}: {}", line, e);
                continue;
            }
        };

        let GroundRecord::Telemetry { dt, tm, device: recorded, val, .. } = &record else {
            continue;
        };
        if recorded.parse::<u32>().ok() != Some(device) {
            continue;
        }
        match crate::protocol::parse_timestamp(dt, tm) {
            Ok(timestamp) if timestamp > since => {}
            Ok(_) => continue,
            Err(e) => {
                debug!("Skipping log line {:?}: {}", line, e);
                continue;
            }
        }

        let val = val.to_lowercase();
        if val.contains("error") {
            count.errors += 1;
        } else if val.contains("warning") {
            count.warnings += 1;
        }
    }

    count
}

/// Leaky-bucket limiter: at most one release per `period`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    period: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    /// A limiter whose first window starts at `now`.
    pub fn new(period: Duration, now: Instant) -> Self {
        Self { period, last: Some(now) }
    }

    /// A limiter that releases immediately.
    pub fn ready(period: Duration) -> Self {
        Self { period, last: None }
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.period,
            None => true,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

/// Ground side of the link.
///
/// The receiver worker ([`GroundStation::run_receiver`]) ingests telemetry and drains the
/// request queue; the console worker parses operator lines and feeds that queue. The queue is
/// the only state the two share.
pub struct GroundStation {
    config: GroundConfig,
    socket: UdpSocket,
    requests: FifoQueue<LogRequest>,
    log: LogStore,
    session_start: NaiveDateTime,
}

impl GroundStation {
    pub async fn bind(config: GroundConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        let log = LogStore::open(&config.log_path)?;
        info!(
            "Ground station bound to {}, spacecraft at {}",
            socket.local_addr()?,
            config.spacecraft_addr
        );

        Ok(Self {
            config,
            socket,
            requests: FifoQueue::new(),
            log,
            session_start: Local::now().naive_local(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn config(&self) -> &GroundConfig {
        &self.config
    }

    pub fn requests(&self) -> &FifoQueue<LogRequest> {
        &self.requests
    }

    pub fn log(&self) -> &LogStore {
        &self.log
    }

    pub fn session_start(&self) -> NaiveDateTime {
        self.session_start
    }

    /// Applies one console line. Returns the failure count when the line asked for one.
    pub fn handle_console_line(&self, line: &str) -> Result<Option<FailureCount>> {
        match ConsoleCommand::parse(line) {
            Some(ConsoleCommand::RequestLog(request)) => {
                debug!("Queued log request {:?}", request);
                self.requests.push(request);
                Ok(None)
            }
            Some(ConsoleCommand::FailureCount { device }) => self.failure_count(device).map(Some),
            None => Ok(None),
        }
    }

    pub fn failure_count(&self, device: u32) -> Result<FailureCount> {
        let lines = self.log.lines()?;
        Ok(count_failures(&lines, device, self.session_start))
    }

    /// Waits up to the configured timeout for one telemetry datagram.
    ///
    /// Timeouts and socket errors yield `None` silently, as do readings from an unknown source.
    /// Corrupt or malformed datagrams are logged and dropped.
    pub async fn receive_once(&self) -> Option<Reading> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let (len, peer) = match timeout(self.config.recv_timeout, self.socket.recv_from(&mut buf)).await {
            Err(_) => return None,
            Ok(Err(e)) => {
                debug!("Receive failed: {}", e);
                return None;
            }
            Ok(Ok(received)) => received,
        };

        match decode_telemetry(&buf[..len]) {
            Ok(reading) => Some(reading),
            Err(e) if e.is_integrity_violation() => {
                warn!("{}", e);
                None
            }
            Err(ProtocolError::UnknownSource(source)) => {
                debug!("Ignoring reading from source {:?} sent by {}", source, peer);
                None
            }
            Err(e) => {
                warn!("Dropping datagram from {}: {}", peer, e);
                None
            }
        }
    }

    /// Displays and persists an accepted reading. Readings from other sources are ignored.
    pub fn handle_reading(&self, reading: &Reading) -> Result<Option<TelemetryView>> {
        let Some(view) = classify(reading) else {
            debug!("Ignoring {} reading from device {}", reading.source(), reading.device());
            return Ok(None);
        };

        display(&view);
        self.log.append(&GroundRecord::telemetry(reading).to_line())?;
        Ok(Some(view))
    }

    /// Sends the oldest queued request if the limiter allows it.
    pub async fn dispatch_pending(&self, limiter: &mut RateLimiter) -> Result<Option<CommandRequest>> {
        if !limiter.is_ready(Instant::now()) {
            return Ok(None);
        }
        let Some(request) = self.requests.pop() else {
            return Ok(None);
        };

        let command = CommandRequest::from(request);
        let sent = self.send_command(&command).await;
        limiter.mark(Instant::now());
        sent?;
        Ok(Some(command))
    }

    async fn send_command(&self, command: &CommandRequest) -> Result<()> {
        let datagram = command.encode()?;
        self.socket
            .send_to(datagram.as_bytes(), self.config.spacecraft_addr)
            .await?;
        info!(
            "Sent getlog interval={} device={} sensor={}",
            command.interval, command.device, command.sensor
        );

        let record = GroundRecord::command_sent(Local::now().naive_local(), command);
        self.log.append(&record.to_line())
    }

    /// One receiver iteration: receive, handle, dispatch.
    pub async fn poll_once(&self, limiter: &mut RateLimiter) {
        if let Some(reading) = self.receive_once().await {
            if let Err(e) = self.handle_reading(&reading) {
                error!("Failed to record telemetry: {}", e);
            }
        }

        if let Err(e) = self.dispatch_pending(limiter).await {
            error!("Failed to dispatch log request: {}", e);
        }
    }

    pub async fn run_receiver(self: Arc<Self>, stop: watch::Receiver<bool>) {
        let mut limiter = RateLimiter::new(self.config.dispatch_interval, Instant::now());
        while !*stop.borrow() {
            self.poll_once(&mut limiter).await;
            sleep(self.config.poll_interval).await;
        }
        debug!("Ground receiver stopped");
    }

    /// Runs the receiver worker and the stdin console until EOF or Ctrl-C.
    pub async fn run(mut self) -> Result<()> {
        self.session_start = Local::now().naive_local();
        print_banner(self.local_addr()?, self.config.spacecraft_addr);

        let station = Arc::new(self);
        let (stop_tx, stop_rx) = watch::channel(false);
        let receiver = tokio::spawn(Arc::clone(&station).run_receiver(stop_rx));

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => match station.handle_console_line(&line) {
                        Ok(Some(count)) => println!("{}", count.to_string().bright_yellow()),
                        Ok(None) => {}
                        Err(e) => error!("Failure count query failed: {}", e),
                    },
                    Ok(None) => {
                        info!("Console closed");
                        break;
                    }
                    Err(e) => {
                        error!("Console read failed: {}", e);
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received");
                    break;
                }
            }
        }

        let _ = stop_tx.send(true);
        if let Err(e) = receiver.await {
            error!("Ground receiver task failed: {}", e);
        }
        println!("{}", "Ground station stopped".dimmed());
        Ok(())
    }
}

fn display(view: &TelemetryView) {
    match view.observation {
        Observation::Value(_) => println!("{} {}", "📡".bright_blue(), view.to_string().bright_green()),
        Observation::Failure(_) => println!("{} {}", "⚠️".bright_red(), view.to_string().bright_red()),
    }
}

fn print_banner(ground: SocketAddr, spacecraft: SocketAddr) {
    println!("{}", "🛰️  Ground Station".bright_blue().bold());
    println!("{} {}", "Ground socket:".bright_white(), ground);
    println!("{} {}", "Spacecraft socket:".bright_white(), spacecraft);
    println!();
    println!("{}", "Console commands:".bright_white());
    println!("  {} <interval> <device> <sensor>   fetch recorder logs, e.g. {}", "[getlog]".cyan(), "5 3 temperature".dimmed());
    println!("  {} <device>                      count session errors and warnings, e.g. {}", "[printfails]".cyan(), "3".dimmed());
}
