use crate::checksum::{self, FIELD_COUNT};
use arrayvec::ArrayString;
use chrono::NaiveDateTime;
use heapless::Vec;
use serde::{Deserialize, Deserializer, Serialize};
use static_assertions::const_assert;
use thiserror::Error;

pub const MAX_DATAGRAM_SIZE: usize = 1024;
const MAX_UDP_PAYLOAD: usize = 65_507;
const_assert!(MAX_DATAGRAM_SIZE <= MAX_UDP_PAYLOAD);

/// date, time, source, device, sensor, value, checksum
pub const TELEMETRY_TOKEN_COUNT: usize = FIELD_COUNT + 1;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.6f";

pub const MARKER_SENSOR: &str = "system";
pub const LOG_START: &str = "log_start";
pub const LOG_END: &str = "log_end";

pub type DatagramBuffer = ArrayString<MAX_DATAGRAM_SIZE>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Datagram carries no message")]
    MissingMessage,

    #[error("Expected {expected} tokens, found {found}")]
    WrongTokenCount { expected: usize, found: usize },

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Invalid checksum token: {0}")]
    InvalidChecksum(String),

    #[error("Packet at {date} {time} is broken")]
    ChecksumMismatch { date: String, time: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Message exceeds datagram size")]
    MessageTooLarge,

    #[error("Serialization failed")]
    SerializationError,
}

impl ProtocolError {
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, ProtocolError::ChecksumMismatch { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Online,
    Log,
    System,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Online => "online",
            Source::Log => "log",
            Source::System => "system",
        }
    }
}

impl core::fmt::Display for Source {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Source {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Source::Online),
            "log" => Ok(Source::Log),
            "system" => Ok(Source::System),
            other => Err(ProtocolError::UnknownSource(other.to_string())),
        }
    }
}

/// One telemetry or log sample.
///
/// A `Reading` always carries a checksum that agrees with its fields: [`Reading::new`] and
/// [`Reading::at`] compute it, and [`Reading::from_message`] refuses input whose embedded
/// checksum does not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    date: String,
    time: String,
    source: Source,
    device: String,
    sensor: String,
    value: String,
    checksum: u32,
}

impl Reading {
    pub fn new(
        date: impl Into<String>,
        time: impl Into<String>,
        source: Source,
        device: impl Into<String>,
        sensor: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let date = date.into();
        let time = time.into();
        let device = device.into();
        let sensor = sensor.into();
        let value = value.into();
        let checksum = checksum::checksum(&date, &time, source.as_str(), &device, &sensor, &value);

        Self { date, time, source, device, sensor, value, checksum }
    }

    /// Builds a reading stamped with `timestamp`, rendered in the wire date/time format.
    pub fn at(
        timestamp: NaiveDateTime,
        source: Source,
        device: impl Into<String>,
        sensor: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            timestamp.format(DATE_FORMAT).to_string(),
            timestamp.format(TIME_FORMAT).to_string(),
            source,
            device,
            sensor,
            value,
        )
    }

    /// Parses a six-token log line (`date time source device sensor value`) and attaches a
    /// freshly computed checksum.
    pub fn from_line(line: &str) -> Result<Self, ProtocolError> {
        let tokens = split_tokens::<FIELD_COUNT>(line)?;
        let source = tokens[2].parse()?;
        Ok(Self::new(tokens[0], tokens[1], source, tokens[3], tokens[4], tokens[5]))
    }

    /// Parses the seven-token wire message and verifies its checksum.
    pub fn from_message(message: &str) -> Result<Self, ProtocolError> {
        let tokens = split_tokens::<TELEMETRY_TOKEN_COUNT>(message)?;
        let stored: u32 = tokens[6]
            .parse()
            .map_err(|_| ProtocolError::InvalidChecksum(tokens[6].to_string()))?;

        let fields = [tokens[0], tokens[1], tokens[2], tokens[3], tokens[4], tokens[5]];
        if !checksum::verify(&fields, stored) {
            return Err(ProtocolError::ChecksumMismatch {
                date: tokens[0].to_string(),
                time: tokens[1].to_string(),
            });
        }

        let source = tokens[2].parse()?;
        Ok(Self {
            date: tokens[0].to_string(),
            time: tokens[1].to_string(),
            source,
            device: tokens[3].to_string(),
            sensor: tokens[4].to_string(),
            value: tokens[5].to_string(),
            checksum: stored,
        })
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn timestamp(&self) -> Result<NaiveDateTime, ProtocolError> {
        parse_timestamp(&self.date, &self.time)
    }

    /// True when the value reports a fault: it contains "warning" or "error" in any case.
    pub fn is_failure(&self) -> bool {
        let value = self.value.to_lowercase();
        value.contains("warning") || value.contains("error")
    }

    /// The six content fields without the checksum, as persisted by the spacecraft.
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.date, self.time, self.source, self.device, self.sensor, self.value
        )
    }

    /// The seven-token wire message.
    pub fn to_message(&self) -> String {
        format!("{} {}", self.to_line(), self.checksum)
    }
}

impl core::fmt::Display for Reading {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_message())
    }
}

/// Parses `date` and `time` tokens into a timestamp. The fractional second is optional.
pub fn parse_timestamp(date: &str, time: &str) -> Result<NaiveDateTime, ProtocolError> {
    format!("{date}T{time}")
        .parse::<NaiveDateTime>()
        .map_err(|_| ProtocolError::InvalidTimestamp(format!("{date} {time}")))
}

fn split_tokens<const N: usize>(text: &str) -> Result<Vec<&str, N>, ProtocolError> {
    let mut tokens: Vec<&str, N> = Vec::new();
    let mut found = 0;
    for token in text.split_whitespace() {
        found += 1;
        // Overflow is reported below with the full count.
        let _ = tokens.push(token);
    }

    if found != N {
        return Err(ProtocolError::WrongTokenCount { expected: N, found });
    }
    Ok(tokens)
}

/// A reading queued for transmission, stamped with the epoch second it was queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub recv_time: i64,
    pub message: String,
}

impl OutboundEnvelope {
    pub fn new(reading: &Reading, recv_time: i64) -> Self {
        Self {
            recv_time,
            message: reading.to_message(),
        }
    }

    pub fn encode(&self) -> Result<DatagramBuffer, ProtocolError> {
        encode_json(self)
    }
}

#[derive(Deserialize)]
struct TelemetryDatagram {
    #[serde(default)]
    message: Option<String>,
}

/// Decodes one telemetry datagram into a validated [`Reading`].
pub fn decode_telemetry(bytes: &[u8]) -> Result<Reading, ProtocolError> {
    let datagram: TelemetryDatagram =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    match datagram.message {
        Some(message) if !message.trim().is_empty() => Reading::from_message(&message),
        _ => Err(ProtocolError::MissingMessage),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    #[serde(rename = "getlog")]
    GetLog,
}

/// A pending log retrieval: `interval` seconds back, for one device and sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRequest {
    pub interval: u32,
    pub device: u32,
    pub sensor: String,
}

impl LogRequest {
    pub fn new(interval: u32, device: u32, sensor: impl Into<String>) -> Self {
        Self {
            interval,
            device,
            sensor: sensor.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: CommandKind,
    #[serde(deserialize_with = "lenient_u32")]
    pub interval: u32,
    #[serde(deserialize_with = "lenient_u32")]
    pub device: u32,
    pub sensor: String,
}

impl CommandRequest {
    pub fn encode(&self) -> Result<DatagramBuffer, ProtocolError> {
        encode_json(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
    }
}

impl From<LogRequest> for CommandRequest {
    fn from(request: LogRequest) -> Self {
        Self {
            command: CommandKind::GetLog,
            interval: request.interval,
            device: request.device,
            sensor: request.sensor,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u32),
    Text(String),
}

// Peers send integers, but numeric strings show up too.
fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn encode_json<T: Serialize>(value: &T) -> Result<DatagramBuffer, ProtocolError> {
    let json = serde_json::to_string(value).map_err(|_| ProtocolError::SerializationError)?;
    let mut buffer = DatagramBuffer::new();
    buffer
        .try_push_str(&json)
        .map_err(|_| ProtocolError::MessageTooLarge)?;
    Ok(buffer)
}
