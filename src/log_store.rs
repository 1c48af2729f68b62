//! Append-only text logs kept by each endpoint.
//!
//! The spacecraft writes one [`Reading`] per line as six positional tokens (see
//! [`Reading::to_line`]). The ground station writes [`GroundRecord`]s as space-joined
//! `key=value` pairs.

use crate::error::Result;
use crate::protocol::{parse_timestamp, CommandRequest, ProtocolError, Reading, Source};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const ISO_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogRecordError {
    #[error("Token without '=': {0}")]
    MissingSeparator(String),

    #[error("Missing key: {0}")]
    MissingKey(&'static str),

    #[error("Unrecognized record layout")]
    UnknownLayout,

    #[error("Invalid number for {key}: {value}")]
    InvalidNumber { key: &'static str, value: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// An append-only, line-oriented log file.
#[derive(Debug, Clone)]
pub struct LogStore {
    path: PathBuf,
}

impl LogStore {
    /// Opens the log at `path`, creating an empty file if none exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line.trim_end())?;
        Ok(())
    }

    /// Every non-blank line, oldest first.
    pub fn lines(&self) -> Result<Vec<String>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut lines = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        Ok(lines)
    }
}

/// One line of the ground station log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroundRecord {
    Telemetry {
        dt: String,
        tm: String,
        src: Source,
        device: String,
        sensor: String,
        val: String,
    },
    CommandSent {
        datetime: NaiveDateTime,
        command: String,
        interval: u32,
        device: u32,
        sensor: String,
    },
}

impl GroundRecord {
    pub fn telemetry(reading: &Reading) -> Self {
        GroundRecord::Telemetry {
            dt: reading.date().to_string(),
            tm: reading.time().to_string(),
            src: reading.source(),
            device: reading.device().to_string(),
            sensor: reading.sensor().to_string(),
            val: reading.value().to_string(),
        }
    }

    pub fn command_sent(datetime: NaiveDateTime, request: &CommandRequest) -> Self {
        GroundRecord::CommandSent {
            datetime,
            command: "getlog".to_string(),
            interval: request.interval,
            device: request.device,
            sensor: request.sensor.clone(),
        }
    }

    pub fn to_line(&self) -> String {
        match self {
            GroundRecord::Telemetry { dt, tm, src, device, sensor, val } => format!(
                "dt={} tm={} src={} device={} sensor={} val={}",
                dt, tm, src, device, sensor, val
            ),
            GroundRecord::CommandSent { datetime, command, interval, device, sensor } => format!(
                "datetime={} command={} interval={} device={} sensor={}",
                datetime.format(ISO_DATETIME_FORMAT),
                command,
                interval,
                device,
                sensor
            ),
        }
    }

    pub fn parse(line: &str) -> core::result::Result<Self, LogRecordError> {
        let mut pairs = HashMap::new();
        for token in line.split_whitespace() {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| LogRecordError::MissingSeparator(token.to_string()))?;
            pairs.insert(key, value);
        }

        let get = |key: &'static str| pairs.get(key).copied().ok_or(LogRecordError::MissingKey(key));

        if pairs.contains_key("dt") {
            Ok(GroundRecord::Telemetry {
                dt: get("dt")?.to_string(),
                tm: get("tm")?.to_string(),
                src: get("src")?.parse()?,
                device: get("device")?.to_string(),
                sensor: get("sensor")?.to_string(),
                val: get("val")?.to_string(),
            })
        } else if pairs.contains_key("datetime") {
            let datetime = get("datetime")?;
            let datetime = datetime
                .parse::<NaiveDateTime>()
                .map_err(|_| ProtocolError::InvalidTimestamp(datetime.to_string()))?;
            Ok(GroundRecord::CommandSent {
                datetime,
                command: get("command")?.to_string(),
                interval: parse_number("interval", get("interval")?)?,
                device: parse_number("device", get("device")?)?,
                sensor: get("sensor")?.to_string(),
            })
        } else {
            Err(LogRecordError::UnknownLayout)
        }
    }

    /// Timestamp of a telemetry record; `None` for command records.
    pub fn telemetry_timestamp(&self) -> Option<core::result::Result<NaiveDateTime, ProtocolError>> {
        match self {
            GroundRecord::Telemetry { dt, tm, .. } => Some(parse_timestamp(dt, tm)),
            GroundRecord::CommandSent { .. } => None,
        }
    }
}

impl core::fmt::Display for GroundRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_line())
    }
}

fn parse_number(key: &'static str, value: &str) -> core::result::Result<u32, LogRecordError> {
    value.parse().map_err(|_| LogRecordError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_line_layout() {
        let reading = Reading::new("2025-08-26", "13:28:40", Source::Log, "3", "temperature", "WARNING:overheat");
        let line = GroundRecord::telemetry(&reading).to_line();
        assert_eq!(
            line,
            "dt=2025-08-26 tm=13:28:40 src=log device=3 sensor=temperature val=WARNING:overheat"
        );
    }

    #[test]
    fn command_line_parses_back() {
        let line = "datetime=2025-08-26T13:28:40.500000 command=getlog interval=5 device=3 sensor=temperature";
        match GroundRecord::parse(line).unwrap() {
            GroundRecord::CommandSent { interval, device, sensor, .. } => {
                assert_eq!(interval, 5);
                assert_eq!(device, 3);
                assert_eq!(sensor, "temperature");
            }
            other => panic!("Expected CommandSent, got {:?}", other),
        }
    }

    #[test]
    fn rejects_tokens_without_separator() {
        assert_eq!(
            GroundRecord::parse("dt=2025-08-26 garbage"),
            Err(LogRecordError::MissingSeparator("garbage".to_string()))
        );
    }
}
