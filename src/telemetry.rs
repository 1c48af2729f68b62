use crate::protocol::{Reading, Source};
use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const VOLTAGE_DEVICE: &str = "2";
pub const VOLTAGE_SENSOR: &str = "voltage";
pub const TEMPERATURE_DEVICE: &str = "3";
pub const TEMPERATURE_SENSOR: &str = "temperature";

const TEMPERATURE_MIN_C: u8 = 0;
const TEMPERATURE_MAX_C: u8 = 50;
const VOLTAGE_SCALE_MIN: u32 = 3;
const VOLTAGE_SCALE_MAX: u32 = 10;

// Fault model for the temperature recorder
pub const SENSOR_FAIL_THRESHOLD_C: u8 = 40;
pub const OVERHEAT_THRESHOLD_C: u8 = 20;
pub const SENSOR_FAIL: &str = "ERROR:sensor_fail";
pub const OVERHEAT: &str = "WARNING:overheat";

/// Text recorded for a temperature sample: a fault string above the thresholds, otherwise the
/// temperature itself.
pub fn temperature_value(temperature_c: u8) -> String {
    if temperature_c > SENSOR_FAIL_THRESHOLD_C {
        SENSOR_FAIL.to_string()
    } else if temperature_c > OVERHEAT_THRESHOLD_C {
        OVERHEAT.to_string()
    } else {
        temperature_c.to_string()
    }
}

/// Synthetic on-board sensors: a live voltage channel and a temperature recorder.
#[derive(Debug)]
pub struct SensorSimulator {
    rng: StdRng,
}

impl SensorSimulator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self { rng }
    }

    /// Voltage in volts, rounded to millivolts.
    pub fn sample_voltage(&mut self) -> f64 {
        let scale = self.rng.gen_range(VOLTAGE_SCALE_MIN..=VOLTAGE_SCALE_MAX);
        let raw = self.rng.gen::<f64>() * f64::from(scale);
        (raw * 1000.0).round() / 1000.0
    }

    pub fn sample_temperature(&mut self) -> u8 {
        self.rng.gen_range(TEMPERATURE_MIN_C..=TEMPERATURE_MAX_C)
    }

    pub fn online_reading(&mut self, now: NaiveDateTime) -> Reading {
        let voltage = self.sample_voltage();
        Reading::at(now, Source::Online, VOLTAGE_DEVICE, VOLTAGE_SENSOR, voltage.to_string())
    }

    pub fn log_reading(&mut self, now: NaiveDateTime) -> Reading {
        let value = temperature_value(self.sample_temperature());
        Reading::at(now, Source::Log, TEMPERATURE_DEVICE, TEMPERATURE_SENSOR, value)
    }
}

impl Default for SensorSimulator {
    fn default() -> Self {
        Self::new()
    }
}
