//! Integrity checksum over the six content fields of a reading.
//!
//! The checksum exists to catch corruption in transit, not tampering. It is a CRC-32 over
//! the fields joined by single spaces, so it changes when any field changes and when two
//! fields swap places.

use crc32fast::Hasher;

pub const FIELD_COUNT: usize = 6;

/// Computes the checksum of `date time source device sensor value`.
pub fn checksum(date: &str, time: &str, source: &str, device: &str, sensor: &str, value: &str) -> u32 {
    checksum_fields(&[date, time, source, device, sensor, value])
}

pub fn checksum_fields(fields: &[&str; FIELD_COUNT]) -> u32 {
    let mut hasher = Hasher::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update(b" ");
        }
        hasher.update(field.as_bytes());
    }
    hasher.finalize()
}

/// Returns true when `stored` matches the checksum recomputed from `fields`.
pub fn verify(fields: &[&str; FIELD_COUNT], stored: u32) -> bool {
    checksum_fields(fields) == stored
}
