//! Small helpers shared across components: timestamps, integer log2 /
//! ceiling division, and human-readable byte sizes.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the epoch, as used by every on-disk timestamp field.
pub fn timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Seconds since the epoch as a float, for the journal's `i_date` field.
pub fn timestamp_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Returns `floor(log2(n))`, or `None` if `n == 0`.
pub fn log2(n: u64) -> Option<u64> {
    if n == 0 {
        None
    } else {
        Some(63 - n.leading_zeros() as u64)
    }
}

/// Ceiling division for positive integers.
pub fn ceil_div(n: u64, d: u64) -> u64 {
    (n + d - 1) / d
}

/// A byte count with a human-readable `Display` (KiB, MiB, ...).
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];
        let mut size = self.0 as f64;
        let mut unit = 0;
        while size >= 1024.0 && unit < UNITS.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }
        if unit == 0 {
            write!(fmt, "{} {}", self.0, UNITS[unit])
        } else {
            write!(fmt, "{:.2} {}", size, UNITS[unit])
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn log2_values() {
        assert_eq!(log2(0), None);
        assert_eq!(log2(1), Some(0));
        assert_eq!(log2(2), Some(1));
        assert_eq!(log2(1023), Some(9));
        assert_eq!(log2(1024), Some(10));
    }

    #[test]
    fn ceil_div_values() {
        assert_eq!(ceil_div(10, 5), 2);
        assert_eq!(ceil_div(11, 5), 3);
        assert_eq!(ceil_div(0, 5), 0);
    }

    #[test]
    fn bytesize_display() {
        assert_eq!(ByteSize(512).to_string(), "512 B");
        assert_eq!(ByteSize(2048).to_string(), "2.00 KiB");
    }
}
