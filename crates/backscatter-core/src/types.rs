//! Fundamental types shared across the detection pipeline.

use chrono::Utc;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Timestamp wrapper with nanosecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(0))
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn from_micros(micros: i64) -> Self {
        Self(micros.saturating_mul(1_000))
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }
}

/// Complex number type alias for CSI data (one I/Q sample per subcarrier)
pub type CsiComplex = Complex<f64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_conversions() {
        let ts = Timestamp::from_micros(1_500_000);
        assert_eq!(ts.as_nanos(), 1_500_000_000);
        assert!((ts.as_secs_f64() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_now_is_after_epoch() {
        assert!(Timestamp::now().as_nanos() > 0);
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(Timestamp::from_nanos(1) < Timestamp::from_nanos(2));
    }
}
