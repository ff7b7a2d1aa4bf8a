//! CSI frame data structures.

use backscatter_core::{CsiComplex, Error, Result, Timestamp};
use serde::{Deserialize, Serialize};

/// Marker leading every CSI record printed by the ESP32 firmware
pub const ESP32_CSI_PREFIX: &str = "CSI_DATA";

/// One CSI vector as delivered by the radio
///
/// Each element is the complex I/Q sample of one OFDM subcarrier for a
/// single received frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsiPacket {
    /// Nanosecond timestamp when the frame was captured
    pub timestamp: i64,

    /// Sequence number for packet ordering
    pub sequence_number: u32,

    /// Received Signal Strength Indicator (dBm), when reported
    pub rssi: Option<i8>,

    /// Per-subcarrier complex samples
    pub csi: Vec<CsiComplex>,
}

impl CsiPacket {
    pub fn new(timestamp: i64, sequence_number: u32, csi: Vec<CsiComplex>) -> Self {
        Self {
            timestamp,
            sequence_number,
            rssi: None,
            csi,
        }
    }

    pub fn subcarrier_count(&self) -> usize {
        self.csi.len()
    }

    /// Extract amplitude values
    pub fn amplitudes(&self) -> Vec<f64> {
        self.csi.iter().map(|c| c.norm()).collect()
    }

    /// Extract phase values (radians)
    pub fn phases(&self) -> Vec<f64> {
        self.csi.iter().map(|c| c.arg()).collect()
    }

    /// Non-empty and every sample finite
    pub fn is_valid(&self) -> bool {
        !self.csi.is_empty() && self.csi.iter().all(|c| c.re.is_finite() && c.im.is_finite())
    }

    pub fn to_timestamp(&self) -> Timestamp {
        Timestamp::from_nanos(self.timestamp)
    }

    /// Parse one line of ESP32 CSI serial output.
    ///
    /// The raw samples are the bracketed list at the end of the line, as
    /// interleaved integers `[I0 Q0 I1 Q1 ...]` separated by spaces and/or
    /// commas. When the line starts with `CSI_DATA`, field 1 is read as the
    /// sequence number and field 3 as the RSSI; unparsable metadata is
    /// ignored. The packet is stamped with the time of parsing, which for a
    /// live serial reader is the capture time. `line_no` is only used for
    /// error reporting.
    pub fn parse_esp32_line(line: &str, line_no: usize) -> Result<Self> {
        let parse_err = |reason: String| Error::Parse {
            line: line_no,
            reason,
        };

        let open = line
            .rfind('[')
            .ok_or_else(|| parse_err("missing '[' before sample list".into()))?;
        let close = line[open..]
            .find(']')
            .map(|i| open + i)
            .ok_or_else(|| parse_err("missing closing ']'".into()))?;

        let values = line[open + 1..close]
            .split(|ch: char| ch == ',' || ch.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(|token| {
                token
                    .parse::<i32>()
                    .map_err(|_| parse_err(format!("invalid sample '{token}'")))
            })
            .collect::<Result<Vec<i32>>>()?;

        if values.is_empty() {
            return Err(parse_err("empty sample list".into()));
        }
        if values.len() % 2 != 0 {
            return Err(parse_err(format!(
                "odd number of I/Q values ({})",
                values.len()
            )));
        }

        let csi = values
            .chunks_exact(2)
            .map(|pair| CsiComplex::new(pair[0] as f64, pair[1] as f64))
            .collect();

        let mut packet = CsiPacket::new(Timestamp::now().as_nanos(), 0, csi);

        let fields: Vec<&str> = line[..open]
            .split(',')
            .map(|f| f.trim().trim_matches('"'))
            .collect();
        if fields.first() == Some(&ESP32_CSI_PREFIX) {
            if let Some(seq) = fields.get(1).and_then(|f| f.parse::<u32>().ok()) {
                packet.sequence_number = seq;
            }
            packet.rssi = fields.get(3).and_then(|f| f.parse::<i8>().ok());
        }

        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csi_packet_amplitudes() {
        let csi = vec![
            CsiComplex::new(3.0, 4.0), // |z| = 5
            CsiComplex::new(0.0, 1.0), // |z| = 1
            CsiComplex::new(1.0, 0.0), // |z| = 1
        ];

        let packet = CsiPacket::new(0, 0, csi);
        let amps = packet.amplitudes();

        assert!((amps[0] - 5.0).abs() < 1e-10);
        assert!((amps[1] - 1.0).abs() < 1e-10);
        assert!((amps[2] - 1.0).abs() < 1e-10);
        assert!(packet.is_valid());
    }

    #[test]
    fn test_parse_esp32_line() {
        let line = "CSI_DATA,42,aa:bb:cc:dd:ee:ff,-57,11,1,0,0,\"[3 -4 0 1 -2 2]\"";
        let packet = CsiPacket::parse_esp32_line(line, 1).unwrap();

        assert_eq!(packet.sequence_number, 42);
        assert_eq!(packet.rssi, Some(-57));
        assert!(packet.to_timestamp().as_nanos() > 0);
        assert_eq!(
            packet.csi,
            vec![
                CsiComplex::new(3.0, -4.0),
                CsiComplex::new(0.0, 1.0),
                CsiComplex::new(-2.0, 2.0),
            ]
        );
    }

    #[test]
    fn test_parse_bare_sample_list() {
        let packet = CsiPacket::parse_esp32_line("[1, 2, 3, 4]", 7).unwrap();
        assert_eq!(packet.subcarrier_count(), 2);
        assert_eq!(packet.sequence_number, 0);
        assert_eq!(packet.rssi, None);
    }

    #[test]
    fn test_parse_errors_carry_line_number() {
        for bad in ["CSI_DATA,1,mac,-50", "[1 2 3]", "[]", "[1 x 2 3]", "[1 2 3 4"] {
            match CsiPacket::parse_esp32_line(bad, 12) {
                Err(Error::Parse { line, .. }) => assert_eq!(line, 12),
                other => panic!("expected parse error for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_packet() {
        let packet = CsiPacket::new(0, 0, vec![CsiComplex::new(f64::INFINITY, 0.0)]);
        assert!(!packet.is_valid());
        assert!(!CsiPacket::new(0, 0, Vec::new()).is_valid());
    }
}
