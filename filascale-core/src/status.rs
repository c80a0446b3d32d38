//! Spool status record reported by the device

use serde::{Deserialize, Serialize};

use crate::error::{FilaScaleError, Result};

/// Largest spool id a 125kHz RFID tag can carry (48 bits)
pub const MAX_SPOOL_ID: u64 = (1 << 48) - 1;

/// Decoded STATUS payload
///
/// Wire shape:
/// `{"printername": "...", "spool_id": 1423659708, "temp": 38.0, "humidity": 0.48, "weight": 788}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Printer the spool is loaded on
    #[serde(rename = "printername")]
    pub printer_name: String,
    /// RFID tag id of the spool
    pub spool_id: u64,
    /// Drybox temperature
    #[serde(rename = "temp")]
    pub temperature: f64,
    /// Drybox relative humidity
    pub humidity: f64,
    /// Spool weight
    pub weight: f64,
}

impl StatusRecord {
    /// Decode a STATUS payload.
    ///
    /// Anything that is not valid UTF-8 JSON of the expected shape, or a
    /// spool id wider than 48 bits, is an `InvalidStatusPayload`.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let record: StatusRecord = serde_json::from_slice(payload)
            .map_err(|e| FilaScaleError::InvalidStatusPayload(e.to_string()))?;

        if record.spool_id > MAX_SPOOL_ID {
            return Err(FilaScaleError::InvalidStatusPayload(format!(
                "spool_id {} exceeds 48 bits",
                record.spool_id
            )));
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"printername":"bender_prime","spool_id":1423659708,"temp":38.0,"humidity":0.48,"weight":788}"#;

    #[test]
    fn test_decode_sample_payload() {
        let record = StatusRecord::from_payload(SAMPLE.as_bytes()).unwrap();

        assert_eq!(record.printer_name, "bender_prime");
        assert_eq!(record.spool_id, 1423659708);
        assert_eq!(record.temperature, 38.0);
        assert_eq!(record.humidity, 0.48);
        assert_eq!(record.weight, 788.0);
    }

    #[test]
    fn test_decode_truncated_payload() {
        let truncated = &SAMPLE.as_bytes()[..SAMPLE.len() - 10];
        let err = StatusRecord::from_payload(truncated).unwrap_err();
        assert!(matches!(err, FilaScaleError::InvalidStatusPayload(_)));
    }

    #[test]
    fn test_decode_missing_field() {
        let payload = br#"{"printername":"bender_prime","spool_id":1,"temp":38.0,"humidity":0.48}"#;
        let err = StatusRecord::from_payload(payload).unwrap_err();
        assert!(matches!(err, FilaScaleError::InvalidStatusPayload(_)));
    }

    #[test]
    fn test_decode_spool_id_too_wide() {
        let payload = format!(
            r#"{{"printername":"p","spool_id":{},"temp":1.0,"humidity":1.0,"weight":1.0}}"#,
            MAX_SPOOL_ID + 1
        );
        let err = StatusRecord::from_payload(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, FilaScaleError::InvalidStatusPayload(msg) if msg.contains("48 bits")));
    }

    #[test]
    fn test_decode_max_spool_id() {
        let payload = format!(
            r#"{{"printername":"p","spool_id":{},"temp":1.0,"humidity":1.0,"weight":1.0}}"#,
            MAX_SPOOL_ID
        );
        let record = StatusRecord::from_payload(payload.as_bytes()).unwrap();
        assert_eq!(record.spool_id, MAX_SPOOL_ID);
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let err = StatusRecord::from_payload(&[0xFF, 0xFE, 0x7B]).unwrap_err();
        assert!(matches!(err, FilaScaleError::InvalidStatusPayload(_)));
    }

    #[test]
    fn test_encode_uses_wire_field_names() {
        let record = StatusRecord::from_payload(SAMPLE.as_bytes()).unwrap();
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.contains("\"printername\":\"bender_prime\""));
        assert!(json.contains("\"temp\":38.0"));
        assert!(!json.contains("printer_name"));
    }
}
