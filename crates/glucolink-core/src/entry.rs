//! Entry documents sent to the collector
//!
//! ```json
//! [
//!   {
//!     "type": "sgv",
//!     "sgv": 104,
//!     "date": 1767960000000,
//!     "dateString": "2026-01-09T12:00:00.000Z",
//!     "direction": "Flat",
//!     "device": "sensor-a"
//!   }
//! ]
//! ```
//!
//! Raw-signal fields stay local. Readings whose value cannot be expressed
//! as an sgv entry are left out of the batch.

use chrono::SecondsFormat;
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::traits::Reading;

/// Lowest glucose value the collector schema accepts (mg/dL)
pub const MIN_SGV: f64 = 1.0;

/// Highest glucose value the collector schema accepts (mg/dL)
pub const MAX_SGV: f64 = 1000.0;

/// Wire form of one reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDocument {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub sgv: u16,
    pub date: i64,
    pub date_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl EntryDocument {
    /// Build the wire form of a reading
    ///
    /// Fails with [`Error::Serialization`] when the value cannot be
    /// represented as an sgv entry.
    pub fn from_reading(reading: &Reading) -> Result<Self> {
        if !reading.value.is_finite() || !(MIN_SGV..=MAX_SGV).contains(&reading.value) {
            return Err(Error::serialization(format!(
                "Reading at {} has unencodable value {}",
                reading.timestamp.to_rfc3339(),
                reading.value
            )));
        }

        Ok(Self {
            kind: "sgv",
            sgv: reading.value.round() as u16,
            date: reading.timestamp.timestamp_millis(),
            date_string: reading
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            direction: reading.trend.map(|t| t.as_str()),
            device: reading.device.clone(),
        })
    }
}

/// Encoded request body for one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    /// JSON array of entry documents
    pub body: Vec<u8>,
    /// Readings present in `body`
    pub encoded: usize,
    /// Readings left out because their value is unencodable
    pub skipped: usize,
}

/// Encode readings as a JSON array of entry documents
///
/// Unencodable readings are skipped with a warning. Fails with
/// [`Error::Serialization`] when a non-empty input has no encodable reading
/// or when JSON encoding itself fails.
pub fn encode_entries(readings: &[Reading]) -> Result<EncodedBatch> {
    let mut documents = Vec::with_capacity(readings.len());
    let mut last_error = None;

    for reading in readings {
        match EntryDocument::from_reading(reading) {
            Ok(document) => documents.push(document),
            Err(e) => {
                warn!("Skipping reading: {}", e);
                last_error = Some(e);
            }
        }
    }

    if documents.is_empty() {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    let body = serde_json::to_vec(&documents)
        .map_err(|e| Error::serialization(format!("Failed to encode entries: {}", e)))?;

    Ok(EncodedBatch {
        encoded: documents.len(),
        skipped: readings.len() - documents.len(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{RawSignal, Trend};
    use chrono::{DateTime, Utc};

    fn ts() -> DateTime<Utc> {
        "2026-01-09T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_document_shape() {
        let reading = Reading::new(ts(), 104.4)
            .with_trend(Trend::Flat)
            .with_device("sensor-a")
            .with_raw(RawSignal {
                filtered: 101_000.0,
                unfiltered: 99_500.0,
                noise: Some(1),
                rssi: Some(-70),
            });

        let body = encode_entries(&[reading]).unwrap().body;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(
            json,
            serde_json::json!([{
                "type": "sgv",
                "sgv": 104,
                "date": 1767960000000i64,
                "dateString": "2026-01-09T12:00:00.000Z",
                "direction": "Flat",
                "device": "sensor-a"
            }])
        );
    }

    #[test]
    fn test_optional_fields_omitted() {
        let body = encode_entries(&[Reading::new(ts(), 90.0)]).unwrap().body;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let entry = json[0].as_object().unwrap();

        assert!(!entry.contains_key("direction"));
        assert!(!entry.contains_key("device"));
        assert!(!entry.contains_key("filtered"));
    }

    #[test]
    fn test_unencodable_values_rejected() {
        for value in [f64::NAN, f64::INFINITY, 0.0, -5.0, 1500.0] {
            let err = EntryDocument::from_reading(&Reading::new(ts(), value)).unwrap_err();
            assert!(matches!(err, Error::Serialization(_)), "value {}: {}", value, err);

            let err = encode_entries(&[Reading::new(ts(), value)]).unwrap_err();
            assert!(matches!(err, Error::Serialization(_)), "value {}: {}", value, err);
        }
    }

    #[test]
    fn test_unencodable_reading_skipped_in_batch() {
        let earlier = ts() - chrono::Duration::minutes(5);
        let readings = [Reading::new(ts(), 0.0), Reading::new(earlier, 110.0)];

        let batch = encode_entries(&readings).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&batch.body).unwrap();

        assert_eq!(batch.encoded, 1);
        assert_eq!(batch.skipped, 1);
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["sgv"], 110);
    }

    #[test]
    fn test_empty_batch_encodes_empty_array() {
        let batch = encode_entries(&[]).unwrap();
        assert_eq!(batch.body, b"[]");
        assert_eq!(batch.encoded, 0);
    }
}
