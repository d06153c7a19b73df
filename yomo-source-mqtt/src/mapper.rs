// Copyright 2025 The YoMo Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Payload mapping between MQTT sensor readings and the zipper record format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key of the sensor value in inbound payloads.
pub const NOISE_FIELD: &str = "noise";

/// Problems found while decoding an inbound payload.
///
/// None of these abort a message: decoding always yields a reading, possibly
/// empty, and the error is only reported.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("field '{key}' is not a 32-bit integer: {value}")]
    FieldType { key: String, value: String },
}

/// Integer fields decoded from an inbound MQTT payload, e.g. `{"noise": 46}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundReading {
    fields: HashMap<String, i32>,
}

impl InboundReading {
    /// Value of `key`, or 0 when absent.
    pub fn get(&self, key: &str) -> i32 {
        self.fields.get(key).copied().unwrap_or_default()
    }

    pub fn noise(&self) -> i32 {
        self.get(NOISE_FIELD)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Record forwarded to the zipper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseData {
    /// Noise value.
    pub noise: f32,
    /// Time of the transform, milliseconds since the Unix epoch.
    pub time: i64,
    /// Address of the host performing the transform.
    pub from: String,
}

impl NoiseData {
    pub fn from_reading(reading: &InboundReading, time: i64, from: impl Into<String>) -> Self {
        Self {
            noise: reading.noise() as f32,
            time,
            from: from.into(),
        }
    }

    /// Serialize into the JSON buffer written to the zipper.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Best-effort decode of an MQTT payload.
///
/// Always returns a reading. Invalid JSON or a non-object payload yields an
/// empty reading. Inside an object, integer fields that fit in 32 bits are
/// kept, `null` fields decode to 0, and any other field is skipped; the
/// first skipped field in document order is reported. A top-level `null`
/// is an empty reading without error.
pub fn decode(payload: &[u8]) -> (InboundReading, Option<DecodeError>) {
    let json: Value = match serde_json::from_slice(payload) {
        Ok(v) => v,
        Err(e) => return (InboundReading::default(), Some(e.into())),
    };

    let map = match json {
        Value::Object(map) => map,
        Value::Null => return (InboundReading::default(), None),
        other => {
            return (
                InboundReading::default(),
                Some(DecodeError::NotAnObject(kind(&other))),
            )
        }
    };

    let mut fields = HashMap::with_capacity(map.len());
    let mut error = None;
    for (key, value) in map {
        let parsed = match &value {
            Value::Null => Some(0),
            Value::Number(n) => n.as_i64().and_then(|i| i32::try_from(i).ok()),
            _ => None,
        };
        match parsed {
            Some(v) => {
                fields.insert(key, v);
            }
            None if error.is_none() => {
                error = Some(DecodeError::FieldType {
                    key,
                    value: value.to_string(),
                });
            }
            None => {}
        }
    }

    (InboundReading { fields }, error)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_integer_noise() {
        let (reading, err) = decode(br#"{"noise": 46}"#);
        assert!(err.is_none());
        assert_eq!(reading.noise(), 46);
    }

    #[test]
    fn test_decode_missing_noise_defaults_to_zero() {
        let (reading, err) = decode(b"{}");
        assert!(err.is_none());
        assert!(reading.is_empty());
        assert_eq!(reading.noise(), 0);
    }

    #[test]
    fn test_decode_invalid_json() {
        let (reading, err) = decode(b"not json");
        assert!(matches!(err, Some(DecodeError::Syntax(_))));
        assert!(reading.is_empty());
        assert_eq!(reading.noise(), 0);
    }

    #[test]
    fn test_decode_non_object() {
        let (reading, err) = decode(b"[46]");
        assert!(matches!(err, Some(DecodeError::NotAnObject("array"))));
        assert!(reading.is_empty());
    }

    #[test]
    fn test_decode_top_level_null() {
        let (reading, err) = decode(b"null");
        assert!(err.is_none());
        assert!(reading.is_empty());
    }

    #[test]
    fn test_decode_keeps_valid_fields_around_bad_one() {
        let (reading, err) = decode(br#"{"noise": 45.6, "humidity": 70, "room": null}"#);
        match err {
            Some(DecodeError::FieldType { key, value }) => {
                assert_eq!(key, "noise");
                assert_eq!(value, "45.6");
            }
            other => panic!("Expected FieldType, got {other:?}"),
        }
        assert_eq!(reading.noise(), 0);
        assert_eq!(reading.get("humidity"), 70);
        assert_eq!(reading.get("room"), 0);
        assert_eq!(reading.len(), 2);
    }

    #[test]
    fn test_decode_reports_first_bad_field_in_document_order() {
        let (reading, err) = decode(br#"{"zeta": "x", "noise": 3, "alpha": "y"}"#);
        match err {
            Some(DecodeError::FieldType { key, value }) => {
                assert_eq!(key, "zeta");
                assert_eq!(value, "\"x\"");
            }
            other => panic!("Expected FieldType, got {other:?}"),
        }
        assert_eq!(reading.noise(), 3);
        assert_eq!(reading.len(), 1);
    }

    #[test]
    fn test_decode_rejects_out_of_range_integer() {
        let (reading, err) = decode(br#"{"noise": 4294967296}"#);
        assert!(matches!(err, Some(DecodeError::FieldType { .. })));
        assert_eq!(reading.noise(), 0);
    }

    #[test]
    fn test_decode_negative_noise() {
        let (reading, err) = decode(br#"{"noise": -12}"#);
        assert!(err.is_none());
        assert_eq!(reading.noise(), -12);
    }

    #[test]
    fn test_encode_has_exactly_three_fields() {
        let (reading, _) = decode(br#"{"noise": 46, "other": 1}"#);
        let data = NoiseData::from_reading(&reading, 1_700_000_000_000, "10.0.0.5");
        let bytes = data.encode().unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();

        let obj = parsed.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(parsed["noise"].as_f64(), Some(46.0));
        assert_eq!(parsed["time"].as_i64(), Some(1_700_000_000_000));
        assert_eq!(parsed["from"], "10.0.0.5");
    }
}
