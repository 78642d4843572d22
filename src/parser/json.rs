use serde_json::Value as JsonValue;

use super::LineParser;
use super::timestamp::TimestampExtractor;
use crate::error::ParseError;
use crate::record::{Fields, Record, Value};

/// Parses one JSON object per line into a flat record.
#[derive(Clone)]
pub struct JsonParser {
    timestamps: TimestampExtractor,
}

impl JsonParser {
    pub fn new(timestamps: TimestampExtractor) -> Self {
        Self { timestamps }
    }
}

impl LineParser for JsonParser {
    fn parse_line(&self, line: &str) -> Result<Record, ParseError> {
        let parsed: JsonValue =
            serde_json::from_str(line).map_err(|e| ParseError::Json(e.to_string()))?;

        let JsonValue::Object(map) = parsed else {
            return Err(ParseError::NotAnObject);
        };

        let mut fields = Fields::new();
        for (key, value) in map {
            if let Some(value) = to_scalar(value) {
                fields.insert(key, value);
            }
        }

        let timestamp = self.timestamps.get_timestamp(&fields);
        Ok(Record::new(fields, timestamp))
    }
}

/// Nested arrays and objects are kept as their compact JSON text.
fn to_scalar(value: JsonValue) -> Option<Value> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(Value::Bool(b)),
        JsonValue::Number(n) => n.as_f64().map(Value::Number),
        JsonValue::String(s) => Some(Value::String(s)),
        nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
            Some(Value::String(nested.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::parser::timestamp::TimestampConfig;
    use crate::parser::timestamp::tests::{FixedClock, fake_now};

    fn parser() -> JsonParser {
        JsonParser::new(TimestampExtractor::new(
            TimestampConfig::default(),
            Arc::new(FixedClock(fake_now())),
        ))
    }

    #[test]
    fn test_scalars() {
        let record = parser()
            .parse_line(r#"{"mystr": "myval", "myint": 3, "myfloat": 4.234, "ok": true}"#)
            .unwrap();

        assert_eq!(record.fields.len(), 4);
        assert_eq!(record.get("mystr"), Some(&Value::from("myval")));
        assert_eq!(record.get("myint"), Some(&Value::Number(3.0)));
        assert_eq!(record.get("myfloat"), Some(&Value::Number(4.234)));
        assert_eq!(record.get("ok"), Some(&Value::Bool(true)));
        assert_eq!(record.timestamp, fake_now());
    }

    #[test]
    fn test_scalar_round_trip() {
        let line = r#"{"a":"x","b":1.5,"c":false,"d":-7}"#;
        let record = parser().parse_line(line).unwrap();

        let encoded = serde_json::to_string(&record.fields).unwrap();
        let original: serde_json::Map<String, JsonValue> = serde_json::from_str(line).unwrap();
        let reencoded: serde_json::Map<String, JsonValue> =
            serde_json::from_str(&encoded).unwrap();

        assert_eq!(original.len(), reencoded.len());
        for (key, value) in &original {
            assert_eq!(value.as_f64(), reencoded[key].as_f64(), "{key}");
            assert_eq!(value.as_str(), reencoded[key].as_str(), "{key}");
            assert_eq!(value.as_bool(), reencoded[key].as_bool(), "{key}");
        }
    }

    #[test]
    fn test_time_field_kept_and_parsed() {
        let record = parser()
            .parse_line(r#"{"time": "2014-03-10 19:57:38.123456789 -0800 PST", "myint": 3}"#)
            .unwrap();

        assert_eq!(
            record.get("time"),
            Some(&Value::from("2014-03-10 19:57:38.123456789 -0800 PST"))
        );
        assert_eq!(record.timestamp.to_rfc3339(), "2014-03-11T03:57:38.123456789+00:00");
    }

    #[test]
    fn test_nested_values_become_text() {
        let record = parser()
            .parse_line(r#"{"array": [3, 4, 6], "obj": {"k": "v", "n": [1]}, "myfloat": 4.234}"#)
            .unwrap();

        assert_eq!(record.get("array"), Some(&Value::from("[3,4,6]")));
        assert_eq!(record.get("obj"), Some(&Value::from(r#"{"k":"v","n":[1]}"#)));
        assert_eq!(record.get("myfloat"), Some(&Value::Number(4.234)));
    }

    #[test]
    fn test_null_is_omitted() {
        let record = parser().parse_line(r#"{"a": null, "b": "x"}"#).unwrap();
        assert!(record.get("a").is_none());
        assert_eq!(record.fields.len(), 1);
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(
            parser().parse_line("not valid json"),
            Err(ParseError::Json(_))
        ));
        assert_eq!(parser().parse_line("[1, 2, 3]"), Err(ParseError::NotAnObject));
    }
}
