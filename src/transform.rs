//! Field rules applied to every parsed record: scrub, then drop, then add.

use sha2::{Digest, Sha256};

use crate::error::ConfigError;
use crate::record::{Record, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transformer {
    scrub: Vec<String>,
    drop: Vec<String>,
    add: Vec<(String, String)>,
}

impl Transformer {
    pub fn new(scrub: Vec<String>, drop: Vec<String>, add: Vec<(String, String)>) -> Self {
        Self { scrub, drop, add }
    }

    /// Build from raw `key=value` add specs, rejecting malformed ones.
    pub fn from_specs(
        scrub: &[String],
        drop: &[String],
        add: &[String],
    ) -> Result<Self, ConfigError> {
        let add = add
            .iter()
            .map(|spec| parse_add_field(spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(scrub.to_vec(), drop.to_vec(), add))
    }

    pub fn apply(&self, record: &mut Record) {
        for name in &self.scrub {
            if let Some(value) = record.fields.get_mut(name) {
                *value = Value::String(scrub_value(value));
            }
        }
        for name in &self.drop {
            record.fields.remove(name);
        }
        for (key, value) in &self.add {
            record
                .fields
                .insert(key.clone(), Value::String(value.clone()));
        }
    }
}

/// Hex SHA-256 of the value's text.
pub fn scrub_value(value: &Value) -> String {
    let digest = Sha256::digest(value.to_string().as_bytes());
    hex::encode(digest)
}

/// Split `key=value` at the first `=`. The value may be empty; the key may not.
pub fn parse_add_field(spec: &str) -> Result<(String, String), ConfigError> {
    match spec.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(ConfigError::MalformedAddField(spec.to_string())),
    }
}
