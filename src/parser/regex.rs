use regex::Regex;

use super::LineParser;
use super::timestamp::TimestampExtractor;
use crate::error::{ConfigError, ParseError};
use crate::record::{Fields, Record, Value};

/// Extracts fields from a line using a regular expression with named
/// capture groups. Every group that participates in a match becomes a string
/// field.
#[derive(Clone)]
pub struct RegexParser {
    regex: Regex,
    /// Names of the capture groups (excluding the full match)
    group_names: Vec<String>,
    timestamps: TimestampExtractor,
}

impl RegexParser {
    /// The pattern must contain at least one `(?P<name>...)` group.
    pub fn new(pattern: &str, timestamps: TimestampExtractor) -> Result<Self, ConfigError> {
        let regex =
            Regex::new(pattern).map_err(|e| ConfigError::InvalidLineRegex(e.to_string()))?;

        let group_names: Vec<String> = regex
            .capture_names()
            .skip(1)
            .filter_map(|name| name.map(|s| s.to_string()))
            .collect();

        if group_names.is_empty() {
            return Err(ConfigError::NoNamedGroups);
        }

        Ok(Self {
            regex,
            group_names,
            timestamps,
        })
    }

    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    /// Capture the named groups without deriving a timestamp.
    pub(crate) fn capture(&self, line: &str) -> Result<Fields, ParseError> {
        let captures = self
            .regex
            .captures(line)
            .ok_or_else(|| ParseError::NoMatch(line.chars().take(100).collect()))?;

        let mut fields = Fields::new();
        for name in &self.group_names {
            if let Some(m) = captures.name(name) {
                fields.insert(name.clone(), Value::from(m.as_str()));
            }
        }
        Ok(fields)
    }

    pub(crate) fn timestamps(&self) -> &TimestampExtractor {
        &self.timestamps
    }
}

impl LineParser for RegexParser {
    fn parse_line(&self, line: &str) -> Result<Record, ParseError> {
        let fields = self.capture(line)?;
        let timestamp = self.timestamps.get_timestamp(&fields);
        Ok(Record::new(fields, timestamp))
    }
}
