//! Parser for the nginx combined access log format:
//!
//! ```text
//! $remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent "$http_referer" "$http_user_agent"
//! ```

use super::LineParser;
use super::regex::RegexParser;
use super::timestamp::{TimestampConfig, TimestampExtractor};
use crate::error::{ConfigError, ParseError};
use crate::record::{Record, Value};

/// nginx `$time_local`, e.g. `17/Dec/2025:10:15:32 +0000`.
pub const NGINX_TIME_LOCAL_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

pub const NGINX_COMBINED_PATTERN: &str = r#"^(?P<remote_addr>\S+) - (?P<remote_user>\S+) \[(?P<time_local>[^\]]+)\] "(?P<request>[^"]*)" (?P<status>\d+) (?P<body_bytes_sent>\d+|-) "(?P<http_referer>[^"]*)" "(?P<http_user_agent>[^"]*)""#;

const NUMERIC_FIELDS: &[&str] = &["status", "body_bytes_sent"];

#[derive(Clone)]
pub struct NginxParser {
    regex: RegexParser,
}

impl NginxParser {
    /// Time settings left unset default to `time_local` in nginx's layout.
    pub fn new(timestamps: TimestampExtractor) -> Result<Self, ConfigError> {
        Ok(Self {
            regex: RegexParser::new(NGINX_COMBINED_PATTERN, timestamps)?,
        })
    }

    pub fn default_timestamp_config(config: TimestampConfig) -> TimestampConfig {
        TimestampConfig {
            field: config.field.or_else(|| Some("time_local".to_string())),
            format: config
                .format
                .or_else(|| Some(NGINX_TIME_LOCAL_FORMAT.to_string())),
        }
    }
}

impl LineParser for NginxParser {
    fn parse_line(&self, line: &str) -> Result<Record, ParseError> {
        let mut fields = self.regex.capture(line)?;

        for name in NUMERIC_FIELDS {
            let parsed = match fields.get(*name) {
                Some(Value::String(raw)) => raw.parse::<f64>().ok(),
                _ => None,
            };
            if let Some(n) = parsed {
                fields.insert(name.to_string(), Value::Number(n));
            }
        }

        if let Some((method, path)) = fields.get("request").and_then(split_request) {
            fields.insert("method".to_string(), Value::String(method));
            fields.insert("path".to_string(), Value::String(path));
        }

        let timestamp = self.regex.timestamps().get_timestamp(&fields);
        Ok(Record::new(fields, timestamp))
    }
}

fn split_request(request: &Value) -> Option<(String, String)> {
    let Value::String(request) = request else {
        return None;
    };
    let mut parts = request.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;
    Some((method.to_string(), path.to_string()))
}
