//! Event time derivation shared by every parser.
//!
//! A record's time comes from one of its fields. Unless a field name is
//! configured, the first present of [`DEFAULT_TIME_FIELDS`] is used. Unless a
//! format is configured, a fixed list of common layouts is tried in order.
//! Whenever no time can be read, the injected [`Clock`] supplies "now".

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::record::{Fields, Value};

/// Field names searched, in order, when no time field is configured.
pub const DEFAULT_TIME_FIELDS: &[&str] = &["time", "timestamp", "Date", "DateTime"];

/// `2014-03-10 19:57:38.123456789 -0800 PST`
pub const DEFAULT_LAYOUT: &str = "%Y-%m-%d %H:%M:%S%.f %z %Z";
/// `Thu Apr 10 19:57:38.123456789 -0800 2014`
pub const RUBY_DATE_LAYOUT: &str = "%a %b %d %H:%M:%S%.f %z %Y";
/// `Thu Apr 10 19:57:38 PST 2014`
pub const UNIX_DATE_LAYOUT: &str = "%a %b %e %H:%M:%S %Z %Y";

enum Layout {
    /// RFC 3339 with or without fractional seconds.
    Rfc3339,
    Strftime(&'static str),
}

const FALLBACK_LAYOUTS: &[Layout] = &[
    Layout::Rfc3339,
    Layout::Strftime(DEFAULT_LAYOUT),
    Layout::Strftime(RUBY_DATE_LAYOUT),
    Layout::Strftime(UNIX_DATE_LAYOUT),
];

/// Comma used as a fractional-seconds separator, e.g. `12:57:38,123`.
static COMMA_FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}:\d{2}:\d{2}),(\d)").expect("static regex"));

/// A fraction written after a literal separator, e.g. `%S,%f` or `%S.%3f`.
/// chrono reads a bare `%f` as a nanosecond count, so these become the
/// left-aligned `%S%.f`.
static SEPARATED_FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%S[.,]%[369]?f").expect("static regex"));

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per-parser time settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampConfig {
    /// Only this field is inspected when set.
    pub field: Option<String>,
    /// chrono strftime layout; tried exclusively when set.
    pub format: Option<String>,
}

impl TimestampConfig {
    pub fn new(field: Option<String>, format: Option<String>) -> Self {
        Self { field, format }
    }
}

#[derive(Clone)]
pub struct TimestampExtractor {
    config: TimestampConfig,
    clock: Arc<dyn Clock>,
}

impl TimestampExtractor {
    pub fn new(config: TimestampConfig, clock: Arc<dyn Clock>) -> Self {
        let config = TimestampConfig {
            format: config.format.map(|f| normalize_layout(&f)),
            ..config
        };
        Self { config, clock }
    }

    pub fn get_timestamp(&self, fields: &Fields) -> DateTime<Utc> {
        let value = match &self.config.field {
            Some(name) => fields.get(name),
            None => DEFAULT_TIME_FIELDS.iter().find_map(|name| fields.get(*name)),
        };

        let Some(Value::String(raw)) = value else {
            return self.clock.now();
        };

        let raw = normalize_fraction(raw);
        let parsed = match &self.config.format {
            Some(layout) => parse_layout(&raw, layout),
            None => FALLBACK_LAYOUTS.iter().find_map(|layout| match layout {
                Layout::Rfc3339 => DateTime::parse_from_rfc3339(&raw)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc)),
                Layout::Strftime(fmt) => parse_layout(&raw, fmt),
            }),
        };

        parsed.unwrap_or_else(|| self.clock.now())
    }
}

/// Parse with an explicit layout. Layouts that carry no numeric offset are
/// read as UTC; zone abbreviations are not resolved.
fn parse_layout(value: &str, layout: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, layout)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, layout)
                .ok()
                .map(|dt| dt.and_utc())
        })
}

fn normalize_fraction(value: &str) -> String {
    COMMA_FRACTION.replace(value, "$1.$2").into_owned()
}

fn normalize_layout(layout: &str) -> String {
    SEPARATED_FRACTION
        .replace_all(layout, "%S%.f")
        .replace("%S,", "%S.")
}
