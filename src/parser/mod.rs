//! Line parsers.
//!
//! Each format implements [`LineParser`]. The set of formats is closed: a run
//! picks one by name from [`ParserKind::ALL`] and [`Parser::build`] constructs
//! it with the per-parser options.

mod json;
mod nginx;
mod regex;
pub mod timestamp;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use json::JsonParser;
pub use nginx::NginxParser;
pub use self::regex::RegexParser;
pub use timestamp::{Clock, SystemClock, TimestampConfig, TimestampExtractor};

use crate::error::{ConfigError, ParseError};
use crate::record::Record;

/// Turns one raw line into a record.
pub trait LineParser: Send + Sync {
    fn parse_line(&self, line: &str) -> Result<Record, ParseError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Json,
    Nginx,
    Regex,
}

impl ParserKind {
    pub const ALL: &'static [ParserKind] = &[ParserKind::Json, ParserKind::Nginx, ParserKind::Regex];

    pub fn name(self) -> &'static str {
        match self {
            ParserKind::Json => "json",
            ParserKind::Nginx => "nginx",
            ParserKind::Regex => "regex",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.name()).collect()
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParserKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| ConfigError::UnknownParser(s.to_string()))
    }
}

/// Options for the selected parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserOptions {
    pub timestamp: TimestampConfig,
    /// Pattern for the `regex` parser.
    pub line_regex: Option<String>,
}

#[derive(Clone)]
pub enum Parser {
    Json(JsonParser),
    Nginx(NginxParser),
    Regex(RegexParser),
}

impl Parser {
    pub fn build(
        kind: ParserKind,
        options: &ParserOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let parser = match kind {
            ParserKind::Json => Parser::Json(JsonParser::new(TimestampExtractor::new(
                options.timestamp.clone(),
                clock,
            ))),
            ParserKind::Nginx => {
                let config = NginxParser::default_timestamp_config(options.timestamp.clone());
                Parser::Nginx(NginxParser::new(TimestampExtractor::new(config, clock))?)
            }
            ParserKind::Regex => {
                let pattern = options
                    .line_regex
                    .as_deref()
                    .ok_or(ConfigError::MissingLineRegex)?;
                Parser::Regex(RegexParser::new(
                    pattern,
                    TimestampExtractor::new(options.timestamp.clone(), clock),
                )?)
            }
        };
        Ok(parser)
    }

    pub fn kind(&self) -> ParserKind {
        match self {
            Parser::Json(_) => ParserKind::Json,
            Parser::Nginx(_) => ParserKind::Nginx,
            Parser::Regex(_) => ParserKind::Regex,
        }
    }
}

impl LineParser for Parser {
    fn parse_line(&self, line: &str) -> Result<Record, ParseError> {
        match self {
            Parser::Json(p) => p.parse_line(line),
            Parser::Nginx(p) => p.parse_line(line),
            Parser::Regex(p) => p.parse_line(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        assert_eq!("json".parse::<ParserKind>(), Ok(ParserKind::Json));
        assert_eq!("nginx".parse::<ParserKind>(), Ok(ParserKind::Nginx));
        assert_eq!(
            "mysql".parse::<ParserKind>(),
            Err(ConfigError::UnknownParser("mysql".into()))
        );
        assert_eq!(ParserKind::names(), ["json", "nginx", "regex"]);
    }

    #[test]
    fn test_build_variants() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        for kind in [ParserKind::Json, ParserKind::Nginx] {
            let parser = Parser::build(kind, &ParserOptions::default(), clock.clone()).unwrap();
            assert_eq!(parser.kind(), kind);
        }

        assert_eq!(
            Parser::build(ParserKind::Regex, &ParserOptions::default(), clock.clone()).err(),
            Some(ConfigError::MissingLineRegex)
        );

        let options = ParserOptions {
            line_regex: Some(r"^(?P<word>\w+)$".into()),
            ..Default::default()
        };
        let parser = Parser::build(ParserKind::Regex, &options, clock).unwrap();
        let record = parser.parse_line("hello").unwrap();
        assert_eq!(record.fields.len(), 1);
    }
}
