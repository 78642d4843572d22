use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::ConfigError;
use crate::parser::{ParserKind, ParserOptions, TimestampConfig};
use crate::sink::SinkIdentity;
use crate::tail::{LogSource, ReadFrom, STDIN_MARKER, TailOptions};
use crate::transform::Transformer;

/// Immutable configuration used by the pipeline
#[derive(Debug, Clone)]
pub struct Config {
    pub parser: ParserKind,
    pub parser_options: ParserOptions,
    pub identity: SinkIdentity,
    pub sources: Vec<LogSource>,
    pub tail: TailOptions,
    pub state_file: Option<PathBuf>,
    pub state_flush_interval: Duration,
    pub pool_size: usize,
    pub queue_capacity: usize,
    pub sample_rate: u32,
    pub sample_seed: Option<u64>,
    pub transform: Transformer,
    pub status_interval: Duration,
    pub debug: bool,
}

impl Config {
    /// Checks that must hold before any source is opened, however the
    /// config was built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::MissingLogFiles);
        }
        if self.tail.read_from == ReadFrom::End && self.tail.stop_at_eof {
            return Err(ConfigError::EndWithStop);
        }
        if self.sources.len() > 1 && self.state_file.is_some() {
            return Err(ConfigError::StateFileWithMultipleFiles);
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        Ok(())
    }
}

/// What the process was asked to do.
#[derive(Debug)]
pub enum Invocation {
    ListParsers,
    Run(Box<Config>),
}

/// User-facing CLI arguments (kept private to the CLI layer)
#[derive(Parser, Debug)]
#[command(
    name = "logleash",
    version,
    about = "Tail log files, parse each line, and ship the events",
    override_usage = "logleash -p <parser> -k <writekey> -f </path/to/logfile> -d <dataset>"
)]
struct Args {
    /// Parser to use. Use --list to list available options
    #[arg(short = 'p', long = "parser")]
    parser: Option<String>,

    /// Team write key
    #[arg(short = 'k', long = "writekey", env = "LOGLEASH_WRITEKEY", hide_env_values = true)]
    writekey: Option<String>,

    /// Log file(s) to parse. Use '-' for stdin, repeat to tail several files, or use a glob
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    files: Vec<String>,

    /// Name of the dataset
    #[arg(short = 'd', long = "dataset")]
    dataset: Option<String>,

    #[arg(long = "api_host", hide = true, default_value = "https://api.honeycomb.io/")]
    api_host: String,

    /// Only send 1 / N log lines
    #[arg(short = 'r', long = "samplerate", default_value_t = 1)]
    sample_rate: u32,

    /// Fixed seed for the sampler, for reproducible runs
    #[arg(long = "sample_seed", hide = true)]
    sample_seed: Option<u64>,

    /// Number of concurrent senders
    #[arg(short = 'P', long = "poolsize", default_value_t = 10)]
    pool_size: usize,

    /// Events buffered between the parsers and the senders (default 4 x poolsize)
    #[arg(long = "queue_capacity")]
    queue_capacity: Option<usize>,

    /// Print debugging output
    #[arg(long = "debug")]
    debug: bool,

    /// How frequently, in seconds, to print out summary info
    #[arg(long = "status_interval", default_value_t = 60)]
    status_interval: u64,

    /// Apply a one-way hash to this field's content (repeatable)
    #[arg(long = "scrub_field", value_name = "FIELD")]
    scrub_fields: Vec<String>,

    /// Do not send this field (repeatable)
    #[arg(long = "drop_field", value_name = "FIELD")]
    drop_fields: Vec<String>,

    /// Add key=val to every event (repeatable)
    #[arg(long = "add_field", value_name = "KEY=VAL")]
    add_fields: Vec<String>,

    /// List available parsers
    #[arg(short = 'l', long = "list")]
    list: bool,

    /// Where to begin reading: start, end, or resume (alias: last)
    #[arg(long = "tail.read_from", value_enum, default_value_t = ReadFrom::Start)]
    read_from: ReadFrom,

    /// Stop reading at the end of the file instead of following it
    #[arg(long = "tail.stop")]
    stop: bool,

    /// File holding the read position between runs (single file only)
    #[arg(long = "tail.statefile", value_name = "PATH")]
    state_file: Option<PathBuf>,

    /// How often, in milliseconds, to poll a followed file for new data
    #[arg(long = "tail.poll_interval_ms", default_value_t = 250)]
    poll_interval_ms: u64,

    /// How often, in seconds, to save the read position while running
    #[arg(long = "tail.state_flush_interval", default_value_t = 10)]
    state_flush_interval: u64,

    /// JSON field holding the event time
    #[arg(long = "json.timefield")]
    json_time_field: Option<String>,

    /// chrono format of the JSON time field
    #[arg(long = "json.format")]
    json_format: Option<String>,

    /// nginx field holding the event time
    #[arg(long = "nginx.timefield")]
    nginx_time_field: Option<String>,

    /// chrono format of the nginx time field
    #[arg(long = "nginx.format")]
    nginx_format: Option<String>,

    /// Regular expression with named capture groups, one match per line
    #[arg(long = "regex.line_regex")]
    line_regex: Option<String>,

    /// Capture group holding the event time
    #[arg(long = "regex.timefield")]
    regex_time_field: Option<String>,

    /// chrono format of the regex time field
    #[arg(long = "regex.format")]
    regex_format: Option<String>,
}

/// Parse the process arguments. Exits on clap usage errors, like any clap app.
pub fn parse() -> Result<Invocation, ConfigError> {
    Args::parse().resolve()
}

/// Parse an explicit argument list.
pub fn parse_from<I, T>(args: I) -> Result<Invocation, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Args::parse_from(args).resolve()
}

impl Args {
    fn resolve(self) -> Result<Invocation, ConfigError> {
        if self.list {
            return Ok(Invocation::ListParsers);
        }
        self.into_config().map(|c| Invocation::Run(Box::new(c)))
    }

    fn into_config(self) -> Result<Config, ConfigError> {
        let parser_name = self.parser.ok_or(ConfigError::MissingParser)?;
        let write_key = match self.writekey {
            Some(k) if !k.is_empty() && k != "NULL" => k,
            _ => return Err(ConfigError::MissingWriteKey),
        };
        let dataset = self
            .dataset
            .filter(|d| !d.is_empty())
            .ok_or(ConfigError::MissingDataset)?;
        let sources = expand_sources(&self.files)?;
        let parser: ParserKind = parser_name.parse()?;
        let transform =
            Transformer::from_specs(&self.scrub_fields, &self.drop_fields, &self.add_fields)?;

        let timestamp = match parser {
            ParserKind::Json => TimestampConfig::new(self.json_time_field, self.json_format),
            ParserKind::Nginx => TimestampConfig::new(self.nginx_time_field, self.nginx_format),
            ParserKind::Regex => TimestampConfig::new(self.regex_time_field, self.regex_format),
        };
        if parser == ParserKind::Regex && self.line_regex.is_none() {
            return Err(ConfigError::MissingLineRegex);
        }

        let state_file = self
            .state_file
            .or_else(|| default_state_file(self.read_from, &sources));

        let config = Config {
            parser,
            parser_options: ParserOptions {
                timestamp,
                line_regex: self.line_regex,
            },
            identity: SinkIdentity {
                api_host: self.api_host,
                write_key,
                dataset,
            },
            sources,
            tail: TailOptions {
                read_from: self.read_from,
                stop_at_eof: self.stop,
                poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            },
            state_file,
            state_flush_interval: Duration::from_secs(self.state_flush_interval.max(1)),
            pool_size: self.pool_size,
            queue_capacity: self.queue_capacity.unwrap_or(self.pool_size * 4).max(1),
            sample_rate: self.sample_rate,
            sample_seed: self.sample_seed,
            transform,
            status_interval: Duration::from_secs(self.status_interval.max(1)),
            debug: self.debug,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Expand globs; plain paths are kept as given so that a missing file fails
/// when it is opened. A source named more than once is read once.
fn expand_sources(args: &[String]) -> Result<Vec<LogSource>, ConfigError> {
    let mut sources = Vec::new();
    for arg in args {
        if arg == STDIN_MARKER || !is_glob(arg) {
            push_unique(&mut sources, LogSource::from_arg(arg));
            continue;
        }

        let matches = glob::glob(arg).map_err(|e| ConfigError::InvalidGlob {
            pattern: arg.clone(),
            reason: e.to_string(),
        })?;
        let mut matched = false;
        for path in matches.flatten() {
            if path.is_file() {
                matched = true;
                push_unique(&mut sources, LogSource::File(path));
            }
        }
        if !matched {
            return Err(ConfigError::NoMatches(arg.clone()));
        }
    }
    Ok(sources)
}

fn push_unique(sources: &mut Vec<LogSource>, source: LogSource) {
    if !sources.contains(&source) {
        sources.push(source);
    }
}

fn is_glob(arg: &str) -> bool {
    arg.contains(['*', '?', '['])
}

/// Resuming a single file without an explicit state file keeps its position
/// in the temp directory.
fn default_state_file(read_from: ReadFrom, sources: &[LogSource]) -> Option<PathBuf> {
    if read_from != ReadFrom::Resume {
        return None;
    }
    match sources {
        [LogSource::File(path)] => {
            let name = path.file_name()?.to_string_lossy();
            Some(std::env::temp_dir().join(format!("{name}.leash.state")))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const BASE: &[&str] = &["logleash", "-p", "json", "-k", "abc", "-d", "pika"];

    fn run_config(extra: &[&str]) -> Result<Config, ConfigError> {
        let args = BASE.iter().chain(extra.iter()).copied();
        match parse_from(args)? {
            Invocation::Run(config) => Ok(*config),
            Invocation::ListParsers => panic!("unexpected list invocation"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = run_config(&["-f", "/var/log/app.log"]).unwrap();
        assert_eq!(config.parser, ParserKind::Json);
        assert_eq!(config.sample_rate, 1);
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.queue_capacity, 40);
        assert_eq!(config.tail.read_from, ReadFrom::Start);
        assert!(!config.tail.stop_at_eof);
        assert_eq!(config.state_file, None);
        assert_eq!(config.status_interval, Duration::from_secs(60));
        assert_eq!(
            config.sources,
            [LogSource::File(PathBuf::from("/var/log/app.log"))]
        );
    }

    #[test]
    fn test_list_needs_nothing_else() {
        assert!(matches!(
            parse_from(["logleash", "--list"]),
            Ok(Invocation::ListParsers)
        ));
    }

    #[test]
    fn test_required_options() {
        assert_eq!(
            parse_from(["logleash", "-k", "a", "-f", "x", "-d", "d"]).err(),
            Some(ConfigError::MissingParser)
        );
        assert_eq!(
            parse_from(["logleash", "-p", "json", "-k", "NULL", "-f", "x", "-d", "d"]).err(),
            Some(ConfigError::MissingWriteKey)
        );
        assert_eq!(run_config(&[]).err(), Some(ConfigError::MissingLogFiles));
        assert_eq!(
            parse_from(["logleash", "-p", "json", "-k", "a", "-f", "x"]).err(),
            Some(ConfigError::MissingDataset)
        );
    }

    #[test]
    fn test_end_with_stop_rejected() {
        assert_eq!(
            run_config(&["-f", "x.log", "--tail.read_from", "end", "--tail.stop"]).err(),
            Some(ConfigError::EndWithStop)
        );
    }

    #[test]
    fn test_state_file_with_many_files_rejected() {
        assert_eq!(
            run_config(&["-f", "a.log", "-f", "b.log", "--tail.statefile", "s.state"]).err(),
            Some(ConfigError::StateFileWithMultipleFiles)
        );

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("one.log"), "").unwrap();
        fs::write(dir.path().join("two.log"), "").unwrap();
        let pattern = dir.path().join("*.log").display().to_string();
        assert_eq!(
            run_config(&["-f", &pattern, "--tail.statefile", "s.state"]).err(),
            Some(ConfigError::StateFileWithMultipleFiles)
        );

        let config = run_config(&["-f", &pattern]).unwrap();
        assert_eq!(config.sources.len(), 2);
    }

    #[test]
    fn test_repeated_sources_are_read_once() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.log");
        let b = dir.path().join("b.log");
        fs::write(&a, "").unwrap();
        fs::write(&b, "").unwrap();
        let a_arg = a.display().to_string();
        let pattern = dir.path().join("*.log").display().to_string();

        let config = run_config(&["-f", &a_arg, "-f", &pattern, "-f", &a_arg]).unwrap();
        assert_eq!(config.sources, [LogSource::File(a.clone()), LogSource::File(b)]);

        let config = run_config(&["-f", &a_arg, "-f", &a_arg, "--tail.statefile", "s.state"])
            .unwrap();
        assert_eq!(config.sources, [LogSource::File(a)]);
    }

    #[test]
    fn test_glob_without_matches() {
        let dir = TempDir::new().unwrap();
        let pattern = dir.path().join("*.log").display().to_string();
        assert_eq!(
            run_config(&["-f", &pattern]).err(),
            Some(ConfigError::NoMatches(pattern))
        );
    }

    #[test]
    fn test_bad_values_rejected() {
        assert_eq!(
            run_config(&["-f", "x", "--add_field", "oops"]).err(),
            Some(ConfigError::MalformedAddField("oops".into()))
        );
        assert_eq!(
            run_config(&["-f", "x", "-r", "0"]).err(),
            Some(ConfigError::ZeroSampleRate)
        );
        assert_eq!(
            run_config(&["-f", "x", "-P", "0"]).err(),
            Some(ConfigError::ZeroPoolSize)
        );
        assert_eq!(
            parse_from(["logleash", "-p", "mysql", "-k", "a", "-f", "x", "-d", "d"]).err(),
            Some(ConfigError::UnknownParser("mysql".into()))
        );
        assert_eq!(
            parse_from(["logleash", "-p", "regex", "-k", "a", "-f", "x", "-d", "d"]).err(),
            Some(ConfigError::MissingLineRegex)
        );
    }

    #[test]
    fn test_resume_alias_and_default_state_file() {
        let config = run_config(&["-f", "/var/log/app.log", "--tail.read_from", "last"]).unwrap();
        assert_eq!(config.tail.read_from, ReadFrom::Resume);
        assert_eq!(
            config.state_file,
            Some(std::env::temp_dir().join("app.log.leash.state"))
        );
    }

    #[test]
    fn test_parser_options_follow_selected_parser() {
        let config = run_config(&[
            "-f",
            "-",
            "--json.timefield",
            "ts",
            "--json.format",
            "%s",
            "--nginx.timefield",
            "ignored",
        ])
        .unwrap();
        assert_eq!(config.sources, [LogSource::Stdin]);
        assert_eq!(
            config.parser_options.timestamp,
            TimestampConfig::new(Some("ts".into()), Some("%s".into()))
        );
    }
}
