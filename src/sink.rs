//! Event delivery.
//!
//! The pipeline hands finished events to an [`EventSink`]. Transport,
//! batching and retries belong to the sink; a failed send is only counted by
//! the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use crate::error::SinkError;
use crate::record::{Event, Value};

/// Credentials and destination established once per run.
#[derive(Clone, PartialEq, Eq)]
pub struct SinkIdentity {
    pub api_host: String,
    pub write_key: String,
    pub dataset: String,
}

impl std::fmt::Debug for SinkIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkIdentity")
            .field("api_host", &self.api_host)
            .field("write_key", &"[REDACTED]")
            .field("dataset", &self.dataset)
            .finish()
    }
}

#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: &Event) -> Result<(), SinkError>;
}

#[derive(Serialize)]
struct Envelope<'a> {
    dataset: &'a str,
    samplerate: u32,
    time: String,
    data: &'a BTreeMap<String, Value>,
}

/// Writes one JSON document per event to stdout, or to any other writer.
pub struct StdoutSink<W = Stdout> {
    identity: SinkIdentity,
    out: Mutex<W>,
}

impl StdoutSink {
    pub fn new(identity: SinkIdentity) -> Self {
        Self::with_writer(identity, tokio::io::stdout())
    }
}

impl<W> StdoutSink<W> {
    pub fn with_writer(identity: SinkIdentity, out: W) -> Self {
        Self {
            identity,
            out: Mutex::new(out),
        }
    }
}

pub(crate) fn encode(dataset: &str, event: &Event) -> Result<String, SinkError> {
    let envelope = Envelope {
        dataset,
        samplerate: event.sample_rate,
        time: format_time(event.timestamp),
        data: &event.fields,
    };
    Ok(serde_json::to_string(&envelope)?)
}

fn format_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[async_trait::async_trait]
impl<W> EventSink for StdoutSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, event: &Event) -> Result<(), SinkError> {
        let mut line = encode(&self.identity.dataset, event)?;
        line.push('\n');
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::record::Fields;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records everything it is given; fails every `fail_every`-th send.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub events: Mutex<Vec<Event>>,
        pub fail_every: Option<usize>,
        calls: AtomicUsize,
    }

    impl RecordingSink {
        pub(crate) fn failing_every(n: usize) -> Self {
            Self {
                fail_every: Some(n),
                ..Default::default()
            }
        }

        pub(crate) fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl EventSink for RecordingSink {
        async fn send(&self, event: &Event) -> Result<(), SinkError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(n) = self.fail_every {
                if call % n == 0 {
                    return Err(SinkError::Rejected(format!("call {call}")));
                }
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn test_encode_envelope() {
        let mut fields = Fields::new();
        fields.insert("format".into(), Value::from("json"));
        fields.insert("n".into(), Value::Number(2.5));
        let event = Event {
            fields,
            timestamp: Utc.with_ymd_and_hms(2014, 3, 10, 19, 57, 38).unwrap(),
            sample_rate: 20,
        };

        assert_eq!(
            encode("pika", &event).unwrap(),
            r#"{"dataset":"pika","samplerate":20,"time":"2014-03-10T19:57:38Z","data":{"format":"json","n":2.5}}"#
        );
    }

    #[tokio::test]
    async fn test_writes_one_line_per_event() {
        let identity = SinkIdentity {
            api_host: String::new(),
            write_key: "k".into(),
            dataset: "pika".into(),
        };
        let sink = StdoutSink::with_writer(identity, Vec::<u8>::new());
        for (i, rate) in [1, 5].into_iter().enumerate() {
            let mut fields = Fields::new();
            fields.insert("i".into(), Value::Number(i as f64));
            let event = Event {
                fields,
                timestamp: Utc.with_ymd_and_hms(2014, 3, 10, 19, 57, 38).unwrap(),
                sample_rate: rate,
            };
            sink.send(&event).await.unwrap();
        }

        let written = String::from_utf8(sink.out.into_inner()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(written.ends_with('\n'));
        assert_eq!(
            lines[1],
            r#"{"dataset":"pika","samplerate":5,"time":"2014-03-10T19:57:38Z","data":{"i":1.0}}"#
        );
    }

    #[test]
    fn test_identity_debug_hides_write_key() {
        let identity = SinkIdentity {
            api_host: "https://api.example.com/".into(),
            write_key: "abcabc123123".into(),
            dataset: "pika".into(),
        };
        let printed = format!("{identity:?}");
        assert!(!printed.contains("abcabc123123"));
        assert!(printed.contains("pika"));
    }
}
