use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::cli::Config;
use crate::dispatch::{DispatchPool, EventSender};
use crate::error::TailError;
use crate::parser::{Clock, LineParser, Parser, SystemClock};
use crate::record::{Event, RawLine};
use crate::sample::{SampleDecision, Sampler};
use crate::sink::{EventSink, StdoutSink};
use crate::state::StateFile;
use crate::stats::{self, Stats, StatsSnapshot};
use crate::tail::{self, LineReader, ReadFrom};
use crate::transform::Transformer;

/// Application runtime: ships events to stdout until the sources are done or
/// Ctrl-C is pressed.
pub async fn run(config: Config) -> Result<StatsSnapshot> {
    let sink: Arc<dyn EventSink> = Arc::new(StdoutSink::new(config.identity.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, finishing up");
            let _ = shutdown_tx.send(true);
        }
    });

    let result = run_with(&config, sink, Arc::new(SystemClock), shutdown_rx).await;
    signal.abort();
    result
}

/// Parse, transform and sample lines; the part of a run between reading a
/// line and queueing its event.
struct Stage {
    parser: Parser,
    transform: Transformer,
    sampler: Sampler,
    stats: Arc<Stats>,
}

impl Stage {
    fn process(&self, line: &RawLine) -> Option<Event> {
        let mut record = match self.parser.parse_line(&line.text) {
            Ok(record) => record,
            Err(e) => {
                self.stats.parse_error();
                debug!(source = %line.source, error = %e, "skipping unparsable line");
                return None;
            }
        };

        self.transform.apply(&mut record);

        match self.sampler.decide() {
            SampleDecision::Keep(rate) => Some(Event::from_record(record, rate)),
            SampleDecision::Discard => {
                self.stats.sampled_out();
                None
            }
        }
    }
}

/// Run the pipeline against an arbitrary sink. Returns once every source is
/// exhausted (or `shutdown` flips to true) and the queue has drained.
pub async fn run_with(
    config: &Config,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
) -> Result<StatsSnapshot> {
    config.validate()?;

    let stats = Stats::new();
    let sampler = match config.sample_seed {
        Some(seed) => Sampler::new(config.sample_rate, seed),
        None => Sampler::from_clock(config.sample_rate),
    };
    let stage = Arc::new(Stage {
        parser: Parser::build(config.parser, &config.parser_options, clock)?,
        transform: config.transform.clone(),
        sampler,
        stats: stats.clone(),
    });

    let state_file = config.state_file.as_ref().map(StateFile::new);
    let saved = match (&state_file, config.tail.read_from) {
        (Some(file), ReadFrom::Resume) => file.load(),
        _ => None,
    };

    // every source must open before anything is read
    let mut readers = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        let reader = tail::open(source, &config.tail, saved)
            .await
            .with_context(|| format!("failed to open log source {}", source.name()))?;
        readers.push((source.name(), reader));
    }

    info!(
        parser = %config.parser,
        sources = readers.len(),
        pool_size = config.pool_size,
        sample_rate = config.sample_rate,
        dataset = %config.identity.dataset,
        "starting pipeline"
    );

    let pool = DispatchPool::start(
        config.pool_size,
        config.queue_capacity,
        sink,
        stats.clone(),
    );

    let (done_tx, done_rx) = watch::channel(false);
    let reporter = tokio::spawn(stats::report(
        stats.clone(),
        config.status_interval,
        done_rx,
    ));

    let producers: Vec<_> = readers
        .into_iter()
        .map(|(name, reader)| {
            let producer = Producer {
                name,
                reader,
                stage: stage.clone(),
                tx: pool.sender(),
                state_file: state_file.clone(),
                flush_every: config.state_flush_interval,
            };
            tokio::spawn(producer.run(shutdown.clone()))
        })
        .collect();

    for handle in producers {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "log source failed"),
            Err(e) => error!(error = %e, "log source task panicked"),
        }
    }

    pool.shutdown().await;
    let _ = done_tx.send(true);
    if let Err(e) = reporter.await {
        warn!(error = %e, "stats reporter panicked");
    }

    let snapshot = stats.snapshot();
    snapshot.log("final summary");
    Ok(snapshot)
}

/// Feeds one source through the stage into the queue.
struct Producer {
    name: String,
    reader: Box<dyn LineReader>,
    stage: Arc<Stage>,
    tx: EventSender,
    state_file: Option<StateFile>,
    flush_every: Duration,
}

impl Producer {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), TailError> {
        let mut flush = interval_at(Instant::now() + self.flush_every, self.flush_every);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break Ok(()),
                _ = flush.tick() => {
                    self.save_state();
                    continue;
                }
                next = self.reader.next_line() => next,
            };

            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            self.stage.stats.line_read();
            if let Some(event) = self.stage.process(&line) {
                if self.tx.send(event).await.is_err() {
                    warn!(source = %self.name, "dispatch queue closed, stopping source");
                    break Ok(());
                }
            }
        };

        self.save_state();
        debug!(source = %self.name, "log source finished");
        result
    }

    fn save_state(&self) {
        let (Some(file), Some(state)) = (&self.state_file, self.reader.checkpoint()) else {
            return;
        };
        if let Err(e) = file.save(&state) {
            warn!(source = %self.name, path = %file.path().display(), error = %e, "failed to save tail state");
        }
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            // nobody can ask us to stop any more
            std::future::pending::<()>().await;
        }
    }
}
