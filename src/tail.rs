//! Log ingestion layer: reads lines from files or stdin.
//!
//! Sources implement [`LineReader`]. A [`FileTail`] tracks the inode and byte
//! offset of what it has handed out so that a later run can resume, and in
//! follow mode it notices when the file it is reading gets rotated or
//! truncated underneath it.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom, Stdin};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::TailError;
use crate::record::RawLine;
use crate::state::TailState;

const MAX_REOPEN_BACKOFF: Duration = Duration::from_secs(10);

pub const STDIN_MARKER: &str = "-";

/// One input of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    Stdin,
    File(PathBuf),
}

impl LogSource {
    pub fn from_arg(arg: &str) -> Self {
        if arg == STDIN_MARKER {
            LogSource::Stdin
        } else {
            LogSource::File(PathBuf::from(arg))
        }
    }

    pub fn name(&self) -> String {
        match self {
            LogSource::Stdin => STDIN_MARKER.to_string(),
            LogSource::File(path) => path.display().to_string(),
        }
    }
}

/// Where reading begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReadFrom {
    #[default]
    Start,
    End,
    /// Continue from a saved [`TailState`] when it matches the file.
    #[value(alias = "last")]
    Resume,
}

#[derive(Debug, Clone)]
pub struct TailOptions {
    pub read_from: ReadFrom,
    /// End the stream at the current end of file instead of following it.
    pub stop_at_eof: bool,
    pub poll_interval: Duration,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            read_from: ReadFrom::Start,
            stop_at_eof: false,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// A lazy sequence of lines.
#[async_trait::async_trait]
pub trait LineReader: Send {
    /// `Ok(None)` once the source is exhausted. Following sources never end.
    async fn next_line(&mut self) -> Result<Option<RawLine>, TailError>;

    /// Position covering every line returned so far, if the source has one.
    fn checkpoint(&self) -> Option<TailState>;
}

/// Open a reader for `source`. `saved` is only consulted in resume mode.
pub async fn open(
    source: &LogSource,
    options: &TailOptions,
    saved: Option<TailState>,
) -> Result<Box<dyn LineReader>, TailError> {
    match source {
        LogSource::Stdin => Ok(Box::new(StdinTail::new())),
        LogSource::File(path) => Ok(Box::new(FileTail::open(path, options, saved).await?)),
    }
}

pub struct FileTail {
    path: PathBuf,
    name: String,
    reader: Option<BufReader<File>>,
    inode: u64,
    offset: u64,
    /// Bytes of a line whose terminator has not arrived yet.
    pending: Vec<u8>,
    stop_at_eof: bool,
    poll_interval: Duration,
    reopen_backoff: Duration,
    /// The path failed to stat on the last check; the old handle is kept.
    missing: bool,
}

impl FileTail {
    pub async fn open(
        path: &Path,
        options: &TailOptions,
        saved: Option<TailState>,
    ) -> Result<Self, TailError> {
        let file = File::open(path).await.map_err(|source| TailError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let meta = file.metadata().await?;
        let inode = inode_of(&meta);

        let offset = match options.read_from {
            ReadFrom::Start => 0,
            ReadFrom::End => meta.len(),
            ReadFrom::Resume => match saved {
                Some(state) if state.resume_offset(inode) > meta.len() => {
                    info!(path = %path.display(), offset = state.offset, size = meta.len(),
                        "file shrank since last run, reading from start");
                    0
                }
                Some(state) => {
                    let offset = state.resume_offset(inode);
                    if offset == 0 && state.offset != 0 {
                        info!(path = %path.display(), saved_inode = state.inode, inode,
                            "file was replaced since last run, reading from start");
                    }
                    offset
                }
                None => 0,
            },
        };

        let mut file = file;
        file.seek(SeekFrom::Start(offset)).await?;
        debug!(path = %path.display(), inode, offset, "opened log file");

        Ok(Self {
            path: path.to_path_buf(),
            name: path.display().to_string(),
            reader: Some(BufReader::new(file)),
            inode,
            offset,
            pending: Vec::new(),
            stop_at_eof: options.stop_at_eof,
            poll_interval: options.poll_interval,
            reopen_backoff: options.poll_interval,
            missing: false,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn inode(&self) -> u64 {
        self.inode
    }

    fn take_line(&mut self) -> RawLine {
        self.offset += self.pending.len() as u64;
        let bytes = std::mem::take(&mut self.pending);
        RawLine {
            source: self.name.clone(),
            text: line_text(bytes),
        }
    }

    /// Byte position the reader has consumed up to, partial line included.
    fn read_to(&self) -> u64 {
        self.offset + self.pending.len() as u64
    }

    /// Open the path again. The same file continues from where reading
    /// stopped; a replaced or truncated one starts over at offset 0. The
    /// unterminated tail of a replaced file is returned as a final line.
    async fn reopen(&mut self) -> std::io::Result<Option<RawLine>> {
        let mut file = File::open(&self.path).await?;
        let meta = file.metadata().await?;
        let inode = inode_of(&meta);
        let read_to = self.read_to();

        if inode == self.inode && meta.len() >= read_to {
            file.seek(SeekFrom::Start(read_to)).await?;
            self.reader = Some(BufReader::new(file));
            self.reopen_backoff = self.poll_interval;
            return Ok(None);
        }

        let leftover = if self.pending.is_empty() {
            None
        } else if inode != self.inode {
            Some(self.take_line())
        } else {
            warn!(path = %self.name, bytes = self.pending.len(),
                "discarding partial line of truncated file");
            self.pending.clear();
            None
        };

        self.inode = inode;
        self.offset = 0;
        self.reader = Some(BufReader::new(file));
        self.reopen_backoff = self.poll_interval;
        Ok(leftover)
    }

    /// Called at end of file while following. The current handle stays open
    /// until a different file shows up at the path.
    async fn check_rotation(&mut self) -> Option<RawLine> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) => {
                if !self.missing {
                    warn!(path = %self.name, error = %e, "log file disappeared, waiting for it to return");
                    self.missing = true;
                }
                return None;
            }
        };
        if self.missing {
            info!(path = %self.name, "log file is back");
            self.missing = false;
        }

        let inode = inode_of(&meta);
        if inode == self.inode && meta.len() >= self.read_to() {
            return None;
        }

        info!(path = %self.name, old_inode = self.inode, inode,
            offset = self.offset, size = meta.len(), "file rotated or truncated, reopening");
        match self.reopen().await {
            Ok(leftover) => leftover,
            Err(e) => {
                warn!(path = %self.name, error = %e, "failed to reopen rotated file");
                self.reader = None;
                None
            }
        }
    }

    async fn wait_for_file(&mut self) -> Option<RawLine> {
        sleep(self.reopen_backoff).await;
        match self.reopen().await {
            Ok(leftover) => {
                info!(path = %self.name, inode = self.inode, offset = self.offset, "log file reopened");
                leftover
            }
            Err(e) => {
                self.reopen_backoff = (self.reopen_backoff * 2).min(MAX_REOPEN_BACKOFF);
                debug!(path = %self.name, error = %e, backoff = ?self.reopen_backoff, "log file still unavailable");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl LineReader for FileTail {
    async fn next_line(&mut self) -> Result<Option<RawLine>, TailError> {
        loop {
            let Some(reader) = self.reader.as_mut() else {
                if let Some(line) = self.wait_for_file().await {
                    return Ok(Some(line));
                }
                continue;
            };

            let read = match reader.read_until(b'\n', &mut self.pending).await {
                Ok(n) => n,
                Err(e) if !self.stop_at_eof => {
                    warn!(path = %self.name, error = %e, "read failed, reopening");
                    self.reader = None;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if self.pending.ends_with(b"\n") {
                return Ok(Some(self.take_line()));
            }
            if read > 0 {
                continue;
            }

            if self.stop_at_eof {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            if let Some(line) = self.check_rotation().await {
                return Ok(Some(line));
            }
            if self.reader.is_some() {
                sleep(self.poll_interval).await;
            }
        }
    }

    fn checkpoint(&self) -> Option<TailState> {
        Some(TailState::new(self.inode, self.offset))
    }
}

/// Standard input, or any other stream read until it closes. Has no
/// position to save.
pub struct StdinTail<R = BufReader<Stdin>> {
    reader: R,
    pending: Vec<u8>,
}

impl StdinTail {
    pub fn new() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl Default for StdinTail {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> StdinTail<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }
}

#[async_trait::async_trait]
impl<R> LineReader for StdinTail<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_line(&mut self) -> Result<Option<RawLine>, TailError> {
        self.reader.read_until(b'\n', &mut self.pending).await?;
        if self.pending.is_empty() {
            return Ok(None);
        }
        let bytes = std::mem::take(&mut self.pending);
        Ok(Some(RawLine {
            source: STDIN_MARKER.to_string(),
            text: line_text(bytes),
        }))
    }

    fn checkpoint(&self) -> Option<TailState> {
        None
    }
}

fn line_text(mut bytes: Vec<u8>) -> String {
    if bytes.ends_with(b"\n") {
        bytes.pop();
    }
    if bytes.ends_with(b"\r") {
        bytes.pop();
    }
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[cfg(unix)]
fn inode_of(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode_of(_meta: &Metadata) -> u64 {
    0
}
