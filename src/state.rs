//! Persisted read position for resumable tailing.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::TailError;

/// `{"INode": <u64>, "Offset": <u64>}` on disk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailState {
    #[serde(rename = "INode")]
    pub inode: u64,
    #[serde(rename = "Offset")]
    pub offset: u64,
}

impl TailState {
    pub fn new(inode: u64, offset: u64) -> Self {
        Self { inode, offset }
    }

    /// Offset to start from for a file currently identified by `inode`.
    pub fn resume_offset(&self, inode: u64) -> u64 {
        if self.inode == inode { self.offset } else { 0 }
    }
}

/// Reads and writes a [`TailState`] at a fixed path.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file is not an error; reading starts over.
    pub fn load(&self) -> Option<TailState> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no usable state file");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt state file");
                None
            }
        }
    }

    /// Write to a sibling temp file, then rename over the target.
    pub fn save(&self, state: &TailState) -> Result<(), TailError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, state)
                .map_err(|e| TailError::State(format!("failed to encode state: {e}")))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), inode = state.inode, offset = state.offset, "saved tail state");
        Ok(())
    }
}
