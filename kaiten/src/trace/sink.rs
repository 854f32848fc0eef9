//! Trace sinks.
//!
//! A [`TraceSink`] receives every [`TraceEntry`] produced during a turn.
//! `save` is fire-and-forget: it must not block and must not fail back into
//! the loop. Sinks are shared between concurrent turns, so implementations
//! must tolerate concurrent writers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::entry::TraceEntry;
use crate::error::Result;

/// Destination for trace entries.
pub trait TraceSink: Send + Sync + fmt::Debug {
    /// Record one entry.
    fn save(&self, entry: TraceEntry);
}

/// Shared handle to a trace sink.
pub type SharedTraceSink = Arc<dyn TraceSink>;

/// In-process sink that keeps every entry in memory.
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    entries: Mutex<Vec<TraceEntry>>,
}

impl MemoryTraceSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries in arrival order.
    #[must_use]
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries belonging to one trace, in arrival order.
    #[must_use]
    pub fn by_trace(&self, trace_id: &str) -> Vec<TraceEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.trace_id == trace_id)
            .cloned()
            .collect()
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl TraceSink for MemoryTraceSink {
    fn save(&self, entry: TraceEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

enum Command {
    Write(Box<TraceEntry>),
    Flush(oneshot::Sender<()>),
}

/// Appends entries to a file, one JSON object per line.
///
/// Writes happen on a background task fed by an unbounded channel, so
/// [`save`](TraceSink::save) returns immediately. Must be opened from within
/// a tokio runtime.
pub struct JsonlTraceSink {
    path: PathBuf,
    tx: mpsc::UnboundedSender<Command>,
}

impl fmt::Debug for JsonlTraceSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonlTraceSink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JsonlTraceSink {
    /// Open (or create) `path` for appending and start the writer task.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::writer(file, path.clone(), rx));
        Ok(Self { path, tx })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until every entry saved so far has been written.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Read every entry from a JSONL trace file.
    ///
    /// Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a JSON error for
    /// the first malformed line.
    pub async fn read(path: impl AsRef<Path>) -> Result<Vec<TraceEntry>> {
        let contents = tokio::fs::read_to_string(path).await?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<TraceEntry>(line).map_err(crate::Error::from))
            .collect()
    }

    async fn writer(
        mut file: tokio::fs::File,
        path: PathBuf,
        mut rx: mpsc::UnboundedReceiver<Command>,
    ) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Write(entry) => {
                    let mut line = match serde_json::to_vec(&entry) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "failed to encode trace entry");
                            continue;
                        }
                    };
                    line.push(b'\n');
                    if let Err(e) = file.write_all(&line).await {
                        warn!(path = %path.display(), error = %e, "failed to write trace entry");
                    }
                }
                Command::Flush(ack) => {
                    if let Err(e) = file.flush().await {
                        warn!(path = %path.display(), error = %e, "failed to flush trace file");
                    }
                    let _ = ack.send(());
                }
            }
        }
        // Every sender is gone; push out what is still buffered.
        if let Err(e) = file.flush().await {
            warn!(path = %path.display(), error = %e, "failed to flush trace file on close");
        }
    }
}

impl TraceSink for JsonlTraceSink {
    fn save(&self, entry: TraceEntry) {
        // Only fails once the writer task is gone; entries are dropped then.
        let _ = self.tx.send(Command::Write(Box::new(entry)));
    }
}
