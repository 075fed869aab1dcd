//! File sink: per-channel append-only persistence of popped batches.
//!
//! A sink file is a flat sequence of fixed-width little-endian elements in
//! arrival order. No header, no length prefix, no checksum.

use crate::element::{encode_batch, Element};
use crate::error::{BridgeError, Result};
use crate::invariant_ppt::{assert_invariant, SINK_VERBATIM};
use crate::source::ChannelId;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Where a sink-backed session writes its two channel files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub directory: PathBuf,
    /// File names for the first and second channel, in start order.
    pub file_names: [String; 2],
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_names: ["data1.bin".to_string(), "data2.bin".to_string()],
        }
    }
}

impl SinkConfig {
    /// Default file names inside `directory`.
    pub fn in_dir(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Path of the file for channel slot `slot` (0 or 1).
    pub fn path(&self, slot: usize) -> PathBuf {
        self.directory.join(&self.file_names[slot])
    }
}

/// Append-only file for one channel.
///
/// The first failed write disables the sink for the rest of the session;
/// the in-memory stream is unaffected.
#[derive(Debug)]
pub struct FileSink {
    channel: ChannelId,
    path: PathBuf,
    file: File,
    // File length after the last complete batch.
    committed: u64,
    elements_written: u64,
    failed: bool,
}

impl FileSink {
    /// Opens (or creates) `path` for appending.
    pub fn open(channel: ChannelId, path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let committed = file.metadata()?.len();
        log::info!("Opened sink for channel {} at {}", channel, path.display());
        Ok(Self {
            channel,
            path,
            file,
            committed,
            elements_written: 0,
            failed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn elements_written(&self) -> u64 {
        self.elements_written
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Appends `batch` verbatim.
    ///
    /// On failure the file is cut back to the end of the last complete
    /// batch, so a partial write never leaves a torn element behind.
    pub fn append<T: Element>(&mut self, batch: &[T]) -> Result<()> {
        if self.failed {
            return Err(BridgeError::SinkFailed(self.channel));
        }
        if batch.is_empty() {
            return Ok(());
        }
        let bytes = encode_batch(batch);
        assert_invariant(
            SINK_VERBATIM,
            bytes.len() == batch.len() * T::WIDTH,
            "sink writes exactly one fixed-width record per element",
            None,
        );
        if let Err(source) = self.file.write_all(&bytes) {
            self.failed = true;
            log::error!(
                "Sink write for channel {} to {} failed, disabling sink: {}",
                self.channel,
                self.path.display(),
                source
            );
            self.rollback();
            return Err(BridgeError::SinkWrite {
                channel: self.channel,
                elements: batch.len(),
                source,
            });
        }
        self.committed += bytes.len() as u64;
        self.elements_written += batch.len() as u64;
        Ok(())
    }

    fn rollback(&mut self) {
        let len = match self.file.metadata() {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return,
        };
        if len <= self.committed {
            return;
        }
        if let Err(err) = self.file.set_len(self.committed) {
            log::warn!(
                "Could not trim partial write from {}: {}",
                self.path.display(),
                err
            );
        }
    }

    /// Flushes and closes the file, returning how many elements it received.
    pub fn close(mut self) -> io::Result<u64> {
        self.file.flush()?;
        log::info!(
            "Closed sink for channel {} ({} elements)",
            self.channel,
            self.elements_written
        );
        Ok(self.elements_written)
    }
}

/// Decodes a sink file back into elements.
pub fn read_sink_file<T: Element>(path: impl AsRef<Path>) -> io::Result<Vec<T>> {
    let bytes = std::fs::read(path)?;
    if bytes.len() % T::WIDTH != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "sink file length {} is not a multiple of the {}-byte element width",
                bytes.len(),
                T::WIDTH
            ),
        ));
    }
    Ok(bytes.chunks_exact(T::WIDTH).map(T::read_le).collect())
}
