// SPDX-License-Identifier: MPL-2.0

//! Output sink for the encoded stream
//!
//! The encoded elementary stream is appended to the file exactly as the
//! encoder delivers it: no container, no header, arrival order.

use crate::errors::{VideoError, VideoResult};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Sink shared between the session and the encoder delivery callback
///
/// Only the delivery callback touches it while the encoder output port is
/// enabled; the session touches it only after the port is disabled.
pub type SharedSink = Arc<Mutex<OutputSink>>;

/// Lock a shared sink, recovering the guard if a callback panicked while holding it
pub fn lock_sink(sink: &SharedSink) -> MutexGuard<'_, OutputSink> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append-only output file
#[derive(Debug)]
pub struct OutputSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
    chunks_written: u64,
}

impl OutputSink {
    /// Create the output file for binary writing
    ///
    /// An existing file is never clobbered.
    pub fn create(path: impl AsRef<Path>) -> VideoResult<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| VideoError::ResourceFailure {
                message: format!("Failed to create the output file `{}`: {}", path.display(), e),
                status: None,
            })?;

        info!(path = %path.display(), "Opened output file");

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            bytes_written: 0,
            chunks_written: 0,
        })
    }

    /// Wrap in the shared form handed to the delivery callback
    pub fn into_shared(self) -> SharedSink {
        Arc::new(Mutex::new(self))
    }

    /// Append encoded bytes
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "output file is closed"))?;
        writer.write_all(data)?;
        self.bytes_written += data.len() as u64;
        self.chunks_written += 1;
        Ok(())
    }

    /// Flush, sync and close the file
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn close(&mut self) -> VideoResult<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        info!(
            path = %self.path.display(),
            bytes = self.bytes_written,
            chunks = self.chunks_written,
            "Closed output file"
        );
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total payload bytes appended
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Number of successful appends
    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        if self.is_open() {
            debug!(path = %self.path.display(), "Output sink dropped while open");
            if let Err(e) = self.close() {
                warn!(error = %e, "Failed to close output file on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_then_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1700000000.h264");

        let mut sink = OutputSink::create(&path).unwrap();
        sink.append(&[0, 0, 0, 1, 0x67]).unwrap();
        sink.append(&[0, 0, 0, 1, 0x65, 0xaa]).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();

        assert!(!sink.is_open());
        assert_eq!(sink.bytes_written(), 11);
        assert_eq!(sink.chunks_written(), 2);
        assert_eq!(
            std::fs::read(&path).unwrap(),
            vec![0, 0, 0, 1, 0x67, 0, 0, 0, 1, 0x65, 0xaa]
        );
    }

    #[test]
    fn test_existing_file_is_not_clobbered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken.h264");
        std::fs::write(&path, b"keep").unwrap();

        let err = OutputSink::create(&path).unwrap_err();
        assert!(matches!(err, VideoError::ResourceFailure { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep");
    }

    #[test]
    fn test_append_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = OutputSink::create(dir.path().join("closed.h264")).unwrap();
        sink.close().unwrap();

        let err = sink.append(b"late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
