//! Temp-file capture for the file path.
//!
//! The temp file is created exclusively with a unique name; the descriptor
//! is close-on-exec like every descriptor std opens. Until `finish` persists
//! it, the file is owned by a `NamedTempFile`, so any early exit (failed
//! transfer, abandoned task) removes it from disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::http::TransferInfo;
use crate::transport::ChunkSink;

const TEMP_PREFIX: &str = "nettask-";

#[derive(Debug)]
pub struct FileCapture {
    file: NamedTempFile,
    written: u64,
}

impl FileCapture {
    /// Create a uniquely named temp file inside `dir`.
    pub fn create_in(dir: &Path) -> Result<Self, TaskError> {
        let file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)
            .map_err(|e| TaskError::io(format!("creating temp file in {}", dir.display()), e))?;
        debug!(path = %file.path().display(), "created capture file");
        Ok(Self { file, written: 0 })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Close the file and settle its fate.
    ///
    /// A failed transfer deletes the file. A successful one is checked
    /// against the announced length (when the server announced a non-zero
    /// one); a mismatch deletes the file and turns the result into
    /// `TaskError::Validation`. Otherwise the file is persisted and its path
    /// returned to the caller, who owns it from then on.
    pub fn finish(
        self,
        transfer: Result<TransferInfo, TaskError>,
    ) -> Result<PathBuf, TaskError> {
        let temp_path = self.file.into_temp_path();

        let info = match transfer {
            Ok(info) => info,
            Err(e) => {
                if let Err(rm) = temp_path.close() {
                    warn!(error = %rm, "failed to remove partial download");
                }
                return Err(e);
            }
        };

        let actual = fs::metadata(&temp_path)
            .map_err(|e| TaskError::io(format!("stat {}", temp_path.display()), e))?
            .len();

        if let Some(expected) = info.content_length.filter(|len| *len > 0) {
            if expected != actual {
                warn!(expected, actual, "download size mismatch, discarding file");
                if let Err(rm) = temp_path.close() {
                    warn!(error = %rm, "failed to remove truncated download");
                }
                return Err(TaskError::Validation { expected, actual });
            }
        }

        temp_path
            .keep()
            .map_err(|e| TaskError::io("persisting downloaded file", e.error))
    }
}

impl ChunkSink for FileCapture {
    fn write_chunk(&mut self, chunk: &[u8]) -> usize {
        match self.file.write_all(chunk) {
            Ok(()) => {
                self.written += chunk.len() as u64;
                chunk.len()
            }
            Err(e) => {
                warn!(error = %e, "writing to capture file failed");
                0
            }
        }
    }
}
