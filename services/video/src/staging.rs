//! Scratch files for uploads in flight.
//!
//! Probing and remuxing tools need random access, so the inbound stream is
//! copied to disk first. Every file created here is owned by a [`StagedFile`]
//! and removed when that guard is released or dropped.

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

const STAGED_FILE_PREFIX: &str = "tubely-upload-";

/// A pipeline-owned file, deleted when released or dropped
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    removed: bool,
}

impl StagedFile {
    /// Take ownership of an existing file
    pub fn adopt(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand the file over to the caller without deleting it
    pub fn into_path(mut self) -> PathBuf {
        self.removed = true;
        std::mem::take(&mut self.path)
    }

    /// Delete the file now, reporting failures instead of swallowing them
    pub async fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed staged file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        // Error and cancellation path only; normal flow goes through `remove`.
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove staged file");
            }
        }
    }
}

/// A freshly staged upload, with its handle rewound to the first byte
#[derive(Debug)]
pub struct StagedUpload {
    pub file: StagedFile,
    pub handle: File,
    pub size_bytes: u64,
}

/// Copy a byte stream to a new scratch file in `dir`.
///
/// The stream is consumed once, in order, without being buffered in memory.
/// On any error the partial file is removed before returning.
pub async fn stage_stream<S, E>(dir: &Path, extension: &str, body: S) -> io::Result<StagedUpload>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let suffix = format!(".{}", extension);
    let named = tempfile::Builder::new()
        .prefix(STAGED_FILE_PREFIX)
        .suffix(&suffix)
        .tempfile_in(dir)?;

    // From here on the guard, not tempfile, decides when the file goes away.
    let (std_file, path) = named.keep().map_err(|e| e.error)?;
    let file = StagedFile::adopt(path);
    let mut handle = File::from_std(std_file);

    let reader = StreamReader::new(body.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
    futures::pin_mut!(reader);

    let size_bytes = tokio::io::copy(&mut reader, &mut handle).await?;
    handle.flush().await?;
    handle.rewind().await?;

    debug!(
        path = %file.path().display(),
        size_bytes = size_bytes,
        "Upload staged"
    );

    Ok(StagedUpload {
        file,
        handle,
        size_bytes,
    })
}
