//! Streaming transfer of one binary file to a fixed local path

use crate::error::{Error, Result};
use crate::remote::ByteSource;
use futures_util::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Progress of a running transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferProgress {
    pub bytes_written: u64,
    pub bytes_expected: Option<u64>,
    /// `None` when the server did not report a length
    pub percent: Option<u8>,
}

impl TransferProgress {
    fn new(bytes_written: u64, bytes_expected: Option<u64>) -> Self {
        let percent = bytes_expected
            .filter(|expected| *expected > 0)
            .map(|expected| (bytes_written.min(expected) * 100 / expected) as u8);

        Self {
            bytes_written,
            bytes_expected,
            percent,
        }
    }
}

/// A file downloaded to a path derived from its content identity.
///
/// Bytes go to `<path>.part` first and are renamed into place once the
/// stream ends. A part file left over by an earlier process is resumed
/// when the server supports ranges.
pub struct FileTransfer {
    path: PathBuf,
    source: Arc<dyn ByteSource>,
}

impl FileTransfer {
    pub fn new(path: PathBuf, source: Arc<dyn ByteSource>) -> Self {
        Self { path, source }
    }

    /// `<audio_dir>/<reciter>/<surah>.mp3`, surah zero-padded to three digits
    pub fn surah_audio(
        audio_dir: &Path,
        reciter_id: u32,
        surah_id: u32,
        source: Arc<dyn ByteSource>,
    ) -> Self {
        let path = audio_dir
            .join(reciter_id.to_string())
            .join(format!("{surah_id:03}.mp3"));
        Self::new(path, source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn part_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".part");
        PathBuf::from(name)
    }

    /// True if the file exists, is not a directory and is not empty
    pub async fn is_downloaded(&self) -> bool {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    /// Stream `url` into place, reporting progress after every chunk.
    pub async fn download<F>(&self, url: &str, mut on_progress: F) -> Result<PathBuf>
    where
        F: FnMut(TransferProgress) + Send,
    {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part_path = self.part_path();
        let offset = match tokio::fs::metadata(&part_path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        };

        let stream = self.source.open(url, offset).await?;
        let (mut file, mut written) = if stream.resumed {
            info!("Resuming {:?} at byte {}", self.path, offset);
            let file = OpenOptions::new().append(true).open(&part_path).await?;
            (file, offset)
        } else {
            (File::create(&part_path).await?, 0)
        };
        let expected = stream.content_length.map(|remaining| remaining + written);

        let mut chunks = stream.chunks;
        while let Some(chunk) = chunks.next().await {
            let bytes = chunk?;
            file.write_all(&bytes).await?;
            written += bytes.len() as u64;
            on_progress(TransferProgress::new(written, expected));
        }

        file.flush().await?;
        drop(file);
        tokio::fs::rename(&part_path, &self.path).await?;

        if !self.is_downloaded().await {
            return Err(Error::Transfer(format!("{url} produced no usable file")));
        }

        debug!("Wrote {} bytes to {:?}", written, self.path);
        Ok(self.path.clone())
    }

    /// Remove the file and any part file; succeeds if neither exists.
    pub async fn delete(&self) -> Result<()> {
        for path in [self.path.clone(), self.part_path()] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Removed {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
