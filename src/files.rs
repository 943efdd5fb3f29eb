//! Transient audio file store
//!
//! Tracks every audio file the bot writes to disk (downloaded voice input,
//! synthesized speech) so none of them outlives the process.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::Result;

/// Tracked set of locally created audio files
///
/// Owned by the pipeline worker, so mutation needs no lock. Any setup with
/// more than one worker must wrap it in a mutex.
#[derive(Debug)]
pub struct TransientFiles {
    dir: PathBuf,
    tracked: HashSet<PathBuf>,
}

impl TransientFiles {
    /// Create a store rooted at `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            tracked: HashSet::new(),
        })
    }

    /// Directory new files are placed in
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a downloaded voice message
    #[must_use]
    pub fn voice_input_path(&self, message_id: i64) -> PathBuf {
        self.dir.join(format!("voice_{message_id}.ogg"))
    }

    /// Path for synthesized speech answering a message
    #[must_use]
    pub fn speech_output_path(&self, message_id: i64) -> PathBuf {
        self.dir.join(format!("speech_{message_id}.ogg"))
    }

    /// Start tracking `path`. Registering the same path twice is a no-op.
    pub fn register(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.tracked.insert(path.clone()) {
            tracing::trace!(path = %path.display(), "tracking file");
        }
    }

    /// Register `path` and write `bytes` to it
    ///
    /// The path is registered before writing so a partial file left by a
    /// failed write is still removed later.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub async fn write(&mut self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.register(path);
        tokio::fs::write(path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote audio file");
        Ok(())
    }

    /// Delete `path` now and stop tracking it
    ///
    /// A missing file is fine. Other deletion errors are logged, not returned.
    pub async fn release(&mut self, path: &Path) {
        self.tracked.remove(path);
        remove_quietly(path).await;
    }

    /// Delete every file still tracked. Called once at shutdown.
    pub async fn cleanup_all(&mut self) {
        if self.tracked.is_empty() {
            return;
        }

        tracing::info!(count = self.tracked.len(), "cleaning up audio files");
        for path in std::mem::take(&mut self.tracked) {
            remove_quietly(&path).await;
        }
    }

    /// Whether `path` is currently tracked
    #[must_use]
    pub fn is_tracked(&self, path: &Path) -> bool {
        self.tracked.contains(path)
    }

    /// Currently tracked paths, in no particular order
    pub fn tracked(&self) -> impl Iterator<Item = &Path> {
        self.tracked.iter().map(PathBuf::as_path)
    }

    /// Number of tracked files
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    /// Whether nothing is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "deleted file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::error!(path = %path.display(), error = %e, "failed to delete file"),
    }
}
