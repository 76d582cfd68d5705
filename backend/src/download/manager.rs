//! Download manager: entry point for every download and delete

use super::{audio, tafsir, translation, FileTransfer, InFlightGuard, Operation};
use crate::config::DownloadSettings;
use crate::content::DownloadableContent;
use crate::db::OfflineDb;
use crate::error::Result;
use crate::index::{DownloadIndex, IndexEvent};
use crate::remote::{ByteSource, ContentApi};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Error recorded on operations cut short by a process exit
pub const INTERRUPTED: &str = "interrupted before completion";

/// Everything an orchestrator needs
pub struct DownloadContext {
    pub index: Arc<DownloadIndex>,
    pub db: OfflineDb,
    pub api: Arc<dyn ContentApi>,
    pub bytes: Arc<dyn ByteSource>,
    pub audio_dir: PathBuf,
    pub settings: DownloadSettings,
}

impl DownloadContext {
    pub fn audio_file(&self, reciter_id: u32, surah_id: u32) -> FileTransfer {
        FileTransfer::surah_audio(&self.audio_dir, reciter_id, surah_id, Arc::clone(&self.bytes))
    }
}

/// Runs downloads and deletes, at most one per content key at a time
#[derive(Clone)]
pub struct DownloadManager {
    ctx: Arc<DownloadContext>,
    guard: InFlightGuard,
}

impl DownloadManager {
    pub fn new(ctx: DownloadContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            guard: InFlightGuard::new(),
        }
    }

    pub fn index(&self) -> &Arc<DownloadIndex> {
        &self.ctx.index
    }

    pub fn db(&self) -> &OfflineDb {
        &self.ctx.db
    }

    /// Subscribe to index changes
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.ctx.index.subscribe()
    }

    /// Whether an operation is currently running for `content`
    pub fn is_running(&self, content: &DownloadableContent) -> bool {
        self.guard.is_running(&content.key())
    }

    /// Fail records a previous process left mid-operation so they can be retried.
    pub async fn recover_interrupted(&self) -> usize {
        let failed = self.ctx.index.fail_in_flight(INTERRUPTED).await;
        for entry in &failed {
            info!("Marked interrupted download {} as failed", entry.key);
        }
        failed.len()
    }

    pub async fn download_translation(&self, translation_id: u32) -> Result<()> {
        let content = DownloadableContent::translation(translation_id);
        content.validate()?;

        let ctx = Arc::clone(&self.ctx);
        self.guard
            .run(content.key(), Operation::Download, async move {
                translation::download(&ctx, translation_id).await
            })
            .await
    }

    pub async fn delete_translation(&self, translation_id: u32) -> Result<()> {
        let content = DownloadableContent::translation(translation_id);
        content.validate()?;

        let ctx = Arc::clone(&self.ctx);
        self.guard
            .run(content.key(), Operation::Delete, async move {
                translation::delete(&ctx, translation_id).await
            })
            .await
    }

    /// Download several tafsirs of one surah.
    ///
    /// Each id succeeds or fails on its own; failures are reported together
    /// once every id has been attempted.
    pub async fn download_surah_tafsir(&self, surah_id: u32, tafsir_ids: &[u32]) -> Result<()> {
        tafsir::download_surah(&self.ctx, &self.guard, surah_id, tafsir_ids).await
    }

    pub async fn delete_surah_tafsir(&self, tafsir_id: u32, surah_id: u32) -> Result<()> {
        let content = DownloadableContent::surah_tafsir(tafsir_id, surah_id);
        content.validate()?;

        let ctx = Arc::clone(&self.ctx);
        self.guard
            .run(content.key(), Operation::Delete, async move {
                tafsir::delete(&ctx, tafsir_id, surah_id).await
            })
            .await
    }

    pub async fn download_surah_audio(&self, reciter_id: u32, surah_id: u32) -> Result<()> {
        let content = DownloadableContent::surah_audio(reciter_id, surah_id);
        content.validate()?;

        let ctx = Arc::clone(&self.ctx);
        self.guard
            .run(content.key(), Operation::Download, async move {
                audio::download(&ctx, reciter_id, surah_id).await
            })
            .await
    }

    pub async fn delete_surah_audio(&self, reciter_id: u32, surah_id: u32) -> Result<()> {
        let content = DownloadableContent::surah_audio(reciter_id, surah_id);
        content.validate()?;

        let ctx = Arc::clone(&self.ctx);
        self.guard
            .run(content.key(), Operation::Delete, async move {
                audio::delete(&ctx, reciter_id, surah_id).await
            })
            .await
    }

    /// Local file backing a surah recitation
    pub fn audio_file(&self, reciter_id: u32, surah_id: u32) -> FileTransfer {
        self.ctx.audio_file(reciter_id, surah_id)
    }
}
