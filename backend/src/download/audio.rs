//! Surah recitation download through the file transfer

use super::{begin, delete_content, DownloadContext, FileTransfer, ProgressThrottle, TransferProgress};
use crate::content::DownloadableContent;
use crate::error::Result;
use crate::index::{DownloadProgress, IndexPatch};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub(super) async fn download(ctx: &DownloadContext, reciter_id: u32, surah_id: u32) -> Result<()> {
    let content = DownloadableContent::surah_audio(reciter_id, surah_id);
    let file = ctx.audio_file(reciter_id, surah_id);

    // An installed record whose file has gone missing is downloaded again
    let installed_is_current = file.is_downloaded().await;
    let initial = DownloadProgress::percent(0);
    if !begin(&ctx.index, &content, initial, installed_is_current).await {
        return Ok(());
    }

    info!("Downloading audio of surah {} by reciter {}", surah_id, reciter_id);
    let mut last = initial;
    match transfer(ctx, &content, &file, (reciter_id, surah_id), &mut last).await {
        Ok(path) => {
            ctx.index.upsert(&content, IndexPatch::installed()).await;
            info!("Audio saved to {:?}", path);
            Ok(())
        }
        Err(e) => {
            warn!("Audio {} failed: {}", content, e);
            if let Err(cleanup) = file.delete().await {
                warn!("Could not remove partial file {:?}: {}", file.path(), cleanup);
            }
            ctx.index
                .upsert(&content, IndexPatch::failed(e.to_string(), Some(last)))
                .await;
            Err(e)
        }
    }
}

/// Run the transfer while persisting throttled progress; every held-back
/// sample is written before this returns.
async fn transfer(
    ctx: &DownloadContext,
    content: &DownloadableContent,
    file: &FileTransfer,
    (reciter_id, surah_id): (u32, u32),
    last: &mut DownloadProgress,
) -> Result<PathBuf> {
    let url = ctx.api.audio_url(reciter_id, surah_id).await?;

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<TransferProgress>();
    let bytes = file.download(&url, move |progress| {
        let _ = progress_tx.send(progress);
    });

    let persist = async {
        let mut throttle = ProgressThrottle::new(ctx.settings.audio_progress_interval());
        // Ends once the transfer drops its sender
        while let Some(progress) = progress_rx.recv().await {
            let Some(percent) = progress.percent else {
                continue;
            };
            *last = DownloadProgress::percent(percent);
            if let Some(sample) = throttle.offer(*last) {
                ctx.index.upsert(content, IndexPatch::progress(sample)).await;
            }
        }
        if let Some(sample) = throttle.drain() {
            ctx.index.upsert(content, IndexPatch::progress(sample)).await;
        }
    };

    let (result, ()) = tokio::join!(bytes, persist);
    result
}

pub(super) async fn delete(ctx: &DownloadContext, reciter_id: u32, surah_id: u32) -> Result<()> {
    let content = DownloadableContent::surah_audio(reciter_id, surah_id);
    let file = ctx.audio_file(reciter_id, surah_id);
    delete_content(&ctx.index, &content, file.delete()).await
}
