//! Surah-scoped tafsir download, verse by verse, for several tafsir ids

use super::{begin, delete_content, DownloadContext, InFlightGuard, Operation};
use crate::content::{positive, DownloadableContent};
use crate::error::{Error, Result};
use crate::index::{DownloadProgress, IndexPatch};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Verse keys of the surah, looked up once per request and shared by all ids
type VerseKeys = Arc<OnceCell<std::result::Result<Arc<Vec<String>>, Arc<Error>>>>;

pub(super) async fn download_surah(
    ctx: &Arc<DownloadContext>,
    guard: &InFlightGuard,
    surah_id: u32,
    tafsir_ids: &[u32],
) -> Result<()> {
    positive("surahId", surah_id)?;
    let mut ids: Vec<u32> = Vec::with_capacity(tafsir_ids.len());
    for &id in tafsir_ids {
        positive("tafsirId", id)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    let verse_keys: VerseKeys = Arc::new(OnceCell::new());
    let mut failed = Vec::new();

    for tafsir_id in ids {
        let content = DownloadableContent::surah_tafsir(tafsir_id, surah_id);
        let work = {
            let ctx = Arc::clone(ctx);
            let verse_keys = Arc::clone(&verse_keys);
            async move { download_one(&ctx, &verse_keys, tafsir_id, surah_id).await }
        };

        if let Err(e) = guard.run(content.key(), Operation::Download, work).await {
            warn!("Tafsir {} for surah {} failed: {}", tafsir_id, surah_id, e);
            failed.push(tafsir_id);
        }
    }

    // A failed lookup fails every id with the same cause; report that cause
    if let Some(Err(lookup)) = verse_keys.get() {
        return Err(Error::Shared(Arc::clone(lookup)));
    }
    if failed.is_empty() {
        Ok(())
    } else {
        Err(Error::TafsirFailed {
            surah_id,
            tafsir_ids: failed,
        })
    }
}

async fn download_one(
    ctx: &DownloadContext,
    verse_keys: &VerseKeys,
    tafsir_id: u32,
    surah_id: u32,
) -> Result<()> {
    let content = DownloadableContent::surah_tafsir(tafsir_id, surah_id);
    if !begin(&ctx.index, &content, DownloadProgress::items(0, 0), true).await {
        return Ok(());
    }

    let lookup = verse_keys
        .get_or_init(|| async {
            ctx.api
                .verse_keys(surah_id)
                .await
                .map(Arc::new)
                .map_err(Arc::new)
        })
        .await;
    let keys = match lookup {
        Ok(keys) => Arc::clone(keys),
        Err(e) => {
            ctx.index
                .upsert(&content, IndexPatch::failed(e.to_string(), None))
                .await;
            return Err(Error::Shared(Arc::clone(e)));
        }
    };

    info!(
        "Downloading tafsir {} for surah {} ({} verses)",
        tafsir_id,
        surah_id,
        keys.len()
    );
    let total = keys.len() as u32;
    let step = ctx.settings.tafsir_progress_step.max(1);
    let mut done = 0u32;
    ctx.index
        .upsert(&content, IndexPatch::progress(DownloadProgress::items(0, total)))
        .await;

    let result: Result<()> = async {
        for verse_key in keys.iter() {
            let html = ctx.api.tafsir_text(tafsir_id, verse_key).await?;
            ctx.db
                .upsert_tafsir(tafsir_id, surah_id, verse_key, &html)
                .await?;
            done += 1;

            if done % step == 0 || done == total {
                ctx.index
                    .upsert(&content, IndexPatch::progress(DownloadProgress::items(done, total)))
                    .await;
            }
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            ctx.index.upsert(&content, IndexPatch::installed()).await;
            info!("Tafsir {} for surah {} installed", tafsir_id, surah_id);
            Ok(())
        }
        Err(e) => {
            ctx.index
                .upsert(
                    &content,
                    IndexPatch::failed(e.to_string(), Some(DownloadProgress::items(done, total))),
                )
                .await;
            Err(e)
        }
    }
}

pub(super) async fn delete(ctx: &DownloadContext, tafsir_id: u32, surah_id: u32) -> Result<()> {
    let content = DownloadableContent::surah_tafsir(tafsir_id, surah_id);
    delete_content(&ctx.index, &content, async {
        ctx.db.delete_tafsir_for_surah(tafsir_id, surah_id).await?;
        Ok(())
    })
    .await
}
