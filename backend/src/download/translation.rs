//! Whole-translation download: every surah, page by page

use super::{begin, delete_content, DownloadContext};
use crate::content::{DownloadableContent, SURAH_COUNT};
use crate::db::{TranslationRow, VerseBatch, VerseRow};
use crate::error::Result;
use crate::index::{DownloadProgress, IndexPatch};
use crate::remote::RemoteVerse;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

static FOOTNOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<sup[^>]*>.*?</sup>").expect("footnote regex is valid"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Plain text of a translation: footnote markers dropped, tags removed,
/// common entities decoded, whitespace collapsed.
pub fn strip_html(html: &str) -> String {
    let text = FOOTNOTE.replace_all(html, "");
    let text = TAG.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

pub(super) async fn download(ctx: &DownloadContext, translation_id: u32) -> Result<()> {
    let content = DownloadableContent::translation(translation_id);
    let initial = DownloadProgress::items(0, SURAH_COUNT);
    if !begin(&ctx.index, &content, initial, true).await {
        return Ok(());
    }

    info!("Downloading translation {}", translation_id);
    let mut last = initial;
    match fetch_all_surahs(ctx, &content, translation_id, &mut last).await {
        Ok(()) => {
            ctx.index.upsert(&content, IndexPatch::installed()).await;
            info!("Translation {} installed", translation_id);
            Ok(())
        }
        Err(e) => {
            warn!("Translation {} failed: {}", translation_id, e);
            ctx.index
                .upsert(&content, IndexPatch::failed(e.to_string(), Some(last)))
                .await;
            if let Err(cleanup) = ctx.db.delete_translation(translation_id).await {
                warn!(
                    "Could not remove partial translation {}: {}",
                    translation_id, cleanup
                );
            }
            Err(e)
        }
    }
}

async fn fetch_all_surahs(
    ctx: &DownloadContext,
    content: &DownloadableContent,
    translation_id: u32,
    last: &mut DownloadProgress,
) -> Result<()> {
    for surah_id in 1..=SURAH_COUNT {
        let mut page = 1;
        loop {
            let fetched = ctx.api.verses_page(surah_id, translation_id, page).await?;
            let batch = to_batch(surah_id, translation_id, &fetched.verses);
            debug!(
                "Translation {} surah {} page {}: {} verses",
                translation_id,
                surah_id,
                page,
                batch.verses.len()
            );
            ctx.db.upsert_verses_and_translations(batch).await?;

            match fetched.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        *last = DownloadProgress::items(surah_id, SURAH_COUNT);
        ctx.index.upsert(content, IndexPatch::progress(*last)).await;
    }
    Ok(())
}

fn to_batch(surah_id: u32, translation_id: u32, verses: &[RemoteVerse]) -> VerseBatch {
    let mut batch = VerseBatch::default();
    for verse in verses {
        batch.verses.push(VerseRow {
            verse_key: verse.verse_key.clone(),
            surah_id,
            ayah_number: verse.verse_number,
            arabic_text: verse.text_uthmani.clone(),
        });
        batch.translations.extend(
            verse
                .translations
                .iter()
                .filter(|t| t.resource_id == translation_id)
                .map(|t| TranslationRow {
                    translation_id,
                    verse_key: verse.verse_key.clone(),
                    text: strip_html(&t.text),
                }),
        );
    }
    batch
}

pub(super) async fn delete(ctx: &DownloadContext, translation_id: u32) -> Result<()> {
    let content = DownloadableContent::translation(translation_id);
    delete_content(&ctx.index, &content, ctx.db.delete_translation(translation_id)).await
}
