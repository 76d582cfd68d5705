//! Download orchestration: per-kind drivers of the index state machine

mod audio;
mod guard;
mod manager;
mod tafsir;
mod throttle;
mod transfer;
mod translation;

pub use guard::{InFlightGuard, Operation};
pub use manager::{DownloadContext, DownloadManager};
pub use throttle::ProgressThrottle;
pub use transfer::{FileTransfer, TransferProgress};
pub use translation::strip_html;

use crate::content::DownloadableContent;
use crate::error::{Error, Result};
use crate::index::{DownloadIndex, DownloadProgress, DownloadStatus, IndexPatch};
use std::future::Future;
use tracing::{debug, info};

/// Move a record to `downloading` unless there is nothing to do.
///
/// Returns `false` when the content is already installed (and
/// `installed_is_current`) or another operation owns the record.
async fn begin(
    index: &DownloadIndex,
    content: &DownloadableContent,
    initial: DownloadProgress,
    installed_is_current: bool,
) -> bool {
    if let Some(entry) = index.get(content).await {
        match entry.item.status {
            DownloadStatus::Installed if installed_is_current => {
                debug!("{} already installed", entry.key);
                return false;
            }
            status if status.is_in_flight() => {
                info!("Not starting {}: record is {}", entry.key, status.as_str());
                return false;
            }
            _ => {}
        }
    }

    index
        .upsert(
            content,
            IndexPatch::status(DownloadStatus::Queued)
                .clear_progress()
                .clear_error(),
        )
        .await;
    index
        .upsert(
            content,
            IndexPatch::status(DownloadStatus::Downloading).with_progress(initial),
        )
        .await;
    true
}

/// Shared delete protocol: `deleting`, run `removal`, then drop the record.
async fn delete_content<F>(index: &DownloadIndex, content: &DownloadableContent, removal: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match index.get(content).await {
        Some(entry)
            if matches!(
                entry.item.status,
                DownloadStatus::Queued | DownloadStatus::Downloading
            ) =>
        {
            return Err(Error::Busy(entry.key));
        }
        Some(_) => {}
        None => {
            // Untracked: clear any leftovers without creating a record
            removal.await?;
            debug!("Nothing tracked for {}", content);
            return Ok(());
        }
    }

    index
        .upsert(
            content,
            IndexPatch::status(DownloadStatus::Deleting)
                .clear_progress()
                .clear_error(),
        )
        .await;

    match removal.await {
        Ok(()) => {
            index.remove(content).await;
            info!("Deleted {}", content);
            Ok(())
        }
        Err(e) => {
            index.upsert(content, IndexPatch::failed(e.to_string(), None)).await;
            Err(e)
        }
    }
}
