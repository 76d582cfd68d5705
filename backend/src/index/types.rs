//! Download index record types

use crate::content::DownloadableContent;
use serde::{Deserialize, Serialize};

/// Lifecycle status of one download unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Installed,
    Failed,
    Deleting,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Installed => "installed",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
        }
    }

    /// Queued, downloading or deleting.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Queued | Self::Downloading | Self::Deleting)
    }
}

/// Progress snapshot, either a percentage or a count of finished units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DownloadProgress {
    Percent { percent: u8 },
    Items { completed: u32, total: u32 },
}

impl DownloadProgress {
    pub fn percent(percent: u8) -> Self {
        Self::Percent {
            percent: percent.min(100),
        }
    }

    pub fn items(completed: u32, total: u32) -> Self {
        Self::Items {
            completed: completed.min(total),
            total,
        }
    }
}

/// Lifecycle record for one content key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadIndexItem {
    pub content: DownloadableContent,
    pub status: DownloadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<DownloadProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Epoch milliseconds
    pub created_at: i64,
    /// Epoch milliseconds, never decreases
    pub updated_at: i64,
}

/// An index record together with its key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadIndexEntry {
    pub key: String,
    #[serde(flatten)]
    pub item: DownloadIndexItem,
}

/// How a patch treats one optional field
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PatchField<T> {
    /// Leave the stored value alone
    #[default]
    Keep,
    /// Remove the stored value
    Clear,
    Set(T),
}

impl<T> PatchField<T> {
    pub(crate) fn apply(self, slot: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Clear => *slot = None,
            Self::Set(value) => *slot = Some(value),
        }
    }
}

/// Partial update merged into a record by `DownloadIndex::upsert`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexPatch {
    pub status: Option<DownloadStatus>,
    pub progress: PatchField<DownloadProgress>,
    pub error: PatchField<String>,
}

impl IndexPatch {
    pub fn status(status: DownloadStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(progress: DownloadProgress) -> Self {
        Self {
            progress: PatchField::Set(progress),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, progress: DownloadProgress) -> Self {
        self.progress = PatchField::Set(progress);
        self
    }

    /// Keep `progress` if given, otherwise leave the stored one untouched.
    pub fn with_progress_opt(self, progress: Option<DownloadProgress>) -> Self {
        match progress {
            Some(progress) => self.with_progress(progress),
            None => self,
        }
    }

    pub fn clear_progress(mut self) -> Self {
        self.progress = PatchField::Clear;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = PatchField::Set(error.into());
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = PatchField::Clear;
        self
    }

    /// Terminal success: installed, no progress, no error.
    pub fn installed() -> Self {
        Self::status(DownloadStatus::Installed)
            .clear_progress()
            .clear_error()
    }

    /// Terminal failure keeping the last known progress.
    pub fn failed(error: impl Into<String>, last_progress: Option<DownloadProgress>) -> Self {
        Self::status(DownloadStatus::Failed)
            .with_error(error)
            .with_progress_opt(last_progress)
    }
}
