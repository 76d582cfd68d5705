//! Quran Offline - download and index recitations, translations and tafsir
//! for use without a network connection.
//!
//! The [`download::DownloadManager`] drives each download through the
//! [`index::DownloadIndex`] state machine, writing text into the
//! [`db::OfflineDb`] and audio files to disk.

pub mod config;
pub mod content;
pub mod db;
pub mod download;
pub mod error;
pub mod index;
pub mod kv;
pub mod remote;
pub mod server;

pub use error::{Error, Result};

use crate::config::Settings;
use crate::db::OfflineDb;
use crate::download::{DownloadContext, DownloadManager};
use crate::index::DownloadIndex;
use crate::kv::FileKeyValueStore;
use crate::remote::HttpContentApi;
use parking_lot::RwLock;
use std::sync::Arc;

/// Application state shared across all components
pub struct AppState {
    pub settings: RwLock<Settings>,
    pub downloads: DownloadManager,
}

impl AppState {
    pub fn new(settings: Settings, downloads: DownloadManager) -> Self {
        Self {
            settings: RwLock::new(settings),
            downloads,
        }
    }

    /// Open the on-disk stores named by `settings` and wire up the HTTP API.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(settings: Settings) -> Result<Self> {
        let storage = settings.storage.clone();
        let db = OfflineDb::open(&storage.database_path())?;
        let index = Arc::new(DownloadIndex::new(Arc::new(FileKeyValueStore::new(
            storage.state_dir(),
        ))));
        let api = Arc::new(HttpContentApi::new(&settings.api)?);

        let downloads = DownloadManager::new(DownloadContext {
            index,
            db,
            api: api.clone(),
            bytes: api,
            audio_dir: storage.audio_dir(),
            settings: settings.downloads.clone(),
        });

        Ok(Self::new(settings, downloads))
    }
}
