//! Settings data structures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Remote content API
    #[serde(default)]
    pub api: ApiSettings,

    /// Where offline data lives
    #[serde(default)]
    pub storage: StorageSettings,

    /// Download tuning
    #[serde(default)]
    pub downloads: DownloadSettings,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8788,
        }
    }
}

/// Remote content API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
    pub user_agent: String,

    /// Verses requested per page when paging through a surah
    pub per_page: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.quran.com/api/v4".to_string(),
            user_agent: format!("QuranOffline/{}", env!("CARGO_PKG_VERSION")),
            per_page: 50,
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("quran-offline"),
        }
    }
}

impl StorageSettings {
    /// SQLite file holding verses, translations and tafsir
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("offline.db")
    }

    /// Directory of the key-value blobs (download index, small settings)
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    /// Root of the per-reciter audio folders
    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }
}

/// Download tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Minimum gap between persisted audio progress updates
    pub audio_progress_interval_ms: u64,

    /// Persist tafsir progress every this many verses
    pub tafsir_progress_step: u32,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            audio_progress_interval_ms: 800,
            tafsir_progress_step: 5,
        }
    }
}

impl DownloadSettings {
    pub fn audio_progress_interval(&self) -> Duration {
        Duration::from_millis(self.audio_progress_interval_ms)
    }
}
