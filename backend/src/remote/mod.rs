//! Remote content sources

mod http;

pub use http::HttpContentApi;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::Deserialize;

/// A translated verse as served by the API
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTranslation {
    pub resource_id: u32,
    pub text: String,
}

/// A verse with its translations
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVerse {
    pub verse_key: String,
    pub verse_number: u32,
    #[serde(default)]
    pub text_uthmani: String,
    #[serde(default)]
    pub translations: Vec<RemoteTranslation>,
}

/// One page of a surah's verses
#[derive(Debug, Clone)]
pub struct VersesPage {
    pub verses: Vec<RemoteVerse>,
    /// `None` on the last page
    pub next_page: Option<u32>,
}

/// JSON content endpoints
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// One page of verses of `surah_id` with `translation_id` attached.
    /// Pages start at 1.
    async fn verses_page(&self, surah_id: u32, translation_id: u32, page: u32) -> Result<VersesPage>;

    /// Ordered verse keys of a surah, e.g. `["1:1", "1:2", ...]`
    async fn verse_keys(&self, surah_id: u32) -> Result<Vec<String>>;

    /// Tafsir HTML for one verse
    async fn tafsir_text(&self, tafsir_id: u32, verse_key: &str) -> Result<String>;

    /// Location of a reciter's audio file for a surah
    async fn audio_url(&self, reciter_id: u32, surah_id: u32) -> Result<String>;
}

/// An opened binary response
pub struct ByteStream {
    /// Length of the body still to come, if the server reported one
    pub content_length: Option<u64>,
    /// Whether the server honoured the requested start offset
    pub resumed: bool,
    pub chunks: BoxStream<'static, Result<Bytes>>,
}

/// Binary downloads
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Start streaming `url`, asking the server to skip the first `offset` bytes.
    async fn open(&self, url: &str, offset: u64) -> Result<ByteStream>;
}
