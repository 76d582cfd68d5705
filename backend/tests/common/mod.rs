//! In-process fakes for the remote API and the audio host

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use parking_lot::Mutex;
use quran_offline::config::DownloadSettings;
use quran_offline::db::OfflineDb;
use quran_offline::download::{DownloadContext, DownloadManager};
use quran_offline::index::DownloadIndex;
use quran_offline::kv::MemoryKeyValueStore;
use quran_offline::remote::{
    ByteSource, ByteStream, ContentApi, RemoteTranslation, RemoteVerse, VersesPage,
};
use quran_offline::{Error, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Content API serving a small, predictable Quran
pub struct FakeApi {
    /// Verses in every surah
    pub verses_per_surah: u32,
    /// Verses per page of `verses_page`
    pub page_size: u32,
    /// `verses_page` fails once it reaches this surah
    pub fail_translation_at: Option<u32>,
    /// `verse_keys` fails
    pub fail_verse_keys: bool,
    /// `(tafsir_id, verse_key)` pairs whose text cannot be fetched
    pub failing_tafsir: HashSet<(u32, String)>,
    pub verse_key_lookups: AtomicUsize,
    pub tafsir_requests: AtomicUsize,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            verses_per_surah: 3,
            page_size: 2,
            fail_translation_at: None,
            fail_verse_keys: false,
            failing_tafsir: HashSet::new(),
            verse_key_lookups: AtomicUsize::new(0),
            tafsir_requests: AtomicUsize::new(0),
        }
    }
}

impl FakeApi {
    pub fn failing_tafsir(mut self, tafsir_id: u32, verse_key: &str) -> Self {
        self.failing_tafsir.insert((tafsir_id, verse_key.to_string()));
        self
    }
}

fn unavailable(url: String) -> Error {
    Error::Http { status: 503, url }
}

#[async_trait]
impl ContentApi for FakeApi {
    async fn verses_page(&self, surah_id: u32, translation_id: u32, page: u32) -> Result<VersesPage> {
        if self.fail_translation_at == Some(surah_id) {
            return Err(unavailable(format!("verses/by_chapter/{surah_id}")));
        }

        let first = (page - 1) * self.page_size + 1;
        let last = (page * self.page_size).min(self.verses_per_surah);
        let verses = (first..=last)
            .map(|ayah| RemoteVerse {
                verse_key: format!("{surah_id}:{ayah}"),
                verse_number: ayah,
                text_uthmani: format!("arabic {surah_id}:{ayah}"),
                translations: vec![RemoteTranslation {
                    resource_id: translation_id,
                    text: format!("<p>t{translation_id} {surah_id}:{ayah}<sup foot_note=1>1</sup></p>"),
                }],
            })
            .collect();

        let next_page = (last < self.verses_per_surah).then_some(page + 1);
        Ok(VersesPage { verses, next_page })
    }

    async fn verse_keys(&self, surah_id: u32) -> Result<Vec<String>> {
        self.verse_key_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_verse_keys {
            return Err(unavailable(format!("verses/by_chapter/{surah_id}")));
        }
        Ok((1..=self.verses_per_surah)
            .map(|ayah| format!("{surah_id}:{ayah}"))
            .collect())
    }

    async fn tafsir_text(&self, tafsir_id: u32, verse_key: &str) -> Result<String> {
        self.tafsir_requests.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_tafsir
            .contains(&(tafsir_id, verse_key.to_string()))
        {
            return Err(unavailable(format!("tafsirs/{tafsir_id}/by_ayah/{verse_key}")));
        }
        Ok(format!("<p>tafsir {tafsir_id} on {verse_key}</p>"))
    }

    async fn audio_url(&self, reciter_id: u32, surah_id: u32) -> Result<String> {
        Ok(format!("https://audio.test/{reciter_id}/{surah_id:03}.mp3"))
    }
}

/// Audio host serving a fixed body in equal chunks
pub struct FakeBytes {
    pub body: Vec<u8>,
    pub chunk_size: usize,
    /// Stream errors after this many chunks
    pub fail_after_chunks: Option<usize>,
    pub chunk_delay: Duration,
    pub report_length: bool,
    pub opens: AtomicUsize,
    pub urls: Mutex<Vec<String>>,
}

impl Default for FakeBytes {
    fn default() -> Self {
        Self {
            body: vec![7u8; 1000],
            chunk_size: 100,
            fail_after_chunks: None,
            chunk_delay: Duration::ZERO,
            report_length: true,
            opens: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBytes {
    pub fn slow(delay: Duration) -> Self {
        Self {
            chunk_delay: delay,
            ..Self::default()
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ByteSource for FakeBytes {
    async fn open(&self, url: &str, _offset: u64) -> Result<ByteStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_string());

        let mut chunks: Vec<Result<Bytes>> = self
            .body
            .chunks(self.chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if let Some(n) = self.fail_after_chunks {
            chunks.truncate(n);
            chunks.push(Err(Error::Transfer("connection reset".into())));
        }

        let delay = self.chunk_delay;
        let chunks = stream::iter(chunks)
            .then(move |chunk| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                chunk
            })
            .boxed();

        Ok(ByteStream {
            content_length: self.report_length.then_some(self.body.len() as u64),
            resumed: false,
            chunks,
        })
    }
}

/// A manager wired to fakes, an in-memory database and a temp audio dir
pub struct Harness {
    pub manager: DownloadManager,
    pub api: Arc<FakeApi>,
    pub bytes: Arc<FakeBytes>,
    pub kv: Arc<MemoryKeyValueStore>,
    pub audio_dir: PathBuf,
    _dir: TempDir,
}

impl Harness {
    pub fn new(api: FakeApi, bytes: FakeBytes) -> Self {
        let settings = DownloadSettings {
            audio_progress_interval_ms: 0,
            tafsir_progress_step: 1,
        };
        Self::with_settings(api, bytes, settings)
    }

    pub fn with_settings(api: FakeApi, bytes: FakeBytes, settings: DownloadSettings) -> Self {
        let dir = TempDir::new().unwrap();
        let audio_dir = dir.path().join("audio");
        let api = Arc::new(api);
        let bytes = Arc::new(bytes);
        let kv = Arc::new(MemoryKeyValueStore::new());

        let manager = DownloadManager::new(DownloadContext {
            index: Arc::new(DownloadIndex::new(kv.clone())),
            db: OfflineDb::open_in_memory().unwrap(),
            api: api.clone(),
            bytes: bytes.clone(),
            audio_dir: audio_dir.clone(),
            settings,
        });

        Self {
            manager,
            api,
            bytes,
            kv,
            audio_dir,
            _dir: dir,
        }
    }

    pub fn audio_path(&self, reciter_id: u32, surah_id: u32) -> PathBuf {
        self.audio_dir
            .join(reciter_id.to_string())
            .join(format!("{surah_id:03}.mp3"))
    }
}
