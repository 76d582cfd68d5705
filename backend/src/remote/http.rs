//! reqwest-backed content API

use super::{ByteSource, ByteStream, ContentApi, RemoteVerse, VersesPage};
use crate::config::ApiSettings;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
struct VersesResponse {
    verses: Vec<RemoteVerse>,
    pagination: Pagination,
}

#[derive(Deserialize)]
struct Pagination {
    next_page: Option<u32>,
}

#[derive(Deserialize)]
struct ChapterResponse {
    chapter: Chapter,
}

#[derive(Deserialize)]
struct Chapter {
    verses_count: u32,
}

#[derive(Deserialize)]
struct TafsirResponse {
    tafsir: Tafsir,
}

#[derive(Deserialize)]
struct Tafsir {
    text: String,
}

#[derive(Deserialize)]
struct RecitationResponse {
    audio_file: RecitationFile,
}

#[derive(Deserialize)]
struct RecitationFile {
    audio_url: String,
}

/// Client for the public Quran content API
#[derive(Clone)]
pub struct HttpContentApi {
    client: reqwest::Client,
    base_url: String,
    per_page: u32,
}

impl HttpContentApi {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            per_page: settings.per_page.max(1),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ContentApi for HttpContentApi {
    async fn verses_page(&self, surah_id: u32, translation_id: u32, page: u32) -> Result<VersesPage> {
        let response: VersesResponse = self
            .get_json(
                &format!("/verses/by_chapter/{surah_id}"),
                &[
                    ("translations", translation_id.to_string()),
                    ("fields", "text_uthmani".to_string()),
                    ("page", page.to_string()),
                    ("per_page", self.per_page.to_string()),
                ],
            )
            .await?;

        Ok(VersesPage {
            verses: response.verses,
            next_page: response.pagination.next_page,
        })
    }

    async fn verse_keys(&self, surah_id: u32) -> Result<Vec<String>> {
        let response: ChapterResponse = self.get_json(&format!("/chapters/{surah_id}"), &[]).await?;
        Ok(verse_keys_for(surah_id, response.chapter.verses_count))
    }

    async fn tafsir_text(&self, tafsir_id: u32, verse_key: &str) -> Result<String> {
        let response: TafsirResponse = self
            .get_json(&format!("/tafsirs/{tafsir_id}/by_ayah/{verse_key}"), &[])
            .await?;
        Ok(response.tafsir.text)
    }

    async fn audio_url(&self, reciter_id: u32, surah_id: u32) -> Result<String> {
        let response: RecitationResponse = self
            .get_json(&format!("/chapter_recitations/{reciter_id}/{surah_id}"), &[])
            .await?;
        Ok(response.audio_file.audio_url)
    }
}

#[async_trait]
impl ByteSource for HttpContentApi {
    async fn open(&self, url: &str, offset: u64) -> Result<ByteStream> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(header::RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(ByteStream {
            content_length: response.content_length(),
            resumed: offset > 0 && status == StatusCode::PARTIAL_CONTENT,
            chunks: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(Error::from))
                .boxed(),
        })
    }
}

fn verse_keys_for(surah_id: u32, verses_count: u32) -> Vec<String> {
    (1..=verses_count)
        .map(|ayah| format!("{surah_id}:{ayah}"))
        .collect()
}
