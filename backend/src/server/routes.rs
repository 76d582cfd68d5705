//! REST API routes

use crate::content::{positive, DownloadableContent};
use crate::db::VerseWithTranslations;
use crate::error::{Error, Result};
use crate::index::DownloadIndexEntry;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Create API routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Download index
        .route("/downloads", get(list_downloads))
        .route("/downloads/clear-errors", post(clear_errors))
        // Translations
        .route(
            "/downloads/translations/{translation_id}",
            post(add_translation).delete(remove_translation),
        )
        // Tafsir
        .route("/downloads/tafsirs/surahs/{surah_id}", post(add_surah_tafsir))
        .route(
            "/downloads/tafsirs/{tafsir_id}/surahs/{surah_id}",
            delete(remove_surah_tafsir),
        )
        // Audio
        .route(
            "/downloads/audio/{reciter_id}/surahs/{surah_id}",
            post(add_surah_audio).delete(remove_surah_audio),
        )
        // Offline reading
        .route("/surahs/{surah_id}/verses", get(surah_verses))
}

/// Response after accepting a download
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub keys: Vec<String>,
}

fn accepted(keys: Vec<String>) -> (StatusCode, Json<AcceptedResponse>) {
    (StatusCode::ACCEPTED, Json(AcceptedResponse { keys }))
}

/// Run a download in the background; its outcome lands in the index.
fn spawn_download<F>(key: String, work: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match work.await {
            Ok(()) => info!("Download {} finished", key),
            Err(e) => error!("Download {} failed: {}", key, e),
        }
    });
}

/// List every download record
async fn list_downloads(State(state): State<Arc<AppState>>) -> Json<Vec<DownloadIndexEntry>> {
    Json(state.downloads.index().list().await)
}

/// Request to clear failed records
#[derive(Debug, Default, Deserialize)]
pub struct ClearErrorsRequest {
    /// Only this record; every failed record when absent
    #[serde(default)]
    pub content: Option<DownloadableContent>,
}

async fn clear_errors(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ClearErrorsRequest>>,
) -> Result<StatusCode, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    if let Some(content) = &req.content {
        content.validate()?;
    }
    state.downloads.index().clear_errors(req.content.as_ref()).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_translation(
    State(state): State<Arc<AppState>>,
    Path(translation_id): Path<u32>,
) -> Result<impl IntoResponse, AppError> {
    let content = DownloadableContent::translation(translation_id);
    content.validate()?;

    let downloads = state.downloads.clone();
    spawn_download(content.key(), async move {
        downloads.download_translation(translation_id).await
    });
    Ok(accepted(vec![content.key()]))
}

async fn remove_translation(
    State(state): State<Arc<AppState>>,
    Path(translation_id): Path<u32>,
) -> Result<StatusCode, AppError> {
    state.downloads.delete_translation(translation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request to download tafsir for one surah
#[derive(Debug, Deserialize)]
pub struct SurahTafsirRequest {
    pub tafsir_ids: Vec<u32>,
}

async fn add_surah_tafsir(
    State(state): State<Arc<AppState>>,
    Path(surah_id): Path<u32>,
    Json(req): Json<SurahTafsirRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.tafsir_ids.is_empty() {
        return Err(AppError::BadRequest("tafsir_ids must not be empty".into()));
    }
    let mut keys = Vec::with_capacity(req.tafsir_ids.len());
    for &tafsir_id in &req.tafsir_ids {
        let content = DownloadableContent::surah_tafsir(tafsir_id, surah_id);
        content.validate()?;
        keys.push(content.key());
    }

    let downloads = state.downloads.clone();
    spawn_download(format!("tafsir surah {}", surah_id), async move {
        downloads
            .download_surah_tafsir(surah_id, &req.tafsir_ids)
            .await
    });
    Ok(accepted(keys))
}

async fn remove_surah_tafsir(
    State(state): State<Arc<AppState>>,
    Path((tafsir_id, surah_id)): Path<(u32, u32)>,
) -> Result<StatusCode, AppError> {
    state.downloads.delete_surah_tafsir(tafsir_id, surah_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_surah_audio(
    State(state): State<Arc<AppState>>,
    Path((reciter_id, surah_id)): Path<(u32, u32)>,
) -> Result<impl IntoResponse, AppError> {
    let content = DownloadableContent::surah_audio(reciter_id, surah_id);
    content.validate()?;

    let downloads = state.downloads.clone();
    spawn_download(content.key(), async move {
        downloads.download_surah_audio(reciter_id, surah_id).await
    });
    Ok(accepted(vec![content.key()]))
}

async fn remove_surah_audio(
    State(state): State<Arc<AppState>>,
    Path((reciter_id, surah_id)): Path<(u32, u32)>,
) -> Result<StatusCode, AppError> {
    state.downloads.delete_surah_audio(reciter_id, surah_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Query for offline verses
#[derive(Debug, Default, Deserialize)]
pub struct VersesQuery {
    /// Comma-separated translation ids, e.g. `20,131`
    #[serde(default)]
    pub translations: Option<String>,
}

async fn surah_verses(
    State(state): State<Arc<AppState>>,
    Path(surah_id): Path<u32>,
    Query(query): Query<VersesQuery>,
) -> Result<Json<Vec<VerseWithTranslations>>, AppError> {
    positive("surahId", surah_id)?;
    let translation_ids = parse_ids(query.translations.as_deref().unwrap_or(""))?;

    let verses = state
        .downloads
        .db()
        .get_surah_verses_with_translations(surah_id, &translation_ids)
        .await?;
    Ok(Json(verses))
}

fn parse_ids(list: &str) -> Result<Vec<u32>, AppError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| AppError::BadRequest(format!("invalid translation id: {}", s)))
                .and_then(|id| {
                    positive("translationId", id)?;
                    Ok(id)
                })
        })
        .collect()
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(serde_json::json!({ "error": message }));
        (status, body).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        if err.is_validation() {
            AppError::BadRequest(err.to_string())
        } else if err.is_busy() {
            AppError::Conflict(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}
