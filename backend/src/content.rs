//! Identity of downloadable content units

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of surahs in the mushaf
pub const SURAH_COUNT: u32 = 114;

/// What can be downloaded for offline use.
///
/// Serialized with a `kind` tag, e.g. `{"kind":"audio","reciterId":3,"surahId":2}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum DownloadableContent {
    /// A full translation, all surahs
    Translation { translation_id: u32 },

    /// A tafsir, either whole or scoped to one surah
    Tafsir {
        tafsir_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        surah_id: Option<u32>,
    },

    /// One reciter's recitation of one surah
    Audio { reciter_id: u32, surah_id: u32 },

    /// Word-by-word data of one surah
    Words { surah_id: u32 },
}

impl DownloadableContent {
    pub fn translation(translation_id: u32) -> Self {
        Self::Translation { translation_id }
    }

    pub fn surah_tafsir(tafsir_id: u32, surah_id: u32) -> Self {
        Self::Tafsir {
            tafsir_id,
            surah_id: Some(surah_id),
        }
    }

    pub fn surah_audio(reciter_id: u32, surah_id: u32) -> Self {
        Self::Audio {
            reciter_id,
            surah_id,
        }
    }

    /// Canonical download key.
    ///
    /// The scope discriminator is part of the key so that `tafsir:7` and
    /// `tafsir:7:surah:2` never collide.
    pub fn key(&self) -> String {
        match self {
            Self::Translation { translation_id } => format!("translation:{translation_id}"),
            Self::Tafsir {
                tafsir_id,
                surah_id: None,
            } => format!("tafsir:{tafsir_id}"),
            Self::Tafsir {
                tafsir_id,
                surah_id: Some(surah_id),
            } => format!("tafsir:{tafsir_id}:surah:{surah_id}"),
            Self::Audio {
                reciter_id,
                surah_id,
            } => format!("audio:{reciter_id}:surah:{surah_id}"),
            Self::Words { surah_id } => format!("words:surah:{surah_id}"),
        }
    }

    /// Reject non-positive identifiers.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Translation { translation_id } => positive("translationId", translation_id),
            Self::Tafsir {
                tafsir_id,
                surah_id,
            } => {
                positive("tafsirId", tafsir_id)?;
                surah_id.map_or(Ok(()), |id| positive("surahId", id))
            }
            Self::Audio {
                reciter_id,
                surah_id,
            } => {
                positive("reciterId", reciter_id)?;
                positive("surahId", surah_id)
            }
            Self::Words { surah_id } => positive("surahId", surah_id),
        }
    }
}

impl fmt::Display for DownloadableContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Fail with `InvalidId` unless `value > 0`.
pub fn positive(field: &'static str, value: u32) -> Result<()> {
    if value == 0 {
        return Err(Error::InvalidId { field, value });
    }
    Ok(())
}
