//! Row types of the offline store

use serde::{Deserialize, Serialize};

/// One verse of the mushaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseRow {
    pub verse_key: String,
    pub surah_id: u32,
    pub ayah_number: u32,
    pub arabic_text: String,
}

/// One translated verse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRow {
    pub translation_id: u32,
    pub verse_key: String,
    pub text: String,
}

/// Rows written together in one transaction
#[derive(Debug, Clone, Default)]
pub struct VerseBatch {
    pub verses: Vec<VerseRow>,
    pub translations: Vec<TranslationRow>,
}

impl VerseBatch {
    pub fn is_empty(&self) -> bool {
        self.verses.is_empty() && self.translations.is_empty()
    }
}

/// Translation text attached to a verse in query results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerseTranslation {
    pub translation_id: u32,
    pub text: String,
}

/// A verse with the requested translations, in the requested order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerseWithTranslations {
    pub verse_key: String,
    pub surah_id: u32,
    pub ayah_number: u32,
    pub arabic_text: String,
    pub translations: Vec<VerseTranslation>,
}
