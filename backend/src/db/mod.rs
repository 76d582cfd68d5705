//! Offline store for verse text, translations and tafsir

mod migrations;
mod schema;

pub use migrations::{latest_version, MigrationOutcome, MIGRATIONS};
pub use schema::*;

use crate::error::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// SQLite wrapper; every call runs on the blocking pool
#[derive(Clone)]
pub struct OfflineDb {
    conn: Arc<Mutex<Connection>>,
}

impl OfflineDb {
    /// Open (or create) the store at `path` and bring its schema up to date
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Re-run pending migrations; a no-op on an up-to-date store.
    pub async fn migrate(&self) -> Result<MigrationOutcome> {
        self.run(migrations::migrate).await
    }

    /// Insert or overwrite verses and translations atomically.
    pub async fn upsert_verses_and_translations(&self, batch: VerseBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        self.run(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut verse_stmt = tx.prepare_cached(
                    r#"
                    INSERT INTO verses (verse_key, surah_id, ayah_number, arabic_text)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(verse_key) DO UPDATE SET
                        surah_id = excluded.surah_id,
                        ayah_number = excluded.ayah_number,
                        arabic_text = excluded.arabic_text
                    "#,
                )?;
                for verse in &batch.verses {
                    verse_stmt.execute(params![
                        verse.verse_key,
                        verse.surah_id,
                        verse.ayah_number,
                        verse.arabic_text,
                    ])?;
                }

                let mut translation_stmt = tx.prepare_cached(
                    r#"
                    INSERT INTO translations (translation_id, verse_key, text)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(translation_id, verse_key) DO UPDATE SET text = excluded.text
                    "#,
                )?;
                for translation in &batch.translations {
                    translation_stmt.execute(params![
                        translation.translation_id,
                        translation.verse_key,
                        translation.text,
                    ])?;
                }
            }
            tx.commit()
        })
        .await
    }

    /// Verses of a surah in ayah order, each carrying the requested
    /// translations in the requested order. Ids without stored text are
    /// left out rather than padded.
    pub async fn get_surah_verses_with_translations(
        &self,
        surah_id: u32,
        translation_ids: &[u32],
    ) -> Result<Vec<VerseWithTranslations>> {
        let mut requested: Vec<u32> = Vec::with_capacity(translation_ids.len());
        for id in translation_ids {
            if !requested.contains(id) {
                requested.push(*id);
            }
        }

        self.run(move |conn| {
            let mut stmt = conn.prepare_cached(
                r#"
                SELECT verse_key, surah_id, ayah_number, arabic_text
                FROM verses
                WHERE surah_id = ?1
                ORDER BY ayah_number ASC
                "#,
            )?;
            let verses = stmt
                .query_map([surah_id], |row| {
                    Ok(VerseRow {
                        verse_key: row.get(0)?,
                        surah_id: row.get(1)?,
                        ayah_number: row.get(2)?,
                        arabic_text: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut texts: HashMap<(String, u32), String> = HashMap::new();
            if !requested.is_empty() {
                let placeholders = (0..requested.len())
                    .map(|i| format!("?{}", i + 2))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    r#"
                    SELECT t.verse_key, t.translation_id, t.text
                    FROM translations t
                    JOIN verses v ON v.verse_key = t.verse_key
                    WHERE v.surah_id = ?1 AND t.translation_id IN ({placeholders})
                    "#
                );
                let mut stmt = conn.prepare(&sql)?;
                let args = std::iter::once(surah_id).chain(requested.iter().copied());
                let rows = stmt.query_map(params_from_iter(args), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?, row.get::<_, String>(2)?))
                })?;
                for row in rows {
                    let (verse_key, translation_id, text) = row?;
                    texts.insert((verse_key, translation_id), text);
                }
            }

            Ok(verses
                .into_iter()
                .map(|verse| {
                    let translations = requested
                        .iter()
                        .filter_map(|id| {
                            texts
                                .remove(&(verse.verse_key.clone(), *id))
                                .map(|text| VerseTranslation {
                                    translation_id: *id,
                                    text,
                                })
                        })
                        .collect();
                    VerseWithTranslations {
                        verse_key: verse.verse_key,
                        surah_id: verse.surah_id,
                        ayah_number: verse.ayah_number,
                        arabic_text: verse.arabic_text,
                        translations,
                    }
                })
                .collect())
        })
        .await
    }

    /// Remove a translation and any verse no other translation still uses.
    pub async fn delete_translation(&self, translation_id: u32) -> Result<()> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM translations WHERE translation_id = ?1",
                [translation_id],
            )?;
            tx.execute(
                r#"
                DELETE FROM verses
                WHERE NOT EXISTS (
                    SELECT 1 FROM translations t WHERE t.verse_key = verses.verse_key
                )
                "#,
                [],
            )?;
            tx.commit()
        })
        .await
    }

    /// Number of stored rows for one translation
    pub async fn translation_row_count(&self, translation_id: u32) -> Result<u64> {
        self.run(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM translations WHERE translation_id = ?1",
                [translation_id],
                |row| row.get(0),
            )
        })
        .await
    }

    pub async fn upsert_tafsir(
        &self,
        tafsir_id: u32,
        surah_id: u32,
        verse_key: &str,
        html: &str,
    ) -> Result<()> {
        let verse_key = verse_key.to_string();
        let html = html.to_string();
        self.run(move |conn| {
            conn.execute(
                r#"
                INSERT INTO tafsirs (tafsir_id, verse_key, surah_id, html)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(tafsir_id, verse_key) DO UPDATE SET
                    surah_id = excluded.surah_id,
                    html = excluded.html
                "#,
                params![tafsir_id, verse_key, surah_id, html],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_tafsir(&self, tafsir_id: u32, verse_key: &str) -> Result<Option<String>> {
        let verse_key = verse_key.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT html FROM tafsirs WHERE tafsir_id = ?1 AND verse_key = ?2",
                params![tafsir_id, verse_key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    /// Remove one tafsir's cached text for a surah, returning the row count.
    pub async fn delete_tafsir_for_surah(&self, tafsir_id: u32, surah_id: u32) -> Result<usize> {
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM tafsirs WHERE tafsir_id = ?1 AND surah_id = ?2",
                params![tafsir_id, surah_id],
            )
        })
        .await
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))?
        .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verse(surah_id: u32, ayah_number: u32) -> VerseRow {
        VerseRow {
            verse_key: format!("{surah_id}:{ayah_number}"),
            surah_id,
            ayah_number,
            arabic_text: format!("arabic {surah_id}:{ayah_number}"),
        }
    }

    fn translation(translation_id: u32, verse_key: &str) -> TranslationRow {
        TranslationRow {
            translation_id,
            verse_key: verse_key.to_string(),
            text: format!("t{translation_id} {verse_key}"),
        }
    }

    async fn seeded() -> OfflineDb {
        let db = OfflineDb::open_in_memory().unwrap();
        // Surah 1: verses 1-3, translation 20 everywhere, 131 only on 1:2
        db.upsert_verses_and_translations(VerseBatch {
            verses: vec![verse(1, 3), verse(1, 1), verse(1, 2)],
            translations: vec![
                translation(20, "1:1"),
                translation(20, "1:2"),
                translation(20, "1:3"),
                translation(131, "1:2"),
            ],
        })
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn verses_come_back_in_ayah_order_with_requested_translations() {
        let db = seeded().await;

        let verses = db
            .get_surah_verses_with_translations(1, &[131, 20])
            .await
            .unwrap();
        let keys: Vec<_> = verses.iter().map(|v| v.verse_key.as_str()).collect();
        assert_eq!(keys, vec!["1:1", "1:2", "1:3"]);

        let ids: Vec<Vec<u32>> = verses
            .iter()
            .map(|v| v.translations.iter().map(|t| t.translation_id).collect())
            .collect();
        assert_eq!(ids, vec![vec![20], vec![131, 20], vec![20]]);
    }

    #[tokio::test]
    async fn no_requested_ids_means_no_translations() {
        let db = seeded().await;
        let verses = db.get_surah_verses_with_translations(1, &[]).await.unwrap();
        assert_eq!(verses.len(), 3);
        assert!(verses.iter().all(|v| v.translations.is_empty()));
    }

    #[tokio::test]
    async fn upsert_overwrites_on_conflict() {
        let db = seeded().await;
        db.upsert_verses_and_translations(VerseBatch {
            verses: vec![VerseRow {
                arabic_text: "updated".into(),
                ..verse(1, 1)
            }],
            translations: vec![TranslationRow {
                text: "new text".into(),
                ..translation(20, "1:1")
            }],
        })
        .await
        .unwrap();

        let verses = db.get_surah_verses_with_translations(1, &[20]).await.unwrap();
        assert_eq!(verses[0].arabic_text, "updated");
        assert_eq!(verses[0].translations[0].text, "new text");
        assert_eq!(db.translation_row_count(20).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_translation_collects_orphaned_verses_only() {
        let db = seeded().await;

        db.delete_translation(20).await.unwrap();

        let verses = db
            .get_surah_verses_with_translations(1, &[20, 131])
            .await
            .unwrap();
        assert_eq!(verses.len(), 1);
        assert_eq!(verses[0].verse_key, "1:2");
        assert_eq!(
            verses[0].translations,
            vec![VerseTranslation {
                translation_id: 131,
                text: "t131 1:2".into()
            }]
        );
        assert_eq!(db.translation_row_count(20).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn translation_must_reference_a_verse() {
        let db = OfflineDb::open_in_memory().unwrap();
        let err = db
            .upsert_verses_and_translations(VerseBatch {
                verses: vec![],
                translations: vec![translation(20, "9:9")],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn tafsir_rows_are_scoped_by_surah() {
        let db = OfflineDb::open_in_memory().unwrap();
        db.upsert_tafsir(1, 1, "1:1", "<p>a</p>").await.unwrap();
        db.upsert_tafsir(1, 2, "2:1", "<p>b</p>").await.unwrap();
        db.upsert_tafsir(1, 1, "1:1", "<p>c</p>").await.unwrap();

        assert_eq!(db.get_tafsir(1, "1:1").await.unwrap().as_deref(), Some("<p>c</p>"));
        assert_eq!(db.delete_tafsir_for_surah(1, 1).await.unwrap(), 1);
        assert_eq!(db.get_tafsir(1, "1:1").await.unwrap(), None);
        assert!(db.get_tafsir(1, "2:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reopening_a_file_keeps_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.db");

        let db = OfflineDb::open(&path).unwrap();
        db.upsert_verses_and_translations(VerseBatch {
            verses: vec![verse(2, 1)],
            translations: vec![],
        })
        .await
        .unwrap();
        drop(db);

        let db = OfflineDb::open(&path).unwrap();
        assert_eq!(
            db.migrate().await.unwrap(),
            MigrationOutcome::UpToDate {
                version: latest_version()
            }
        );
        assert_eq!(db.get_surah_verses_with_translations(2, &[]).await.unwrap().len(), 1);
    }
}
