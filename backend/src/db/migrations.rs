//! Versioned schema migrations
//!
//! The applied version is kept in `PRAGMA user_version`.

use rusqlite::Connection;
use tracing::{info, warn};

/// One additive schema step
pub struct Migration {
    pub version: u32,
    pub statements: &'static [&'static str],
}

/// Every known migration, in increasing version order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS verses (
                verse_key TEXT PRIMARY KEY,
                surah_id INTEGER NOT NULL,
                ayah_number INTEGER NOT NULL,
                arabic_text TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_verses_surah ON verses(surah_id, ayah_number)",
            r#"
            CREATE TABLE IF NOT EXISTS translations (
                translation_id INTEGER NOT NULL,
                verse_key TEXT NOT NULL REFERENCES verses(verse_key) ON DELETE CASCADE,
                text TEXT NOT NULL,
                PRIMARY KEY (translation_id, verse_key)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_translations_verse ON translations(verse_key)",
        ],
    },
    Migration {
        version: 2,
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS tafsirs (
                tafsir_id INTEGER NOT NULL,
                verse_key TEXT NOT NULL,
                surah_id INTEGER NOT NULL,
                html TEXT NOT NULL,
                PRIMARY KEY (tafsir_id, verse_key)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_tafsirs_surah ON tafsirs(tafsir_id, surah_id)",
        ],
    },
];

/// Highest schema version this build knows about
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Result of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    UpToDate { version: u32 },
    Migrated { from: u32, to: u32 },
    /// The stored schema is newer than this build; nothing was run
    UnsupportedVersion { stored: u32, latest: u32 },
}

/// Apply every pending migration inside one transaction.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<MigrationOutcome> {
    let stored: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let latest = latest_version();

    if stored > latest {
        warn!(
            "Offline store schema version {} is newer than supported version {}; skipping migrations",
            stored, latest
        );
        return Ok(MigrationOutcome::UnsupportedVersion { stored, latest });
    }
    if stored == latest {
        return Ok(MigrationOutcome::UpToDate { version: stored });
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > stored) {
        for statement in migration.statements {
            tx.execute_batch(statement)?;
        }
    }
    tx.pragma_update(None, "user_version", latest)?;
    tx.commit()?;

    info!("Offline store migrated from schema {} to {}", stored, latest);
    Ok(MigrationOutcome::Migrated {
        from: stored,
        to: latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type IN ('table', 'index') ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap()
    }

    #[test]
    fn versions_strictly_increase() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
        assert_eq!(latest_version(), 2);
    }

    #[test]
    fn second_run_changes_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();

        assert_eq!(
            migrate(&mut conn).unwrap(),
            MigrationOutcome::Migrated { from: 0, to: 2 }
        );
        let before = tables(&conn);

        assert_eq!(
            migrate(&mut conn).unwrap(),
            MigrationOutcome::UpToDate { version: 2 }
        );
        assert_eq!(tables(&conn), before);
    }

    #[test]
    fn partial_schema_is_completed() {
        let mut conn = Connection::open_in_memory().unwrap();
        for statement in MIGRATIONS[0].statements {
            conn.execute_batch(statement).unwrap();
        }
        conn.pragma_update(None, "user_version", 1).unwrap();

        assert_eq!(
            migrate(&mut conn).unwrap(),
            MigrationOutcome::Migrated { from: 1, to: 2 }
        );
        assert!(tables(&conn).contains(&"tafsirs".to_string()));
    }

    #[test]
    fn newer_schema_is_left_alone() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 9).unwrap();

        assert_eq!(
            migrate(&mut conn).unwrap(),
            MigrationOutcome::UnsupportedVersion { stored: 9, latest: 2 }
        );
        assert!(tables(&conn).is_empty());
    }
}
