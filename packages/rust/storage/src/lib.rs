//! libSQL storage layer.
//!
//! The [`Storage`] struct wraps a local libSQL database holding users and
//! their tag scores, scraped and processed news, and listed companies.
//! Operations are grouped by entity in the `users`, `news` and `companies`
//! modules; all of them are methods on [`Storage`].

mod companies;
mod migrations;
mod news;
mod users;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use mojarung_shared::{MojarungError, Result};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MojarungError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    MojarungError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Drop every table and recreate the schema.
    pub async fn reset(&self) -> Result<()> {
        for table in migrations::TABLES {
            self.conn
                .execute(&format!("DROP TABLE IF EXISTS {table}"), params![])
                .await
                .map_err(storage_err)?;
        }
        tracing::warn!("all tables dropped");
        self.run_migrations().await
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

/// Map a libSQL error, surfacing uniqueness violations as conflicts.
pub(crate) fn storage_err(e: libsql::Error) -> MojarungError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        MojarungError::conflict(message)
    } else {
        MojarungError::Storage(message)
    }
}

/// Fixed-width RFC 3339 timestamp so text ordering matches time ordering.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn col_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(storage_err)
}

pub(crate) fn col_i64(row: &libsql::Row, idx: i32) -> Result<i64> {
    row.get::<i64>(idx).map_err(storage_err)
}

pub(crate) fn col_date(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>> {
    let s = col_string(row, idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MojarungError::Storage(format!("invalid date: {e}")))
}

/// Clamp API paging arguments into SQLite integers.
pub(crate) fn paging(skip: usize, limit: usize) -> (i64, i64) {
    let clamp = |v: usize| i64::try_from(v).unwrap_or(i64::MAX);
    (clamp(skip), clamp(limit))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Storage;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    pub(crate) async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("mj_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_storage;
    use super::*;
    use mojarung_shared::ScrapedArticle;
    use uuid::Uuid;

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("mj_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn reset_clears_data() {
        let storage = test_storage().await;
        storage
            .insert_raw_news(&ScrapedArticle {
                title: "Ставка ЦБ".into(),
                full_text: "Банк России сохранил ключевую ставку".into(),
                source: "rbc".into(),
            })
            .await
            .expect("insert");

        storage.reset().await.expect("reset");
        assert_eq!(storage.get_schema_version().await, 1);
        assert!(storage.list_raw_news(0, 100).await.expect("list").is_empty());
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let a = timestamp(DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z").unwrap().into());
        let b = timestamp(
            DateTime::parse_from_rfc3339("2025-03-01T10:00:00.5Z")
                .unwrap()
                .into(),
        );
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }
}
