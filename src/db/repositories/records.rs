use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::Database;

impl Database {
    /// Raw value stored under `key`, if any.
    pub async fn get_record(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM records WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .with_context(|| format!("failed to read record '{key}'"))?;
            Ok(value)
        })
        .await
    }

    /// Replaces whatever is stored under `key`.
    pub async fn put_record(
        &self,
        key: &str,
        value: String,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO records (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, updated_at.to_rfc3339()],
            )
            .with_context(|| format!("failed to write record '{key}'"))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_then_get_overwrites_previous_value() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_record("k").await.unwrap(), None);

        db.put_record("k", "first".into(), Utc::now()).await.unwrap();
        db.put_record("k", "second".into(), Utc::now()).await.unwrap();

        assert_eq!(db.get_record("k").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn records_survive_reopening_the_file() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("timers.sqlite3");

        {
            let db = Database::new(db_path.clone()).unwrap();
            db.put_record("friendly-timers", "[]".into(), Utc::now())
                .await
                .unwrap();
        }

        let reopened = Database::new(db_path).unwrap();
        assert_eq!(
            reopened.get_record("friendly-timers").await.unwrap().as_deref(),
            Some("[]")
        );
    }
}
