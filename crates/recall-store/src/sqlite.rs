use crate::{DocumentStore, Row, Selection, cosine_similarity, embedding_of};
use chrono::{DateTime, Utc};
use recall_core::Result;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Durable document store backed by a single SQLite file. All tables share
/// one generic `records` relation; the schema is created idempotently on
/// open.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    table_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_records_table_time ON records(table_name, created_at);";

impl SqliteStore {
    /// Open (or create) the store file under the given runtime directory.
    pub fn open(runtime_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(runtime_dir)?;
        let db_path = runtime_dir.join("context.sqlite");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn fetch(&self, table: &str, selection: &Selection) -> Result<Vec<Row>> {
        let conn = self.lock();
        let order = if selection.newest_first { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT id, table_name, created_at, data FROM records
             WHERE table_name = ?1 AND created_at > ?2
             ORDER BY created_at {order}"
        );
        let floor = selection
            .created_after
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| String::from(""));
        let mut stmt = conn.prepare(&sql)?;
        let mapped = stmt.query_map(params![table, floor], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut rows = Vec::new();
        for item in mapped {
            let (id, table, created_at, data) = item?;
            // Rows with unparseable payloads are skipped, not fatal.
            let Ok(data) = serde_json::from_str(&data) else {
                continue;
            };
            let Ok(created_at) = DateTime::parse_from_rfc3339(&created_at) else {
                continue;
            };
            rows.push(Row {
                id,
                table,
                created_at: created_at.with_timezone(&Utc),
                data,
            });
        }

        // Field equality cannot be pushed into SQL on an opaque payload;
        // apply it (and the cap) after decoding.
        if let Some((field, value)) = &selection.field_eq {
            rows.retain(|row| row.data.get(field) == Some(value));
        }
        if let Some(limit) = selection.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

impl DocumentStore for SqliteStore {
    fn create(&self, table: &str, record: serde_json::Value) -> Result<Row> {
        let row = Row {
            id: Uuid::now_v7().to_string(),
            table: table.to_string(),
            created_at: crate::record_created_at(&record),
            data: record,
        };
        let conn = self.lock();
        conn.execute(
            "INSERT INTO records (id, table_name, created_at, data) VALUES (?1, ?2, ?3, ?4)",
            params![
                row.id,
                row.table,
                row.created_at.to_rfc3339(),
                serde_json::to_string(&row.data)?,
            ],
        )?;
        Ok(row)
    }

    fn select(&self, table: &str, selection: &Selection) -> Result<Vec<Row>> {
        self.fetch(table, selection)
    }

    fn update(&self, table: &str, id: &str, record: serde_json::Value) -> Result<Row> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE records SET data = ?1 WHERE table_name = ?2 AND id = ?3",
            params![serde_json::to_string(&record)?, table, id],
        )?;
        if changed == 0 {
            return Err(anyhow::anyhow!("no such record: {table}:{id}"));
        }
        let created_at: String = conn.query_row(
            "SELECT created_at FROM records WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(Row {
            id: id.to_string(),
            table: table.to_string(),
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            data: record,
        })
    }

    fn delete_before(&self, table: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM records WHERE table_name = ?1 AND created_at < ?2",
            params![table, cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }

    fn health_check(&self) -> bool {
        let conn = self.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    fn similarity(&self, table: &str, query: &[f32], k: usize) -> Result<Vec<(Row, f32)>> {
        let rows = self.fetch(table, &Selection::all())?;
        let mut scored: Vec<(Row, f32)> = rows
            .into_iter()
            .filter_map(|row| {
                let vec = embedding_of(&row)?;
                let score = cosine_similarity(query, &vec);
                Some((row, score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}
