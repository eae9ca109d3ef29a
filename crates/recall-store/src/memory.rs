use crate::{DocumentStore, Row, Selection, apply_selection, cosine_similarity, embedding_of};
use chrono::{DateTime, Utc};
use recall_core::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Process-local document store. Rows live until the process exits; used
/// as the failover tier and in tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn create(&self, table: &str, record: serde_json::Value) -> Result<Row> {
        let row = Row {
            id: Uuid::now_v7().to_string(),
            table: table.to_string(),
            created_at: crate::record_created_at(&record),
            data: record,
        };
        let mut tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    fn select(&self, table: &str, selection: &Selection) -> Result<Vec<Row>> {
        let tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let rows = tables.get(table).cloned().unwrap_or_default();
        Ok(apply_selection(rows, selection))
    }

    fn update(&self, table: &str, id: &str, record: serde_json::Value) -> Result<Row> {
        let mut tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| anyhow::anyhow!("no such table: {table}"))?;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| anyhow::anyhow!("no such record: {table}:{id}"))?;
        row.data = record;
        Ok(row.clone())
    }

    fn delete_before(&self, table: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| row.created_at >= cutoff);
        Ok(before - rows.len())
    }

    fn health_check(&self) -> bool {
        true
    }

    fn similarity(&self, table: &str, query: &[f32], k: usize) -> Result<Vec<(Row, f32)>> {
        let tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut scored: Vec<(Row, f32)> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        embedding_of(row).map(|vec| (row.clone(), cosine_similarity(query, &vec)))
                    })
                    .collect()
            })
            .unwrap_or_default();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}
