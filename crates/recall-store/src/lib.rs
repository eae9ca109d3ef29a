//! Document-store layer: a small record-oriented abstraction over the
//! external context store, with durable (SQLite), process-local (memory),
//! and HTTP (remote) implementations plus a two-tier failover wrapper.
//!
//! The engine keeps action records and workflow patterns here; the
//! semantic index keeps its own fingerprint-keyed cache on disk and only
//! consults the store's similarity form when an external caller asks for it.

use chrono::{DateTime, Utc};
use recall_core::Result;
use serde::{Deserialize, Serialize};

mod failover;
mod memory;
mod remote;
mod repository;
mod sqlite;

pub use failover::FailoverStore;
pub use memory::MemoryStore;
pub use remote::RemoteStore;
pub use repository::ContextStore;
pub use sqlite::SqliteStore;

/// A stored record: opaque JSON data plus the identity the store assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub table: String,
    pub created_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Typed stand-in for the external store's query statements. Every
/// implementation honors the same filter semantics: equality on one data
/// field, a lower bound on creation time, newest-first ordering, and a
/// result cap, applied in that order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    pub field_eq: Option<(String, serde_json::Value)>,
    pub created_after: Option<DateTime<Utc>>,
    pub newest_first: bool,
    pub limit: Option<usize>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn newest(limit: usize) -> Self {
        Self {
            newest_first: true,
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn since(cutoff: DateTime<Utc>, limit: usize) -> Self {
        Self {
            created_after: Some(cutoff),
            newest_first: true,
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn matching(field: &str, value: serde_json::Value) -> Self {
        Self {
            field_eq: Some((field.to_string(), value)),
            ..Self::default()
        }
    }
}

/// The four operations the engine needs from a document store, plus the
/// similarity-search form. Object-safe so endpoints can be swapped and
/// layered (see [`FailoverStore`]).
pub trait DocumentStore: Send + Sync {
    fn create(&self, table: &str, record: serde_json::Value) -> Result<Row>;

    fn select(&self, table: &str, selection: &Selection) -> Result<Vec<Row>>;

    fn update(&self, table: &str, id: &str, record: serde_json::Value) -> Result<Row>;

    /// Remove rows created before `cutoff`. Returns the number removed.
    fn delete_before(&self, table: &str, cutoff: DateTime<Utc>) -> Result<usize>;

    fn health_check(&self) -> bool;

    /// Rows whose `embedding` field is nearest to `query` by cosine
    /// similarity, best first.
    fn similarity(&self, table: &str, query: &[f32], k: usize) -> Result<Vec<(Row, f32)>>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub(crate) fn embedding_of(row: &Row) -> Option<Vec<f32>> {
    row.data.get("embedding").and_then(|v| {
        v.as_array().map(|xs| {
            xs.iter()
                .filter_map(|x| x.as_f64().map(|f| f as f32))
                .collect()
        })
    })
}

/// Apply `selection` to rows already fetched from a backend that cannot
/// filter natively.
pub(crate) fn apply_selection(mut rows: Vec<Row>, selection: &Selection) -> Vec<Row> {
    if let Some((field, value)) = &selection.field_eq {
        rows.retain(|row| row.data.get(field) == Some(value));
    }
    if let Some(cutoff) = selection.created_after {
        rows.retain(|row| row.created_at > cutoff);
    }
    if selection.newest_first {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    } else {
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }
    if let Some(limit) = selection.limit {
        rows.truncate(limit);
    }
    rows
}

/// Record creation time: honor a `created_at` field already present on the
/// record, otherwise stamp now.
pub(crate) fn record_created_at(record: &serde_json::Value) -> DateTime<Utc> {
    record
        .get("created_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
