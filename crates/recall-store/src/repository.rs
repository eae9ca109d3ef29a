use crate::{
    DocumentStore, FailoverStore, MemoryStore, RemoteStore, Selection, SqliteStore,
};
use chrono::{DateTime, Utc};
use recall_core::{ActionRecord, Result, StoreConfig, StoreEndpoint, WorkflowPattern};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const ACTION_TABLE: &str = "action_log";
pub const PATTERN_TABLE: &str = "workflow_pattern";

/// Typed repository over the generic document store: translates engine
/// records to and from rows and owns the table names. Malformed rows are
/// skipped per item rather than failing the whole read.
#[derive(Clone)]
pub struct ContextStore {
    store: Arc<dyn DocumentStore>,
}

impl ContextStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Wire primary and fallback endpoints per configuration and wrap them
    /// in the failover tier.
    pub fn from_config(config: &StoreConfig, runtime_dir: &Path) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let primary = open_endpoint(&config.primary, runtime_dir, timeout)?;
        let fallback = open_endpoint(&config.fallback, runtime_dir, timeout)?;
        Ok(Self::new(Arc::new(FailoverStore::new(primary, fallback))))
    }

    /// The underlying document store, for callers that need the raw
    /// operations (health checks, similarity form).
    pub fn document_store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn health(&self) -> bool {
        self.store.health_check()
    }

    pub fn append_action(&self, record: &ActionRecord) -> Result<()> {
        self.store
            .create(ACTION_TABLE, serde_json::to_value(record)?)?;
        Ok(())
    }

    /// Actions newer than `since` (all when `None`), newest first.
    pub fn recent_actions(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ActionRecord>> {
        let selection = match since {
            Some(cutoff) => Selection::since(cutoff, limit),
            None => Selection::newest(limit),
        };
        let rows = self.store.select(ACTION_TABLE, &selection)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row.data).ok())
            .collect())
    }

    pub fn cleanup_actions_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.store.delete_before(ACTION_TABLE, cutoff)
    }

    pub fn find_pattern(&self, name: &str) -> Result<Option<(String, WorkflowPattern)>> {
        let rows = self.store.select(
            PATTERN_TABLE,
            &Selection::matching("name", serde_json::Value::String(name.to_string())),
        )?;
        Ok(rows.into_iter().find_map(|row| {
            let pattern = serde_json::from_value(row.data).ok()?;
            Some((row.id, pattern))
        }))
    }

    pub fn insert_pattern(&self, pattern: &WorkflowPattern) -> Result<()> {
        self.store
            .create(PATTERN_TABLE, serde_json::to_value(pattern)?)?;
        Ok(())
    }

    pub fn replace_pattern(&self, row_id: &str, pattern: &WorkflowPattern) -> Result<()> {
        self.store
            .update(PATTERN_TABLE, row_id, serde_json::to_value(pattern)?)?;
        Ok(())
    }

    /// Patterns ordered by `(frequency, success_rate)` descending.
    pub fn top_patterns(&self, limit: usize) -> Result<Vec<WorkflowPattern>> {
        let rows = self.store.select(PATTERN_TABLE, &Selection::all())?;
        let mut patterns: Vec<WorkflowPattern> = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row.data).ok())
            .collect();
        patterns.sort_by(|a, b| {
            b.frequency.cmp(&a.frequency).then(
                b.success_rate
                    .partial_cmp(&a.success_rate)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        patterns.truncate(limit);
        Ok(patterns)
    }
}

fn open_endpoint(
    endpoint: &StoreEndpoint,
    runtime_dir: &Path,
    timeout: Duration,
) -> Result<Box<dyn DocumentStore>> {
    Ok(match endpoint {
        StoreEndpoint::Sqlite => Box::new(SqliteStore::open(runtime_dir)?),
        StoreEndpoint::Memory => Box::new(MemoryStore::new()),
        StoreEndpoint::Remote { url } => Box::new(RemoteStore::connect(url, timeout)?),
    })
}
