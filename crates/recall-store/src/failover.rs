use crate::{DocumentStore, Row, Selection};
use chrono::{DateTime, Utc};
use recall_core::Result;
use std::sync::atomic::{AtomicU64, Ordering};

/// Two-tier store: every operation is tried against the primary endpoint
/// and retried once against the fallback on any error. Read paths that
/// fail on both tiers surface the fallback's error; callers treat that as
/// "no data".
pub struct FailoverStore {
    primary: Box<dyn DocumentStore>,
    fallback: Box<dyn DocumentStore>,
    failovers: AtomicU64,
}

impl FailoverStore {
    pub fn new(primary: Box<dyn DocumentStore>, fallback: Box<dyn DocumentStore>) -> Self {
        Self {
            primary,
            fallback,
            failovers: AtomicU64::new(0),
        }
    }

    /// How many operations have fallen through to the second tier.
    pub fn failover_count(&self) -> u64 {
        self.failovers.load(Ordering::Relaxed)
    }

    fn via<T>(
        &self,
        on_primary: impl Fn(&dyn DocumentStore) -> Result<T>,
    ) -> Result<T> {
        match on_primary(self.primary.as_ref()) {
            Ok(value) => Ok(value),
            Err(_) => {
                self.failovers.fetch_add(1, Ordering::Relaxed);
                on_primary(self.fallback.as_ref())
            }
        }
    }
}

impl DocumentStore for FailoverStore {
    fn create(&self, table: &str, record: serde_json::Value) -> Result<Row> {
        self.via(|store| store.create(table, record.clone()))
    }

    fn select(&self, table: &str, selection: &Selection) -> Result<Vec<Row>> {
        self.via(|store| store.select(table, selection))
    }

    fn update(&self, table: &str, id: &str, record: serde_json::Value) -> Result<Row> {
        self.via(|store| store.update(table, id, record.clone()))
    }

    fn delete_before(&self, table: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        self.via(|store| store.delete_before(table, cutoff))
    }

    fn health_check(&self) -> bool {
        self.primary.health_check() || self.fallback.health_check()
    }

    fn similarity(&self, table: &str, query: &[f32], k: usize) -> Result<Vec<(Row, f32)>> {
        self.via(|store| store.similarity(table, query, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use serde_json::json;

    /// A store that refuses everything, standing in for an unreachable
    /// primary endpoint.
    struct DownStore;

    impl DocumentStore for DownStore {
        fn create(&self, _: &str, _: serde_json::Value) -> Result<Row> {
            Err(anyhow::anyhow!("store unreachable"))
        }
        fn select(&self, _: &str, _: &Selection) -> Result<Vec<Row>> {
            Err(anyhow::anyhow!("store unreachable"))
        }
        fn update(&self, _: &str, _: &str, _: serde_json::Value) -> Result<Row> {
            Err(anyhow::anyhow!("store unreachable"))
        }
        fn delete_before(&self, _: &str, _: DateTime<Utc>) -> Result<usize> {
            Err(anyhow::anyhow!("store unreachable"))
        }
        fn health_check(&self) -> bool {
            false
        }
        fn similarity(&self, _: &str, _: &[f32], _: usize) -> Result<Vec<(Row, f32)>> {
            Err(anyhow::anyhow!("store unreachable"))
        }
    }

    #[test]
    fn falls_back_when_primary_is_down() {
        let store = FailoverStore::new(Box::new(DownStore), Box::new(MemoryStore::new()));
        store
            .create("action_log", json!({"tool_name": "read"}))
            .expect("create should fall back");
        let rows = store
            .select("action_log", &Selection::all())
            .expect("select should fall back");
        assert_eq!(rows.len(), 1);
        assert_eq!(store.failover_count(), 2);
        assert!(store.health_check(), "fallback keeps the tier healthy");
    }

    #[test]
    fn primary_is_preferred_when_healthy() {
        let store = FailoverStore::new(Box::new(MemoryStore::new()), Box::new(MemoryStore::new()));
        store.create("t", json!({"n": 1})).expect("create");
        assert_eq!(store.failover_count(), 0);
    }
}
