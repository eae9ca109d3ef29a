use chrono::{DateTime, Utc};
use recall_core::ActionRecord;
use recall_store::ContextStore;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

const RING_CAPACITY: usize = 256;

/// Append-only record of tool invocations.
///
/// Writes go through the context store. The first store failure flips the
/// log into degraded mode for the remainder of the process: records land
/// in a bounded in-memory ring instead, and reads merge both sources.
/// Losing ring contents on exit is acceptable; this is advisory
/// telemetry, not a ledger.
pub struct ActionLog {
    store: ContextStore,
    ring: Mutex<VecDeque<ActionRecord>>,
    degraded: AtomicBool,
}

impl ActionLog {
    pub fn new(store: ContextStore) -> Self {
        Self {
            store,
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            degraded: AtomicBool::new(false),
        }
    }

    /// Record an action. Returns whether the record reached the store;
    /// never fails.
    pub fn append(&self, record: ActionRecord) -> bool {
        if !self.degraded.load(Ordering::Relaxed) {
            match self.store.append_action(&record) {
                Ok(()) => return true,
                Err(_) => {
                    self.degraded.store(true, Ordering::Relaxed);
                }
            }
        }
        let mut ring = self
            .ring
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if ring.len() == RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(record);
        false
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Actions newer than `since` (all when `None`), newest first. Store
    /// errors degrade to whatever the ring holds. "No data" is a valid
    /// answer, never an error.
    pub fn recent(&self, since: Option<DateTime<Utc>>, limit: usize) -> Vec<ActionRecord> {
        let mut records = self.store.recent_actions(since, limit).unwrap_or_default();

        let ring = self
            .ring
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for record in ring.iter() {
            if since.is_none_or(|cutoff| record.created_at > cutoff) {
                records.push(record.clone());
            }
        }
        drop(ring);

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        records
    }

    /// Tool names used since `since`, newest first.
    pub fn recent_tools(&self, since: DateTime<Utc>, limit: usize) -> Vec<String> {
        self.recent(Some(since), limit)
            .into_iter()
            .map(|record| record.tool_name)
            .collect()
    }

    /// Drop records older than `cutoff` from both tiers. Returns how many
    /// store rows were removed.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> usize {
        let removed = self.store.cleanup_actions_before(cutoff).unwrap_or(0);
        let mut ring = self
            .ring
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        ring.retain(|record| record.created_at >= cutoff);
        removed
    }
}
