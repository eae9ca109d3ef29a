use crate::ActionLog;
use chrono::{Duration, Utc};
use recall_core::{LearningConfig, Result, WorkflowPattern, pattern_name};
use recall_store::ContextStore;

/// Learns recurring tool sequences from the trailing action-log window.
///
/// After each tracked action the learner takes the last N tool names
/// (default 3) observed in the current window and upserts them as a
/// pattern: `frequency` increments and `success_rate` folds in the
/// outcome of the terminal action as an incremental mean. A plain mean is
/// used rather than a decayed average; recency weighting can be swapped in
/// behind `WorkflowPattern::merge_outcome` without touching the invariants
/// (frequency never decreases, rate stays within [0, 1]).
pub struct PatternLearner {
    store: ContextStore,
    config: LearningConfig,
}

impl PatternLearner {
    pub fn new(store: ContextStore, config: LearningConfig) -> Self {
        Self { store, config }
    }

    /// Derive and upsert the trailing pattern after an action whose
    /// outcome was `success`. Returns the updated pattern, or `None` when
    /// learning is off or the window holds too few actions.
    pub fn observe(&self, log: &ActionLog, success: bool) -> Result<Option<WorkflowPattern>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let window_start = Utc::now() - Duration::minutes(self.config.window_minutes);
        let mut window = log.recent(Some(window_start), self.config.window_records);
        if window.len() < self.config.pattern_length {
            return Ok(None);
        }
        window.reverse(); // chronological order

        let tail = &window[window.len() - self.config.pattern_length..];
        let tools: Vec<String> = tail.iter().map(|record| record.tool_name.clone()).collect();

        let name = pattern_name(&tools);
        let pattern = match self.store.find_pattern(&name)? {
            Some((row_id, mut existing)) => {
                existing.merge_outcome(success);
                self.store.replace_pattern(&row_id, &existing)?;
                existing
            }
            None => {
                let fresh = WorkflowPattern::first_seen(tools, success);
                self.store.insert_pattern(&fresh)?;
                fresh
            }
        };
        Ok(Some(pattern))
    }

    /// Best-known patterns by `(frequency, success_rate)` descending.
    /// Store trouble yields an empty list, never an error.
    pub fn top(&self, limit: usize) -> Vec<WorkflowPattern> {
        self.store.top_patterns(limit).unwrap_or_default()
    }

    /// Patterns seen at least `min_pattern_frequency` times.
    pub fn established(&self, limit: usize) -> Vec<WorkflowPattern> {
        self.top(limit)
            .into_iter()
            .filter(|pattern| pattern.frequency >= self.config.min_pattern_frequency)
            .collect()
    }
}
