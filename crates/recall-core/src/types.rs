use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tool invocation as observed by the engine. Append-only: records are
/// never mutated after creation, only removed by retention cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub tool_name: String,
    pub input_data: serde_json::Value,
    pub result: serde_json::Value,
    pub success: bool,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl ActionRecord {
    pub fn new(
        tool_name: &str,
        input_data: serde_json::Value,
        result: serde_json::Value,
        success: bool,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            input_data,
            result,
            success,
            execution_time_ms,
            created_at: Utc::now(),
        }
    }
}

/// A recurring ordered sequence of tool names with usage statistics.
///
/// `frequency` only ever grows; `success_rate` is an incremental mean of
/// per-occurrence outcomes and stays within [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPattern {
    pub name: String,
    pub tools_sequence: Vec<String>,
    pub frequency: u64,
    pub success_rate: f64,
    pub last_used: DateTime<Utc>,
}

impl WorkflowPattern {
    pub fn first_seen(tools: Vec<String>, success: bool) -> Self {
        Self {
            name: pattern_name(&tools),
            tools_sequence: tools,
            frequency: 1,
            success_rate: if success { 1.0 } else { 0.0 },
            last_used: Utc::now(),
        }
    }

    /// Fold one more observed outcome into the running statistics.
    pub fn merge_outcome(&mut self, success: bool) {
        let outcome = if success { 1.0 } else { 0.0 };
        let old = self.frequency as f64;
        self.frequency += 1;
        self.success_rate = (self.success_rate * old + outcome) / self.frequency as f64;
        self.success_rate = self.success_rate.clamp(0.0, 1.0);
        self.last_used = Utc::now();
    }
}

/// Canonical key for a tool sequence, stable across runs.
pub fn pattern_name(tools: &[String]) -> String {
    tools.join("_")
}
