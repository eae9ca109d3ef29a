//! Persistent session state: one bounded, TTL-expiring record per
//! workspace (or one global record when no workspace is selected),
//! written atomically so a crash mid-write can never leave an unparseable
//! file behind.

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use recall_core::{MemoryConfig, Result, global_dir, runtime_dir, write_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub success: bool,
    pub output_preview: String,
    pub tools_used: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub response: TurnResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub workspace_path: Option<String>,
    pub conversation_history: Vec<ConversationTurn>,
    pub context_data: BTreeMap<String, serde_json::Value>,
    pub active_files: Vec<String>,
    pub workflow_patterns: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub total_turns: usize,
    pub successful_turns: usize,
    pub success_rate: f64,
    pub workspace: Option<String>,
    pub active_files: usize,
    pub patterns_noted: usize,
}

/// Owner of the session record. Loads the scoped file on open, replaces
/// stale or corrupt records with a fresh one, and persists after every
/// mutation (when auto-save is on).
pub struct SessionStore {
    path: PathBuf,
    config: MemoryConfig,
    record: SessionRecord,
}

impl SessionStore {
    /// Open the session for a workspace, or the global session when no
    /// workspace is given.
    pub fn open(workspace: Option<&Path>, config: MemoryConfig) -> Result<Self> {
        let path = session_path(workspace)?;
        let record = load_or_fresh(&path, workspace, &config);
        Ok(Self {
            path,
            config,
            record,
        })
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn session_id(&self) -> &str {
        &self.record.session_id
    }

    /// Append a conversation turn. The output preview is truncated and
    /// history is trimmed oldest-first to the configured maximum.
    pub fn add_turn(
        &mut self,
        user_input: &str,
        success: bool,
        output: &str,
        tools_used: &[String],
    ) -> Result<()> {
        let turn = ConversationTurn {
            timestamp: Utc::now(),
            user_input: user_input.to_string(),
            response: TurnResponse {
                success,
                output_preview: truncate_chars(output, self.config.output_preview_chars),
                tools_used: tools_used.to_vec(),
            },
        };
        self.record.conversation_history.push(turn);

        let excess = self
            .record
            .conversation_history
            .len()
            .saturating_sub(self.config.max_history);
        if excess > 0 {
            self.record.conversation_history.drain(..excess);
        }
        self.persist()
    }

    /// Mark a file as active in this session. Returns whether it was new.
    pub fn track_file(&mut self, file_path: &str) -> Result<bool> {
        if self.record.active_files.iter().any(|f| f == file_path) {
            return Ok(false);
        }
        self.record.active_files.push(file_path.to_string());
        let excess = self
            .record
            .active_files
            .len()
            .saturating_sub(self.config.max_tracked_files);
        if excess > 0 {
            self.record.active_files.drain(..excess);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn active_files(&self) -> &[String] {
        &self.record.active_files
    }

    pub fn set_context_value(&mut self, key: &str, value: serde_json::Value) -> Result<()> {
        self.record.context_data.insert(key.to_string(), value);
        self.persist()
    }

    pub fn context_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.record.context_data.get(key)
    }

    /// Count an occurrence of a learned pattern against this session.
    pub fn note_pattern(&mut self, name: &str) -> Result<()> {
        *self
            .record
            .workflow_patterns
            .entry(name.to_string())
            .or_insert(0) += 1;
        self.persist()
    }

    /// Compact summary of the most recent turns, for prompt enhancement.
    pub fn conversation_context(&self, max_turns: usize) -> String {
        let history = &self.record.conversation_history;
        if history.is_empty() {
            return "No previous conversation history.".to_string();
        }
        let start = history.len().saturating_sub(max_turns);
        let mut lines = vec!["Recent conversation:".to_string()];
        for (i, turn) in history[start..].iter().enumerate() {
            let marker = if turn.response.success { "ok" } else { "failed" };
            lines.push(format!(
                "{}. {} [{marker}]",
                i + 1,
                truncate_chars(&turn.user_input, 100)
            ));
        }
        lines.join("\n")
    }

    pub fn stats(&self) -> SessionStats {
        let history = &self.record.conversation_history;
        let successful = history.iter().filter(|t| t.response.success).count();
        SessionStats {
            session_id: self.record.session_id.clone(),
            created_at: self.record.created_at,
            total_turns: history.len(),
            successful_turns: successful,
            success_rate: if history.is_empty() {
                0.0
            } else {
                successful as f64 / history.len() as f64
            },
            workspace: self.record.workspace_path.clone(),
            active_files: self.record.active_files.len(),
            patterns_noted: self.record.workflow_patterns.len(),
        }
    }

    /// Discard the current record and start fresh.
    pub fn clear(&mut self) -> Result<()> {
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
        let workspace = self.record.workspace_path.clone().map(PathBuf::from);
        self.record = fresh_record(workspace.as_deref());
        self.persist()
    }

    /// Write the full record somewhere else, for backup or analysis.
    pub fn export(&self, path: &Path) -> Result<()> {
        write_atomic(path, &serde_json::to_vec_pretty(&self.record)?)
    }

    fn persist(&mut self) -> Result<()> {
        self.record.last_activity = Utc::now();
        if !self.config.auto_save {
            return Ok(());
        }
        write_atomic(&self.path, &serde_json::to_vec_pretty(&self.record)?)
    }
}

fn session_path(workspace: Option<&Path>) -> Result<PathBuf> {
    match workspace {
        Some(root) => Ok(runtime_dir(root).join("session.json")),
        None => Ok(global_dir()
            .ok_or_else(|| anyhow!("HOME/USERPROFILE is not set; cannot locate global session"))?
            .join("global_session.json")),
    }
}

fn fresh_record(workspace: Option<&Path>) -> SessionRecord {
    let now = Utc::now();
    SessionRecord {
        session_id: format!("sess_{}", Uuid::now_v7()),
        created_at: now,
        last_activity: now,
        workspace_path: workspace.map(|p| p.to_string_lossy().to_string()),
        conversation_history: Vec::new(),
        context_data: BTreeMap::new(),
        active_files: Vec::new(),
        workflow_patterns: BTreeMap::new(),
    }
}

/// Read the record at `path`; any unreadable, unparseable, or expired
/// record is replaced with a fresh one rather than reported.
fn load_or_fresh(path: &Path, workspace: Option<&Path>, config: &MemoryConfig) -> SessionRecord {
    let Ok(raw) = fs::read_to_string(path) else {
        return fresh_record(workspace);
    };
    let Ok(record) = serde_json::from_str::<SessionRecord>(&raw) else {
        return fresh_record(workspace);
    };
    let age = Utc::now() - record.last_activity;
    if age > Duration::hours(config.session_timeout_hours) {
        return fresh_record(workspace);
    }
    record
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_in(dir: &Path) -> SessionStore {
        SessionStore::open(Some(dir), MemoryConfig::default()).expect("open")
    }

    #[test]
    fn history_is_bounded_fifo() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = MemoryConfig {
            max_history: 10,
            ..MemoryConfig::default()
        };
        let mut store = SessionStore::open(Some(dir.path()), config).expect("open");

        for i in 0..15 {
            store
                .add_turn(&format!("turn {i}"), true, "done", &[])
                .expect("add turn");
        }

        let history = &store.record().conversation_history;
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].user_input, "turn 5", "oldest five evicted");
        assert_eq!(history[9].user_input, "turn 14");
    }

    #[test]
    fn output_previews_are_truncated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = open_in(dir.path());
        let long_output = "x".repeat(2000);
        store
            .add_turn("do something", true, &long_output, &[])
            .expect("add turn");
        let preview = &store.record().conversation_history[0]
            .response
            .output_preview;
        assert_eq!(preview.chars().count(), 503); // 500 + "..."
    }

    #[test]
    fn record_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session_id = {
            let mut store = open_in(dir.path());
            store
                .add_turn("hello", true, "hi", &["read_file".to_string()])
                .expect("add turn");
            store.session_id().to_string()
        };
        let store = open_in(dir.path());
        assert_eq!(store.session_id(), session_id);
        assert_eq!(store.record().conversation_history.len(), 1);
    }

    #[test]
    fn expired_record_is_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let old_id = {
            let mut store = open_in(dir.path());
            store.add_turn("old work", true, "ok", &[]).expect("add");
            store.session_id().to_string()
        };

        // Backdate the file's last_activity beyond the timeout.
        let path = runtime_dir(dir.path()).join("session.json");
        let mut record: SessionRecord =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        record.last_activity = Utc::now() - Duration::hours(48);
        fs::write(&path, serde_json::to_vec_pretty(&record).expect("encode")).expect("write");

        let store = open_in(dir.path());
        assert_ne!(store.session_id(), old_id);
        assert!(store.record().conversation_history.is_empty());
    }

    #[test]
    fn corrupt_record_starts_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = runtime_dir(dir.path()).join("session.json");
        fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
        fs::write(&path, b"{ definitely not json").expect("write garbage");

        let store = open_in(dir.path());
        assert!(store.record().conversation_history.is_empty());
    }

    #[test]
    fn active_files_dedupe_and_cap() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = MemoryConfig {
            max_tracked_files: 3,
            ..MemoryConfig::default()
        };
        let mut store = SessionStore::open(Some(dir.path()), config).expect("open");

        assert!(store.track_file("a.rs").expect("track"));
        assert!(!store.track_file("a.rs").expect("track"), "no duplicates");
        for name in ["b.rs", "c.rs", "d.rs"] {
            store.track_file(name).expect("track");
        }
        assert_eq!(store.active_files(), &["b.rs", "c.rs", "d.rs"]);
    }

    #[test]
    fn stats_reflect_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = open_in(dir.path());
        store.add_turn("one", true, "ok", &[]).expect("add");
        store.add_turn("two", false, "boom", &[]).expect("add");
        store.note_pattern("read_edit_test").expect("note");

        let stats = store.stats();
        assert_eq!(stats.total_turns, 2);
        assert_eq!(stats.successful_turns, 1);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.patterns_noted, 1);
    }

    #[test]
    fn clear_resets_the_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = open_in(dir.path());
        store.add_turn("work", true, "ok", &[]).expect("add");
        let old_id = store.session_id().to_string();

        store.clear().expect("clear");
        assert_ne!(store.session_id(), old_id);
        assert!(store.record().conversation_history.is_empty());
    }

    #[test]
    fn conversation_context_summarizes_recent_turns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = open_in(dir.path());
        assert_eq!(
            store.conversation_context(5),
            "No previous conversation history."
        );

        store.add_turn("fix the parser", true, "ok", &[]).expect("add");
        store.add_turn("run the tests", false, "boom", &[]).expect("add");
        let context = store.conversation_context(5);
        assert!(context.contains("fix the parser"));
        assert!(context.contains("[failed]"));
    }
}
