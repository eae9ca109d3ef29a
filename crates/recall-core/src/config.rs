use crate::{Result, runtime_dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level engine configuration.
///
/// Loaded by overlaying JSON settings files over the serde defaults:
/// user settings (`~/.recall/settings.json`), then project settings
/// (`.recall/settings.json`), then project-local overrides
/// (`.recall/settings.local.json`). A legacy `.recall/config.toml` is read
/// before all of them when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub index: IndexConfig,
    pub store: StoreConfig,
    pub memory: MemoryConfig,
    pub learning: LearningConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Extensions indexed as source code.
    pub code_extensions: Vec<String>,
    /// Extensions indexed as documentation.
    pub doc_extensions: Vec<String>,
    /// Glob patterns excluded from indexing, on top of hidden paths and
    /// build artifacts.
    pub exclude_globs: Vec<String>,
    /// Files larger than this are skipped.
    pub max_file_bytes: u64,
    /// Line cap per extracted chunk.
    pub chunk_max_lines: usize,
    /// Dimensionality of embedding vectors.
    pub embedding_dimension: usize,
    /// Batch size for embedding calls.
    pub embed_batch_size: usize,
    /// Optional similarity floor applied to search results. `None` keeps
    /// every nearest-neighbor hit; callers filter downstream.
    pub min_similarity: Option<f32>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            code_extensions: [
                "rs", "py", "js", "ts", "java", "cpp", "c", "h", "cs", "go", "php", "rb",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            doc_extensions: ["md", "txt", "rst", "org"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_globs: Vec::new(),
            max_file_bytes: 1_048_576, // 1 MB
            chunk_max_lines: 20,
            embedding_dimension: 384,
            embed_batch_size: 32,
            min_similarity: None,
        }
    }
}

/// Where a document store lives. The engine is wired with a primary and a
/// fallback endpoint and fails over transparently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreEndpoint {
    /// Durable rows in the workspace runtime directory.
    Sqlite,
    /// Process-local tables, lost on exit.
    Memory,
    /// External document store spoken to over HTTP.
    Remote { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub primary: StoreEndpoint,
    pub fallback: StoreEndpoint,
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            primary: StoreEndpoint::Sqlite,
            fallback: StoreEndpoint::Memory,
            request_timeout_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Conversation turns retained per session.
    pub max_history: usize,
    /// Hours of inactivity before a session record is replaced.
    pub session_timeout_hours: i64,
    /// Output previews stored per turn are cut to this many characters.
    pub output_preview_chars: usize,
    /// Upper bound on files tracked as "active" in a session.
    pub max_tracked_files: usize,
    /// Action records older than this are eligible for cleanup.
    pub cleanup_period_days: i64,
    pub auto_save: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history: 20,
            session_timeout_hours: 24,
            output_preview_chars: 500,
            max_tracked_files: 50,
            cleanup_period_days: 30,
            auto_save: true,
        }
    }
}

impl MemoryConfig {
    /// Smallest footprint, for constrained environments.
    pub fn minimal() -> Self {
        Self {
            max_history: 5,
            session_timeout_hours: 8,
            max_tracked_files: 20,
            ..Self::default()
        }
    }

    /// The defaults.
    pub fn balanced() -> Self {
        Self::default()
    }

    /// Maximum retention for long-running intensive sessions.
    pub fn extensive() -> Self {
        Self {
            max_history: 50,
            session_timeout_hours: 72,
            max_tracked_files: 200,
            cleanup_period_days: 90,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub enabled: bool,
    /// Length of the tool-sequence window a pattern is derived from.
    pub pattern_length: usize,
    /// Trailing window of the action log considered, in minutes.
    pub window_minutes: i64,
    /// Cap on records pulled from the window.
    pub window_records: usize,
    /// Patterns returned per suggestion request.
    pub pattern_limit: usize,
    /// Occurrences before a pattern counts as established.
    pub min_pattern_frequency: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pattern_length: 3,
            window_minutes: 5,
            window_records: 10,
            pattern_limit: 5,
            min_pattern_frequency: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
}

impl EngineConfig {
    pub fn user_settings_path() -> Option<PathBuf> {
        let home = std::env::var("HOME")
            .ok()
            .or_else(|| std::env::var("USERPROFILE").ok())?;
        Some(Path::new(&home).join(".recall/settings.json"))
    }

    pub fn project_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.json")
    }

    pub fn project_local_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.local.json")
    }

    pub fn legacy_toml_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("config.toml")
    }

    pub fn load(workspace: &Path) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        let legacy = Self::legacy_toml_path(workspace);
        if legacy.exists() {
            let raw = fs::read_to_string(legacy)?;
            let legacy_cfg: EngineConfig = toml::from_str(&raw)?;
            merge_json_value(&mut merged, &serde_json::to_value(legacy_cfg)?);
        }

        let mut paths = Vec::new();
        if let Some(user) = Self::user_settings_path() {
            paths.push(user);
        }
        paths.push(Self::project_settings_path(workspace));
        paths.push(Self::project_local_settings_path(workspace));

        for path in paths {
            if !path.exists() {
                continue;
            }
            let raw = fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            merge_json_value(&mut merged, &value);
        }

        Ok(serde_json::from_value(merged)?)
    }

    pub fn save(&self, workspace: &Path) -> Result<()> {
        let path = Self::project_settings_path(workspace);
        fs::create_dir_all(
            path.parent()
                .ok_or_else(|| anyhow::anyhow!("invalid settings path"))?,
        )?;
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

fn merge_json_value(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_obj), serde_json::Value::Object(overlay_obj)) => {
            for (key, overlay_value) in overlay_obj {
                if let Some(base_value) = base_obj.get_mut(key) {
                    merge_json_value(base_value, overlay_value);
                } else {
                    base_obj.insert(key.clone(), overlay_value.clone());
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}
