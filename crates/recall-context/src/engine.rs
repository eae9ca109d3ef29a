use crate::suggest::{SemanticMatch, SuggestionBundle, generate_hints};
use chrono::{Duration, Utc};
use recall_core::{ActionRecord, EngineConfig, Result, WorkspaceContext};
use recall_index::{BuildStats, EmbeddingsBackend, SearchHit, SemanticIndex, SharedEmbeddings};
use recall_learn::{ActionLog, PatternLearner};
use recall_observe::{EngineEvent, Observer};
use recall_session::{SessionStats, SessionStore};
use recall_store::ContextStore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Keys in `input_data` that name the file a tool touched.
const FILE_KEYS: &[&str] = &["file_path", "path", "target_file"];

/// Snapshot of engine state for the caller.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub session_id: String,
    pub workspace: String,
    pub index_built: bool,
    pub indexed_chunks: usize,
    pub store_healthy: bool,
    pub action_log_degraded: bool,
    pub embedding_model: String,
    pub active_files: usize,
}

/// The context-intelligence surface the agent loop talks to.
///
/// Owns one of everything per workspace (store tier, semantic index,
/// action log, pattern learner, session record, observer), wired at
/// construction. Every operation returns either a structured value or an
/// error with a readable reason; nothing below this layer panics across
/// the boundary.
pub struct ContextEngine {
    workspace: WorkspaceContext,
    config: EngineConfig,
    store: ContextStore,
    index: SemanticIndex,
    log: ActionLog,
    learner: PatternLearner,
    session: SessionStore,
    observer: Observer,
    embeddings: Arc<dyn EmbeddingsBackend>,
}

impl ContextEngine {
    /// Open the engine for a workspace with configuration loaded from its
    /// settings files and the default local embeddings backend.
    pub fn open(workspace_root: &Path) -> Result<Self> {
        let workspace = WorkspaceContext::select(workspace_root)?;
        let config = EngineConfig::load(workspace.root())?;
        let embeddings = SharedEmbeddings::hashed(config.index.embedding_dimension).get();
        Self::with_config(workspace, config, embeddings)
    }

    /// Fully explicit construction, for tests and embedders that bring
    /// their own backend.
    pub fn with_config(
        workspace: WorkspaceContext,
        config: EngineConfig,
        embeddings: Arc<dyn EmbeddingsBackend>,
    ) -> Result<Self> {
        let runtime = workspace.runtime_dir();
        let store = ContextStore::from_config(&config.store, &runtime)?;
        let index = SemanticIndex::new(
            workspace.root(),
            &runtime.join("index"),
            config.index.clone(),
            embeddings.clone(),
        );
        let log = ActionLog::new(store.clone());
        let learner = PatternLearner::new(store.clone(), config.learning.clone());
        let session = SessionStore::open(Some(workspace.root()), config.memory.clone())?;
        let observer = Observer::new(&runtime, &config.telemetry)?;

        Ok(Self {
            workspace,
            config,
            store,
            index,
            log,
            learner,
            session,
            observer,
            embeddings,
        })
    }

    pub fn workspace(&self) -> &WorkspaceContext {
        &self.workspace
    }

    /// Bring the semantic index up to date with the tree. Cheap when
    /// nothing changed: the fingerprint gate skips all embedding work.
    pub fn build_index(&mut self) -> Result<BuildStats> {
        let stats = self.index.build()?;
        let _ = self.observer.record_event(&EngineEvent::IndexBuilt {
            fingerprint: stats.fingerprint.clone(),
            chunks: stats.chunks_indexed,
            from_cache: stats.loaded_from_cache,
        });
        Ok(stats)
    }

    /// Semantic search over the workspace. Builds the index first when it
    /// has not been built in this process yet.
    pub fn search(&mut self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if !self.index.is_built() {
            self.build_index()?;
        }
        let hits = self.index.search(query, k)?;
        let _ = self.observer.record_event(&EngineEvent::SearchServed {
            query_chars: query.chars().count(),
            hits: hits.len(),
        });
        Ok(hits)
    }

    /// Record one tool invocation: append to the action log, feed the
    /// pattern learner, and track any touched file against the session.
    /// Telemetry trouble is absorbed here: this call does not fail when
    /// the store is down.
    pub fn track_action(
        &mut self,
        tool_name: &str,
        input_data: serde_json::Value,
        result: serde_json::Value,
        success: bool,
        execution_time_ms: u64,
    ) -> Result<()> {
        let touched = FILE_KEYS
            .iter()
            .find_map(|key| input_data.get(key).and_then(|v| v.as_str()))
            .map(str::to_string);

        let record = ActionRecord::new(tool_name, input_data, result, success, execution_time_ms);
        let persisted = self.log.append(record);
        let _ = self.observer.record_event(&EngineEvent::ActionTracked {
            tool_name: tool_name.to_string(),
            success,
            persisted,
        });

        match self.learner.observe(&self.log, success) {
            Ok(Some(pattern)) => {
                let _ = self.session.note_pattern(&pattern.name);
            }
            Ok(None) => {}
            Err(err) => self.observer.warn_log(&format!("pattern learning skipped: {err}")),
        }

        if let Some(file) = touched {
            let _ = self.session.track_file(&file);
        }
        Ok(())
    }

    /// Fuse semantic matches, learned patterns, and recent activity into
    /// advisory next-step hints. Degrades to an empty-but-valid bundle
    /// when the index cannot be built or the store is unreachable.
    pub fn suggest(&mut self, task: &str) -> Result<SuggestionBundle> {
        let _ = self
            .session
            .set_context_value("current_task", serde_json::Value::String(task.to_string()));

        let semantic_matches: Vec<SemanticMatch> = match self.search(task, 3) {
            Ok(hits) => hits.iter().map(SemanticMatch::from).collect(),
            Err(err) => {
                self.observer
                    .verbose_log(&format!("semantic matches unavailable: {err}"));
                Vec::new()
            }
        };

        let workflow_patterns = self.learner.top(self.config.learning.pattern_limit);
        let recent_tools = self.log.recent_tools(Utc::now() - Duration::hours(1), 5);
        let active_files = self.session.active_files().to_vec();

        let suggested_next_steps = generate_hints(
            &semantic_matches,
            &workflow_patterns,
            &recent_tools,
            &active_files,
        );
        let _ = self.observer.record_event(&EngineEvent::SuggestionServed {
            hints: suggested_next_steps.len(),
        });

        Ok(SuggestionBundle {
            semantic_matches,
            workflow_patterns,
            recent_tools,
            active_files,
            suggested_next_steps,
        })
    }

    /// Append a conversation turn to the session record.
    pub fn add_turn(
        &mut self,
        user_input: &str,
        success: bool,
        output: &str,
        tools_used: &[String],
    ) -> Result<()> {
        self.session.add_turn(user_input, success, output, tools_used)?;
        let _ = self.observer.record_event(&EngineEvent::SessionTurnAdded {
            total_turns: self.session.record().conversation_history.len(),
        });
        Ok(())
    }

    pub fn session_stats(&self) -> SessionStats {
        self.session.stats()
    }

    pub fn conversation_context(&self, max_turns: usize) -> String {
        self.session.conversation_context(max_turns)
    }

    pub fn clear_session(&mut self) -> Result<()> {
        self.session.clear()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            session_id: self.session.session_id().to_string(),
            workspace: self.workspace.root().to_string_lossy().to_string(),
            index_built: self.index.is_built(),
            indexed_chunks: self.index.chunk_count(),
            store_healthy: self.store.health(),
            action_log_degraded: self.log.is_degraded(),
            embedding_model: self.embeddings.model_id().to_string(),
            active_files: self.session.active_files().len(),
        }
    }

    /// Drop action records older than the configured retention period.
    pub fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - Duration::days(self.config.memory.cleanup_period_days);
        self.log.cleanup_before(cutoff)
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.observer.set_verbose(verbose);
    }
}
