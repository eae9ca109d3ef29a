use recall_core::WorkflowPattern;
use recall_index::SearchHit;
use serde::{Deserialize, Serialize};

/// How many active files is "too many" before the engine suggests
/// narrowing focus.
const FOCUS_THRESHOLD: usize = 5;

/// A semantic search result flattened for the suggestion bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticMatch {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub preview: String,
    pub score: f32,
}

impl From<&SearchHit> for SemanticMatch {
    fn from(hit: &SearchHit) -> Self {
        let preview: String = hit.chunk.content.chars().take(200).collect();
        Self {
            file_path: hit.chunk.file_path.clone(),
            start_line: hit.chunk.start_line,
            end_line: hit.chunk.end_line,
            preview,
            score: hit.score,
        }
    }
}

/// Everything `suggest` computed for one request. Ephemeral; never
/// persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionBundle {
    pub semantic_matches: Vec<SemanticMatch>,
    pub workflow_patterns: Vec<WorkflowPattern>,
    pub recent_tools: Vec<String>,
    pub active_files: Vec<String>,
    pub suggested_next_steps: Vec<String>,
}

/// Produce advisory next-step hints, in insertion order: semantic first,
/// then pattern continuations, then the general heuristics. The hints are
/// plain strings; acting on them is entirely up to the calling agent.
///
/// `recent_tools` arrives newest first, as the action log reports it.
pub fn generate_hints(
    semantic_matches: &[SemanticMatch],
    patterns: &[WorkflowPattern],
    recent_tools: &[String],
    active_files: &[String],
) -> Vec<String> {
    let mut hints = Vec::new();

    if let Some(best) = semantic_matches.first() {
        hints.push(format!(
            "Review {}; it looks semantically related to the current task",
            best.file_path
        ));
    }

    if recent_tools.len() >= 2 {
        // Chronological order of the two most recent tools.
        let last_two = [recent_tools[1].as_str(), recent_tools[0].as_str()];
        for pattern in patterns.iter().take(2) {
            if pattern.tools_sequence.len() > 2
                && pattern.tools_sequence[0] == last_two[0]
                && pattern.tools_sequence[1] == last_two[1]
            {
                hints.push(format!(
                    "You usually run {} after {} and {}",
                    pattern.tools_sequence[2], last_two[0], last_two[1]
                ));
            }
        }
    }

    if active_files.is_empty() {
        hints.push(
            "Start by listing the directory contents to understand the project structure"
                .to_string(),
        );
    } else if active_files.len() > FOCUS_THRESHOLD {
        hints.push("Consider focusing on fewer files to keep the context tight".to_string());
    }

    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pattern(tools: &[&str], frequency: u64) -> WorkflowPattern {
        WorkflowPattern {
            name: tools.join("_"),
            tools_sequence: tools.iter().map(|s| s.to_string()).collect(),
            frequency,
            success_rate: 1.0,
            last_used: Utc::now(),
        }
    }

    fn semantic(file: &str) -> SemanticMatch {
        SemanticMatch {
            file_path: file.to_string(),
            start_line: 1,
            end_line: 5,
            preview: String::new(),
            score: 0.8,
        }
    }

    #[test]
    fn semantic_hint_comes_first() {
        let hints = generate_hints(&[semantic("fib.py")], &[], &[], &["fib.py".to_string()]);
        assert!(hints[0].contains("fib.py"));
    }

    #[test]
    fn pattern_continuation_matches_chronological_prefix() {
        let patterns = vec![pattern(&["read_file", "edit_file", "run_tests"], 4)];
        // Newest first: edit_file happened last, read_file before it.
        let recent = vec!["edit_file".to_string(), "read_file".to_string()];
        let hints = generate_hints(&[], &patterns, &recent, &["a.rs".to_string()]);
        assert!(hints.iter().any(|h| h.contains("run_tests")));
    }

    #[test]
    fn reversed_recents_do_not_match() {
        let patterns = vec![pattern(&["read_file", "edit_file", "run_tests"], 4)];
        let recent = vec!["read_file".to_string(), "edit_file".to_string()];
        let hints = generate_hints(&[], &patterns, &recent, &["a.rs".to_string()]);
        assert!(!hints.iter().any(|h| h.contains("run_tests")));
    }

    #[test]
    fn empty_session_suggests_listing_the_tree() {
        let hints = generate_hints(&[], &[], &[], &[]);
        assert_eq!(hints.len(), 1);
        assert!(hints[0].contains("listing the directory"));
    }

    #[test]
    fn too_many_active_files_suggests_narrowing() {
        let files: Vec<String> = (0..7).map(|i| format!("f{i}.rs")).collect();
        let hints = generate_hints(&[], &[], &[], &files);
        assert!(hints.iter().any(|h| h.contains("fewer files")));
    }

    #[test]
    fn hints_keep_insertion_order() {
        let patterns = vec![pattern(&["a", "b", "c"], 3)];
        let recent = vec!["b".to_string(), "a".to_string()];
        let hints = generate_hints(&[semantic("x.py")], &patterns, &recent, &[]);
        assert!(hints[0].contains("x.py"), "semantic first");
        assert!(hints[1].contains('c'), "pattern second");
        assert!(hints[2].contains("listing"), "heuristic last");
    }
}
