//! The context-intelligence facade: wires the store tier, semantic index,
//! action log, pattern learner, session record, and observer into one
//! engine the agent loop calls in-process.

mod engine;
mod suggest;

pub use engine::{ContextEngine, EngineStatus};
pub use suggest::{SemanticMatch, SuggestionBundle, generate_hints};
