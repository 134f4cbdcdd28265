//! Viva SDK
//!
//! Shared library providing the error taxonomy and the wire types of the
//! discovery chat endpoint. This crate is used by the engine and by clients.

/// Error types and handling
pub mod errors;

/// Request/response types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, VivaErrorExt};
pub use types::{
    Action, ChatRequest, ChatResponse, DrillDownQuestionView, OptionView, PatternDetected,
    QuestionView, Selections,
};
