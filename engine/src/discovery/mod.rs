//! Discovery flow
//!
//! A per-(vision, category) dialogue in four phases: broad selection,
//! drill-down, rhythm, and vision generation.

pub mod catalog;
pub mod orchestrator;
pub mod phase;
pub mod prompts;

pub use catalog::{catalog, drill_down_questions, resolve_category, Catalog, Category};
pub use orchestrator::DiscoveryOrchestrator;
pub use phase::{Phase, Transition};
