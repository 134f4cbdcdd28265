//! Viva Engine Library
//!
//! Core of the discovery conversation service. It is used by both the `viva`
//! binary and integration tests.

/// HTTP surface
pub mod api;

/// Command-line interface definitions
pub mod cli;

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Discovery conversation flow
pub mod discovery;

/// CLI command handlers
pub mod handlers;

/// Completion provider abstraction layer
pub mod llm;

/// Secret management module
pub mod secrets;

/// Structured logging setup
pub mod telemetry;

/// Token estimation and budgeting
pub mod tokens;
