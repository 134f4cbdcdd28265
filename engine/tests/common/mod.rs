//! Shared fixtures for engine integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use sdk::types::{ChatRequest, Selections};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use viva_engine::config::DiscoveryConfig;
use viva_engine::db::Database;
use viva_engine::discovery::DiscoveryOrchestrator;
use viva_engine::llm::{Completion, CompletionProvider, CompletionRequest, LLMError, TokenUsage};

pub const PATTERN_JSON: &str =
    r#"{"theme": "creative self-expression", "evidence": ["You chose Creative", "You chose Visual arts"]}"#;

/// Scripted completion provider that counts and keeps every request
#[derive(Default)]
pub struct MockCompletionProvider {
    calls: AtomicUsize,
    fail: AtomicBool,
    delay_ms: AtomicU64,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletionProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Hold every completion for `delay` so concurrent requests overlap
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "gpt-4o"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LLMError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(LLMError::NetworkError("connection reset".to_string()));
        }

        let text = if request.json_response {
            PATTERN_JSON.to_string()
        } else {
            format!("I am living my joy, reply number {}.", n)
        };

        Ok(Completion {
            text,
            usage: Some(TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 50,
            }),
        })
    }
}

/// A fresh database in a temporary directory
pub async fn test_database() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("viva.db")).await.unwrap();
    (temp_dir, db)
}

pub fn orchestrator(db: &Database, provider: Arc<MockCompletionProvider>) -> DiscoveryOrchestrator {
    DiscoveryOrchestrator::new(db, provider, DiscoveryConfig::default(), 4)
}

pub fn start(vision_id: &str, category: &str) -> ChatRequest {
    ChatRequest {
        vision_id: vision_id.to_string(),
        category: category.to_string(),
        action: "start".to_string(),
        ..Default::default()
    }
}

pub fn step1(vision_id: &str, category: &str, ids: &[&str]) -> ChatRequest {
    ChatRequest {
        vision_id: vision_id.to_string(),
        category: category.to_string(),
        action: "submit_step_1".to_string(),
        step: Some(1),
        selections: Some(Selections::List(ids.iter().map(|s| s.to_string()).collect())),
        ..Default::default()
    }
}

pub fn step2(vision_id: &str, category: &str, answers: Vec<(&str, Vec<&str>)>) -> ChatRequest {
    let map: BTreeMap<String, Vec<String>> = answers
        .into_iter()
        .map(|(key, ids)| (key.to_string(), ids.iter().map(|s| s.to_string()).collect()))
        .collect();
    ChatRequest {
        vision_id: vision_id.to_string(),
        category: category.to_string(),
        action: "submit_step_2".to_string(),
        step: Some(2),
        selections: Some(Selections::Map(map)),
        ..Default::default()
    }
}

pub fn step3(vision_id: &str, category: &str, id: &str) -> ChatRequest {
    ChatRequest {
        vision_id: vision_id.to_string(),
        category: category.to_string(),
        action: "submit_step_3".to_string(),
        step: Some(3),
        selections: Some(Selections::List(vec![id.to_string()])),
        ..Default::default()
    }
}
