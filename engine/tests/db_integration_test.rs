/// Integration tests for database module
///
/// Tests the repositories against a real SQLite file:
/// - Schema creation via migrations
/// - Conversation creation and compare-and-swap step writes
/// - Previous vision lookup across categories
/// - Session lifecycle
mod common;

use common::test_database;
use sdk::types::{ChatResponse, QuestionView};
use std::collections::BTreeMap;
use viva_engine::db::{
    CreateOutcome, Database, StepRecord, StepUpdate, VibrationalState, WriteOutcome,
};

fn question_response() -> ChatResponse {
    ChatResponse::DiscoveryQuestion {
        step: 1,
        ai_message: "Let's begin".to_string(),
        question: QuestionView {
            text: "What lights you up?".to_string(),
            options: Vec::new(),
            multi_select: true,
        },
    }
}

fn broad_update(ids: &[&str]) -> StepUpdate {
    StepUpdate {
        record: StepRecord::Broad {
            selections: ids.iter().map(|s| s.to_string()).collect(),
            custom_input: None,
        },
        vibrational_state: VibrationalState::Neutral,
        final_emotion_score: None,
        generated_vision: None,
        response: ChatResponse::DrillDownQuestions {
            step: 2,
            ai_message: "Lovely".to_string(),
            questions: Vec::new(),
        },
    }
}

async fn created(db: &Database, user: &str, vision: &str, category: &str) -> viva_engine::db::Conversation {
    match db
        .conversations()
        .create(user, vision, category, &question_response())
        .await
        .unwrap()
    {
        CreateOutcome::Created(conversation) => conversation,
        CreateOutcome::Existing(_) => panic!("conversation already existed"),
    }
}

#[tokio::test]
async fn test_database_schema_complete() {
    let (_dir, db) = test_database().await;

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(db.pool())
            .await
            .unwrap();

    for table in ["vision_conversations", "token_balances", "token_usage", "sessions"] {
        assert!(tables.contains(&table.to_string()), "{} table missing", table);
    }

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_create_is_unique_per_vision_and_category() {
    let (_dir, db) = test_database().await;
    let first = created(&db, "u1", "v1", "fun").await;

    match db
        .conversations()
        .create("u1", "v1", "fun", &question_response())
        .await
        .unwrap()
    {
        CreateOutcome::Existing(existing) => assert_eq!(existing.id, first.id),
        CreateOutcome::Created(_) => panic!("duplicate row inserted"),
    }

    // Same vision, other category is a separate conversation
    created(&db, "u1", "v1", "travel").await;
    assert_eq!(db.conversations().list_for_vision("v1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_step_write_is_compare_and_swap() {
    let (_dir, db) = test_database().await;
    let conversation = created(&db, "u1", "v1", "fun").await;

    let applied = match db
        .conversations()
        .record_step(&conversation, broad_update(&["creative"]))
        .await
        .unwrap()
    {
        WriteOutcome::Applied(updated) => updated,
        WriteOutcome::Stale => panic!("first write should apply"),
    };
    assert_eq!(applied.version, 1);
    assert_eq!(applied.messages.len(), 1);

    // A second writer still holding version 0 loses
    let outcome = db
        .conversations()
        .record_step(&conversation, broad_update(&["social"]))
        .await
        .unwrap();
    assert!(matches!(outcome, WriteOutcome::Stale));

    let stored = db.conversations().find("v1", "fun").await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(
        stored.messages,
        vec![StepRecord::Broad {
            selections: vec!["creative".to_string()],
            custom_input: None,
        }]
    );
}

#[tokio::test]
async fn test_vision_write_stamps_completion() {
    let (_dir, db) = test_database().await;
    let conversation = created(&db, "u1", "v1", "fun").await;

    let WriteOutcome::Applied(step1) = db
        .conversations()
        .record_step(&conversation, broad_update(&["creative"]))
        .await
        .unwrap()
    else {
        panic!("step 1 should apply");
    };

    let WriteOutcome::Applied(step2) = db
        .conversations()
        .record_step(
            &step1,
            StepUpdate {
                record: StepRecord::DrillDown {
                    selections: BTreeMap::new(),
                },
                vibrational_state: VibrationalState::AboveGreenLine,
                final_emotion_score: None,
                generated_vision: None,
                response: question_response(),
            },
        )
        .await
        .unwrap()
    else {
        panic!("step 2 should apply");
    };
    assert!(step2.completed_at.is_none());

    let WriteOutcome::Applied(done) = db
        .conversations()
        .record_step(
            &step2,
            StepUpdate {
                record: StepRecord::Rhythm {
                    selection: "daily".to_string(),
                },
                vibrational_state: VibrationalState::AboveGreenLine,
                final_emotion_score: Some(4),
                generated_vision: Some("I create every day.".to_string()),
                response: ChatResponse::VisionGenerated {
                    vision: "I create every day.".to_string(),
                    ai_message: "Does this feel like you?".to_string(),
                },
            },
        )
        .await
        .unwrap()
    else {
        panic!("step 3 should apply");
    };

    let stored = db.conversations().find("v1", "fun").await.unwrap().unwrap();
    assert_eq!(stored.version, 3);
    assert_eq!(stored.final_emotion_score, Some(4));
    assert_eq!(stored.completed_at, done.completed_at);
    assert!(stored.vision_generated_at.is_some());
    assert_eq!(stored.last_response, done.last_response);
}

#[tokio::test]
async fn test_previous_visions_scope() {
    let (_dir, db) = test_database().await;

    for (user, vision, category) in [
        ("u1", "v1", "forward"),
        ("u1", "v1", "fun"),
        ("u1", "v2", "travel"),
        ("u2", "v1", "travel"),
    ] {
        let conversation = created(&db, user, vision, category).await;
        sqlx::query("UPDATE vision_conversations SET generated_vision = ?, completed_at = 1 WHERE id = ?")
            .bind(format!("{} vision of {}", category, user))
            .bind(&conversation.id)
            .execute(db.pool())
            .await
            .unwrap();
    }

    let previous = db
        .conversations()
        .previous_visions("u1", "v1", "fun")
        .await
        .unwrap();
    assert_eq!(previous.len(), 1);
    assert_eq!(previous[0].category, "forward");
    assert_eq!(previous[0].vision, "forward vision of u1");
}

#[tokio::test]
async fn test_session_lifecycle() {
    let (_dir, db) = test_database().await;
    let sessions = db.sessions();

    let issued = sessions.issue("u1", 24).await.unwrap();
    assert!(issued.token.expose().starts_with("vs_"));
    assert_eq!(
        sessions.authenticate(issued.token.expose()).await.unwrap(),
        Some("u1".to_string())
    );

    assert!(sessions.revoke(issued.token.expose()).await.unwrap());
    assert_eq!(sessions.authenticate(issued.token.expose()).await.unwrap(), None);
    assert!(!sessions.revoke(issued.token.expose()).await.unwrap());
}
