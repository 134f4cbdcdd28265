/// Discovery conversation persistence
///
/// One row per (vision, category). The ordered step records live in the
/// `messages` JSON column. Every write after creation is a compare-and-swap on
/// `version`, so two racing submissions for the same step cannot both land.
use anyhow::{Context, Result};
use sdk::types::ChatResponse;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use super::now_secs;

/// Coarse mood tag attached to a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VibrationalState {
    Neutral,
    AboveGreenLine,
}

impl VibrationalState {
    pub fn as_str(&self) -> &str {
        match self {
            VibrationalState::Neutral => "neutral",
            VibrationalState::AboveGreenLine => "above_green_line",
        }
    }

    fn from_db(value: &str) -> Result<Self> {
        match value {
            "neutral" => Ok(VibrationalState::Neutral),
            "above_green_line" => Ok(VibrationalState::AboveGreenLine),
            other => anyhow::bail!("Unknown vibrational state '{}'", other),
        }
    }
}

/// One element of a conversation's `messages` list
///
/// Stored as `{"step": n, "selections": ..., "customInput"?: ...}` where the
/// shape of `selections` depends on `step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStepRecord", into = "RawStepRecord")]
pub enum StepRecord {
    /// Step 1: broad options, in submission order
    Broad {
        selections: Vec<String>,
        custom_input: Option<String>,
    },

    /// Step 2: drill-down question key to selected option ids
    DrillDown {
        selections: BTreeMap<String, Vec<String>>,
    },

    /// Step 3: the single rhythm option
    Rhythm { selection: String },
}

impl StepRecord {
    pub fn step(&self) -> u8 {
        match self {
            StepRecord::Broad { .. } => 1,
            StepRecord::DrillDown { .. } => 2,
            StepRecord::Rhythm { .. } => 3,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawStepRecord {
    step: u8,
    selections: serde_json::Value,
    #[serde(
        rename = "customInput",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    custom_input: Option<String>,
}

impl TryFrom<RawStepRecord> for StepRecord {
    type Error = String;

    fn try_from(raw: RawStepRecord) -> std::result::Result<Self, Self::Error> {
        match raw.step {
            1 => {
                let selections = serde_json::from_value(raw.selections)
                    .map_err(|e| format!("step 1 selections: {}", e))?;
                Ok(StepRecord::Broad {
                    selections,
                    custom_input: raw.custom_input,
                })
            }
            2 => {
                let selections = serde_json::from_value(raw.selections)
                    .map_err(|e| format!("step 2 selections: {}", e))?;
                Ok(StepRecord::DrillDown { selections })
            }
            3 => match raw.selections {
                serde_json::Value::String(selection) => Ok(StepRecord::Rhythm { selection }),
                serde_json::Value::Array(mut items) if items.len() == 1 => match items.pop() {
                    Some(serde_json::Value::String(selection)) => {
                        Ok(StepRecord::Rhythm { selection })
                    }
                    _ => Err("step 3 selection must be a string".to_string()),
                },
                _ => Err("step 3 selection must be a single string".to_string()),
            },
            other => Err(format!("unknown step {}", other)),
        }
    }
}

impl From<StepRecord> for RawStepRecord {
    fn from(record: StepRecord) -> Self {
        match record {
            StepRecord::Broad {
                selections,
                custom_input,
            } => RawStepRecord {
                step: 1,
                selections: serde_json::json!(selections),
                custom_input,
            },
            StepRecord::DrillDown { selections } => RawStepRecord {
                step: 2,
                selections: serde_json::json!(selections),
                custom_input: None,
            },
            StepRecord::Rhythm { selection } => RawStepRecord {
                step: 3,
                selections: serde_json::Value::String(selection),
                custom_input: None,
            },
        }
    }
}

/// Conversation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub vision_id: String,
    pub category: String,
    pub messages: Vec<StepRecord>,
    pub vibrational_state: VibrationalState,
    pub final_emotion_score: Option<i64>,
    pub generated_vision: Option<String>,
    /// Response of the latest transition, returned again on resume/replay
    pub last_response: ChatResponse,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub vision_generated_at: Option<i64>,
    pub completed_at: Option<i64>,
}

/// Everything one step transition writes, applied in a single statement
#[derive(Debug, Clone)]
pub struct StepUpdate {
    pub record: StepRecord,
    pub vibrational_state: VibrationalState,
    pub final_emotion_score: Option<i64>,
    /// Setting this also stamps `vision_generated_at` and `completed_at`
    pub generated_vision: Option<String>,
    pub response: ChatResponse,
}

/// Result of inserting a conversation
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Conversation),
    /// A row for the same (vision, category) already existed
    Existing(Conversation),
}

/// Result of a compare-and-swap step write
#[derive(Debug)]
pub enum WriteOutcome {
    Applied(Conversation),
    /// The row's version moved on since it was read
    Stale,
}

/// A generated vision of another category of the same vision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviousVision {
    pub category: String,
    pub vision: String,
}

const SELECT_COLUMNS: &str = "id, user_id, vision_id, category, messages, vibrational_state, \
     final_emotion_score, generated_vision, last_response, version, created_at, updated_at, \
     vision_generated_at, completed_at";

/// Conversation repository for database operations
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up the conversation for a (vision, category) pair
    pub async fn find(&self, vision_id: &str, category: &str) -> Result<Option<Conversation>> {
        let query = format!(
            "SELECT {} FROM vision_conversations WHERE vision_id = ? AND category = ?",
            SELECT_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(vision_id)
            .bind(category)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch conversation")?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    /// Insert a fresh conversation (no steps, state neutral, version 0)
    ///
    /// If a row for the pair already exists (including one inserted by a
    /// concurrent request) it is returned untouched as `Existing`.
    pub async fn create(
        &self,
        user_id: &str,
        vision_id: &str,
        category: &str,
        initial_response: &ChatResponse,
    ) -> Result<CreateOutcome> {
        let now = now_secs()?;
        let id = uuid::Uuid::new_v4().to_string();
        let response_json =
            serde_json::to_string(initial_response).context("Failed to encode response")?;

        let result = sqlx::query(
            "INSERT INTO vision_conversations \
             (id, user_id, vision_id, category, messages, vibrational_state, last_response, version, created_at, updated_at) \
             VALUES (?, ?, ?, ?, '[]', ?, ?, 0, ?, ?) \
             ON CONFLICT (vision_id, category) DO NOTHING",
        )
        .bind(&id)
        .bind(user_id)
        .bind(vision_id)
        .bind(category)
        .bind(VibrationalState::Neutral.as_str())
        .bind(&response_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create conversation")?;

        if result.rows_affected() == 1 {
            return Ok(CreateOutcome::Created(Conversation {
                id,
                user_id: user_id.to_string(),
                vision_id: vision_id.to_string(),
                category: category.to_string(),
                messages: Vec::new(),
                vibrational_state: VibrationalState::Neutral,
                final_emotion_score: None,
                generated_vision: None,
                last_response: initial_response.clone(),
                version: 0,
                created_at: now,
                updated_at: now,
                vision_generated_at: None,
                completed_at: None,
            }));
        }

        let existing = self
            .find(vision_id, category)
            .await?
            .context("Conversation insert conflicted but no row was found")?;

        Ok(CreateOutcome::Existing(existing))
    }

    /// Append a step record and apply its side effects atomically
    ///
    /// The write only lands if the row is still at `conversation.version`.
    pub async fn record_step(
        &self,
        conversation: &Conversation,
        update: StepUpdate,
    ) -> Result<WriteOutcome> {
        let now = now_secs()?;

        let mut messages = conversation.messages.clone();
        messages.push(update.record);
        let messages_json = serde_json::to_string(&messages).context("Failed to encode steps")?;
        let response_json =
            serde_json::to_string(&update.response).context("Failed to encode response")?;

        let final_emotion_score = update
            .final_emotion_score
            .or(conversation.final_emotion_score);
        let (generated_vision, vision_generated_at, completed_at) = match update.generated_vision
        {
            Some(vision) => (Some(vision), Some(now), Some(now)),
            None => (
                conversation.generated_vision.clone(),
                conversation.vision_generated_at,
                conversation.completed_at,
            ),
        };
        let next_version = conversation.version + 1;

        let result = sqlx::query(
            "UPDATE vision_conversations SET messages = ?, vibrational_state = ?, \
             final_emotion_score = ?, generated_vision = ?, last_response = ?, version = ?, \
             updated_at = ?, vision_generated_at = ?, completed_at = ? \
             WHERE id = ? AND version = ?",
        )
        .bind(&messages_json)
        .bind(update.vibrational_state.as_str())
        .bind(final_emotion_score)
        .bind(&generated_vision)
        .bind(&response_json)
        .bind(next_version)
        .bind(now)
        .bind(vision_generated_at)
        .bind(completed_at)
        .bind(&conversation.id)
        .bind(conversation.version)
        .execute(&self.pool)
        .await
        .context("Failed to record conversation step")?;

        if result.rows_affected() == 0 {
            return Ok(WriteOutcome::Stale);
        }

        Ok(WriteOutcome::Applied(Conversation {
            messages,
            vibrational_state: update.vibrational_state,
            final_emotion_score,
            generated_vision,
            last_response: update.response,
            version: next_version,
            updated_at: now,
            vision_generated_at,
            completed_at,
            ..conversation.clone()
        }))
    }

    /// Generated visions of the user's other categories on the same vision
    pub async fn previous_visions(
        &self,
        user_id: &str,
        vision_id: &str,
        excluding_category: &str,
    ) -> Result<Vec<PreviousVision>> {
        let rows = sqlx::query(
            "SELECT category, generated_vision FROM vision_conversations \
             WHERE user_id = ? AND vision_id = ? AND category != ? AND generated_vision IS NOT NULL \
             ORDER BY completed_at ASC",
        )
        .bind(user_id)
        .bind(vision_id)
        .bind(excluding_category)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch previous visions")?;

        Ok(rows
            .into_iter()
            .map(|r| PreviousVision {
                category: r.get("category"),
                vision: r.get("generated_vision"),
            })
            .collect())
    }

    /// Conversations belonging to one vision, oldest first
    pub async fn list_for_vision(&self, vision_id: &str) -> Result<Vec<Conversation>> {
        let query = format!(
            "SELECT {} FROM vision_conversations WHERE vision_id = ? ORDER BY created_at ASC",
            SELECT_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(vision_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch conversations")?;

        rows.iter().map(conversation_from_row).collect()
    }
}

fn conversation_from_row(r: &SqliteRow) -> Result<Conversation> {
    let id: String = r.get("id");

    let messages: Vec<StepRecord> = serde_json::from_str(r.get::<&str, _>("messages"))
        .with_context(|| format!("Corrupt step records in conversation {}", id))?;
    let last_response: ChatResponse = serde_json::from_str(r.get::<&str, _>("last_response"))
        .with_context(|| format!("Corrupt stored response in conversation {}", id))?;
    let vibrational_state = VibrationalState::from_db(r.get::<&str, _>("vibrational_state"))?;

    Ok(Conversation {
        id,
        user_id: r.get("user_id"),
        vision_id: r.get("vision_id"),
        category: r.get("category"),
        messages,
        vibrational_state,
        final_emotion_score: r.get("final_emotion_score"),
        generated_vision: r.get("generated_vision"),
        last_response,
        version: r.get("version"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
        vision_generated_at: r.get("vision_generated_at"),
        completed_at: r.get("completed_at"),
    })
}
