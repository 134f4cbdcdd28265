//! Discovery conversation orchestrator
//!
//! Validates a chat request, looks up the persisted conversation, picks a
//! transition from the phase table, runs the budget-guarded generations for
//! that step and persists the result with one compare-and-swap write.
//!
//! Nothing is written until every generation of a step has finished, so a
//! failed provider call leaves the conversation exactly as it was and the
//! client can resubmit the same step.

use sdk::errors::EngineError;
use sdk::types::{Action, ChatRequest, ChatResponse, PatternDetected, Selections};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::catalog::{catalog, Category, DiscoveryQuestion};
use super::phase::{decide, Transition};
use super::prompts;
use crate::config::{DiscoveryConfig, GenerationConfig};
use crate::db::{
    Conversation, ConversationRepository, CreateOutcome, Database, PreviousVision, StepRecord,
    StepUpdate, UsageRecord, VibrationalState, WriteOutcome,
};
use crate::llm::{CompletionProvider, CompletionRequest, Message};
use crate::tokens::{calculate_cost_cents, estimate_tokens_for_text, GenerationPhase, TokenBudget};

/// Most step-1 options a request may carry
pub const MAX_BROAD_SELECTIONS: usize = 20;

/// Longest accepted free-text answer, in characters
pub const MAX_CUSTOM_INPUT_CHARS: usize = 1000;

/// Emotion score recorded when a conversation completes
pub const FINAL_EMOTION_SCORE: i64 = 4;

/// A request that passed every check that needs no database access
#[derive(Debug)]
struct ValidatedRequest {
    vision_id: String,
    category: &'static Category,
    template: &'static DiscoveryQuestion,
    action: Action,
    record: Option<StepRecord>,
}

/// What a step produces besides its own record
struct StepOutcome {
    vibrational_state: VibrationalState,
    final_emotion_score: Option<i64>,
    generated_vision: Option<String>,
    response: ChatResponse,
}

/// Identifies whose generation is being charged
struct GenerationContext<'a> {
    user_id: &'a str,
    vision_id: &'a str,
    category: &'static Category,
}

/// Drives the four-phase discovery dialogue for one (vision, category)
pub struct DiscoveryOrchestrator {
    conversations: ConversationRepository,
    budget: TokenBudget,
    provider: Arc<dyn CompletionProvider>,
    settings: DiscoveryConfig,
}

impl DiscoveryOrchestrator {
    pub fn new(
        db: &Database,
        provider: Arc<dyn CompletionProvider>,
        settings: DiscoveryConfig,
        chars_per_token: usize,
    ) -> Self {
        Self {
            conversations: db.conversations(),
            budget: TokenBudget::new(db.tokens(), chars_per_token),
            provider,
            settings,
        }
    }

    /// Handle one chat request on behalf of an authenticated user
    pub async fn handle(
        &self,
        user_id: &str,
        request: ChatRequest,
    ) -> Result<ChatResponse, EngineError> {
        let request = validate(request)?;
        debug!(
            "Discovery {} for vision {} / {}",
            request.action, request.vision_id, request.category.key
        );

        let existing = self
            .conversations
            .find(&request.vision_id, request.category.key)
            .await?;

        if let Some(conversation) = &existing {
            ensure_owner(conversation, user_id)?;
        }

        let transition = decide(
            existing.as_ref().map(|c| c.messages.as_slice()),
            request.action,
            request.record.as_ref(),
        )?;

        match (transition, existing) {
            (Transition::Create, _) => self.create(user_id, &request).await,
            (Transition::Resume, Some(conversation)) | (Transition::Replay, Some(conversation)) => {
                debug!(
                    "Returning stored response for conversation {}",
                    conversation.id
                );
                Ok(conversation.last_response)
            }
            (Transition::Advance(step), Some(conversation)) => {
                self.advance(user_id, &request, step, conversation).await
            }
            (_, None) => Err(EngineError::Internal(
                "transition requires an existing conversation".to_string(),
            )),
        }
    }

    async fn create(
        &self,
        user_id: &str,
        request: &ValidatedRequest,
    ) -> Result<ChatResponse, EngineError> {
        let response = ChatResponse::DiscoveryQuestion {
            step: 1,
            ai_message: request.template.ai_message.to_string(),
            question: request.template.view(),
        };

        match self
            .conversations
            .create(
                user_id,
                &request.vision_id,
                request.category.key,
                &response,
            )
            .await?
        {
            CreateOutcome::Created(conversation) => {
                info!(
                    "Started discovery conversation {} ({} / {})",
                    conversation.id, request.vision_id, request.category.key
                );
                Ok(response)
            }
            CreateOutcome::Existing(conversation) => {
                ensure_owner(&conversation, user_id)?;
                debug!(
                    "Concurrent start resolved to conversation {}",
                    conversation.id
                );
                Ok(conversation.last_response)
            }
        }
    }

    async fn advance(
        &self,
        user_id: &str,
        request: &ValidatedRequest,
        step: u8,
        conversation: Conversation,
    ) -> Result<ChatResponse, EngineError> {
        let record = request.record.clone().ok_or_else(|| {
            EngineError::Internal(format!("step {} submitted without a record", step))
        })?;

        let ctx = GenerationContext {
            user_id,
            vision_id: &request.vision_id,
            category: request.category,
        };

        let outcome = match &record {
            StepRecord::Broad {
                selections,
                custom_input,
            } => {
                self.broad_selection(&ctx, selections, custom_input.as_deref())
                    .await?
            }
            StepRecord::DrillDown { selections } => {
                let (broad, custom_input) = broad_record(&conversation)?;
                validate_drill_down_keys(request.category, broad, selections)?;
                self.drill_down(&ctx, broad, custom_input, selections)
                    .await?
            }
            StepRecord::Rhythm { .. } => {
                let mut records = conversation.messages.clone();
                records.push(record.clone());
                self.rhythm(&ctx, &records).await?
            }
        };

        let update = StepUpdate {
            record,
            vibrational_state: outcome.vibrational_state,
            final_emotion_score: outcome.final_emotion_score,
            generated_vision: outcome.generated_vision,
            response: outcome.response,
        };
        let conversation_id = conversation.id.clone();

        match self.conversations.record_step(&conversation, update).await? {
            WriteOutcome::Applied(updated) => {
                info!(
                    "Conversation {} advanced to step {} (version {})",
                    updated.id, step, updated.version
                );
                Ok(updated.last_response)
            }
            WriteOutcome::Stale => {
                // A concurrent identical submission wins the race; replay its answer
                let current = self
                    .conversations
                    .find(&request.vision_id, request.category.key)
                    .await?;
                if let Some(current) = current {
                    if current.messages.len() == usize::from(step)
                        && current.messages.last() == request.record.as_ref()
                    {
                        return Ok(current.last_response);
                    }
                }
                warn!(
                    "Stale write for conversation {} at step {}",
                    conversation_id, step
                );
                Err(EngineError::Conflict(format!(
                    "conversation changed while step {} was being processed",
                    step
                )))
            }
        }
    }

    /// Step 1: drill-downs plus a short acknowledgment
    async fn broad_selection(
        &self,
        ctx: &GenerationContext<'_>,
        selections: &[String],
        custom_input: Option<&str>,
    ) -> Result<StepOutcome, EngineError> {
        let questions: Vec<_> = catalog()
            .drill_downs(ctx.category.key, selections)
            .into_iter()
            .map(|d| d.view())
            .collect();

        let acknowledgment = self
            .generate(
                ctx,
                GenerationPhase::Acknowledgment,
                prompts::acknowledgment_messages(ctx.category, selections, custom_input),
                &self.settings.acknowledgment,
                false,
            )
            .await?
            .unwrap_or_else(|| prompts::FALLBACK_ACKNOWLEDGMENT.to_string());

        Ok(StepOutcome {
            vibrational_state: VibrationalState::Neutral,
            final_emotion_score: None,
            generated_vision: None,
            response: ChatResponse::DrillDownQuestions {
                step: 2,
                ai_message: acknowledgment,
                questions,
            },
        })
    }

    /// Step 2: theme detection, then a message naming the theme
    async fn drill_down(
        &self,
        ctx: &GenerationContext<'_>,
        broad: &[String],
        custom_input: Option<&str>,
        selections: &BTreeMap<String, Vec<String>>,
    ) -> Result<StepOutcome, EngineError> {
        let pattern = self.detect_pattern(ctx, broad, custom_input, selections).await?;

        let message = self
            .generate(
                ctx,
                GenerationPhase::PatternMessage,
                prompts::pattern_message_messages(ctx.category, &pattern),
                &self.settings.pattern_message,
                false,
            )
            .await?
            .unwrap_or_else(|| prompts::FALLBACK_PATTERN_MESSAGE.to_string());

        Ok(StepOutcome {
            vibrational_state: VibrationalState::AboveGreenLine,
            final_emotion_score: None,
            generated_vision: None,
            response: ChatResponse::RhythmQuestion {
                step: 3,
                ai_message: message,
                question: catalog().rhythm().view(),
                pattern_detected: pattern,
            },
        })
    }

    async fn detect_pattern(
        &self,
        ctx: &GenerationContext<'_>,
        broad: &[String],
        custom_input: Option<&str>,
        selections: &BTreeMap<String, Vec<String>>,
    ) -> Result<PatternDetected, EngineError> {
        let output = self
            .generate(
                ctx,
                GenerationPhase::PatternDetection,
                prompts::pattern_detection_messages(ctx.category, broad, custom_input, selections),
                &self.settings.pattern_detection,
                true,
            )
            .await?;

        let Some(output) = output else {
            return Ok(prompts::fallback_pattern());
        };

        match prompts::parse_pattern(&output) {
            Some(pattern) => Ok(pattern),
            None => {
                warn!("Pattern detection returned unusable output; using fallback theme");
                Ok(prompts::fallback_pattern())
            }
        }
    }

    /// Step 3: the vision itself
    async fn rhythm(
        &self,
        ctx: &GenerationContext<'_>,
        records: &[StepRecord],
    ) -> Result<StepOutcome, EngineError> {
        let previous: Vec<PreviousVision> = self
            .conversations
            .previous_visions(ctx.user_id, ctx.vision_id, ctx.category.key)
            .await?
            .into_iter()
            .filter(|pv| {
                let text = pv.vision.trim();
                !text.is_empty() && text != prompts::FALLBACK_VISION
            })
            .collect();

        let vision = self
            .generate(
                ctx,
                GenerationPhase::Vision,
                prompts::vision_messages(ctx.category, records, &previous),
                &self.settings.vision,
                false,
            )
            .await?
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| prompts::FALLBACK_VISION.to_string());

        Ok(StepOutcome {
            vibrational_state: VibrationalState::AboveGreenLine,
            final_emotion_score: Some(FINAL_EMOTION_SCORE),
            generated_vision: Some(vision.clone()),
            response: ChatResponse::VisionGenerated {
                vision,
                ai_message: prompts::closing_message(ctx.category),
            },
        })
    }

    /// Run one budget-guarded completion
    ///
    /// Returns `Ok(None)` when the user's balance cannot cover the estimate;
    /// the provider is not called in that case.
    async fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        phase: GenerationPhase,
        messages: Vec<Message>,
        settings: &GenerationConfig,
        json_response: bool,
    ) -> Result<Option<String>, EngineError> {
        let request = CompletionRequest {
            messages,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            json_response,
        };

        let estimated = self.budget.estimate(&request);
        if let Some(shortfall) = self.budget.check(ctx.user_id, estimated).await? {
            info!(
                "Skipping {} for user {}: needs {} tokens, has {}",
                phase.as_str(),
                ctx.user_id,
                shortfall.needed,
                shortfall.available
            );
            return Ok(None);
        }

        let completion = self.provider.complete(&request).await.map_err(|e| {
            EngineError::LLMProvider(format!("{} generation failed: {}", phase.as_str(), e))
        })?;

        let (input_tokens, output_tokens) = match completion.usage {
            Some(usage) => (
                i64::from(usage.prompt_tokens),
                i64::from(usage.completion_tokens),
            ),
            None => {
                let chars_per_token = self.budget.chars_per_token();
                let prompt: i64 = request
                    .messages
                    .iter()
                    .map(|m| estimate_tokens_for_text(&m.content, chars_per_token))
                    .sum();
                (
                    prompt,
                    estimate_tokens_for_text(&completion.text, chars_per_token),
                )
            }
        };

        let model = self.provider.model().to_string();
        self.budget.record_in_background(UsageRecord {
            user_id: ctx.user_id.to_string(),
            action_type: phase.action_type().to_string(),
            cost_estimate_cents: calculate_cost_cents(&model, input_tokens, output_tokens),
            model_used: model,
            input_tokens,
            output_tokens,
            success: true,
            metadata: serde_json::json!({
                "vision_id": ctx.vision_id,
                "category": ctx.category.key,
                "phase": phase.as_str(),
            }),
        });

        Ok(Some(completion.text))
    }
}

fn ensure_owner(conversation: &Conversation, user_id: &str) -> Result<(), EngineError> {
    if conversation.user_id != user_id {
        return Err(EngineError::Forbidden(
            "conversation belongs to another user".to_string(),
        ));
    }
    Ok(())
}

/// The stored step-1 selections and free text
fn broad_record(conversation: &Conversation) -> Result<(&[String], Option<&str>), EngineError> {
    match conversation.messages.first() {
        Some(StepRecord::Broad {
            selections,
            custom_input,
        }) => Ok((selections.as_slice(), custom_input.as_deref())),
        _ => Err(EngineError::Internal(format!(
            "conversation {} has no step-1 record",
            conversation.id
        ))),
    }
}

/// Step-2 keys must be drill-downs actually offered for the stored step-1 answer
fn validate_drill_down_keys(
    category: &Category,
    broad: &[String],
    selections: &BTreeMap<String, Vec<String>>,
) -> Result<(), EngineError> {
    let offered = catalog().drill_downs(category.key, broad);
    for key in selections.keys() {
        if !offered.iter().any(|d| d.key == key.as_str()) {
            return Err(EngineError::InvalidInput(format!(
                "drill-down '{}' was not offered for these step 1 selections",
                key
            )));
        }
    }
    Ok(())
}

/// Every check that needs no database access, in a fixed order
fn validate(request: ChatRequest) -> Result<ValidatedRequest, EngineError> {
    let vision_id = request.vision_id.trim();
    let category_name = request.category.trim();
    if vision_id.is_empty() || category_name.is_empty() {
        return Err(EngineError::InvalidInput(
            "vision_id and category are required".to_string(),
        ));
    }

    let action: Action = request.action.parse()?;

    let record = match action {
        Action::Start => None,
        Action::SubmitStep1 => Some(broad_shape(request.selections, request.custom_input)?),
        Action::SubmitStep2 => Some(drill_down_shape(request.selections)?),
        Action::SubmitStep3 => Some(rhythm_shape(request.selections)?),
    };

    let category = catalog()
        .resolve_category(category_name)
        .ok_or_else(|| EngineError::TemplateNotFound(category_name.to_string()))?;
    let template = catalog()
        .template(category.key)
        .ok_or_else(|| EngineError::TemplateNotFound(category.label.to_string()))?;

    if let Some(record) = &record {
        validate_option_ids(category, template, record)?;
    }

    Ok(ValidatedRequest {
        vision_id: vision_id.to_string(),
        category,
        template,
        action,
        record,
    })
}

fn broad_shape(
    selections: Option<Selections>,
    custom_input: Option<String>,
) -> Result<StepRecord, EngineError> {
    let selections = match selections {
        Some(Selections::List(ids)) => ids,
        _ => {
            return Err(EngineError::InvalidInput(
                "step 1 selections must be a list of option ids".to_string(),
            ))
        }
    };

    if selections.is_empty() {
        return Err(EngineError::InvalidInput(
            "select at least one option".to_string(),
        ));
    }
    if selections.len() > MAX_BROAD_SELECTIONS {
        return Err(EngineError::InvalidInput(format!(
            "at most {} options may be selected",
            MAX_BROAD_SELECTIONS
        )));
    }

    let unique = {
        let mut seen = std::collections::HashSet::new();
        selections.iter().all(|id| seen.insert(id.as_str()))
    };
    if !unique {
        return Err(EngineError::InvalidInput(
            "step 1 selections contain duplicates".to_string(),
        ));
    }

    let custom_input = custom_input
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    if let Some(text) = &custom_input {
        if text.chars().count() > MAX_CUSTOM_INPUT_CHARS {
            return Err(EngineError::InvalidInput(format!(
                "customInput is limited to {} characters",
                MAX_CUSTOM_INPUT_CHARS
            )));
        }
    }

    Ok(StepRecord::Broad {
        selections,
        custom_input,
    })
}

fn drill_down_shape(selections: Option<Selections>) -> Result<StepRecord, EngineError> {
    match selections {
        Some(Selections::Map(selections)) => Ok(StepRecord::DrillDown { selections }),
        // `{}` and `[]` are indistinguishable to clients that send "nothing picked"
        Some(Selections::List(ids)) if ids.is_empty() => Ok(StepRecord::DrillDown {
            selections: BTreeMap::new(),
        }),
        _ => Err(EngineError::InvalidInput(
            "step 2 selections must map question keys to option ids".to_string(),
        )),
    }
}

fn rhythm_shape(selections: Option<Selections>) -> Result<StepRecord, EngineError> {
    match selections {
        Some(Selections::List(mut ids)) if ids.len() == 1 => Ok(StepRecord::Rhythm {
            selection: ids.remove(0),
        }),
        _ => Err(EngineError::InvalidInput(
            "step 3 takes exactly one selection".to_string(),
        )),
    }
}

fn validate_option_ids(
    category: &Category,
    template: &DiscoveryQuestion,
    record: &StepRecord,
) -> Result<(), EngineError> {
    match record {
        StepRecord::Broad { selections, .. } => {
            for id in selections {
                if template.option(id).is_none() {
                    return Err(EngineError::InvalidInput(format!(
                        "unknown option '{}' for {}",
                        id, category.label
                    )));
                }
            }
        }
        StepRecord::DrillDown { selections } => {
            // Against every drill-down of the category; whether a key was
            // offered is checked once the stored step-1 answer is known
            for (key, ids) in selections {
                let drill_down = catalog().drill_down(category.key, key).ok_or_else(|| {
                    EngineError::InvalidInput(format!(
                        "unknown drill-down '{}' for {}",
                        key, category.label
                    ))
                })?;
                for id in ids {
                    if drill_down.option(id).is_none() {
                        return Err(EngineError::InvalidInput(format!(
                            "unknown option '{}' for drill-down '{}'",
                            id, key
                        )));
                    }
                }
            }
        }
        StepRecord::Rhythm { selection } => {
            if catalog().rhythm().option(selection).is_none() {
                return Err(EngineError::InvalidInput(format!(
                    "unknown rhythm option '{}'",
                    selection
                )));
            }
        }
    }
    Ok(())
}
