//! Wire types for the discovery chat endpoint
//!
//! Field names follow the JSON contract of `POST /api/vision/chat`: request
//! identifiers are snake_case (`vision_id`), while presentation fields are
//! camelCase (`aiMessage`, `multiSelect`, `questionKey`, `patternDetected`).

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;

/// Body of a discovery chat request
///
/// Every field defaults so that missing fields are reported by the engine as
/// input faults instead of failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    #[serde(default)]
    pub vision_id: String,

    /// Category key ("fun") or display label ("Fun / Recreation")
    #[serde(default)]
    pub category: String,

    /// Raw action; parsed with [`Action::from_str`]
    #[serde(default)]
    pub action: String,

    /// Informational only; anything other than a small integer reads as `None`
    #[serde(
        default,
        deserialize_with = "lenient_step",
        skip_serializing_if = "Option::is_none"
    )]
    pub step: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selections: Option<Selections>,

    /// Free text for the "Something else" option (step 1 only)
    #[serde(
        default,
        rename = "customInput",
        alias = "custom_input",
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_input: Option<String>,
}

fn lenient_step<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawStep {
        Number(u64),
        Other(IgnoredAny),
    }

    Ok(match RawStep::deserialize(deserializer)? {
        RawStep::Number(n) => u8::try_from(n).ok(),
        RawStep::Other(_) => None,
    })
}

/// Selections payload; its shape depends on the step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Selections {
    /// Step 1 (broad options) and step 3 (single rhythm option)
    List(Vec<String>),

    /// Step 2: drill-down question key to selected option ids
    Map(BTreeMap<String, Vec<String>>),
}

/// Requested discovery action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start,
    SubmitStep1,
    SubmitStep2,
    SubmitStep3,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::SubmitStep1 => "submit_step_1",
            Action::SubmitStep2 => "submit_step_2",
            Action::SubmitStep3 => "submit_step_3",
        }
    }

    /// The step number this action submits, if any
    pub fn submitted_step(&self) -> Option<u8> {
        match self {
            Action::Start => None,
            Action::SubmitStep1 => Some(1),
            Action::SubmitStep2 => Some(2),
            Action::SubmitStep3 => Some(3),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" => Ok(Action::Start),
            "submit_step_1" => Ok(Action::SubmitStep1),
            "submit_step_2" => Ok(Action::SubmitStep2),
            "submit_step_3" => Ok(Action::SubmitStep3),
            "" => Err(EngineError::InvalidAction("action is required".to_string())),
            other => Err(EngineError::InvalidAction(other.to_string())),
        }
    }
}

/// An answer option as exposed to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionView {
    pub id: String,
    pub label: String,
    pub sublabel: String,
    pub icon: String,

    /// Present (and true) when the option opens a free-text entry
    #[serde(
        default,
        rename = "inputField",
        skip_serializing_if = "Option::is_none"
    )]
    pub input_field: Option<bool>,
}

/// A single question with its options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionView {
    pub text: String,
    pub options: Vec<OptionView>,
    #[serde(rename = "multiSelect")]
    pub multi_select: bool,
}

/// A follow-up question derived from step-1 selections
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrillDownQuestionView {
    #[serde(rename = "questionKey")]
    pub question_key: String,
    pub text: String,
    pub options: Vec<OptionView>,
    #[serde(rename = "multiSelect")]
    pub multi_select: bool,
}

/// Theme detected across steps 1 and 2
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternDetected {
    pub theme: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// Response of the discovery chat endpoint, one variant per phase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatResponse {
    DiscoveryQuestion {
        step: u8,
        #[serde(rename = "aiMessage")]
        ai_message: String,
        question: QuestionView,
    },

    DrillDownQuestions {
        step: u8,
        #[serde(rename = "aiMessage")]
        ai_message: String,
        questions: Vec<DrillDownQuestionView>,
    },

    RhythmQuestion {
        step: u8,
        #[serde(rename = "aiMessage")]
        ai_message: String,
        question: QuestionView,
        #[serde(rename = "patternDetected")]
        pattern_detected: PatternDetected,
    },

    VisionGenerated {
        vision: String,
        #[serde(rename = "aiMessage")]
        ai_message: String,
    },
}

impl ChatResponse {
    /// The `type` discriminant as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            ChatResponse::DiscoveryQuestion { .. } => "discovery_question",
            ChatResponse::DrillDownQuestions { .. } => "drill_down_questions",
            ChatResponse::RhythmQuestion { .. } => "rhythm_question",
            ChatResponse::VisionGenerated { .. } => "vision_generated",
        }
    }

    pub fn ai_message(&self) -> &str {
        match self {
            ChatResponse::DiscoveryQuestion { ai_message, .. }
            | ChatResponse::DrillDownQuestions { ai_message, .. }
            | ChatResponse::RhythmQuestion { ai_message, .. }
            | ChatResponse::VisionGenerated { ai_message, .. } => ai_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_parsing() {
        assert_eq!("start".parse::<Action>().unwrap(), Action::Start);
        assert_eq!(
            " submit_step_2 ".parse::<Action>().unwrap(),
            Action::SubmitStep2
        );
        assert!(matches!(
            "submit_step_4".parse::<Action>(),
            Err(EngineError::InvalidAction(a)) if a == "submit_step_4"
        ));
        assert!("".parse::<Action>().is_err());
        assert_eq!(Action::SubmitStep3.submitted_step(), Some(3));
        assert_eq!(Action::Start.submitted_step(), None);
    }

    #[test]
    fn test_request_selection_shapes() {
        let step1: ChatRequest = serde_json::from_value(json!({
            "vision_id": "v1",
            "category": "fun",
            "action": "submit_step_1",
            "step": 1,
            "selections": ["creative", "playful"],
            "customInput": "kite surfing"
        }))
        .unwrap();
        assert_eq!(
            step1.selections,
            Some(Selections::List(vec![
                "creative".to_string(),
                "playful".to_string()
            ]))
        );
        assert_eq!(step1.custom_input.as_deref(), Some("kite surfing"));

        let step2: ChatRequest = serde_json::from_value(json!({
            "vision_id": "v1",
            "category": "fun",
            "action": "submit_step_2",
            "selections": {"creative_types": ["visual"]}
        }))
        .unwrap();
        match step2.selections {
            Some(Selections::Map(map)) => assert_eq!(map["creative_types"], vec!["visual"]),
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_fields_default() {
        let req: ChatRequest = serde_json::from_value(json!({})).unwrap();
        assert!(req.vision_id.is_empty());
        assert!(req.selections.is_none());
    }

    #[test]
    fn test_informational_step_never_rejects_request() {
        for step in [json!(300), json!("1"), json!(null), json!(-1), json!({"n": 1})] {
            let req: ChatRequest = serde_json::from_value(json!({
                "vision_id": "v1",
                "category": "fun",
                "action": "start",
                "step": step,
            }))
            .unwrap();
            assert_eq!(req.step, None);
            assert_eq!(req.action, "start");
        }

        let req: ChatRequest = serde_json::from_value(json!({"step": 2})).unwrap();
        assert_eq!(req.step, Some(2));
    }

    #[test]
    fn test_response_wire_format() {
        let response = ChatResponse::RhythmQuestion {
            step: 3,
            ai_message: "One last question".to_string(),
            question: QuestionView {
                text: "How does it show up?".to_string(),
                options: vec![OptionView {
                    id: "daily".to_string(),
                    label: "Little moments daily".to_string(),
                    sublabel: String::new(),
                    icon: "☀️".to_string(),
                    input_field: None,
                }],
                multi_select: false,
            },
            pattern_detected: PatternDetected {
                theme: "creative freedom".to_string(),
                evidence: vec!["picked creative".to_string()],
            },
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "rhythm_question");
        assert_eq!(value["aiMessage"], "One last question");
        assert_eq!(value["question"]["multiSelect"], false);
        assert_eq!(value["patternDetected"]["theme"], "creative freedom");
        assert!(value["question"]["options"][0].get("inputField").is_none());
        assert_eq!(response.kind(), "rhythm_question");
    }
}
