//! Conversation phases and the transition table

use sdk::errors::EngineError;
use sdk::types::Action;
use std::fmt;

use crate::db::StepRecord;

/// Where a persisted conversation stands, derived from its step records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingBroadSelection,
    AwaitingDrillDown,
    AwaitingRhythm,
    Complete,
}

impl Phase {
    /// Derive the phase from stored records, which must be exactly steps 1..=n
    pub fn from_records(records: &[StepRecord]) -> Result<Self, EngineError> {
        for (index, record) in records.iter().enumerate() {
            if usize::from(record.step()) != index + 1 {
                return Err(EngineError::Internal(format!(
                    "step records out of sequence: position {} holds step {}",
                    index + 1,
                    record.step()
                )));
            }
        }

        match records.len() {
            0 => Ok(Phase::AwaitingBroadSelection),
            1 => Ok(Phase::AwaitingDrillDown),
            2 => Ok(Phase::AwaitingRhythm),
            3 => Ok(Phase::Complete),
            n => Err(EngineError::Internal(format!(
                "conversation holds {} step records",
                n
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::AwaitingBroadSelection => "awaiting_broad_selection",
            Phase::AwaitingDrillDown => "awaiting_drill_down",
            Phase::AwaitingRhythm => "awaiting_rhythm",
            Phase::Complete => "complete",
        }
    }

    /// The step this phase accepts next, if any
    pub fn next_step(&self) -> Option<u8> {
        match self {
            Phase::AwaitingBroadSelection => Some(1),
            Phase::AwaitingDrillDown => Some(2),
            Phase::AwaitingRhythm => Some(3),
            Phase::Complete => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a request does to a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No row yet: insert one and ask the step-1 question
    Create,
    /// `start` on an existing row: return its stored response
    Resume,
    /// Append the submitted step
    Advance(u8),
    /// Identical resubmission of the step just recorded: return its stored response
    Replay,
}

/// Map (persisted state, requested action) to a transition
///
/// `records` is `None` when no conversation exists. `submitted` is the step
/// record the request would append (absent for `start`).
pub fn decide(
    records: Option<&[StepRecord]>,
    action: Action,
    submitted: Option<&StepRecord>,
) -> Result<Transition, EngineError> {
    let Some(records) = records else {
        return match action {
            Action::Start => Ok(Transition::Create),
            _ => Err(EngineError::InvalidTransition {
                phase: "not_started".to_string(),
                action: action.to_string(),
            }),
        };
    };

    let phase = Phase::from_records(records)?;

    let Some(step) = action.submitted_step() else {
        return Ok(Transition::Resume);
    };

    if phase.next_step() == Some(step) {
        return Ok(Transition::Advance(step));
    }

    // The step just recorded, submitted again
    if usize::from(step) == records.len() {
        let matches = match (records.last(), submitted) {
            (Some(last), Some(new)) => last == new,
            _ => false,
        };
        if matches {
            return Ok(Transition::Replay);
        }
        return Err(EngineError::Conflict(format!(
            "step {} was already submitted with different selections",
            step
        )));
    }

    Err(EngineError::InvalidTransition {
        phase: phase.to_string(),
        action: action.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn broad(ids: &[&str]) -> StepRecord {
        StepRecord::Broad {
            selections: ids.iter().map(|s| s.to_string()).collect(),
            custom_input: None,
        }
    }

    fn drill() -> StepRecord {
        StepRecord::DrillDown {
            selections: BTreeMap::new(),
        }
    }

    fn rhythm(id: &str) -> StepRecord {
        StepRecord::Rhythm {
            selection: id.to_string(),
        }
    }

    #[test]
    fn test_phase_from_records() {
        assert_eq!(
            Phase::from_records(&[]).unwrap(),
            Phase::AwaitingBroadSelection
        );
        assert_eq!(
            Phase::from_records(&[broad(&["fun"]), drill()]).unwrap(),
            Phase::AwaitingRhythm
        );
        assert_eq!(
            Phase::from_records(&[broad(&["a"]), drill(), rhythm("daily")]).unwrap(),
            Phase::Complete
        );
    }

    #[test]
    fn test_out_of_sequence_records_are_internal_faults() {
        assert!(matches!(
            Phase::from_records(&[drill()]),
            Err(EngineError::Internal(_))
        ));
        assert!(matches!(
            Phase::from_records(&[broad(&["a"]), broad(&["a"])]),
            Err(EngineError::Internal(_))
        ));
    }

    #[test]
    fn test_no_conversation() {
        assert_eq!(decide(None, Action::Start, None).unwrap(), Transition::Create);

        let record = broad(&["creative"]);
        assert!(matches!(
            decide(None, Action::SubmitStep1, Some(&record)),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_start_resumes_any_phase() {
        let records = vec![broad(&["creative"]), drill(), rhythm("daily")];
        for n in 0..=3 {
            assert_eq!(
                decide(Some(&records[..n]), Action::Start, None).unwrap(),
                Transition::Resume
            );
        }
    }

    #[test]
    fn test_advance_in_order() {
        let records = vec![broad(&["creative"]), drill()];
        let next = rhythm("weekly");
        assert_eq!(
            decide(Some(records.as_slice()), Action::SubmitStep3, Some(&next)).unwrap(),
            Transition::Advance(3)
        );
    }

    #[test]
    fn test_replay_and_conflict() {
        let records = vec![broad(&["creative", "playful"])];

        let same = broad(&["creative", "playful"]);
        assert_eq!(
            decide(Some(records.as_slice()), Action::SubmitStep1, Some(&same)).unwrap(),
            Transition::Replay
        );

        let different = broad(&["playful"]);
        assert!(matches!(
            decide(Some(records.as_slice()), Action::SubmitStep1, Some(&different)),
            Err(EngineError::Conflict(_))
        ));
    }

    #[test]
    fn test_skips_and_rewinds_rejected() {
        let empty: Vec<StepRecord> = Vec::new();
        let record = rhythm("daily");
        assert!(matches!(
            decide(Some(empty.as_slice()), Action::SubmitStep3, Some(&record)),
            Err(EngineError::InvalidTransition { .. })
        ));

        let complete = vec![broad(&["creative"]), drill(), rhythm("daily")];
        let again = broad(&["creative"]);
        assert!(matches!(
            decide(Some(complete.as_slice()), Action::SubmitStep1, Some(&again)),
            Err(EngineError::InvalidTransition { .. })
        ));

        // An identical step-3 resubmission on a complete conversation replays
        assert_eq!(
            decide(Some(complete.as_slice()), Action::SubmitStep3, Some(&rhythm("daily"))).unwrap(),
            Transition::Replay
        );
    }
}
