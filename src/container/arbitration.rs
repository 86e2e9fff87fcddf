//! Arbitration decision logic for container controls
//!
//! Everything here is pure: given the input, the ordered candidate
//! metadata, and the container's recency records, produce one explicit
//! decision. The container caches that decision between `can_handle` and
//! `handle` and consumes it exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::control::ControlId;
use crate::error::DialogError;
use crate::input::TurnInput;

/// How a container breaks ties between multiple willing children.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ArbitrationStrategy {
    /// Pick the first candidate in declaration order
    FirstMatch,
    /// Prefer the child that most recently held the initiative
    #[default]
    MostRecentInitiative,
    /// Ask the user when target ambiguity is detected; otherwise first match
    AskExplicitly,
}

/// Which child last handled input or last took initiative, and when.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecencyRecord {
    /// Child id at the time of recording; may be stale for dynamic
    /// containers and is then skipped, never an error
    pub control_id: ControlId,
    /// Turn on which the record was made
    pub turn_number: u32,
    /// Wall-clock time of the recording
    pub recorded_at: DateTime<Utc>,
}

impl RecencyRecord {
    /// Record a child as of the given turn.
    pub fn new(control_id: impl Into<ControlId>, turn_number: u32) -> Self {
        Self {
            control_id: control_id.into(),
            turn_number,
            recorded_at: Utc::now(),
        }
    }
}

/// Kinds of question a container can pose on its own behalf.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QuestionKind {
    /// "Which one did you mean" among same-target candidates
    TargetAmbiguity,
}

/// An outstanding "which one did you mean" question, persisted across the
/// turn boundary so the reply can be matched against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisambiguationQuestion {
    /// What kind of question was raised
    pub kind: QuestionKind,
    /// Turn on which it was raised
    pub turn_raised: u32,
    /// Wall-clock time it was raised
    pub raised_at: DateTime<Utc>,
    /// Candidates offered, in candidate order
    pub choices: Vec<DisambiguationChoice>,
}

/// One offered candidate: the child and the label that disambiguates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisambiguationChoice {
    pub control_id: ControlId,
    pub label: String,
}

/// Arbitration-relevant metadata for one candidate child, captured in
/// declaration order.
#[derive(Debug, Clone)]
pub struct CandidateMeta {
    /// Position in the container's child list
    pub index: usize,
    pub control_id: ControlId,
    pub targets: Vec<String>,
    pub specific_target: Option<String>,
}

/// The single explicit outcome of arbitration, threaded into `handle`.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbitrationDecision {
    /// Delegate handling to one child
    Delegate { index: usize, control_id: ControlId },
    /// The input answers an outstanding disambiguation question; dispatch
    /// to the chosen child without re-gathering candidates
    DisambiguationReply { index: usize, control_id: ControlId },
    /// Ambiguity detected; pose the question instead of guessing
    RaiseQuestion { question: DisambiguationQuestion },
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Match the user's words against an outstanding question's offered labels.
/// Accepts either a general-control target or a bare value; comparison is
/// case-insensitive and ignores a leading article.
pub fn match_reply<'q>(
    question: &'q DisambiguationQuestion,
    input: &TurnInput,
) -> Option<&'q DisambiguationChoice> {
    let normalized = normalize(input.selection_text()?);
    let stripped = normalized.strip_prefix("the ").unwrap_or(&normalized);
    question
        .choices
        .iter()
        .find(|choice| normalize(&choice.label) == stripped)
}

/// Detect implicit target ambiguity among the candidates for a general
/// control-type input.
///
/// Returns a question when more than one candidate exists, the input's
/// target (if present) is registered by every candidate, and every
/// candidate renders a distinct specific-target label. Two candidates
/// sharing a label is a configuration fault, not a runtime choice.
pub fn detect_target_ambiguity(
    input: &TurnInput,
    candidates: &[CandidateMeta],
) -> Result<Option<DisambiguationQuestion>, DialogError> {
    if candidates.len() < 2 {
        return Ok(None);
    }
    let Some(intent) = input.general_control() else {
        return Ok(None);
    };

    // A target naming only some candidates already disambiguates.
    if let Some(target) = &intent.target {
        let shared = candidates
            .iter()
            .all(|c| c.targets.iter().any(|t| normalize(t) == normalize(target)));
        if !shared {
            return Ok(None);
        }
    }

    // Without a rendered label for every candidate there is nothing to
    // offer; fall back to the tie-break.
    if candidates.iter().any(|c| c.specific_target.is_none()) {
        debug!(
            "target ambiguity not raised: a candidate has no specific target label"
        );
        return Ok(None);
    }

    let mut choices: Vec<DisambiguationChoice> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let label = candidate
            .specific_target
            .clone()
            .unwrap_or_default();
        if let Some(existing) = choices
            .iter()
            .find(|c| normalize(&c.label) == normalize(&label))
        {
            return Err(DialogError::DuplicateTargetLabel {
                label,
                first: existing.control_id.clone(),
                second: candidate.control_id.clone(),
            });
        }
        choices.push(DisambiguationChoice {
            control_id: candidate.control_id.clone(),
            label,
        });
    }

    Ok(Some(DisambiguationQuestion {
        kind: QuestionKind::TargetAmbiguity,
        turn_raised: input.turn_number,
        raised_at: Utc::now(),
        choices,
    }))
}

/// Pick the winning candidate index (into `candidates`) for the given
/// strategy. `preferred` lists recency records in preference order; the
/// first record naming a current candidate wins, otherwise the first
/// candidate does.
pub fn select_winner(
    candidates: &[CandidateMeta],
    strategy: ArbitrationStrategy,
    preferred: &[Option<&RecencyRecord>],
) -> usize {
    match strategy {
        ArbitrationStrategy::FirstMatch | ArbitrationStrategy::AskExplicitly => 0,
        ArbitrationStrategy::MostRecentInitiative => {
            for record in preferred.iter().flatten() {
                if let Some(position) = candidates
                    .iter()
                    .position(|c| c.control_id == record.control_id)
                {
                    return position;
                }
            }
            0
        }
    }
}
