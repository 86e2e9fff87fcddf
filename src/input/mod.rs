//! Classified user input for a single conversational turn
//!
//! The core never parses speech itself. The hosting request layer runs the
//! recognizer and hands the core an already-classified record; the accessor
//! methods here are the matching primitives the arbitration engine
//! pattern-matches against.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One classified user utterance, as delivered to the control tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnInput {
    /// Correlation id for this turn
    pub turn_id: Uuid,
    /// Sequential turn number within the conversation
    pub turn_number: u32,
    /// The classified utterance
    pub utterance: Utterance,
}

/// The closed set of utterance shapes the core understands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Utterance {
    /// A generic control-type request ("change the date", "set the count to 3")
    GeneralControl(GeneralControlIntent),
    /// A bare slot value, meaningful only to a control that asked for one
    Value(String),
    /// A yes/no reply to a confirmation question
    Feedback(Feedback),
    /// The recognizer could not classify the utterance
    Fallback,
}

/// A general control-type request with optional target and value slots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralControlIntent {
    /// What the user wants done
    pub action: ControlAction,
    /// Which slot of data the user named, if any ("date", "start date")
    pub target: Option<String>,
    /// The new value, if the user supplied one in the same breath
    pub value: Option<String>,
}

/// Actions a general control intent can carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ControlAction {
    /// Provide a value for the first time
    Set,
    /// Replace an existing value
    Change,
    /// Pick one of several offered options
    Select,
}

/// Yes/no feedback for confirmation sub-dialogues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Feedback {
    Affirm,
    Deny,
}

impl TurnInput {
    /// Create a general control-type input.
    pub fn general(
        turn_number: u32,
        action: ControlAction,
        target: Option<&str>,
        value: Option<&str>,
    ) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            turn_number,
            utterance: Utterance::GeneralControl(GeneralControlIntent {
                action,
                target: target.map(str::to_string),
                value: value.map(str::to_string),
            }),
        }
    }

    /// Create a bare-value input.
    pub fn value(turn_number: u32, value: impl Into<String>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            turn_number,
            utterance: Utterance::Value(value.into()),
        }
    }

    /// Create an affirmative reply.
    pub fn affirm(turn_number: u32) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            turn_number,
            utterance: Utterance::Feedback(Feedback::Affirm),
        }
    }

    /// Create a negative reply.
    pub fn deny(turn_number: u32) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            turn_number,
            utterance: Utterance::Feedback(Feedback::Deny),
        }
    }

    /// Create a fallback input (unclassifiable speech).
    pub fn fallback(turn_number: u32) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            turn_number,
            utterance: Utterance::Fallback,
        }
    }

    /// Unpack a general control intent, if that is what this turn carries.
    pub fn general_control(&self) -> Option<&GeneralControlIntent> {
        match &self.utterance {
            Utterance::GeneralControl(intent) => Some(intent),
            _ => None,
        }
    }

    /// Unpack a bare slot value.
    pub fn bare_value(&self) -> Option<&str> {
        match &self.utterance {
            Utterance::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Unpack yes/no feedback.
    pub fn feedback(&self) -> Option<Feedback> {
        match &self.utterance {
            Utterance::Feedback(feedback) => Some(*feedback),
            _ => None,
        }
    }

    /// Whether the recognizer failed to classify the utterance.
    pub fn is_fallback(&self) -> bool {
        matches!(self.utterance, Utterance::Fallback)
    }

    /// The user's words as a candidate answer to an outstanding
    /// disambiguation question: either the target of a general control
    /// intent or a bare value.
    pub fn selection_text(&self) -> Option<&str> {
        match &self.utterance {
            Utterance::GeneralControl(intent) => intent.target.as_deref(),
            Utterance::Value(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_match_utterance_kind() {
        let input = TurnInput::general(1, ControlAction::Change, Some("date"), None);
        assert!(input.general_control().is_some());
        assert!(input.bare_value().is_none());
        assert!(!input.is_fallback());

        let input = TurnInput::value(2, "tuesday");
        assert_eq!(input.bare_value(), Some("tuesday"));
        assert!(input.general_control().is_none());

        let input = TurnInput::fallback(3);
        assert!(input.is_fallback());
        assert_eq!(input.selection_text(), None);
    }

    #[test]
    fn test_selection_text_prefers_target() {
        let input = TurnInput::general(4, ControlAction::Select, Some("start date"), None);
        assert_eq!(input.selection_text(), Some("start date"));

        let input = TurnInput::value(5, "start date");
        assert_eq!(input.selection_text(), Some("start date"));
    }
}
