//! The Control contract - the polymorphic unit of dialogue behavior
//!
//! A control is a node in the tree that manages one slot of conversational
//! state. Each turn it is asked, in order: can you handle this input? can
//! you take the initiative? The tree is rebuilt from configuration at the
//! start of every turn, so live objects never survive a turn boundary;
//! `reestablish_state` / `collect_state` move the serializable part of a
//! control across that boundary, keyed by the control's id.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::acts::{ContentAct, InitiativeAct, SystemAct};
use crate::error::DialogError;
use crate::input::TurnInput;

// Ids are author-assigned strings, stable across turns; they double as the
// persistence key.
pub type ControlId = String;

/// Persisted snapshot of the whole tree: one serialized state per control id.
pub type StateMap = HashMap<ControlId, serde_json::Value>;

/// The per-turn protocol every control implements.
///
/// Execution is single-threaded cooperative: methods are awaited strictly
/// in declaration order, never in parallel. `can_handle` and
/// `can_take_initiative` must not mutate serialized state, but may cache
/// which internal handler matched; the matching `handle` /
/// `take_initiative` consumes that cache and fails with a configuration
/// error if it is absent.
#[async_trait]
pub trait Control: Send {
    /// Unique, turn-stable id; the persistence key for this control's state.
    fn id(&self) -> &str;

    /// Target strings this control answers to ("date", "start date").
    fn targets(&self) -> &[String] {
        &[]
    }

    /// The distinguishing label offered in disambiguation questions.
    /// Containers require this to be unique among simultaneously-eligible
    /// candidates.
    fn specific_target(&self) -> Option<&str> {
        None
    }

    /// Whether this control can handle the input. Safe to call repeatedly
    /// within a turn.
    async fn can_handle(&mut self, input: &TurnInput) -> Result<bool, DialogError>;

    /// Handle the input: mutate own state, append acts. Fails if no prior
    /// successful `can_handle` matched this input.
    async fn handle(
        &mut self,
        input: &TurnInput,
        result: &mut ControlResultBuilder,
    ) -> Result<(), DialogError>;

    /// Whether this control wants the conversational initiative, given that
    /// input handling produced no initiative act.
    async fn can_take_initiative(&mut self, input: &TurnInput) -> Result<bool, DialogError>;

    /// Take the initiative: ask a question, request a confirmation. Fails
    /// if no prior successful `can_take_initiative` matched.
    async fn take_initiative(
        &mut self,
        input: &TurnInput,
        result: &mut ControlResultBuilder,
    ) -> Result<(), DialogError>;

    /// Overwrite this control's state from the persisted snapshot (or reset
    /// to defaults when the snapshot has no entry for this id), then
    /// recurse into children. Dynamic containers reconstruct their dynamic
    /// children from persisted specifications before recursing.
    fn reestablish_state(&mut self, states: &StateMap) -> Result<(), DialogError>;

    /// Serialize this control's state into the snapshot and recurse into
    /// children.
    fn collect_state(&self, out: &mut StateMap) -> Result<(), DialogError>;

    /// Append this control's id and all descendant ids, depth-first. Used
    /// to validate tree-wide id uniqueness after construction.
    fn collect_ids(&self, out: &mut Vec<ControlId>) {
        out.push(self.id().to_string());
    }
}

/// Whether the session stays open for another turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum SessionBehavior {
    /// Keep listening
    #[default]
    Open,
    /// End the conversation after this turn
    End,
}

/// Accumulates the acts of one turn across the whole tree.
///
/// Shared by reference through every `handle` / `take_initiative` call;
/// controls only ever append.
#[derive(Debug, Default)]
pub struct ControlResultBuilder {
    acts: Vec<SystemAct>,
    session_behavior: SessionBehavior,
}

/// The finished output of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlResult {
    /// Acts in production order
    pub acts: Vec<SystemAct>,
    /// Whether the session stays open
    pub session_behavior: SessionBehavior,
}

impl ControlResultBuilder {
    /// Create an empty builder for a new turn.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an act.
    pub fn add_act(&mut self, act: SystemAct) {
        self.acts.push(act);
    }

    /// Append a content act.
    pub fn add_content(&mut self, act: ContentAct) {
        self.acts.push(SystemAct::Content(act));
    }

    /// Append an initiative act.
    pub fn add_initiative(&mut self, act: InitiativeAct) {
        self.acts.push(SystemAct::Initiative(act));
    }

    /// Acts appended so far, in order.
    pub fn acts(&self) -> &[SystemAct] {
        &self.acts
    }

    /// Whether any appended act takes initiative.
    pub fn has_initiative(&self) -> bool {
        self.acts.iter().any(SystemAct::is_initiative)
    }

    /// Request that the session end after this turn.
    pub fn end_session(&mut self) {
        self.session_behavior = SessionBehavior::End;
    }

    /// Whether a control requested the session to end.
    pub fn session_behavior(&self) -> SessionBehavior {
        self.session_behavior
    }

    /// Finish the turn.
    pub fn build(self) -> ControlResult {
        ControlResult {
            acts: self.acts,
            session_behavior: self.session_behavior,
        }
    }
}

/// Read a control's own state entry from the snapshot, deserializing into
/// the control's state type; `None` when the snapshot has no entry for the
/// id.
pub fn read_state<S>(states: &StateMap, id: &str) -> Result<Option<S>, DialogError>
where
    S: for<'de> Deserialize<'de>,
{
    match states.get(id) {
        Some(raw) => serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|source| DialogError::State {
                control_id: id.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Write a control's state entry into the snapshot.
pub fn write_state<S>(out: &mut StateMap, id: &str, state: &S) -> Result<(), DialogError>
where
    S: Serialize,
{
    let raw = serde_json::to_value(state).map_err(|source| DialogError::State {
        control_id: id.to_string(),
        source,
    })?;
    out.insert(id.to_string(), raw);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_builder_tracks_initiative() {
        let mut builder = ControlResultBuilder::new();
        builder.add_content(ContentAct::Acknowledged {
            control_id: "a".to_string(),
        });
        assert!(!builder.has_initiative());

        builder.add_initiative(InitiativeAct::RequestValue {
            control_id: "a".to_string(),
            target: None,
        });
        assert!(builder.has_initiative());

        let result = builder.build();
        assert_eq!(result.acts.len(), 2);
        assert_eq!(result.session_behavior, SessionBehavior::Open);
    }

    #[test]
    fn test_state_round_trip_by_id() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Probe {
            value: Option<String>,
        }

        let mut snapshot = StateMap::new();
        write_state(
            &mut snapshot,
            "probe",
            &Probe {
                value: Some("x".to_string()),
            },
        )
        .unwrap();

        let restored: Option<Probe> = read_state(&snapshot, "probe").unwrap();
        assert_eq!(
            restored,
            Some(Probe {
                value: Some("x".to_string())
            })
        );

        let missing: Option<Probe> = read_state(&snapshot, "absent").unwrap();
        assert!(missing.is_none());
    }
}
