//! Container control - holds children and arbitrates between them
//!
//! A container is itself a control. Each turn it polls its children in
//! declaration order, picks exactly one to handle the input and exactly
//! one (independently) to take the initiative, detects target ambiguity
//! among multiple willing children, and resolves it with a
//! "which one did you mean" sub-dialogue. Recency records persisted in the
//! container's state break ties between willing children.

pub mod arbitration;
pub mod dynamic;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::acts::{ContentAct, InitiativeAct, SystemAct};
use crate::control::{
    read_state, write_state, Control, ControlId, ControlResultBuilder, StateMap,
};
use crate::error::DialogError;
use crate::input::TurnInput;

pub use arbitration::{
    ArbitrationDecision, ArbitrationStrategy, CandidateMeta, DisambiguationChoice,
    DisambiguationQuestion, QuestionKind, RecencyRecord,
};
pub use dynamic::{ControlFactory, DynamicChildSpec, DynamicContainerControl};

/// Serializable per-turn memory of a container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ContainerControlState {
    /// Which child last handled input, and on which turn
    pub last_handling: Option<RecencyRecord>,
    /// Which child last took initiative, and on which turn
    pub last_initiative: Option<RecencyRecord>,
    /// Outstanding disambiguation question posed by the container itself
    pub open_question: Option<DisambiguationQuestion>,
}

/// A control holding an ordered collection of child controls.
pub struct ContainerControl {
    id: ControlId,
    strategy: ArbitrationStrategy,
    pub(crate) children: Vec<Box<dyn Control>>,
    pub(crate) state: ContainerControlState,
    decision: Option<ArbitrationDecision>,
    initiative_child: Option<(usize, ControlId)>,
}

impl ContainerControl {
    /// Create an empty container with the default arbitration strategy.
    pub fn new(id: impl Into<ControlId>) -> Self {
        Self {
            id: id.into(),
            strategy: ArbitrationStrategy::default(),
            children: Vec::new(),
            state: ContainerControlState::default(),
            decision: None,
            initiative_child: None,
        }
    }

    /// Set the tie-break strategy.
    pub fn with_strategy(mut self, strategy: ArbitrationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Append a statically-declared child. Children keep declaration order.
    pub fn with_child(mut self, child: impl Control + 'static) -> Self {
        self.children.push(Box::new(child));
        self
    }

    /// The container's per-turn memory.
    pub fn state(&self) -> &ContainerControlState {
        &self.state
    }

    /// Ids of the current children, in declaration order.
    pub fn child_ids(&self) -> Vec<ControlId> {
        self.children.iter().map(|c| c.id().to_string()).collect()
    }

    /// Run arbitration for the handling side of the turn. Pure with
    /// respect to serialized state; the outcome is cached by `can_handle`
    /// and consumed exactly once by `handle`.
    async fn arbitrate(
        &mut self,
        input: &TurnInput,
    ) -> Result<Option<ArbitrationDecision>, DialogError> {
        // An outstanding question gets first claim on the input.
        if let Some(question) = &self.state.open_question {
            if let Some(choice) = arbitration::match_reply(question, input) {
                match self
                    .children
                    .iter()
                    .position(|c| c.id() == choice.control_id)
                {
                    Some(index) => {
                        debug!(
                            container = %self.id,
                            child = %choice.control_id,
                            "disambiguation reply matched"
                        );
                        return Ok(Some(ArbitrationDecision::DisambiguationReply {
                            index,
                            control_id: choice.control_id.clone(),
                        }));
                    }
                    None => {
                        warn!(
                            container = %self.id,
                            child = %choice.control_id,
                            "offered disambiguation choice no longer in tree; ignoring"
                        );
                    }
                }
            } else {
                debug!(
                    container = %self.id,
                    "input does not answer the open question; treating as fresh input"
                );
            }
        }

        // Candidate gathering, strictly in declaration order.
        let mut candidates: Vec<CandidateMeta> = Vec::new();
        for (index, child) in self.children.iter_mut().enumerate() {
            if child.can_handle(input).await? {
                candidates.push(CandidateMeta {
                    index,
                    control_id: child.id().to_string(),
                    targets: child.targets().to_vec(),
                    specific_target: child.specific_target().map(str::to_string),
                });
            }
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        // Fallback speech goes only to the child that was mid-conversation.
        if input.is_fallback() {
            let Some(record) = &self.state.last_initiative else {
                return Ok(None);
            };
            return Ok(candidates
                .iter()
                .find(|c| c.control_id == record.control_id)
                .map(|c| ArbitrationDecision::Delegate {
                    index: c.index,
                    control_id: c.control_id.clone(),
                }));
        }

        if let Some(question) = arbitration::detect_target_ambiguity(input, &candidates)? {
            return Ok(Some(ArbitrationDecision::RaiseQuestion { question }));
        }

        let winner = arbitration::select_winner(
            &candidates,
            self.strategy,
            &[self.state.last_initiative.as_ref()],
        );
        let chosen = &candidates[winner];
        debug!(
            container = %self.id,
            child = %chosen.control_id,
            strategy = ?self.strategy,
            candidates = candidates.len(),
            "handling winner selected"
        );
        Ok(Some(ArbitrationDecision::Delegate {
            index: chosen.index,
            control_id: chosen.control_id.clone(),
        }))
    }

    fn record_handling(&mut self, produced: &[SystemAct], control_id: &str, turn_number: u32) {
        if produced.is_empty() {
            return;
        }
        self.state.last_handling = Some(RecencyRecord::new(control_id, turn_number));
        if produced.iter().any(SystemAct::is_initiative) {
            self.state.last_initiative = Some(RecencyRecord::new(control_id, turn_number));
        }
    }
}

#[async_trait]
impl Control for ContainerControl {
    fn id(&self) -> &str {
        &self.id
    }

    async fn can_handle(&mut self, input: &TurnInput) -> Result<bool, DialogError> {
        self.decision = self.arbitrate(input).await?;
        Ok(self.decision.is_some())
    }

    async fn handle(
        &mut self,
        input: &TurnInput,
        result: &mut ControlResultBuilder,
    ) -> Result<(), DialogError> {
        let decision = self
            .decision
            .take()
            .ok_or_else(|| DialogError::HandleWithoutMatch {
                control_id: self.id.clone(),
            })?;

        match decision {
            ArbitrationDecision::Delegate { index, control_id } => {
                self.state.open_question = None;
                let before = result.acts().len();
                self.children[index].handle(input, result).await?;
                let produced = result.acts()[before..].to_vec();
                self.record_handling(&produced, &control_id, input.turn_number);
            }
            ArbitrationDecision::DisambiguationReply { index, control_id } => {
                self.state.open_question = None;
                let before = result.acts().len();
                if self.children[index].can_handle(input).await? {
                    self.children[index].handle(input, result).await?;
                } else {
                    // The reply names the control but carries nothing for it
                    // to consume; acknowledge and give it the floor via the
                    // recency records.
                    result.add_content(ContentAct::Acknowledged {
                        control_id: self.id.clone(),
                    });
                }
                let produced = result.acts()[before..].to_vec();
                self.record_handling(&produced, &control_id, input.turn_number);
            }
            ArbitrationDecision::RaiseQuestion { question } => {
                let choices = question.choices.iter().map(|c| c.label.clone()).collect();
                result.add_initiative(InitiativeAct::Disambiguate {
                    control_id: self.id.clone(),
                    choices,
                });
                self.state.open_question = Some(question);
            }
        }
        Ok(())
    }

    async fn can_take_initiative(&mut self, input: &TurnInput) -> Result<bool, DialogError> {
        let mut candidates: Vec<CandidateMeta> = Vec::new();
        for (index, child) in self.children.iter_mut().enumerate() {
            if child.can_take_initiative(input).await? {
                candidates.push(CandidateMeta {
                    index,
                    control_id: child.id().to_string(),
                    targets: child.targets().to_vec(),
                    specific_target: child.specific_target().map(str::to_string),
                });
            }
        }
        if candidates.is_empty() {
            self.initiative_child = None;
            return Ok(false);
        }

        // The child that just handled input is the likeliest to want to
        // continue, ahead of one merely active earlier.
        let winner = arbitration::select_winner(
            &candidates,
            self.strategy,
            &[
                self.state.last_handling.as_ref(),
                self.state.last_initiative.as_ref(),
            ],
        );
        let chosen = &candidates[winner];
        debug!(
            container = %self.id,
            child = %chosen.control_id,
            "initiative winner selected"
        );
        self.initiative_child = Some((chosen.index, chosen.control_id.clone()));
        Ok(true)
    }

    async fn take_initiative(
        &mut self,
        input: &TurnInput,
        result: &mut ControlResultBuilder,
    ) -> Result<(), DialogError> {
        let (index, control_id) =
            self.initiative_child
                .take()
                .ok_or_else(|| DialogError::InitiativeWithoutMatch {
                    control_id: self.id.clone(),
                })?;
        self.children[index].take_initiative(input, result).await?;
        self.state.last_initiative = Some(RecencyRecord::new(control_id, input.turn_number));
        Ok(())
    }

    fn reestablish_state(&mut self, states: &StateMap) -> Result<(), DialogError> {
        self.state = read_state(states, &self.id)?.unwrap_or_default();
        for child in &mut self.children {
            child.reestablish_state(states)?;
        }
        Ok(())
    }

    fn collect_state(&self, out: &mut StateMap) -> Result<(), DialogError> {
        write_state(out, &self.id, &self.state)?;
        for child in &self.children {
            child.collect_state(out)?;
        }
        Ok(())
    }

    fn collect_ids(&self, out: &mut Vec<ControlId>) {
        out.push(self.id.clone());
        for child in &self.children {
            child.collect_ids(out);
        }
    }
}
