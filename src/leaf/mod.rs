//! Leaf value control - the shared single-slot dialogue lifecycle
//!
//! Every concrete slot control (date, number, list item) follows the same
//! internal machine: elicit a value, receive it, validate it, optionally
//! confirm it. `ValueControl` implements that shape against the Control
//! contract; domain-specific validation plugs in as an ordered list of
//! validator functions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::acts::{ContentAct, InitiativeAct};
use crate::control::{read_state, write_state, Control, ControlId, ControlResultBuilder, StateMap};
use crate::error::DialogError;
use crate::input::{Feedback, TurnInput};

/// A validation step: `Err(reason)` rejects the value and surfaces the
/// reason to the user. Validators run in order; the first failure
/// short-circuits.
pub type Validator = Box<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Non-serializable configuration of a value control, rebuilt every turn.
/// Defaults are applied field by field at construction.
#[derive(Default)]
pub struct ValueControlProps {
    /// Target strings this control answers to ("date")
    pub targets: Vec<String>,
    /// The distinguishing label for disambiguation ("start date")
    pub specific_target: Option<String>,
    /// Whether an accepted value must be confirmed before it is final
    pub confirmation_required: bool,
    /// Ordered validation steps
    pub validators: Vec<Validator>,
}

impl ValueControlProps {
    /// Props answering to the given targets.
    pub fn with_targets(targets: &[&str]) -> Self {
        Self {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Set the disambiguation label.
    pub fn specific_target(mut self, label: impl Into<String>) -> Self {
        self.specific_target = Some(label.into());
        self
    }

    /// Require yes/no confirmation of accepted values.
    pub fn confirmation_required(mut self) -> Self {
        self.confirmation_required = true;
        self
    }

    /// Append a validator.
    pub fn validator(
        mut self,
        validate: impl Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validators.push(Box::new(validate));
        self
    }
}

/// Where the slot stands in its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ValuePhase {
    /// Nothing provided yet, or the last value was withdrawn
    #[default]
    NoValue,
    /// A value was provided but failed validation
    Invalid,
    /// A valid value is waiting on a yes/no confirmation
    ConfirmationPending,
    /// The slot is filled (and confirmed, where required)
    Done,
}

/// What the control asked for on its previous initiative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Awaiting {
    /// A bare value reply is expected
    Value,
    /// A yes/no reply is expected
    Confirmation,
}

/// Serializable state of a value control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ValueControlState {
    /// The current value, when one was provided
    pub value: Option<String>,
    /// The value before the most recent change, for delta reporting
    pub previous_value: Option<String>,
    /// Lifecycle phase
    pub phase: ValuePhase,
    /// Outstanding elicitation, if the control asked a question last turn
    pub awaiting: Option<Awaiting>,
    /// Why the current value is invalid, when it is
    pub invalid_reason: Option<String>,
}

// What can_handle matched, consumed once by handle.
#[derive(Debug, Clone, PartialEq)]
enum PlannedHandling {
    SetValue(String),
    RequestSlot,
    Affirm,
    Deny,
}

/// A single-slot control: elicit, receive, validate, confirm.
pub struct ValueControl {
    id: ControlId,
    props: ValueControlProps,
    state: ValueControlState,
    planned: Option<PlannedHandling>,
    initiative_ready: bool,
}

impl ValueControl {
    /// Create a value control from explicit props.
    pub fn new(id: impl Into<ControlId>, props: ValueControlProps) -> Self {
        Self {
            id: id.into(),
            props,
            state: ValueControlState::default(),
            planned: None,
            initiative_ready: false,
        }
    }

    /// The control's serializable state.
    pub fn state(&self) -> &ValueControlState {
        &self.state
    }

    fn matches_target(&self, target: &str) -> bool {
        let target = target.trim().to_lowercase();
        self.props
            .targets
            .iter()
            .any(|t| t.trim().to_lowercase() == target)
            || self
                .props
                .specific_target
                .as_deref()
                .is_some_and(|t| t.trim().to_lowercase() == target)
    }

    fn validate(&self, value: &str) -> Result<(), String> {
        for validator in &self.props.validators {
            validator(value)?;
        }
        Ok(())
    }

    /// Accept a value: remember the previous one, clear any confirmation,
    /// validate, and report the outcome.
    fn apply_value(&mut self, value: String, result: &mut ControlResultBuilder) {
        let previous = self.state.value.take();
        self.state.previous_value = previous.clone();
        self.state.value = Some(value.clone());
        self.state.awaiting = None;
        self.state.invalid_reason = None;

        match self.validate(&value) {
            Err(reason) => {
                debug!(control = %self.id, %reason, "value rejected by validator");
                self.state.phase = ValuePhase::Invalid;
                self.state.invalid_reason = Some(reason.clone());
                result.add_content(ContentAct::InvalidValue {
                    control_id: self.id.clone(),
                    reason,
                });
            }
            Ok(()) => {
                match previous {
                    Some(previous) if previous != value => {
                        result.add_content(ContentAct::ValueChanged {
                            control_id: self.id.clone(),
                            previous,
                            value,
                        });
                    }
                    _ => {
                        result.add_content(ContentAct::ValueSet {
                            control_id: self.id.clone(),
                            value,
                        });
                    }
                }
                self.state.phase = if self.props.confirmation_required {
                    ValuePhase::ConfirmationPending
                } else {
                    ValuePhase::Done
                };
            }
        }
    }

    fn elicitation_target(&self) -> Option<String> {
        self.props
            .specific_target
            .clone()
            .or_else(|| self.props.targets.first().cloned())
    }
}

#[async_trait]
impl Control for ValueControl {
    fn id(&self) -> &str {
        &self.id
    }

    fn targets(&self) -> &[String] {
        &self.props.targets
    }

    fn specific_target(&self) -> Option<&str> {
        self.props.specific_target.as_deref()
    }

    async fn can_handle(&mut self, input: &TurnInput) -> Result<bool, DialogError> {
        self.planned = if let Some(intent) = input.general_control() {
            let targeted = match &intent.target {
                Some(target) => self.matches_target(target),
                // An untargeted request is only plausibly ours while we
                // hold the floor.
                None => self.state.awaiting.is_some(),
            };
            match (targeted, &intent.value) {
                (true, Some(value)) => Some(PlannedHandling::SetValue(value.clone())),
                (true, None) => Some(PlannedHandling::RequestSlot),
                (false, _) => None,
            }
        } else if let Some(value) = input.bare_value() {
            (self.state.awaiting == Some(Awaiting::Value))
                .then(|| PlannedHandling::SetValue(value.to_string()))
        } else if let Some(feedback) = input.feedback() {
            (self.state.phase == ValuePhase::ConfirmationPending).then(|| match feedback {
                Feedback::Affirm => PlannedHandling::Affirm,
                Feedback::Deny => PlannedHandling::Deny,
            })
        } else {
            None
        };
        Ok(self.planned.is_some())
    }

    async fn handle(
        &mut self,
        _input: &TurnInput,
        result: &mut ControlResultBuilder,
    ) -> Result<(), DialogError> {
        let planned = self
            .planned
            .take()
            .ok_or_else(|| DialogError::HandleWithoutMatch {
                control_id: self.id.clone(),
            })?;

        match planned {
            PlannedHandling::SetValue(value) => {
                self.apply_value(value, result);
            }
            PlannedHandling::RequestSlot => {
                // "Change the date": the request itself carries no value,
                // so ask for one now.
                let target = self.elicitation_target();
                let act = if self.state.value.is_some() {
                    InitiativeAct::RequestChangedValue {
                        control_id: self.id.clone(),
                        target,
                    }
                } else {
                    InitiativeAct::RequestValue {
                        control_id: self.id.clone(),
                        target,
                    }
                };
                result.add_initiative(act);
                self.state.awaiting = Some(Awaiting::Value);
            }
            PlannedHandling::Affirm => {
                self.state.phase = ValuePhase::Done;
                self.state.awaiting = None;
                result.add_content(ContentAct::Acknowledged {
                    control_id: self.id.clone(),
                });
            }
            PlannedHandling::Deny => {
                // Disaffirmed: withdraw the value and re-elicit.
                self.state.previous_value = self.state.value.take();
                self.state.phase = ValuePhase::NoValue;
                self.state.awaiting = None;
                result.add_content(ContentAct::Acknowledged {
                    control_id: self.id.clone(),
                });
            }
        }
        Ok(())
    }

    async fn can_take_initiative(&mut self, _input: &TurnInput) -> Result<bool, DialogError> {
        // A pending confirmation blocks every other initiative from this
        // control until resolved.
        self.initiative_ready = matches!(
            self.state.phase,
            ValuePhase::ConfirmationPending | ValuePhase::NoValue | ValuePhase::Invalid
        );
        Ok(self.initiative_ready)
    }

    async fn take_initiative(
        &mut self,
        _input: &TurnInput,
        result: &mut ControlResultBuilder,
    ) -> Result<(), DialogError> {
        if !self.initiative_ready {
            return Err(DialogError::InitiativeWithoutMatch {
                control_id: self.id.clone(),
            });
        }
        self.initiative_ready = false;

        match self.state.phase {
            ValuePhase::ConfirmationPending => {
                let value = self.state.value.clone().unwrap_or_default();
                result.add_initiative(InitiativeAct::ConfirmValue {
                    control_id: self.id.clone(),
                    value,
                });
                self.state.awaiting = Some(Awaiting::Confirmation);
            }
            ValuePhase::Invalid => {
                result.add_initiative(InitiativeAct::RequestChangedValue {
                    control_id: self.id.clone(),
                    target: self.elicitation_target(),
                });
                self.state.awaiting = Some(Awaiting::Value);
            }
            ValuePhase::NoValue => {
                let target = self.elicitation_target();
                let act = if self.state.previous_value.is_some() {
                    InitiativeAct::RequestChangedValue {
                        control_id: self.id.clone(),
                        target,
                    }
                } else {
                    InitiativeAct::RequestValue {
                        control_id: self.id.clone(),
                        target,
                    }
                };
                result.add_initiative(act);
                self.state.awaiting = Some(Awaiting::Value);
            }
            ValuePhase::Done => {
                return Err(DialogError::InitiativeWithoutMatch {
                    control_id: self.id.clone(),
                });
            }
        }
        Ok(())
    }

    fn reestablish_state(&mut self, states: &StateMap) -> Result<(), DialogError> {
        self.state = read_state(states, &self.id)?.unwrap_or_default();
        Ok(())
    }

    fn collect_state(&self, out: &mut StateMap) -> Result<(), DialogError> {
        write_state(out, &self.id, &self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ControlAction;

    fn date_control(id: &str) -> ValueControl {
        ValueControl::new(
            id,
            ValueControlProps::with_targets(&["date"]).specific_target(format!("{id} date")),
        )
    }

    #[tokio::test]
    async fn test_set_then_change_reports_delta() {
        let mut control = date_control("start");
        let mut result = ControlResultBuilder::new();

        let input = TurnInput::general(1, ControlAction::Set, Some("date"), Some("monday"));
        assert!(control.can_handle(&input).await.unwrap());
        control.handle(&input, &mut result).await.unwrap();
        assert_eq!(control.state().value.as_deref(), Some("monday"));
        assert_eq!(control.state().phase, ValuePhase::Done);

        let input = TurnInput::general(2, ControlAction::Change, Some("date"), Some("tuesday"));
        assert!(control.can_handle(&input).await.unwrap());
        control.handle(&input, &mut result).await.unwrap();

        assert!(result.acts().iter().any(|act| matches!(
            act,
            crate::acts::SystemAct::Content(ContentAct::ValueChanged { previous, value, .. })
                if previous == "monday" && value == "tuesday"
        )));
        assert_eq!(control.state().previous_value.as_deref(), Some("monday"));
    }

    #[tokio::test]
    async fn test_first_failing_validator_short_circuits() {
        let mut control = ValueControl::new(
            "count",
            ValueControlProps::with_targets(&["count"])
                .validator(|v| {
                    v.parse::<i64>()
                        .map(|_| ())
                        .map_err(|_| "that is not a number".to_string())
                })
                .validator(|_| Err("never reached for non-numbers".to_string())),
        );
        let mut result = ControlResultBuilder::new();

        let input = TurnInput::general(1, ControlAction::Set, Some("count"), Some("many"));
        assert!(control.can_handle(&input).await.unwrap());
        control.handle(&input, &mut result).await.unwrap();

        assert_eq!(control.state().phase, ValuePhase::Invalid);
        assert_eq!(
            control.state().invalid_reason.as_deref(),
            Some("that is not a number")
        );
        assert!(control.can_take_initiative(&input).await.unwrap());
    }

    #[tokio::test]
    async fn test_confirmation_gate() {
        let mut control = ValueControl::new(
            "dest",
            ValueControlProps::with_targets(&["destination"]).confirmation_required(),
        );
        let mut result = ControlResultBuilder::new();

        let input = TurnInput::general(1, ControlAction::Set, Some("destination"), Some("lisbon"));
        assert!(control.can_handle(&input).await.unwrap());
        control.handle(&input, &mut result).await.unwrap();
        assert_eq!(control.state().phase, ValuePhase::ConfirmationPending);

        // The only initiative on offer is the confirmation question.
        assert!(control.can_take_initiative(&input).await.unwrap());
        control.take_initiative(&input, &mut result).await.unwrap();
        assert!(result.acts().iter().any(|act| matches!(
            act,
            crate::acts::SystemAct::Initiative(InitiativeAct::ConfirmValue { value, .. })
                if value == "lisbon"
        )));

        // Denying withdraws the value and re-opens elicitation.
        let deny = TurnInput::deny(2);
        assert!(control.can_handle(&deny).await.unwrap());
        control.handle(&deny, &mut result).await.unwrap();
        assert_eq!(control.state().phase, ValuePhase::NoValue);
        assert!(control.state().value.is_none());
        assert_eq!(control.state().previous_value.as_deref(), Some("lisbon"));
    }

    #[tokio::test]
    async fn test_bare_value_only_while_awaiting() {
        let mut control = date_control("start");
        let input = TurnInput::value(1, "monday");
        assert!(!control.can_handle(&input).await.unwrap());

        // After the control asks, a bare value is accepted.
        let mut result = ControlResultBuilder::new();
        assert!(control.can_take_initiative(&input).await.unwrap());
        control.take_initiative(&input, &mut result).await.unwrap();

        let input = TurnInput::value(2, "monday");
        assert!(control.can_handle(&input).await.unwrap());
    }

    #[tokio::test]
    async fn test_handle_without_match_is_a_fault() {
        let mut control = date_control("start");
        let mut result = ControlResultBuilder::new();
        let input = TurnInput::value(1, "monday");

        let err = control.handle(&input, &mut result).await.unwrap_err();
        assert!(matches!(err, DialogError::HandleWithoutMatch { .. }));
    }
}
