//! System acts - typed records of what the system communicated in a turn
//!
//! An act is either content (information) or initiative (a request that
//! expects a reply). Acts are immutable once appended to a turn's result;
//! every payload carries the id of the control that produced it. Rendering
//! matches exhaustively over the two sums, so an unrendered act kind is a
//! compile error rather than a silent gap.

use serde::{Deserialize, Serialize};

use crate::control::ControlId;

/// One unit of system communication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SystemAct {
    /// Information for the user; expects no reply
    Content(ContentAct),
    /// A request that expects a reply
    Initiative(InitiativeAct),
}

/// Content acts: things the system tells the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ContentAct {
    /// A value was accepted for the first time
    ValueSet { control_id: ControlId, value: String },
    /// A value replaced an earlier one; carries the delta
    ValueChanged {
        control_id: ControlId,
        previous: String,
        value: String,
    },
    /// A provided value failed validation
    InvalidValue {
        control_id: ControlId,
        reason: String,
    },
    /// The user's reply was understood and consumed
    Acknowledged { control_id: ControlId },
    /// Free-form content supplied by a control
    LiteralContent { control_id: ControlId, text: String },
}

/// Initiative acts: questions the system asks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum InitiativeAct {
    /// Ask the user to provide a value
    RequestValue {
        control_id: ControlId,
        /// Rendered name of the slot being elicited, when the control has one
        target: Option<String>,
    },
    /// Ask the user to replace an existing value
    RequestChangedValue {
        control_id: ControlId,
        target: Option<String>,
    },
    /// Ask the user to confirm a value with yes/no
    ConfirmValue { control_id: ControlId, value: String },
    /// Ask the user which of several controls they meant
    Disambiguate {
        control_id: ControlId,
        /// Rendered labels, in candidate order
        choices: Vec<String>,
    },
}

impl SystemAct {
    /// Id of the control that produced this act.
    pub fn control_id(&self) -> &str {
        match self {
            SystemAct::Content(act) => act.control_id(),
            SystemAct::Initiative(act) => act.control_id(),
        }
    }

    /// Whether this act takes conversational initiative.
    pub fn is_initiative(&self) -> bool {
        matches!(self, SystemAct::Initiative(_))
    }
}

impl ContentAct {
    /// Id of the control that produced this act.
    pub fn control_id(&self) -> &str {
        match self {
            ContentAct::ValueSet { control_id, .. }
            | ContentAct::ValueChanged { control_id, .. }
            | ContentAct::InvalidValue { control_id, .. }
            | ContentAct::Acknowledged { control_id }
            | ContentAct::LiteralContent { control_id, .. } => control_id,
        }
    }
}

impl InitiativeAct {
    /// Id of the control that produced this act.
    pub fn control_id(&self) -> &str {
        match self {
            InitiativeAct::RequestValue { control_id, .. }
            | InitiativeAct::RequestChangedValue { control_id, .. }
            | InitiativeAct::ConfirmValue { control_id, .. }
            | InitiativeAct::Disambiguate { control_id, .. } => control_id,
        }
    }
}
