//! Error taxonomy for the dialog controls crate
//!
//! Guard failures (a control declining an input or an initiative
//! opportunity) are not errors; they are `Ok(false)` from the predicate
//! methods. Everything here is either an author-side configuration fault
//! that must fail the turn loudly, or a boundary failure from persistence
//! and state serialization.

use thiserror::Error;

use crate::control::ControlId;

/// Errors produced by the dialog core.
///
/// Configuration faults are never caught internally; they propagate to the
/// host, which decides the user-visible behavior.
#[derive(Debug, Error)]
pub enum DialogError {
    /// Two simultaneously-eligible candidates render the same
    /// disambiguation label, so no question can tell them apart.
    #[error("controls `{first}` and `{second}` render the same disambiguation label \"{label}\"")]
    DuplicateTargetLabel {
        label: String,
        first: ControlId,
        second: ControlId,
    },

    /// `handle` was invoked without a prior successful `can_handle`.
    #[error("handle called on control `{control_id}` without a matching can_handle")]
    HandleWithoutMatch { control_id: ControlId },

    /// `take_initiative` was invoked without a prior successful
    /// `can_take_initiative`.
    #[error("take_initiative called on control `{control_id}` without a matching can_take_initiative")]
    InitiativeWithoutMatch { control_id: ControlId },

    /// A dynamic child was added with an id already present in the
    /// container.
    #[error("container `{container_id}` already has a child with id `{control_id}`")]
    DuplicateChildId {
        container_id: ControlId,
        control_id: ControlId,
    },

    /// Two controls in the tree share an id, making state reattachment
    /// ambiguous.
    #[error("duplicate control id `{control_id}` in control tree")]
    DuplicateControlId { control_id: ControlId },

    /// The dynamic-child factory cannot construct a control for the
    /// persisted specification.
    #[error("cannot construct dynamic child `{control_id}` of unknown kind \"{kind}\"")]
    UnknownChildKind { kind: String, control_id: ControlId },

    /// The dynamic-child factory returned a control whose id differs from
    /// the specification it was built from.
    #[error("factory built control `{actual}` for specification `{expected}`")]
    FactoryIdMismatch {
        expected: ControlId,
        actual: ControlId,
    },

    /// A control's persisted state could not be serialized or
    /// deserialized.
    #[error("state (de)serialization failed for control `{control_id}`")]
    State {
        control_id: ControlId,
        #[source]
        source: serde_json::Error,
    },

    /// The injected state store failed to load or save a snapshot.
    #[error("state store failure")]
    Store {
        #[source]
        source: anyhow::Error,
    },
}
