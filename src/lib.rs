//! Dialog controls module
//!
//! This crate manages multi-turn voice-assistant dialogues as a tree of
//! reusable, independently-reasoning controls. It provides:
//! - A per-turn Control contract (can-handle / handle / can-take-initiative
//!   / take-initiative) with serializable state
//! - Container controls that arbitrate which child handles input and which
//!   takes the conversational initiative, with recency tie-breaking
//! - Disambiguation sub-dialogues when an input could target more than one
//!   willing child
//! - Dynamic containers whose runtime-added children are reconstructed
//!   from persisted specifications every turn
//! - A tree lifecycle manager that rebuilds the tree each turn, hydrates
//!   persisted state by control id, and persists a new snapshot
//!
//! The crate is a library invoked by a request-handling host once per
//! conversational turn; speech recognition, language generation, and
//! visual layout stay outside it.

pub mod acts;
pub mod container;
pub mod control;
pub mod error;
pub mod input;
pub mod leaf;
pub mod render;
pub mod tree;

// Re-export main types
pub use acts::{ContentAct, InitiativeAct, SystemAct};

pub use control::{
    Control, ControlId, ControlResult, ControlResultBuilder, SessionBehavior, StateMap,
};

pub use container::{
    ArbitrationDecision, ArbitrationStrategy, ContainerControl, ContainerControlState,
    ControlFactory, DisambiguationChoice, DisambiguationQuestion, DynamicChildSpec,
    DynamicContainerControl, QuestionKind, RecencyRecord,
};

pub use error::DialogError;

pub use input::{ControlAction, Feedback, GeneralControlIntent, TurnInput, Utterance};

pub use leaf::{Awaiting, ValueControl, ValueControlProps, ValueControlState, ValuePhase};

pub use render::{render_acts, ResponseBuilder, SpeechResponseBuilder};

pub use tree::{ControlTreeManager, InMemoryStateStore, StateStore, TurnResult};
