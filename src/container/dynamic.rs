//! Containers whose children are created at runtime
//!
//! Live controls do not survive the turn boundary, so a runtime-added
//! child exists next turn only because a minimal specification of it was
//! persisted in its parent's state. On reestablishment the specifications
//! are replayed, in order, through an author-supplied factory before any
//! state flows into the children.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::container::{ContainerControl, ContainerControlState};
use crate::control::{read_state, write_state, Control, ControlId, ControlResultBuilder, StateMap};
use crate::error::DialogError;
use crate::input::TurnInput;

use super::ArbitrationStrategy;

/// Minimal serializable descriptor of a dynamically-added child,
/// sufficient for the factory to reconstruct it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DynamicChildSpec {
    /// Id of the child; the factory must build a control with this id
    pub id: ControlId,
    /// Author-defined discriminator the factory dispatches on
    pub kind: String,
    /// Extra construction data, opaque to the core
    #[serde(default)]
    pub data: serde_json::Value,
}

impl DynamicChildSpec {
    /// Create a specification with no extra data.
    pub fn new(id: impl Into<ControlId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Attach construction data.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Builds a control from a persisted specification.
///
/// An unknown `kind` is unrecoverable for the turn: the child must exist
/// to receive its state, so the factory fails fast with
/// [`DialogError::UnknownChildKind`].
pub trait ControlFactory: Send {
    fn create(&self, spec: &DynamicChildSpec) -> Result<Box<dyn Control>, DialogError>;
}

impl<F> ControlFactory for F
where
    F: Fn(&DynamicChildSpec) -> Result<Box<dyn Control>, DialogError> + Send,
{
    fn create(&self, spec: &DynamicChildSpec) -> Result<Box<dyn Control>, DialogError> {
        self(spec)
    }
}

/// Persisted state of a dynamic container: the arbitration memory plus the
/// specifications of every runtime-added child.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DynamicContainerState {
    #[serde(flatten)]
    pub arbitration: ContainerControlState,
    /// Replayed in array order on every reestablishment
    pub dynamic_children: Vec<DynamicChildSpec>,
}

/// A container that can grow and shrink at runtime.
pub struct DynamicContainerControl {
    inner: ContainerControl,
    factory: Box<dyn ControlFactory>,
    specs: Vec<DynamicChildSpec>,
    /// Children below this index were declared statically and are never
    /// removed or replayed.
    static_count: usize,
}

impl DynamicContainerControl {
    /// Create an empty dynamic container around the given factory.
    pub fn new(id: impl Into<ControlId>, factory: impl ControlFactory + 'static) -> Self {
        Self {
            inner: ContainerControl::new(id),
            factory: Box::new(factory),
            specs: Vec::new(),
            static_count: 0,
        }
    }

    /// Set the tie-break strategy.
    pub fn with_strategy(mut self, strategy: ArbitrationStrategy) -> Self {
        self.inner = self.inner.with_strategy(strategy);
        self
    }

    /// Append a statically-declared child; static children precede all
    /// dynamic ones.
    pub fn with_static_child(mut self, child: impl Control + 'static) -> Self {
        self.inner = self.inner.with_child(child);
        self.static_count += 1;
        self
    }

    /// The container's per-turn memory.
    pub fn state(&self) -> &ContainerControlState {
        self.inner.state()
    }

    /// Ids of the current children, static then dynamic, in order.
    pub fn child_ids(&self) -> Vec<ControlId> {
        self.inner.child_ids()
    }

    /// Specifications of the current dynamic children, in creation order.
    pub fn dynamic_specs(&self) -> &[DynamicChildSpec] {
        &self.specs
    }

    /// Add a child at runtime. The specification is persisted with the
    /// container's state and replayed on every later turn. Duplicate ids
    /// are rejected at the point of addition.
    pub fn add_child(&mut self, spec: DynamicChildSpec) -> Result<(), DialogError> {
        let collides = self.inner.children.iter().any(|c| c.id() == spec.id);
        if collides {
            return Err(DialogError::DuplicateChildId {
                container_id: self.inner.id().to_string(),
                control_id: spec.id,
            });
        }
        let child = self.build_child(&spec)?;
        self.inner.children.push(child);
        self.specs.push(spec);
        Ok(())
    }

    /// Remove a dynamic child and its specification. Returns whether a
    /// child was removed; static children are untouched.
    pub fn remove_child(&mut self, id: &str) -> bool {
        let Some(position) = self
            .inner
            .children
            .iter()
            .position(|c| c.id() == id)
        else {
            return false;
        };
        if position < self.static_count {
            return false;
        }
        self.inner.children.remove(position);
        self.specs.retain(|s| s.id != id);
        true
    }

    fn build_child(&self, spec: &DynamicChildSpec) -> Result<Box<dyn Control>, DialogError> {
        let child = self.factory.create(spec)?;
        if child.id() != spec.id {
            return Err(DialogError::FactoryIdMismatch {
                expected: spec.id.clone(),
                actual: child.id().to_string(),
            });
        }
        Ok(child)
    }
}

#[async_trait]
impl Control for DynamicContainerControl {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn can_handle(&mut self, input: &TurnInput) -> Result<bool, DialogError> {
        self.inner.can_handle(input).await
    }

    async fn handle(
        &mut self,
        input: &TurnInput,
        result: &mut ControlResultBuilder,
    ) -> Result<(), DialogError> {
        self.inner.handle(input, result).await
    }

    async fn can_take_initiative(&mut self, input: &TurnInput) -> Result<bool, DialogError> {
        self.inner.can_take_initiative(input).await
    }

    async fn take_initiative(
        &mut self,
        input: &TurnInput,
        result: &mut ControlResultBuilder,
    ) -> Result<(), DialogError> {
        self.inner.take_initiative(input, result).await
    }

    fn reestablish_state(&mut self, states: &StateMap) -> Result<(), DialogError> {
        let restored: DynamicContainerState =
            read_state(states, self.inner.id())?.unwrap_or_default();
        self.inner.state = restored.arbitration;
        self.specs = restored.dynamic_children;

        // Reconstruct dynamic children before any state flows into the
        // tree; a prior hydration's children are discarded first so each
        // specification is replayed exactly once.
        self.inner.children.truncate(self.static_count);
        for spec in &self.specs {
            debug!(
                container = %self.inner.id(),
                child = %spec.id,
                kind = %spec.kind,
                "reconstructing dynamic child"
            );
            let child = self.factory.create(spec)?;
            if child.id() != spec.id {
                return Err(DialogError::FactoryIdMismatch {
                    expected: spec.id.clone(),
                    actual: child.id().to_string(),
                });
            }
            self.inner.children.push(child);
        }

        // Static and dynamic children reestablish uniformly.
        for child in &mut self.inner.children {
            child.reestablish_state(states)?;
        }
        Ok(())
    }

    fn collect_state(&self, out: &mut StateMap) -> Result<(), DialogError> {
        let state = DynamicContainerState {
            arbitration: self.inner.state.clone(),
            dynamic_children: self.specs.clone(),
        };
        write_state(out, self.inner.id(), &state)?;
        for child in &self.inner.children {
            child.collect_state(out)?;
        }
        Ok(())
    }

    fn collect_ids(&self, out: &mut Vec<ControlId>) {
        self.inner.collect_ids(out);
    }
}
