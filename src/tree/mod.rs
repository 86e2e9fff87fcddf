//! Control tree lifecycle - rebuild, hydrate, run a turn, persist
//!
//! Controls are not persisted as live objects. Every turn the full static
//! tree is rebuilt from an author-supplied build closure (the pure,
//! stateless phase), then hydrated from the previous turn's snapshot (the
//! phase that replays dynamic-child specifications and reattaches state by
//! id). The turn runner drives the handling and initiative halves of the
//! turn and persists the new snapshot only when the turn succeeds.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::acts::SystemAct;
use crate::control::{Control, ControlResultBuilder, SessionBehavior, StateMap};
use crate::error::DialogError;
use crate::input::TurnInput;

/// Injected persistence for turn snapshots, keyed by conversation session.
///
/// The store is an external collaborator; its failures are arbitrary and
/// surface as [`DialogError::Store`].
pub trait StateStore: Send {
    /// Load the last-persisted snapshot for a session, if any.
    fn load(&self, session_id: Uuid) -> anyhow::Result<Option<StateMap>>;

    /// Persist the snapshot for a session, replacing any previous one.
    fn save(&mut self, session_id: Uuid, snapshot: &StateMap) -> anyhow::Result<()>;
}

/// In-memory store, for tests and single-process hosts.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    sessions: HashMap<Uuid, StateMap>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self, session_id: Uuid) -> anyhow::Result<Option<StateMap>> {
        Ok(self.sessions.get(&session_id).cloned())
    }

    fn save(&mut self, session_id: Uuid, snapshot: &StateMap) -> anyhow::Result<()> {
        self.sessions.insert(session_id, snapshot.clone());
        Ok(())
    }
}

/// The finished output of one processed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// Acts produced across the tree, in production order
    pub acts: Vec<SystemAct>,
    /// Whether the session stays open
    pub session_behavior: SessionBehavior,
    /// True when no control anywhere in the tree could handle the input;
    /// the host falls back to its generic "didn't understand" behavior
    pub unmatched: bool,
}

/// Rebuilds the control tree and runs turns against persisted state.
pub struct ControlTreeManager<B, S>
where
    B: Fn() -> Box<dyn Control> + Send,
    S: StateStore,
{
    build: B,
    store: S,
}

impl<B, S> ControlTreeManager<B, S>
where
    B: Fn() -> Box<dyn Control> + Send,
    S: StateStore,
{
    /// Create a manager from the static-tree build closure and a store.
    pub fn new(build: B, store: S) -> Self {
        Self { build, store }
    }

    /// The injected store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Process one turn: rebuild, hydrate, handle, seek initiative,
    /// persist. State is saved only when the whole turn succeeds; a failed
    /// turn leaves the persisted snapshot untouched.
    pub async fn run_turn(
        &mut self,
        session_id: Uuid,
        input: &TurnInput,
    ) -> Result<TurnResult, DialogError> {
        // Phase 1: pure static shape.
        let mut root = (self.build)();
        validate_unique_ids(root.as_ref())?;

        // Phase 2: hydrate from the previous turn's snapshot.
        let snapshot = self
            .store
            .load(session_id)
            .map_err(|source| DialogError::Store { source })?;
        if let Some(snapshot) = &snapshot {
            root.reestablish_state(snapshot)?;
            // Dynamic children reconstructed during hydration can collide
            // with ids elsewhere in the tree; check again now the tree is
            // complete.
            validate_unique_ids(root.as_ref())?;
        }

        let mut result = ControlResultBuilder::new();

        let unmatched = if root.can_handle(input).await? {
            root.handle(input, &mut result).await?;
            false
        } else {
            debug!(turn = input.turn_number, "no control can handle the input");
            true
        };

        // The initiative half runs only when handling produced no
        // initiative act and the session stays open.
        if !result.has_initiative()
            && result.session_behavior() == SessionBehavior::Open
            && root.can_take_initiative(input).await?
        {
            root.take_initiative(input, &mut result).await?;
        }

        if !result.has_initiative() && result.session_behavior() == SessionBehavior::Open {
            warn!(
                turn = input.turn_number,
                "turn ends with an open session but no initiative act"
            );
        }

        let mut new_snapshot = StateMap::new();
        root.collect_state(&mut new_snapshot)?;
        self.store
            .save(session_id, &new_snapshot)
            .map_err(|source| DialogError::Store { source })?;

        let result = result.build();
        Ok(TurnResult {
            acts: result.acts,
            session_behavior: result.session_behavior,
            unmatched,
        })
    }
}

/// Every control id must be unique across the tree; state reattachment is
/// keyed by id and must be unambiguous.
fn validate_unique_ids(root: &dyn Control) -> Result<(), DialogError> {
    let mut ids = Vec::new();
    root.collect_ids(&mut ids);
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.clone()) {
            return Err(DialogError::DuplicateControlId { control_id: id });
        }
    }
    Ok(())
}
