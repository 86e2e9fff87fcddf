//! Tests for tree reconstruction: dynamic children, state reattachment,
//! and state isolation between siblings

use uuid::Uuid;

use dialog_controls::{
    ContainerControl, ContentAct, Control, ControlAction, ControlResultBuilder,
    ControlTreeManager, DialogError, DynamicChildSpec, DynamicContainerControl,
    InMemoryStateStore, StateMap, SystemAct, TurnInput, ValueControl, ValueControlProps,
    ValueControlState,
};

fn value_factory(spec: &DynamicChildSpec) -> Result<Box<dyn Control>, DialogError> {
    match spec.kind.as_str() {
        "value" => {
            let target = spec
                .data
                .get("target")
                .and_then(|v| v.as_str())
                .unwrap_or(spec.id.as_str());
            Ok(Box::new(ValueControl::new(
                spec.id.clone(),
                ValueControlProps::with_targets(&[target]),
            )))
        }
        other => Err(DialogError::UnknownChildKind {
            kind: other.to_string(),
            control_id: spec.id.clone(),
        }),
    }
}

fn dynamic_container() -> DynamicContainerControl {
    DynamicContainerControl::new("root", value_factory)
}

fn spec(id: &str, target: &str) -> DynamicChildSpec {
    DynamicChildSpec::new(id, "value").with_data(serde_json::json!({ "target": target }))
}

#[test]
fn test_dynamic_reconstruction_is_idempotent() {
    let mut container = dynamic_container();
    container.add_child(spec("guest-1", "first guest")).unwrap();
    container.add_child(spec("guest-2", "second guest")).unwrap();
    assert_eq!(container.child_ids(), vec!["guest-1", "guest-2"]);

    let mut snapshot_one = StateMap::new();
    container.collect_state(&mut snapshot_one).unwrap();

    // A fresh build has no dynamic children until hydration replays the
    // persisted specifications.
    let mut rebuilt = dynamic_container();
    assert!(rebuilt.child_ids().is_empty());
    rebuilt.reestablish_state(&snapshot_one).unwrap();
    assert_eq!(rebuilt.child_ids(), vec!["guest-1", "guest-2"]);

    let mut snapshot_two = StateMap::new();
    rebuilt.collect_state(&mut snapshot_two).unwrap();

    // A third reestablishment from the new snapshot changes nothing.
    let mut rebuilt_again = dynamic_container();
    rebuilt_again.reestablish_state(&snapshot_two).unwrap();
    assert_eq!(rebuilt_again.child_ids(), vec!["guest-1", "guest-2"]);

    let mut snapshot_three = StateMap::new();
    rebuilt_again.collect_state(&mut snapshot_three).unwrap();
    assert_eq!(snapshot_two, snapshot_three);
}

#[test]
fn test_repeated_hydration_replays_each_spec_once() {
    let mut container = dynamic_container();
    container.add_child(spec("guest-1", "first guest")).unwrap();

    let mut snapshot = StateMap::new();
    container.collect_state(&mut snapshot).unwrap();

    // Hydrating the same instance twice must not duplicate children.
    let mut rebuilt = dynamic_container();
    rebuilt.reestablish_state(&snapshot).unwrap();
    rebuilt.reestablish_state(&snapshot).unwrap();
    assert_eq!(rebuilt.child_ids(), vec!["guest-1"]);
}

#[test]
fn test_duplicate_dynamic_id_rejected_at_addition() {
    let mut container = dynamic_container();
    container.add_child(spec("guest-1", "first guest")).unwrap();

    let err = container
        .add_child(spec("guest-1", "first guest again"))
        .unwrap_err();
    assert!(matches!(
        err,
        DialogError::DuplicateChildId { control_id, .. } if control_id == "guest-1"
    ));
    assert_eq!(container.child_ids(), vec!["guest-1"]);
}

#[test]
fn test_unknown_kind_fails_reestablishment() {
    let mut container = dynamic_container();
    container.add_child(spec("guest-1", "first guest")).unwrap();
    let mut snapshot = StateMap::new();
    container.collect_state(&mut snapshot).unwrap();

    // Same snapshot, but the rebuilt tree's factory no longer knows the
    // kind: the turn cannot proceed.
    let strict_factory = |spec: &DynamicChildSpec| -> Result<Box<dyn Control>, DialogError> {
        Err(DialogError::UnknownChildKind {
            kind: spec.kind.clone(),
            control_id: spec.id.clone(),
        })
    };
    let mut rebuilt = DynamicContainerControl::new("root", strict_factory);
    let err = rebuilt.reestablish_state(&snapshot).unwrap_err();
    assert!(matches!(err, DialogError::UnknownChildKind { .. }));
}

#[test]
fn test_factory_id_mismatch_is_a_fault() {
    let renaming_factory = |spec: &DynamicChildSpec| -> Result<Box<dyn Control>, DialogError> {
        let _ = spec;
        Ok(Box::new(ValueControl::new(
            "not-the-requested-id",
            ValueControlProps::default(),
        )))
    };
    let mut container = DynamicContainerControl::new("root", renaming_factory);
    let err = container.add_child(spec("guest-1", "guest")).unwrap_err();
    assert!(matches!(
        err,
        DialogError::FactoryIdMismatch { expected, actual }
            if expected == "guest-1" && actual == "not-the-requested-id"
    ));
}

#[test]
fn test_removal_drops_spec_and_child() {
    let mut container = dynamic_container();
    container.add_child(spec("guest-1", "first guest")).unwrap();
    container.add_child(spec("guest-2", "second guest")).unwrap();

    assert!(container.remove_child("guest-1"));
    assert!(!container.remove_child("guest-1"));
    assert_eq!(container.child_ids(), vec!["guest-2"]);

    // The snapshot reconstructs only the surviving child.
    let mut snapshot = StateMap::new();
    container.collect_state(&mut snapshot).unwrap();
    let mut rebuilt = dynamic_container();
    rebuilt.reestablish_state(&snapshot).unwrap();
    assert_eq!(rebuilt.child_ids(), vec!["guest-2"]);
}

#[tokio::test]
async fn test_sibling_state_is_isolated() {
    let mut container = ContainerControl::new("root")
        .with_child(ValueControl::new(
            "start",
            ValueControlProps::with_targets(&["start date"]),
        ))
        .with_child(ValueControl::new(
            "end",
            ValueControlProps::with_targets(&["end date"]),
        ));

    let input = TurnInput::general(1, ControlAction::Set, Some("start date"), Some("monday"));
    assert!(container.can_handle(&input).await.unwrap());
    let mut result = ControlResultBuilder::new();
    container.handle(&input, &mut result).await.unwrap();
    assert!(result.acts().iter().any(|act| matches!(
        act,
        SystemAct::Content(ContentAct::ValueSet { control_id, .. }) if control_id == "start"
    )));

    let mut snapshot = StateMap::new();
    container.collect_state(&mut snapshot).unwrap();

    let start: ValueControlState =
        serde_json::from_value(snapshot.get("start").unwrap().clone()).unwrap();
    let end: ValueControlState =
        serde_json::from_value(snapshot.get("end").unwrap().clone()).unwrap();

    assert_eq!(start.value.as_deref(), Some("monday"));
    assert_eq!(end, ValueControlState::default());
}

#[tokio::test]
async fn test_state_survives_the_turn_boundary() {
    let build = || -> Box<dyn Control> {
        Box::new(
            ContainerControl::new("root")
                .with_child(ValueControl::new(
                    "start",
                    ValueControlProps::with_targets(&["start date"]),
                ))
                .with_child(ValueControl::new(
                    "end",
                    ValueControlProps::with_targets(&["end date"]),
                )),
        )
    };
    let mut manager = ControlTreeManager::new(build, InMemoryStateStore::new());
    let session = Uuid::new_v4();

    let input = TurnInput::general(1, ControlAction::Set, Some("start date"), Some("monday"));
    manager.run_turn(session, &input).await.unwrap();

    // A later turn sees the earlier value and reports the change delta,
    // even though the tree was rebuilt from scratch in between.
    let input = TurnInput::general(2, ControlAction::Change, Some("start date"), Some("tuesday"));
    let result = manager.run_turn(session, &input).await.unwrap();
    assert!(result.acts.iter().any(|act| matches!(
        act,
        SystemAct::Content(ContentAct::ValueChanged { control_id, previous, value })
            if control_id == "start" && previous == "monday" && value == "tuesday"
    )));

    // Separate sessions stay separate.
    let other_session = Uuid::new_v4();
    let input = TurnInput::general(1, ControlAction::Change, Some("start date"), Some("friday"));
    let result = manager.run_turn(other_session, &input).await.unwrap();
    assert!(result.acts.iter().any(|act| matches!(
        act,
        SystemAct::Content(ContentAct::ValueSet { control_id, value })
            if control_id == "start" && value == "friday"
    )));
}
