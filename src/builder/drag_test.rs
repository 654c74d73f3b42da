use super::*;
use crate::error::ErrorCode;
use crate::state::test_helpers::{instance_at, instance_with_id};

fn library(component_id: Uuid) -> DragSource {
    DragSource::Library { component_id }
}

fn placed(instance: &ComponentInstance) -> DragSource {
    DragSource::Instance { instance_id: instance.id, parent_id: instance.parent_id }
}

fn over(instance: &ComponentInstance) -> DropTarget {
    DropTarget::Instance { instance_id: instance.id, parent_id: instance.parent_id }
}

// =============================================================================
// classify_drop
// =============================================================================

#[test]
fn library_on_canvas_appends_after_last_root() {
    let page = Uuid::new_v4();
    let parent = Uuid::new_v4();
    let instances = vec![
        instance_at(page, None, 0),
        instance_at(page, None, 1),
        instance_at(page, Some(parent), 0),
    ];
    let component_id = Uuid::new_v4();

    let DropAction::Create(body) = classify_drop(&library(component_id), &DropTarget::CanvasRoot, &instances) else {
        panic!("expected create");
    };
    assert_eq!(body.component_id, component_id);
    assert_eq!(body.parent_id, None);
    assert_eq!(body.order_index, Some(2));
    assert_eq!(body.props, None);
}

#[test]
fn library_on_empty_canvas_creates_first_root() {
    let action = classify_drop(&library(Uuid::new_v4()), &DropTarget::CanvasRoot, &[]);
    let DropAction::Create(body) = action else {
        panic!("expected create");
    };
    assert_eq!(body.order_index, Some(0));
}

#[test]
fn library_on_droppable_area_creates_first_child() {
    let page = Uuid::new_v4();
    let parent = Uuid::new_v4();
    let instances = vec![instance_at(page, Some(parent), 0), instance_at(page, Some(parent), 1)];

    let action = classify_drop(
        &library(Uuid::new_v4()),
        &DropTarget::DroppableArea { parent_id: parent },
        &instances,
    );
    let DropAction::Create(body) = action else {
        panic!("expected create");
    };
    assert_eq!(body.parent_id, Some(parent));
    assert_eq!(body.order_index, Some(0));
}

#[test]
fn instance_on_sibling_plans_reorder() {
    let page = Uuid::new_v4();
    let a = instance_with_id(Uuid::new_v4(), page, None, 0);
    let b = instance_with_id(Uuid::new_v4(), page, None, 1);
    let c = instance_with_id(Uuid::new_v4(), page, None, 2);
    let instances = vec![a.clone(), b.clone(), c.clone()];

    let DropAction::Reorder(plan) = classify_drop(&placed(&c), &over(&a), &instances) else {
        panic!("expected reorder");
    };
    assert_eq!(plan.ordered_ids, vec![c.id, a.id, b.id]);
}

#[test]
fn instance_on_instance_under_other_parent_is_ignored() {
    let page = Uuid::new_v4();
    let root = instance_at(page, None, 0);
    let nested = instance_at(page, Some(Uuid::new_v4()), 0);
    let instances = vec![root.clone(), nested.clone()];

    assert_eq!(
        classify_drop(&placed(&root), &over(&nested), &instances),
        DropAction::Ignore(IgnoreReason::CrossParent)
    );
}

#[test]
fn instance_on_itself_is_ignored() {
    let page = Uuid::new_v4();
    let a = instance_at(page, None, 0);
    let instances = vec![a.clone()];
    assert_eq!(
        classify_drop(&placed(&a), &over(&a), &instances),
        DropAction::Ignore(IgnoreReason::NoChange)
    );
}

#[test]
fn stale_instance_ids_are_ignored() {
    let page = Uuid::new_v4();
    let a = instance_at(page, None, 0);
    let ghost = instance_at(page, None, 1);
    let instances = vec![a.clone()];
    assert_eq!(
        classify_drop(&placed(&ghost), &over(&a), &instances),
        DropAction::Ignore(IgnoreReason::UnknownInstance)
    );
}

#[test]
fn unsupported_pairs_are_ignored() {
    let page = Uuid::new_v4();
    let a = instance_at(page, None, 0);
    let instances = vec![a.clone()];

    assert_eq!(
        classify_drop(&library(Uuid::new_v4()), &over(&a), &instances),
        DropAction::Ignore(IgnoreReason::UnsupportedTarget)
    );
    assert_eq!(
        classify_drop(&placed(&a), &DropTarget::CanvasRoot, &instances),
        DropAction::Ignore(IgnoreReason::UnsupportedTarget)
    );
    assert_eq!(
        classify_drop(&placed(&a), &DropTarget::DroppableArea { parent_id: Uuid::new_v4() }, &instances),
        DropAction::Ignore(IgnoreReason::UnsupportedTarget)
    );
}

#[test]
fn drag_payloads_are_tagged_on_the_wire() {
    let id = Uuid::nil();
    let value = serde_json::to_value(DragSource::Library { component_id: id }).unwrap();
    assert_eq!(value["type"], "library");
    let target: DropTarget = serde_json::from_value(serde_json::json!({"type": "canvas_root"})).unwrap();
    assert_eq!(target, DropTarget::CanvasRoot);
}

// =============================================================================
// DragMachine
// =============================================================================

#[test]
fn machine_walks_the_full_lifecycle() {
    let mut machine = DragMachine::new();
    let source = library(Uuid::new_v4());
    assert!(machine.is_idle());

    machine.start(source).unwrap();
    assert_eq!(machine.phase(), DragPhase::Dragging(source));
    assert_eq!(machine.active_source(), Some(source));

    let (released, target) = machine.release(DropTarget::CanvasRoot).unwrap();
    assert_eq!(released, source);
    assert_eq!(target, DropTarget::CanvasRoot);
    assert_eq!(machine.phase(), DragPhase::Dropped { source, target });

    machine.finish().unwrap();
    assert!(machine.is_idle());
}

#[test]
fn machine_rejects_new_drag_while_committing() {
    let mut machine = DragMachine::new();
    machine.start(library(Uuid::new_v4())).unwrap();
    assert_eq!(machine.start(library(Uuid::new_v4())), Err(DragError::AlreadyDragging));

    machine.release(DropTarget::CanvasRoot).unwrap();
    let err = machine.start(library(Uuid::new_v4())).unwrap_err();
    assert_eq!(err, DragError::Busy);
    assert!(err.retryable());
    assert_eq!(err.error_code(), "E_DROP_PENDING");
}

#[test]
fn machine_release_and_finish_require_matching_phase() {
    let mut machine = DragMachine::new();
    assert_eq!(machine.release(DropTarget::CanvasRoot), Err(DragError::NotDragging));
    assert_eq!(machine.finish(), Err(DragError::NotDropped));

    machine.start(library(Uuid::new_v4())).unwrap();
    assert_eq!(machine.finish(), Err(DragError::NotDropped));
}

#[test]
fn cancel_only_applies_mid_gesture() {
    let mut machine = DragMachine::new();
    assert!(!machine.cancel());

    machine.start(library(Uuid::new_v4())).unwrap();
    assert!(machine.cancel());
    assert!(machine.is_idle());

    machine.start(library(Uuid::new_v4())).unwrap();
    machine.release(DropTarget::CanvasRoot).unwrap();
    assert!(!machine.cancel());
    assert!(!machine.is_idle());
}

#[test]
fn reset_clears_a_stuck_drop() {
    let mut machine = DragMachine::new();
    machine.start(library(Uuid::new_v4())).unwrap();
    machine.release(DropTarget::CanvasRoot).unwrap();
    machine.reset();
    assert!(machine.is_idle());
    assert!(machine.start(library(Uuid::new_v4())).is_ok());
}
