//! Drag payloads, drop classification, and the drag state machine.
//!
//! DESIGN
//! ======
//! A drag gesture carries a typed source and ends on a typed target. The
//! (source, target) pair maps to exactly one `DropAction` through an
//! exhaustive match:
//!
//! - library → canvas root:       create, appended after the last root
//! - library → droppable area:    create as the first child of that parent
//! - instance → instance:         reorder within a shared parent only
//! - anything else:               ignored, no request is issued
//!
//! The state machine runs `Idle → Dragging → Dropped → Idle`. While a drop is
//! being committed a new drag cannot start, so two reorders of the same
//! group never overlap.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::builder::order::{self, ReorderPlan};
use crate::model::{ComponentInstance, Layout, NewInstance};

// =============================================================================
// PAYLOADS
// =============================================================================

/// What the user picked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DragSource {
    /// A component definition dragged out of the library.
    Library { component_id: Uuid },
    /// An instance already placed on the page.
    Instance { instance_id: Uuid, parent_id: Option<Uuid> },
}

/// Where the user let go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DropTarget {
    /// The page body outside any container.
    CanvasRoot,
    /// The drop zone inside a container instance.
    DroppableArea { parent_id: Uuid },
    /// Another placed instance.
    Instance { instance_id: Uuid, parent_id: Option<Uuid> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Source and target instances live under different parents.
    CrossParent,
    /// The drop would not change anything.
    NoChange,
    /// Source or target instance is not on the page.
    UnknownInstance,
    /// The target does not accept this kind of source.
    UnsupportedTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropAction {
    Create(NewInstance),
    Reorder(ReorderPlan),
    Ignore(IgnoreReason),
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Decide what a drop means given the page's current instances.
#[must_use]
pub fn classify_drop(source: &DragSource, target: &DropTarget, instances: &[ComponentInstance]) -> DropAction {
    match (*source, *target) {
        (DragSource::Library { component_id }, DropTarget::CanvasRoot) => {
            let root_count = instances.iter().filter(|i| i.parent_id.is_none()).count();
            DropAction::Create(new_instance(component_id, None, order::to_order_index(root_count)))
        }
        (DragSource::Library { component_id }, DropTarget::DroppableArea { parent_id }) => {
            DropAction::Create(new_instance(component_id, Some(parent_id), 0))
        }
        (
            DragSource::Instance { instance_id: active_id, parent_id: active_parent },
            DropTarget::Instance { instance_id: over_id, parent_id: over_parent },
        ) => {
            if active_parent != over_parent {
                return DropAction::Ignore(IgnoreReason::CrossParent);
            }
            if active_id == over_id {
                return DropAction::Ignore(IgnoreReason::NoChange);
            }
            let siblings = order::sort_siblings(instances, active_parent);
            let known = |id: Uuid| siblings.iter().any(|i| i.id == id);
            if !known(active_id) || !known(over_id) {
                return DropAction::Ignore(IgnoreReason::UnknownInstance);
            }
            match order::plan_reorder(instances, active_parent, active_id, over_id) {
                Some(plan) => DropAction::Reorder(plan),
                None => DropAction::Ignore(IgnoreReason::NoChange),
            }
        }
        (DragSource::Library { .. }, DropTarget::Instance { .. })
        | (DragSource::Instance { .. }, DropTarget::CanvasRoot | DropTarget::DroppableArea { .. }) => {
            DropAction::Ignore(IgnoreReason::UnsupportedTarget)
        }
    }
}

fn new_instance(component_id: Uuid, parent_id: Option<Uuid>, order_index: i32) -> NewInstance {
    NewInstance { component_id, parent_id, props: None, order_index: Some(order_index), layout: Layout::default() }
}

// =============================================================================
// STATE MACHINE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragPhase {
    #[default]
    Idle,
    Dragging(DragSource),
    Dropped { source: DragSource, target: DropTarget },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DragError {
    #[error("a drag is already in progress")]
    AlreadyDragging,
    #[error("the previous drop is still being committed")]
    Busy,
    #[error("no drag in progress")]
    NotDragging,
    #[error("no drop awaiting completion")]
    NotDropped,
}

impl crate::error::ErrorCode for DragError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyDragging => "E_DRAG_IN_PROGRESS",
            Self::Busy => "E_DROP_PENDING",
            Self::NotDragging => "E_NOT_DRAGGING",
            Self::NotDropped => "E_NOT_DROPPED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

/// Explicit drag lifecycle: `Idle → Dragging(source) → Dropped(source, target) → Idle`.
#[derive(Debug, Clone, Default)]
pub struct DragMachine {
    phase: DragPhase,
}

impl DragMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> DragPhase {
        self.phase
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.phase == DragPhase::Idle
    }

    /// Source of the gesture in progress, if any.
    #[must_use]
    pub fn active_source(&self) -> Option<DragSource> {
        match self.phase {
            DragPhase::Idle => None,
            DragPhase::Dragging(source) | DragPhase::Dropped { source, .. } => Some(source),
        }
    }

    /// Begin a drag.
    ///
    /// # Errors
    ///
    /// `AlreadyDragging` mid-gesture, `Busy` while a drop is committing.
    pub fn start(&mut self, source: DragSource) -> Result<(), DragError> {
        match self.phase {
            DragPhase::Idle => {
                self.phase = DragPhase::Dragging(source);
                Ok(())
            }
            DragPhase::Dragging(_) => Err(DragError::AlreadyDragging),
            DragPhase::Dropped { .. } => Err(DragError::Busy),
        }
    }

    /// Abandon the gesture in progress. Returns false if nothing was cancelled.
    pub fn cancel(&mut self) -> bool {
        if let DragPhase::Dragging(_) = self.phase {
            self.phase = DragPhase::Idle;
            return true;
        }
        false
    }

    /// Release the drag over `target`.
    ///
    /// # Errors
    ///
    /// `NotDragging` if no gesture is in progress.
    pub fn release(&mut self, target: DropTarget) -> Result<(DragSource, DropTarget), DragError> {
        let DragPhase::Dragging(source) = self.phase else {
            return Err(DragError::NotDragging);
        };
        self.phase = DragPhase::Dropped { source, target };
        Ok((source, target))
    }

    /// Mark the committed drop as finished.
    ///
    /// # Errors
    ///
    /// `NotDropped` if no drop is awaiting completion.
    pub fn finish(&mut self) -> Result<(), DragError> {
        if let DragPhase::Dropped { .. } = self.phase {
            self.phase = DragPhase::Idle;
            return Ok(());
        }
        Err(DragError::NotDropped)
    }

    /// Force the machine back to `Idle`, e.g. after a commit was abandoned.
    pub fn reset(&mut self) {
        self.phase = DragPhase::Idle;
    }
}

#[cfg(test)]
#[path = "drag_test.rs"]
mod tests;
