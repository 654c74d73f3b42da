//! Builder session: selection, drag and drop, and the property panel on top
//! of a `BuilderApi`.
//!
//! DESIGN
//! ======
//! The session keeps a read-through cache of the component library and of
//! each page's instances. Every successful mutation invalidates the page
//! entry so the next read refetches from the server.
//!
//! Reorders are applied to the cache before the request is sent and the
//! whole sibling group goes to the server as one batch. If the request
//! fails, the cached snapshot is restored and the error is returned.
//!
//! The drag machine stays in `Dropped` until the commit settles, so a drag
//! cannot start while a previous drop is still in flight.

use std::collections::HashMap;

use uuid::Uuid;

use crate::builder::drag::{self, DragError, DragMachine, DragSource, DropAction, DropTarget, IgnoreReason};
use crate::builder::form::{self, FieldError, PanelState};
use crate::client::api::{BuilderApi, ClientError};
use crate::error::ErrorCode;
use crate::model::{Component, ComponentFilter, ComponentInstance, InstancePatch};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Drag(#[from] DragError),
    #[error(transparent)]
    Api(#[from] ClientError),
    #[error("invalid properties: {}", join_field_errors(.0))]
    InvalidProperties(Vec<FieldError>),
    #[error("no instance selected")]
    NothingSelected,
    #[error("instance not found: {0}")]
    UnknownInstance(Uuid),
    #[error("component not found: {0}")]
    UnknownComponent(Uuid),
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Drag(err) => err.error_code(),
            Self::Api(err) => err.error_code(),
            Self::InvalidProperties(_) => "E_INVALID_PROPERTIES",
            Self::NothingSelected => "E_NOTHING_SELECTED",
            Self::UnknownInstance(_) => "E_INSTANCE_NOT_FOUND",
            Self::UnknownComponent(_) => "E_COMPONENT_NOT_FOUND",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Drag(err) => err.retryable(),
            Self::Api(err) => err.retryable(),
            _ => false,
        }
    }
}

/// Result of a committed drop.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    Created(ComponentInstance),
    Reordered(Vec<ComponentInstance>),
    Ignored(IgnoreReason),
}

pub struct BuilderSession<A> {
    api: A,
    page_id: Uuid,
    components: Option<Vec<Component>>,
    instances: HashMap<Uuid, Vec<ComponentInstance>>,
    selected: Option<Uuid>,
    drag: DragMachine,
}

impl<A: BuilderApi> BuilderSession<A> {
    pub fn new(api: A, page_id: Uuid) -> Self {
        Self {
            api,
            page_id,
            components: None,
            instances: HashMap::new(),
            selected: None,
            drag: DragMachine::new(),
        }
    }

    #[must_use]
    pub fn page_id(&self) -> Uuid {
        self.page_id
    }

    /// Switch to another page. Selection and any drag are dropped.
    pub fn open_page(&mut self, page_id: Uuid) {
        self.page_id = page_id;
        self.selected = None;
        self.drag.reset();
    }

    #[must_use]
    pub fn drag_machine(&self) -> &DragMachine {
        &self.drag
    }

    // =========================================================================
    // CACHE
    // =========================================================================

    /// Component library, fetched once.
    ///
    /// # Errors
    ///
    /// Propagates the API error on a cache miss.
    pub async fn components(&mut self) -> Result<&[Component], ClientError> {
        if self.components.is_none() {
            let fetched = self.api.list_components(&ComponentFilter::default()).await?;
            self.components = Some(fetched);
        }
        Ok(self.components.as_deref().unwrap_or_default())
    }

    /// Instances of the open page, fetched on a cache miss.
    ///
    /// # Errors
    ///
    /// Propagates the API error on a cache miss.
    pub async fn instances(&mut self) -> Result<&[ComponentInstance], ClientError> {
        if !self.instances.contains_key(&self.page_id) {
            let fetched = self.api.list_instances(self.page_id).await?;
            self.instances.insert(self.page_id, fetched);
        }
        Ok(self.instances.get(&self.page_id).map(Vec::as_slice).unwrap_or_default())
    }

    /// Cached instances of the open page without fetching.
    #[must_use]
    pub fn cached_instances(&self) -> Option<&[ComponentInstance]> {
        self.instances.get(&self.page_id).map(Vec::as_slice)
    }

    pub fn invalidate_page(&mut self, page_id: Uuid) {
        self.instances.remove(&page_id);
    }

    pub fn invalidate_components(&mut self) {
        self.components = None;
    }

    // =========================================================================
    // DRAG AND DROP
    // =========================================================================

    /// # Errors
    ///
    /// `Drag(AlreadyDragging)` mid-gesture, `Drag(Busy)` while a drop commits.
    pub fn drag_start(&mut self, source: DragSource) -> Result<(), SessionError> {
        self.drag.start(source)?;
        Ok(())
    }

    pub fn drag_cancel(&mut self) -> bool {
        self.drag.cancel()
    }

    /// Recover from a drop whose commit was abandoned. The page is refetched
    /// on next read since the server state is unknown.
    pub fn reset_drag(&mut self) {
        self.drag.reset();
        self.invalidate_page(self.page_id);
    }

    /// Release the current drag over `target` and commit the result.
    ///
    /// # Errors
    ///
    /// `Drag(NotDragging)` without a drag in progress, or the API error from
    /// the create or reorder request.
    pub async fn drop_on(&mut self, target: DropTarget) -> Result<DropOutcome, SessionError> {
        let (source, target) = self.drag.release(target)?;
        let outcome = self.commit_drop(source, target).await;
        self.drag.finish()?;
        outcome
    }

    async fn commit_drop(&mut self, source: DragSource, target: DropTarget) -> Result<DropOutcome, SessionError> {
        let page_id = self.page_id;
        let action = {
            let instances = self.instances().await?;
            drag::classify_drop(&source, &target, instances)
        };

        match action {
            DropAction::Ignore(reason) => {
                tracing::debug!(%page_id, ?reason, "drop ignored");
                Ok(DropOutcome::Ignored(reason))
            }
            DropAction::Create(body) => match self.api.create_instance(page_id, &body).await {
                Ok(created) => {
                    self.invalidate_page(page_id);
                    Ok(DropOutcome::Created(created))
                }
                Err(err) => {
                    tracing::warn!(%page_id, component_id = %body.component_id, error = %err, "create from drop failed");
                    Err(err.into())
                }
            },
            DropAction::Reorder(plan) => {
                let snapshot = self.instances.get(&page_id).cloned();
                if let Some(cached) = self.instances.get_mut(&page_id) {
                    plan.apply(cached);
                    cached.sort_by_key(|i| (i.parent_id, i.order_index));
                }

                match self.api.reorder_instances(page_id, &plan.to_request()).await {
                    Ok(group) => {
                        self.invalidate_page(page_id);
                        Ok(DropOutcome::Reordered(group))
                    }
                    Err(err) => {
                        if let Some(previous) = snapshot {
                            self.instances.insert(page_id, previous);
                        }
                        tracing::warn!(
                            %page_id,
                            changes = plan.changes.len(),
                            error = %err,
                            "reorder failed; restored previous order"
                        );
                        Err(err.into())
                    }
                }
            }
        }
    }

    // =========================================================================
    // SELECTION AND PROPERTIES
    // =========================================================================

    pub fn select(&mut self, instance_id: Uuid) {
        self.selected = Some(instance_id);
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    #[must_use]
    pub fn selected(&self) -> Option<Uuid> {
        self.selected
    }

    async fn selected_instance(&mut self) -> Result<Option<ComponentInstance>, SessionError> {
        let Some(id) = self.selected else {
            return Ok(None);
        };
        let found = self.instances().await?.iter().find(|i| i.id == id).cloned();
        if found.is_none() {
            // Deleted elsewhere since it was selected.
            self.selected = None;
        }
        Ok(found)
    }

    /// Property panel for the current selection.
    ///
    /// # Errors
    ///
    /// `UnknownComponent` when the instance's component is not in the
    /// library, or an API error on a cache miss.
    pub async fn property_panel(&mut self) -> Result<PanelState, SessionError> {
        let Some(instance) = self.selected_instance().await? else {
            return Ok(PanelState::Empty);
        };
        let component = self
            .components()
            .await?
            .iter()
            .find(|c| c.id == instance.component_id)
            .ok_or(SessionError::UnknownComponent(instance.component_id))?;
        Ok(PanelState::Editing(form::derive_form(component, &instance)))
    }

    /// Validate `values` against the selected instance's form and save the
    /// full props object in one update.
    ///
    /// # Errors
    ///
    /// `NothingSelected`, `InvalidProperties` with every failing field, or
    /// the API error from the update.
    pub async fn submit_properties(&mut self, values: &HashMap<String, String>) -> Result<ComponentInstance, SessionError> {
        let PanelState::Editing(form) = self.property_panel().await? else {
            return Err(SessionError::NothingSelected);
        };
        let version = self
            .cached_instances()
            .and_then(|all| all.iter().find(|i| i.id == form.instance_id))
            .map(|i| i.version);

        let props = form.apply(values).map_err(SessionError::InvalidProperties)?;
        let patch = InstancePatch {
            props: Some(serde_json::Value::Object(props)),
            expected_version: version,
            ..InstancePatch::default()
        };
        let updated = self.api.update_instance(form.instance_id, &patch).await.inspect_err(|err| {
            tracing::warn!(instance_id = %form.instance_id, error = %err, "property update failed");
        })?;
        self.invalidate_page(self.page_id);
        Ok(updated)
    }

    /// Delete the selected instance and its subtree.
    ///
    /// # Errors
    ///
    /// `NothingSelected` or the API error from the delete.
    pub async fn delete_selected(&mut self) -> Result<Uuid, SessionError> {
        let id = self.selected.ok_or(SessionError::NothingSelected)?;
        self.api.delete_instance(id).await?;
        self.selected = None;
        self.invalidate_page(self.page_id);
        Ok(id)
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
