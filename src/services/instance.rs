//! Component instance service: placement, ordering, and edits.
//!
//! DESIGN
//! ======
//! Instances sharing a `(page_id, parent_id)` pair form a sibling group whose
//! order indices stay dense (`0..N-1`) after every mutation. Each mutation
//! that touches ordering runs in one transaction that first locks the
//! affected sibling group with `SELECT ... FOR UPDATE`, so concurrent
//! reorders of the same group serialize instead of interleaving.
//!
//! - create: insert at the requested position (clamped), shifting later
//!   siblings; append when no position is given
//! - reorder: the client sends the complete new order of one group; it must
//!   name exactly the current siblings
//! - reparent: append to the new group, compact the old one
//! - delete: remove the subtree, compact the remaining siblings
//!
//! ERROR HANDLING
//! ==============
//! Updates carrying `expected_version` older than the stored version are
//! rejected as stale. Every row whose order index changes gets its version
//! bumped, so a client holding an outdated copy learns about the move.

use std::collections::{HashMap, HashSet};

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::builder::order::{OrderChange, dense_changes, to_order_index};
use crate::error::ErrorCode;
use crate::model::{ComponentInstance, InstancePatch, Layout, NewInstance, ReorderRequest};
use crate::services::component::{self, ComponentError};
use crate::services::project::{self, Permission, ProjectError};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("component instance not found: {0}")]
    NotFound(Uuid),
    #[error("component not found: {0}")]
    ComponentNotFound(Uuid),
    #[error("invalid parent: {0}")]
    InvalidParent(String),
    #[error("ordered ids do not match the current siblings")]
    SiblingMismatch { parent_id: Option<Uuid> },
    #[error("stale update: expected version {expected} < current {current}")]
    StaleUpdate { expected: i32, current: i32 },
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for InstanceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_INSTANCE_NOT_FOUND",
            Self::ComponentNotFound(_) => "E_COMPONENT_NOT_FOUND",
            Self::InvalidParent(_) => "E_INVALID_PARENT",
            Self::SiblingMismatch { .. } => "E_SIBLING_MISMATCH",
            Self::StaleUpdate { .. } => "E_STALE_UPDATE",
            Self::Invalid(_) => "E_INVALID_INPUT",
            Self::Project(err) => err.error_code(),
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::SiblingMismatch { .. } | Self::StaleUpdate { .. } | Self::Database(_) => true,
            Self::Project(err) => err.retryable(),
            _ => false,
        }
    }
}

const INSTANCE_COLUMNS: &str = "id, component_id, page_id, parent_id, props, order_index, x, y, width, height, version";

fn instance_from_row(row: &PgRow) -> ComponentInstance {
    ComponentInstance {
        id: row.get("id"),
        component_id: row.get("component_id"),
        page_id: row.get("page_id"),
        parent_id: row.get("parent_id"),
        props: row.get("props"),
        order_index: row.get("order_index"),
        layout: Layout {
            x: row.get("x"),
            y: row.get("y"),
            width: row.get("width"),
            height: row.get("height"),
        },
        version: row.get("version"),
    }
}

// =============================================================================
// PURE HELPERS
// =============================================================================

/// Clamp a requested insert position into `0..=sibling_count`. Absent means
/// append.
#[must_use]
pub fn insertion_index(requested: Option<i32>, sibling_count: usize) -> usize {
    match requested {
        Some(index) => usize::try_from(index.max(0)).unwrap_or(0).min(sibling_count),
        None => sibling_count,
    }
}

/// True if `ordered` names exactly the ids in `current`, each once.
#[must_use]
pub fn validate_sibling_set(current: &[Uuid], ordered: &[Uuid]) -> bool {
    if current.len() != ordered.len() {
        return false;
    }
    let expected = current.iter().collect::<HashSet<_>>();
    let mut seen = HashSet::with_capacity(ordered.len());
    ordered.iter().all(|id| expected.contains(id) && seen.insert(*id))
}

/// True if making `new_parent` the parent of `moving` would put `moving`
/// inside its own subtree. `parents` maps each instance id to its parent.
#[must_use]
pub fn would_create_cycle(parents: &HashMap<Uuid, Option<Uuid>>, moving: Uuid, new_parent: Uuid) -> bool {
    let mut cursor = Some(new_parent);
    let mut steps = 0;
    while let Some(id) = cursor {
        if id == moving {
            return true;
        }
        steps += 1;
        if steps > parents.len() {
            return true;
        }
        cursor = parents.get(&id).copied().flatten();
    }
    false
}

fn require_object(props: &serde_json::Value) -> Result<(), InstanceError> {
    if props.is_object() {
        Ok(())
    } else {
        Err(InstanceError::Invalid("props must be a JSON object".into()))
    }
}

// =============================================================================
// SIBLING GROUP PRIMITIVES
// =============================================================================

/// Lock one sibling group and return `(id, order_index)` in display order.
async fn lock_siblings(
    conn: &mut PgConnection,
    page_id: Uuid,
    parent_id: Option<Uuid>,
) -> Result<Vec<(Uuid, i32)>, sqlx::Error> {
    sqlx::query_as::<_, (Uuid, i32)>(
        "SELECT id, order_index FROM component_instances
         WHERE page_id = $1 AND parent_id IS NOT DISTINCT FROM $2
         ORDER BY order_index, id
         FOR UPDATE",
    )
    .bind(page_id)
    .bind(parent_id)
    .fetch_all(&mut *conn)
    .await
}

/// Write changed order indices, bumping each touched row's version.
async fn write_order(conn: &mut PgConnection, changes: &[OrderChange]) -> Result<(), sqlx::Error> {
    for change in changes {
        sqlx::query(
            "UPDATE component_instances
             SET order_index = $2, version = version + 1, updated_at = now()
             WHERE id = $1",
        )
        .bind(change.instance_id)
        .bind(change.to)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Rewrite a group's indices to `0..N-1`, keeping relative order.
async fn compact_siblings(conn: &mut PgConnection, page_id: Uuid, parent_id: Option<Uuid>) -> Result<usize, sqlx::Error> {
    let siblings = lock_siblings(conn, page_id, parent_id).await?;
    let ids = siblings.iter().map(|(id, _)| *id).collect::<Vec<_>>();
    let current = siblings.into_iter().collect::<HashMap<_, _>>();
    let changes = dense_changes(&ids, &current);
    write_order(conn, &changes).await?;
    Ok(changes.len())
}

async fn parent_on_page(conn: &mut PgConnection, parent_id: Uuid, page_id: Uuid) -> Result<(), InstanceError> {
    let parent_page: Option<Uuid> = sqlx::query_scalar("SELECT page_id FROM component_instances WHERE id = $1")
        .bind(parent_id)
        .fetch_optional(&mut *conn)
        .await?;
    match parent_page {
        Some(found) if found == page_id => Ok(()),
        Some(_) => Err(InstanceError::InvalidParent(format!("parent {parent_id} is on another page"))),
        None => Err(InstanceError::InvalidParent(format!("parent {parent_id} does not exist"))),
    }
}

async fn fetch_instance(conn: &mut PgConnection, instance_id: Uuid, lock: bool) -> Result<ComponentInstance, InstanceError> {
    let sql = if lock {
        format!("SELECT {INSTANCE_COLUMNS} FROM component_instances WHERE id = $1 FOR UPDATE")
    } else {
        format!("SELECT {INSTANCE_COLUMNS} FROM component_instances WHERE id = $1")
    };
    let row = sqlx::query(&sql)
        .bind(instance_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(InstanceError::NotFound(instance_id))?;
    Ok(instance_from_row(&row))
}

/// Load an instance and check the user's permission on its page. Hidden
/// pages report the instance as missing.
async fn authorized_instance(
    pool: &PgPool,
    instance_id: Uuid,
    user_id: Uuid,
    permission: Permission,
) -> Result<ComponentInstance, InstanceError> {
    // The connection goes back to the pool before the permission check asks for one.
    let instance = {
        let mut conn = pool.acquire().await?;
        fetch_instance(&mut conn, instance_id, false).await?
    };
    project::ensure_page_permission(pool, instance.page_id, user_id, permission)
        .await
        .map_err(|err| match err {
            ProjectError::PageNotFound(_) => InstanceError::NotFound(instance_id),
            other => InstanceError::Project(other),
        })?;
    Ok(instance)
}

// =============================================================================
// QUERIES
// =============================================================================

/// All instances of a page, roots first, each group in order.
///
/// # Errors
///
/// `PageNotFound` (via `Project`) or a database error.
pub async fn list_page_instances(pool: &PgPool, page_id: Uuid, user_id: Uuid) -> Result<Vec<ComponentInstance>, InstanceError> {
    project::ensure_page_permission(pool, page_id, user_id, Permission::View).await?;
    load_page_instances(pool, page_id).await
}

pub(crate) async fn load_page_instances(pool: &PgPool, page_id: Uuid) -> Result<Vec<ComponentInstance>, InstanceError> {
    let rows = sqlx::query(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM component_instances
         WHERE page_id = $1
         ORDER BY parent_id NULLS FIRST, order_index, id"
    ))
    .bind(page_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(instance_from_row).collect())
}

/// Fetch one instance the user may view.
///
/// # Errors
///
/// `NotFound` or a database error.
pub async fn get_instance(pool: &PgPool, instance_id: Uuid, user_id: Uuid) -> Result<ComponentInstance, InstanceError> {
    authorized_instance(pool, instance_id, user_id, Permission::View).await
}

// =============================================================================
// CREATE
// =============================================================================

/// Place a component on a page.
///
/// # Errors
///
/// `ComponentNotFound` when the component is not visible to the user,
/// `InvalidParent` when the parent is missing or on another page, `Invalid`
/// for non-object props, plus page permission and database errors.
pub async fn create_instance(
    pool: &PgPool,
    page_id: Uuid,
    user_id: Uuid,
    body: &NewInstance,
) -> Result<ComponentInstance, InstanceError> {
    project::ensure_page_permission(pool, page_id, user_id, Permission::Edit).await?;
    let component = component::get_component(pool, body.component_id, user_id)
        .await
        .map_err(|err| match err {
            ComponentError::Database(db) => InstanceError::Database(db),
            _ => InstanceError::ComponentNotFound(body.component_id),
        })?;

    let props = body.props.clone().unwrap_or_else(|| component.default_props.clone());
    require_object(&props)?;

    let mut tx = pool.begin().await?;
    if let Some(parent_id) = body.parent_id {
        parent_on_page(&mut tx, parent_id, page_id).await?;
    }

    let siblings = lock_siblings(&mut tx, page_id, body.parent_id).await?;
    let position = insertion_index(body.order_index, siblings.len());
    let id = Uuid::new_v4();
    let mut ids = siblings.iter().map(|(sid, _)| *sid).collect::<Vec<_>>();
    ids.insert(position, id);
    let current = siblings.into_iter().collect::<HashMap<_, _>>();
    let shifts = dense_changes(&ids, &current)
        .into_iter()
        .filter(|change| change.instance_id != id)
        .collect::<Vec<_>>();
    write_order(&mut tx, &shifts).await?;

    let instance = ComponentInstance {
        id,
        component_id: component.id,
        page_id,
        parent_id: body.parent_id,
        props,
        order_index: to_order_index(position),
        layout: body.layout,
        version: 1,
    };
    sqlx::query(&format!(
        "INSERT INTO component_instances ({INSTANCE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
    ))
    .bind(instance.id)
    .bind(instance.component_id)
    .bind(instance.page_id)
    .bind(instance.parent_id)
    .bind(&instance.props)
    .bind(instance.order_index)
    .bind(instance.layout.x)
    .bind(instance.layout.y)
    .bind(instance.layout.width)
    .bind(instance.layout.height)
    .bind(instance.version)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(
        instance_id = %instance.id,
        %page_id,
        parent_id = ?instance.parent_id,
        order_index = instance.order_index,
        shifted = shifts.len(),
        "instance created"
    );
    Ok(instance)
}

// =============================================================================
// UPDATE
// =============================================================================

/// Apply a partial update: props, layout, or a move to another parent.
///
/// # Errors
///
/// `StaleUpdate` when `expected_version` is older than the stored version,
/// `InvalidParent` for self, descendant, missing, or foreign-page parents,
/// `Invalid` for non-object props, plus permission and database errors.
pub async fn update_instance(
    pool: &PgPool,
    instance_id: Uuid,
    user_id: Uuid,
    patch: &InstancePatch,
) -> Result<ComponentInstance, InstanceError> {
    authorized_instance(pool, instance_id, user_id, Permission::Edit).await?;
    if let Some(props) = &patch.props {
        require_object(props)?;
    }

    let mut tx = pool.begin().await?;
    let mut instance = fetch_instance(&mut tx, instance_id, true).await?;
    if let Some(expected) = patch.expected_version {
        if expected < instance.version {
            warn!(%instance_id, expected, current = instance.version, "stale instance update rejected");
            return Err(InstanceError::StaleUpdate { expected, current: instance.version });
        }
    }

    if let Some(props) = &patch.props {
        instance.props.clone_from(props);
    }
    if let Some(layout) = patch.layout {
        instance.layout = layout;
    }

    let old_parent = instance.parent_id;
    let reparent = patch.parent_id.filter(|new_parent| *new_parent != old_parent);
    if let Some(new_parent) = reparent {
        if let Some(parent_id) = new_parent {
            if parent_id == instance_id {
                return Err(InstanceError::InvalidParent("an instance cannot contain itself".into()));
            }
            parent_on_page(&mut tx, parent_id, instance.page_id).await?;
            let parents = sqlx::query_as::<_, (Uuid, Option<Uuid>)>(
                "SELECT id, parent_id FROM component_instances WHERE page_id = $1",
            )
            .bind(instance.page_id)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect::<HashMap<_, _>>();
            if would_create_cycle(&parents, instance_id, parent_id) {
                return Err(InstanceError::InvalidParent(format!(
                    "{parent_id} is inside the subtree of {instance_id}"
                )));
            }
        }
        let new_siblings = lock_siblings(&mut tx, instance.page_id, new_parent).await?;
        instance.parent_id = new_parent;
        instance.order_index = to_order_index(new_siblings.len());
    }

    let version: i32 = sqlx::query_scalar(
        "UPDATE component_instances
         SET props = $2, parent_id = $3, order_index = $4, x = $5, y = $6, width = $7, height = $8,
             version = version + 1, updated_at = now()
         WHERE id = $1
         RETURNING version",
    )
    .bind(instance.id)
    .bind(&instance.props)
    .bind(instance.parent_id)
    .bind(instance.order_index)
    .bind(instance.layout.x)
    .bind(instance.layout.y)
    .bind(instance.layout.width)
    .bind(instance.layout.height)
    .fetch_one(&mut *tx)
    .await?;
    instance.version = version;

    if reparent.is_some() {
        let compacted = compact_siblings(&mut tx, instance.page_id, old_parent).await?;
        info!(%instance_id, from = ?old_parent, to = ?instance.parent_id, compacted, "instance reparented");
    } else {
        info!(
            %instance_id,
            props = patch.props.is_some(),
            layout = patch.layout.is_some(),
            version,
            "instance updated"
        );
    }
    tx.commit().await?;
    Ok(instance)
}

// =============================================================================
// REORDER
// =============================================================================

/// Give one sibling group a complete new order in a single transaction.
/// Returns the group sorted by its new indices.
///
/// # Errors
///
/// `SiblingMismatch` when `ordered_ids` is not exactly the current sibling
/// set, plus permission and database errors.
pub async fn reorder_instances(
    pool: &PgPool,
    page_id: Uuid,
    user_id: Uuid,
    request: &ReorderRequest,
) -> Result<Vec<ComponentInstance>, InstanceError> {
    project::ensure_page_permission(pool, page_id, user_id, Permission::Edit).await?;

    let mut tx = pool.begin().await?;
    let siblings = lock_siblings(&mut tx, page_id, request.parent_id).await?;
    let current_ids = siblings.iter().map(|(id, _)| *id).collect::<Vec<_>>();
    if !validate_sibling_set(&current_ids, &request.ordered_ids) {
        warn!(%page_id, parent_id = ?request.parent_id, "reorder rejected: sibling set changed");
        return Err(InstanceError::SiblingMismatch { parent_id: request.parent_id });
    }

    let current = siblings.into_iter().collect::<HashMap<_, _>>();
    let changes = dense_changes(&request.ordered_ids, &current);
    write_order(&mut tx, &changes).await?;

    let rows = sqlx::query(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM component_instances
         WHERE page_id = $1 AND parent_id IS NOT DISTINCT FROM $2
         ORDER BY order_index, id"
    ))
    .bind(page_id)
    .bind(request.parent_id)
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(%page_id, parent_id = ?request.parent_id, changed = changes.len(), "siblings reordered");
    Ok(rows.iter().map(instance_from_row).collect())
}

// =============================================================================
// DELETE
// =============================================================================

/// Delete an instance with its subtree and close the gap it leaves.
///
/// # Errors
///
/// `NotFound`, permission errors, or a database error.
pub async fn delete_instance(pool: &PgPool, instance_id: Uuid, user_id: Uuid) -> Result<(), InstanceError> {
    authorized_instance(pool, instance_id, user_id, Permission::Edit).await?;

    let mut tx = pool.begin().await?;
    // Re-read under lock; the row may have moved since the permission check.
    let instance = fetch_instance(&mut tx, instance_id, true).await?;
    lock_siblings(&mut tx, instance.page_id, instance.parent_id).await?;
    let result = sqlx::query("DELETE FROM component_instances WHERE id = $1")
        .bind(instance_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(InstanceError::NotFound(instance_id));
    }
    let compacted = compact_siblings(&mut tx, instance.page_id, instance.parent_id).await?;
    tx.commit().await?;

    info!(%instance_id, page_id = %instance.page_id, compacted, "instance deleted");
    Ok(())
}

#[cfg(test)]
#[path = "instance_test.rs"]
mod tests;
