//! # Hierarchy Editing
//!
//! Keeps `parent`/`child`/`sibling` links consistent while entities are
//! re-parented. Every edit marks the moved node dirty; propagation picks up
//! the rest.

use glam::{Quat, Vec3};

use super::propagate::load;
use super::transform::Transform;
use crate::ecs::{EntityHandle, RowLookup, RowTable};
use crate::error::{StoreError, StoreResult};

/// Links `child` as the first child of `parent`, detaching it from any
/// previous parent first.
///
/// # Errors
///
/// - [`StoreError::InvalidHandle`] if either entity has no transform
/// - [`StoreError::BrokenHierarchy`] if the link would create a cycle
pub fn attach<L: RowLookup>(
    table: &mut RowTable,
    lookup: &L,
    child: EntityHandle,
    parent: EntityHandle,
) -> StoreResult<()> {
    let child_row = row(lookup, child)?;
    let parent_row = row(lookup, parent)?;
    if creates_cycle(table, lookup, child, parent) {
        return Err(StoreError::BrokenHierarchy {
            entity: child,
            link: parent,
        }
        .logged());
    }

    detach(table, lookup, child)?;

    let first = read(table, parent_row, parent)?.child;
    let mut node = read(table, child_row, child)?;
    node.parent = parent;
    node.sibling = first;
    node.dirty = 1;
    table.write(child_row, &node);

    let mut parent_node = read(table, parent_row, parent)?;
    parent_node.child = child;
    table.write(parent_row, &parent_node);
    Ok(())
}

/// Unlinks `child` from its parent's child chain, making it a dirty root.
///
/// A child whose parent has no transform is simply cut loose.
///
/// # Errors
///
/// [`StoreError::InvalidHandle`] if `child` has no transform.
pub fn detach<L: RowLookup>(
    table: &mut RowTable,
    lookup: &L,
    child: EntityHandle,
) -> StoreResult<()> {
    let child_row = row(lookup, child)?;
    let mut node = read(table, child_row, child)?;
    if node.parent.is_null() {
        return Ok(());
    }

    match lookup.row_of(node.parent) {
        Some(parent_row) => unlink(table, lookup, parent_row, child, node.sibling),
        None => {
            let _ = StoreError::BrokenHierarchy {
                entity: child,
                link: node.parent,
            }
            .logged();
        }
    }

    node.parent = EntityHandle::NULL;
    node.sibling = EntityHandle::NULL;
    node.dirty = 1;
    table.write(child_row, &node);
    Ok(())
}

/// Cuts every link to and from `entity`: it leaves its parent's child chain
/// and each of its children becomes a dirty root.
///
/// Must run before the entity's transform row is freed, otherwise the
/// surrounding chain keeps pointing at a dead handle and every sibling after
/// it becomes unreachable.
///
/// # Errors
///
/// [`StoreError::InvalidHandle`] if `entity` has no transform.
pub fn isolate<L: RowLookup>(
    table: &mut RowTable,
    lookup: &L,
    entity: EntityHandle,
) -> StoreResult<()> {
    detach(table, lookup, entity)?;

    let entity_row = row(lookup, entity)?;
    let mut node = read(table, entity_row, entity)?;
    let mut current = std::mem::replace(&mut node.child, EntityHandle::NULL);
    table.write(entity_row, &node);

    for _ in 0..table.capacity() {
        if current.is_null() {
            break;
        }
        let Some(child) = lookup
            .row_of(current)
            .and_then(|child_row| table.get_mut::<Transform>(child_row))
        else {
            let _ = StoreError::BrokenHierarchy {
                entity,
                link: current,
            }
            .logged();
            break;
        };
        child.parent = EntityHandle::NULL;
        child.dirty = 1;
        current = std::mem::replace(&mut child.sibling, EntityHandle::NULL);
    }
    Ok(())
}

/// Replaces the local TRS values of `entity` and marks it dirty.
///
/// # Errors
///
/// [`StoreError::InvalidHandle`] if `entity` has no transform.
pub fn set_local<L: RowLookup>(
    table: &mut RowTable,
    lookup: &L,
    entity: EntityHandle,
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
) -> StoreResult<()> {
    let entity_row = row(lookup, entity)?;
    let node = table
        .get_mut::<Transform>(entity_row)
        .ok_or_else(|| StoreError::InvalidHandle(entity).logged())?;
    node.set_local(translation, rotation, scale);
    Ok(())
}

/// Returns `true` if `parent` is `child` or one of its descendants.
fn creates_cycle<L: RowLookup>(
    table: &RowTable,
    lookup: &L,
    child: EntityHandle,
    parent: EntityHandle,
) -> bool {
    let mut current = parent;
    for _ in 0..=table.capacity() {
        if current == child {
            return true;
        }
        match load(table, lookup, current) {
            Some(node) if !node.parent.is_null() => current = node.parent,
            _ => return false,
        }
    }
    true
}

/// Removes `child` from the sibling chain hanging off the parent at `parent_row`.
fn unlink<L: RowLookup>(
    table: &mut RowTable,
    lookup: &L,
    parent_row: usize,
    child: EntityHandle,
    next: EntityHandle,
) {
    let Some(parent) = table.get_mut::<Transform>(parent_row) else {
        return;
    };
    if parent.child == child {
        parent.child = next;
        return;
    }

    let mut current = parent.child;
    for _ in 0..table.capacity() {
        let Some(current_row) = lookup.row_of(current) else {
            return;
        };
        let Some(node) = table.get_mut::<Transform>(current_row) else {
            return;
        };
        if node.sibling == child {
            node.sibling = next;
            return;
        }
        current = node.sibling;
    }
}

fn row<L: RowLookup>(lookup: &L, entity: EntityHandle) -> StoreResult<usize> {
    lookup
        .row_of(entity)
        .ok_or_else(|| StoreError::InvalidHandle(entity).logged())
}

fn read(table: &RowTable, row: usize, entity: EntityHandle) -> StoreResult<Transform> {
    table
        .read::<Transform>(row)
        .ok_or_else(|| StoreError::InvalidHandle(entity).logged())
}
