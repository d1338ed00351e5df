//! # Transform Propagation
//!
//! Incremental world-matrix propagation over the transform row table.
//!
//! A query walks `parent` links up from the requested entity to find the
//! topmost dirty ancestor, then recomputes downward from there. Everything
//! above that ancestor is clean, so its parent's cached world is exact and
//! nothing outside the dirty subtree is touched.
//!
//! Single-entity queries stop at the requested entity. Its children are
//! flagged dirty instead, so they refresh on their own next query or on the
//! next [`TransformPropagator::update_all`] sweep.

use glam::Mat4;

use super::transform::Transform;
use crate::ecs::{EntityHandle, RowLookup, RowTable};
use crate::error::StoreError;

/// Counters collected while propagating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropagationStats {
    /// Nodes whose world matrix was recomputed and decomposed back into
    /// translation/rotation/scale.
    pub recomputed: usize,
    /// Dangling `parent`/`child`/`sibling` links encountered.
    pub broken_links: usize,
}

/// A node waiting to be recomputed during the downward pass.
#[derive(Clone, Copy)]
struct Pending {
    entity: EntityHandle,
    parent_world: Mat4,
    /// Entity whose link led here, for diagnostics.
    referrer: EntityHandle,
    /// Whether to continue along this node's `sibling` link.
    follow_sibling: bool,
}

/// Recomputes cached world transforms for dirty subtrees.
///
/// Owns a scratch stack so repeated propagation does not allocate once the
/// stack has grown to the deepest fan-out seen.
#[derive(Default)]
pub struct TransformPropagator {
    stack: Vec<Pending>,
    stats: PropagationStats,
}

impl TransformPropagator {
    /// Creates a propagator with an empty scratch stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counters accumulated so far.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> PropagationStats {
        self.stats
    }

    /// Zeroes the counters.
    pub fn reset_stats(&mut self) {
        self.stats = PropagationStats::default();
    }

    /// Brings `entity`'s world matrix up to date and returns it.
    ///
    /// Returns `None` if `entity` has no transform record.
    pub fn update<L: RowLookup>(
        &mut self,
        table: &mut RowTable,
        lookup: &L,
        entity: EntityHandle,
    ) -> Option<Mat4> {
        let node = load(table, lookup, entity)?;

        let Some((start, start_node)) = self.topmost_dirty(table, lookup, entity, node) else {
            return Some(node.world_matrix());
        };

        let parent_world = cached_parent_world(table, lookup, &start_node);
        let reached = self.propagate_from(table, lookup, start, parent_world, Some(entity));

        if !reached {
            // child/sibling links disagree with the parent chain
            self.broken(start, entity);
            let node = load(table, lookup, entity)?;
            let parent_world = cached_parent_world(table, lookup, &node);
            self.propagate_from(table, lookup, entity, parent_world, Some(entity));
        }

        load(table, lookup, entity).map(|node| node.world_matrix())
    }

    /// Recomputes every dirty subtree in the table.
    ///
    /// Rows are visited in index order; a dirty row first resolves its
    /// topmost dirty ancestor so parents are always settled before their
    /// descendants. Returns the number of nodes recomputed.
    pub fn update_all<L: RowLookup>(&mut self, table: &mut RowTable, lookup: &L) -> usize {
        let before = self.stats.recomputed;

        let mut cursor = table.first_index();
        while let Some(row) = cursor {
            let owner = table.entity_at(row);
            if let Some(node) = table.read::<Transform>(row).filter(Transform::is_dirty) {
                if let Some((start, start_node)) = self.topmost_dirty(table, lookup, owner, node) {
                    let parent_world = cached_parent_world(table, lookup, &start_node);
                    self.propagate_from(table, lookup, start, parent_world, None);
                }
            }
            cursor = table.next_index(row);
        }

        self.stats.recomputed - before
    }

    // -- Internal helpers ---------------------------------------------------

    /// Walks `parent` links up from `entity` and returns the topmost dirty node.
    fn topmost_dirty<L: RowLookup>(
        &mut self,
        table: &RowTable,
        lookup: &L,
        entity: EntityHandle,
        node: Transform,
    ) -> Option<(EntityHandle, Transform)> {
        let mut first_dirty = None;
        let mut current = entity;
        let mut node = node;

        for _ in 0..=table.capacity() {
            if node.is_dirty() {
                first_dirty = Some((current, node));
            }
            if node.parent.is_null() {
                return first_dirty;
            }
            match load(table, lookup, node.parent) {
                Some(parent) => {
                    current = node.parent;
                    node = parent;
                }
                None => {
                    self.broken(current, node.parent);
                    return first_dirty;
                }
            }
        }

        // more ancestors than rows: the parent chain loops
        self.broken(current, node.parent);
        first_dirty
    }

    /// Recomputes `start` and its descendants. Returns whether `stop_at` was
    /// reached.
    fn propagate_from<L: RowLookup>(
        &mut self,
        table: &mut RowTable,
        lookup: &L,
        start: EntityHandle,
        parent_world: Mat4,
        stop_at: Option<EntityHandle>,
    ) -> bool {
        let mut reached = false;
        let mut budget = table.capacity();

        self.stack.clear();
        self.stack.push(Pending {
            entity: start,
            parent_world,
            referrer: start,
            follow_sibling: false,
        });

        while let Some(pending) = self.stack.pop() {
            if budget == 0 {
                // more visits than rows: the child/sibling links loop
                self.broken(pending.referrer, pending.entity);
                self.stack.clear();
                break;
            }
            budget -= 1;

            let Some(row) = lookup.row_of(pending.entity) else {
                self.broken(pending.referrer, pending.entity);
                continue;
            };
            let Some(mut node) = table.read::<Transform>(row) else {
                self.broken(pending.referrer, pending.entity);
                continue;
            };

            let world = pending.parent_world * node.local_matrix();
            node.store_world(world);
            table.write(row, &node);
            self.stats.recomputed += 1;

            if pending.follow_sibling && !node.sibling.is_null() {
                self.stack.push(Pending {
                    entity: node.sibling,
                    parent_world: pending.parent_world,
                    referrer: pending.entity,
                    follow_sibling: true,
                });
            }

            if stop_at == Some(pending.entity) {
                reached = true;
                self.mark_children_dirty(table, lookup, pending.entity, node.child);
            } else if !node.child.is_null() {
                self.stack.push(Pending {
                    entity: node.child,
                    parent_world: world,
                    referrer: pending.entity,
                    follow_sibling: true,
                });
            }
        }

        reached
    }

    /// Flags the whole child/sibling chain starting at `first` dirty.
    fn mark_children_dirty<L: RowLookup>(
        &mut self,
        table: &mut RowTable,
        lookup: &L,
        parent: EntityHandle,
        first: EntityHandle,
    ) {
        let mut referrer = parent;
        let mut current = first;
        for _ in 0..table.capacity() {
            if current.is_null() {
                return;
            }
            let Some(row) = lookup.row_of(current) else {
                self.broken(referrer, current);
                return;
            };
            let Some(child) = table.get_mut::<Transform>(row) else {
                self.broken(referrer, current);
                return;
            };
            child.dirty = 1;
            referrer = current;
            current = child.sibling;
        }
    }

    fn broken(&mut self, entity: EntityHandle, link: EntityHandle) {
        self.stats.broken_links += 1;
        let _ = StoreError::BrokenHierarchy { entity, link }.logged();
    }
}

/// Reads the transform owned by `entity`.
pub(crate) fn load<L: RowLookup>(
    table: &RowTable,
    lookup: &L,
    entity: EntityHandle,
) -> Option<Transform> {
    table.read::<Transform>(lookup.row_of(entity)?)
}

/// Cached world of `node`'s parent; identity for a root or a dangling link.
fn cached_parent_world<L: RowLookup>(table: &RowTable, lookup: &L, node: &Transform) -> Mat4 {
    if node.parent.is_null() {
        return Mat4::IDENTITY;
    }
    load(table, lookup, node.parent).map_or(Mat4::IDENTITY, |parent| parent.world_matrix())
}
