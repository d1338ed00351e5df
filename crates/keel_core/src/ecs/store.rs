//! # Store
//!
//! The object applications hold. Owns the entity lifecycle manager, one row
//! table per component kind and one role group per group id, all sized from a
//! [`StoreManifest`] at construction.
//!
//! The store also remembers, per entity slot and kind, which row the entity
//! owns. That bookkeeping is what lets `destroy_entity` free every row and
//! lets component lookups run in O(1).

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

use super::component::Component;
use super::entity::{EntityHandle, EntityStore};
use super::group::EntityGroup;
use super::storage::{RowLookup, RowTable};
use crate::config::StoreManifest;
use crate::error::{StoreError, StoreResult};
use crate::scene::{hierarchy, PropagationStats, Transform, TransformPropagator};

/// Marks a `(slot, kind)` pair with no row.
const NO_ROW: u32 = u32::MAX;

/// Row bookkeeping for one kind, viewed as a [`RowLookup`].
struct KindRows<'a> {
    entities: &'a EntityStore,
    rows: &'a [u32],
    kind: usize,
    kind_count: usize,
}

impl RowLookup for KindRows<'_> {
    fn row_of(&self, entity: EntityHandle) -> Option<usize> {
        if !self.entities.is_valid(entity) {
            return None;
        }
        let row = *self
            .rows
            .get(entity.index() as usize * self.kind_count + self.kind)?;
        (row != NO_ROW).then_some(row as usize)
    }
}

/// Entity/component store.
///
/// # Example
///
/// ```rust,ignore
/// let manifest = StoreManifest::new(1024)
///     .with_component::<Transform>(512)
///     .with_group("party", &[4, 8]);
/// let mut store = Store::new(&manifest)?;
///
/// let hero = store.create_entity(0)?;
/// store.insert(hero, Transform::from_translation(Vec3::X))?;
/// store.group_mut("party")?.add_to_role(hero, 0)?;
/// ```
pub struct Store {
    entities: EntityStore,
    /// Kind name to index into `tables`.
    kinds: HashMap<String, usize>,
    tables: Vec<RowTable>,
    /// Row owned per `(entity slot, kind)`, `slot * tables.len() + kind`.
    rows: Vec<u32>,
    groups: HashMap<String, EntityGroup>,
    /// Index of the `transform` kind, if configured.
    transform_kind: Option<usize>,
    propagator: TransformPropagator,
}

impl Store {
    /// Builds a store from a manifest, pre-allocating every table.
    ///
    /// Component kinds with zero capacity are skipped with a warning, so
    /// their first use reports [`StoreError::UnknownComponentKind`].
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidManifest`] if the manifest fails validation
    /// - [`StoreError::RecordSizeMismatch`] if a `transform` kind is declared
    ///   with a record size other than [`Transform`]'s
    pub fn new(manifest: &StoreManifest) -> StoreResult<Self> {
        manifest.validate()?;

        let mut kinds = HashMap::with_capacity(manifest.components.len());
        let mut tables = Vec::with_capacity(manifest.components.len());
        for component in &manifest.components {
            if component.capacity == 0 {
                tracing::warn!(kind = %component.name, "component kind has zero capacity, skipped");
                continue;
            }
            kinds.insert(component.name.clone(), tables.len());
            tables.push(RowTable::new(
                component.name.clone(),
                component.capacity as usize,
                component.record_size as usize,
            ));
        }

        let transform_kind = kinds.get(Transform::NAME).copied();
        if let Some(kind) = transform_kind {
            let actual = tables[kind].record_size();
            if actual != Transform::record_size() {
                return Err(StoreError::RecordSizeMismatch {
                    kind: Transform::NAME.into(),
                    expected: Transform::record_size(),
                    actual,
                }
                .logged());
            }
        }

        let mut groups = HashMap::with_capacity(manifest.groups.len());
        for group in &manifest.groups {
            groups.insert(
                group.name.clone(),
                EntityGroup::new(group.name.clone(), &group.role_limits)?,
            );
        }

        let rows = Vec::with_capacity(manifest.max_entities as usize * tables.len());

        tracing::debug!(
            max_entities = manifest.max_entities,
            kinds = tables.len(),
            groups = groups.len(),
            "store created"
        );

        Ok(Self {
            entities: EntityStore::new(manifest.max_entities),
            kinds,
            tables,
            rows,
            groups,
            transform_kind,
            propagator: TransformPropagator::new(),
        })
    }

    // -- Entity lifecycle ---------------------------------------------------

    /// Mints a new entity tagged with `context`.
    ///
    /// # Errors
    ///
    /// [`StoreError::CapacityExceeded`] at the manifest's entity ceiling.
    pub fn create_entity(&mut self, context: u32) -> StoreResult<EntityHandle> {
        let handle = self.entities.create(context)?;
        let needed = (handle.index() as usize + 1) * self.tables.len();
        if self.rows.len() < needed {
            self.rows.resize(needed, NO_ROW);
        }
        Ok(handle)
    }

    /// Destroys an entity: pulls it out of its transform hierarchy, frees
    /// every row it owns, drops it from every group, then retires the handle.
    /// Its transform children become dirty roots.
    ///
    /// The null handle is a no-op.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidHandle`] for a stale handle.
    pub fn destroy_entity(&mut self, handle: EntityHandle) -> StoreResult<()> {
        if handle.is_null() {
            return Ok(());
        }
        self.check_alive(handle)?;
        self.unlink_transform(handle);

        // rows go first, while `entity_at(row) == handle` still holds
        let base = handle.index() as usize * self.tables.len();
        for (kind, table) in self.tables.iter_mut().enumerate() {
            let row = std::mem::replace(&mut self.rows[base + kind], NO_ROW);
            if row != NO_ROW {
                debug_assert_eq!(table.entity_at(row as usize), handle);
                table.free(row as usize);
            }
        }
        for group in self.groups.values_mut() {
            group.remove_everywhere(handle);
        }

        self.entities.destroy(handle);
        Ok(())
    }

    /// Checks whether `handle` refers to a live entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        self.entities.is_valid(handle)
    }

    /// Returns the number of live entities.
    #[inline]
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Returns the entity lifecycle manager.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    // -- Components ---------------------------------------------------------

    /// Attaches a zero-filled `kind` row to `handle` and returns its index.
    ///
    /// If the entity already owns a row of this kind, that row is returned.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidHandle`] for a null or stale handle
    /// - [`StoreError::UnknownComponentKind`] if `kind` is not configured
    /// - [`StoreError::CapacityExceeded`] if the kind's table is full
    pub fn add_component(&mut self, handle: EntityHandle, kind: &str) -> StoreResult<usize> {
        self.check_alive(handle)?;
        let kind_index = self.kind_index(kind)?;

        let slot = self.row_slot(handle, kind_index);
        if self.rows[slot] != NO_ROW {
            tracing::debug!(entity = %handle, kind, "component already attached");
            return Ok(self.rows[slot] as usize);
        }

        let row = self.tables[kind_index].allocate(handle)?;
        // row < capacity <= u32::MAX
        #[allow(clippy::cast_possible_truncation)]
        let stored = row as u32;
        self.rows[slot] = stored;
        Ok(row)
    }

    /// Detaches the `kind` row from `handle`.
    ///
    /// Returns `false` if the entity did not own one.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidHandle`] for a null or stale handle
    /// - [`StoreError::UnknownComponentKind`] if `kind` is not configured
    pub fn remove_component(&mut self, handle: EntityHandle, kind: &str) -> StoreResult<bool> {
        self.check_alive(handle)?;
        let kind_index = self.kind_index(kind)?;
        if self.transform_kind == Some(kind_index) {
            self.unlink_transform(handle);
        }

        let slot = self.row_slot(handle, kind_index);
        let row = std::mem::replace(&mut self.rows[slot], NO_ROW);
        if row == NO_ROW {
            return Ok(false);
        }
        Ok(self.tables[kind_index].free(row as usize))
    }

    /// Returns the row `handle` owns in `kind`, if any.
    #[must_use]
    pub fn row_of(&self, handle: EntityHandle, kind: &str) -> Option<usize> {
        let kind = *self.kinds.get(kind)?;
        self.lookup(kind).row_of(handle)
    }

    /// Returns `true` if `handle` owns a `kind` row.
    #[inline]
    #[must_use]
    pub fn has_component(&self, handle: EntityHandle, kind: &str) -> bool {
        self.row_of(handle, kind).is_some()
    }

    /// Returns the payload bytes of `handle`'s `kind` row.
    ///
    /// The borrow ends before any further mutation of the store, so a row can
    /// never be read after it was recycled.
    #[must_use]
    pub fn component(&self, handle: EntityHandle, kind: &str) -> Option<&[u8]> {
        let kind_index = self.resolve(handle, kind)?;
        let row = self.lookup(kind_index).row_of(handle)?;
        self.tables[kind_index].at(row)
    }

    /// Mutable variant of [`component`](Self::component).
    pub fn component_mut(&mut self, handle: EntityHandle, kind: &str) -> Option<&mut [u8]> {
        let kind_index = self.resolve(handle, kind)?;
        let row = self.lookup(kind_index).row_of(handle)?;
        self.tables[kind_index].at_mut(row)
    }

    /// Attaches `T` to `handle` (or reuses its row) and writes `value`.
    ///
    /// # Errors
    ///
    /// Those of [`add_component`](Self::add_component), plus
    /// [`StoreError::RecordSizeMismatch`] if the kind was configured with a
    /// different record size.
    pub fn insert<T: Component>(&mut self, handle: EntityHandle, value: T) -> StoreResult<usize> {
        let kind_index = self.kind_index(T::NAME)?;
        let expected = self.tables[kind_index].record_size();
        if expected != T::record_size() {
            return Err(StoreError::RecordSizeMismatch {
                kind: T::NAME.into(),
                expected,
                actual: T::record_size(),
            }
            .logged());
        }

        let row = self.add_component(handle, T::NAME)?;
        self.tables[kind_index].write(row, &value);
        Ok(row)
    }

    /// Borrows `handle`'s `T` component.
    #[must_use]
    pub fn get<T: Component>(&self, handle: EntityHandle) -> Option<&T> {
        let kind_index = self.resolve(handle, T::NAME)?;
        let row = self.lookup(kind_index).row_of(handle)?;
        self.tables[kind_index].get(row)
    }

    /// Mutably borrows `handle`'s `T` component.
    pub fn get_mut<T: Component>(&mut self, handle: EntityHandle) -> Option<&mut T> {
        let kind_index = self.resolve(handle, T::NAME)?;
        let row = self.lookup(kind_index).row_of(handle)?;
        self.tables[kind_index].get_mut(row)
    }

    /// Returns `true` if `handle` owns a `T` component.
    #[inline]
    #[must_use]
    pub fn has<T: Component>(&self, handle: EntityHandle) -> bool {
        self.has_component(handle, T::NAME)
    }

    /// Detaches `handle`'s `T` component.
    ///
    /// # Errors
    ///
    /// Those of [`remove_component`](Self::remove_component).
    pub fn remove<T: Component>(&mut self, handle: EntityHandle) -> StoreResult<bool> {
        self.remove_component(handle, T::NAME)
    }

    /// Returns the row table of `kind` for read-only iteration.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownComponentKind`] if `kind` is not configured.
    pub fn table(&self, kind: &str) -> StoreResult<&RowTable> {
        Ok(&self.tables[self.kind_index(kind)?])
    }

    /// Iterates over the configured component kind names.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(RowTable::name)
    }

    // -- Groups -------------------------------------------------------------

    /// Returns the group named `name`.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownGroupId`] if no such group is configured.
    pub fn group(&self, name: &str) -> StoreResult<&EntityGroup> {
        self.groups
            .get(name)
            .ok_or_else(|| StoreError::UnknownGroupId(name.into()).logged())
    }

    /// Mutable variant of [`group`](Self::group).
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownGroupId`] if no such group is configured.
    pub fn group_mut(&mut self, name: &str) -> StoreResult<&mut EntityGroup> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownGroupId(name.into()).logged())
    }

    /// Appends a live entity to `role` of group `name`.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidHandle`] for a dead entity, otherwise those of
    /// [`group_mut`](Self::group_mut) and [`EntityGroup::add_to_role`].
    pub fn add_to_group(&mut self, name: &str, handle: EntityHandle, role: u32) -> StoreResult<()> {
        self.check_alive(handle)?;
        self.group_mut(name)?.add_to_role(handle, role)
    }

    // -- Transforms ---------------------------------------------------------

    /// Brings `handle`'s world matrix up to date and returns it.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownComponentKind`] if no `transform` kind is configured
    /// - [`StoreError::InvalidHandle`] if `handle` is dead or has no transform
    pub fn update_transform(&mut self, handle: EntityHandle) -> StoreResult<Mat4> {
        let (table, lookup, propagator) = self.transform_parts()?;
        propagator
            .update(table, &lookup, handle)
            .ok_or_else(|| StoreError::InvalidHandle(handle).logged())
    }

    /// Recomputes every dirty transform subtree. Returns the number of nodes
    /// recomputed; 0 when no `transform` kind is configured.
    pub fn update_all_transforms(&mut self) -> usize {
        if self.transform_kind.is_none() {
            return 0;
        }
        match self.transform_parts() {
            Ok((table, lookup, propagator)) => propagator.update_all(table, &lookup),
            Err(_) => 0,
        }
    }

    /// Makes `child` the first child of `parent`.
    ///
    /// # Errors
    ///
    /// See [`hierarchy::attach`].
    pub fn attach(&mut self, child: EntityHandle, parent: EntityHandle) -> StoreResult<()> {
        let (table, lookup, _) = self.transform_parts()?;
        hierarchy::attach(table, &lookup, child, parent)
    }

    /// Detaches `child` from its parent.
    ///
    /// # Errors
    ///
    /// See [`hierarchy::detach`].
    pub fn detach(&mut self, child: EntityHandle) -> StoreResult<()> {
        let (table, lookup, _) = self.transform_parts()?;
        hierarchy::detach(table, &lookup, child)
    }

    /// Replaces `handle`'s local transform and marks it dirty.
    ///
    /// # Errors
    ///
    /// See [`hierarchy::set_local`].
    pub fn set_local(
        &mut self,
        handle: EntityHandle,
        translation: Vec3,
        rotation: Quat,
        scale: Vec3,
    ) -> StoreResult<()> {
        let (table, lookup, _) = self.transform_parts()?;
        hierarchy::set_local(table, &lookup, handle, translation, rotation, scale)
    }

    /// Returns the propagation counters.
    #[inline]
    #[must_use]
    pub const fn transform_stats(&self) -> PropagationStats {
        self.propagator.stats()
    }

    // -- Internal helpers ---------------------------------------------------

    fn check_alive(&self, handle: EntityHandle) -> StoreResult<()> {
        if self.entities.is_valid(handle) {
            Ok(())
        } else {
            Err(StoreError::InvalidHandle(handle).logged())
        }
    }

    fn kind_index(&self, kind: &str) -> StoreResult<usize> {
        self.kinds
            .get(kind)
            .copied()
            .ok_or_else(|| StoreError::UnknownComponentKind(kind.into()).logged())
    }

    /// Resolves `kind` for a lookup, logging misuse and failing closed.
    fn resolve(&self, handle: EntityHandle, kind: &str) -> Option<usize> {
        self.check_alive(handle).ok()?;
        self.kind_index(kind).ok()
    }

    #[inline]
    fn row_slot(&self, handle: EntityHandle, kind: usize) -> usize {
        handle.index() as usize * self.tables.len() + kind
    }

    fn lookup(&self, kind: usize) -> KindRows<'_> {
        KindRows {
            entities: &self.entities,
            rows: &self.rows,
            kind,
            kind_count: self.tables.len(),
        }
    }

    /// Pulls `handle` out of its transform hierarchy before its row goes away.
    fn unlink_transform(&mut self, handle: EntityHandle) {
        let Some(kind) = self.transform_kind else {
            return;
        };
        if self.lookup(kind).row_of(handle).is_none() {
            return;
        }
        if let Ok((table, lookup, _)) = self.transform_parts() {
            // the row exists, so this cannot fail
            let _ = hierarchy::isolate(table, &lookup, handle);
        }
    }

    fn transform_parts(
        &mut self,
    ) -> StoreResult<(&mut RowTable, KindRows<'_>, &mut TransformPropagator)> {
        let kind = self
            .transform_kind
            .ok_or_else(|| StoreError::UnknownComponentKind(Transform::NAME.into()).logged())?;
        let kind_count = self.tables.len();
        let lookup = KindRows {
            entities: &self.entities,
            rows: &self.rows,
            kind,
            kind_count,
        };
        Ok((&mut self.tables[kind], lookup, &mut self.propagator))
    }
}
