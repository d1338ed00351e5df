//! # Role Groups
//!
//! A group partitions one flat array of entity handles into fixed-capacity
//! regions called roles ("front row", "reserve", ...). Each role keeps its
//! occupied entries packed at the front of its region:
//!
//! ```text
//! role:    0        1              2
//! slots: [a b] [c d _ _ _] [e]
//!         ^base  ^base(1)   ^base(2)
//! ```
//!
//! Region bounds are computed from `(base, count)` pairs and never move after
//! construction.

use super::entity::EntityHandle;
use crate::error::{StoreError, StoreResult};

/// Start and occupancy of one role region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct RoleRange {
    base: u32,
    count: u32,
}

/// Role-partitioned table of entity handles.
#[derive(Debug)]
pub struct EntityGroup {
    name: String,
    ranges: Box<[RoleRange]>,
    slots: Box<[EntityHandle]>,
}

impl EntityGroup {
    /// Creates a group with one role per entry of `role_limits`.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidManifest`] if the limits sum past `u32::MAX`.
    pub fn new(name: impl Into<String>, role_limits: &[u32]) -> StoreResult<Self> {
        let name = name.into();
        let mut ranges = Vec::with_capacity(role_limits.len());
        let mut total: u32 = 0;
        for &limit in role_limits {
            ranges.push(RoleRange {
                base: total,
                count: 0,
            });
            total = total.checked_add(limit).ok_or_else(|| {
                StoreError::InvalidManifest(format!("group {name}: role limits overflow u32"))
                    .logged()
            })?;
        }

        Ok(Self {
            name,
            ranges: ranges.into_boxed_slice(),
            slots: vec![EntityHandle::NULL; total as usize].into_boxed_slice(),
        })
    }

    /// Returns the group name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of roles.
    #[inline]
    #[must_use]
    pub fn role_count(&self) -> u32 {
        // built from a slice whose sum fits in u32
        #[allow(clippy::cast_possible_truncation)]
        let count = self.ranges.len() as u32;
        count
    }

    /// Returns the fixed capacity of `role`, 0 for an unknown role.
    #[must_use]
    pub fn capacity_of(&self, role: u32) -> u32 {
        let Some(range) = self.ranges.get(role as usize) else {
            return 0;
        };
        let end = self
            .ranges
            .get(role as usize + 1)
            .map_or(self.slots.len(), |next| next.base as usize);
        // region bounds come from a u32 sum
        #[allow(clippy::cast_possible_truncation)]
        let capacity = (end - range.base as usize) as u32;
        capacity
    }

    /// Returns the number of occupied slots in `role`, 0 for an unknown role.
    #[inline]
    #[must_use]
    pub fn count_of(&self, role: u32) -> u32 {
        self.ranges.get(role as usize).map_or(0, |range| range.count)
    }

    /// Returns `true` if `role` has no free slot left.
    #[inline]
    #[must_use]
    pub fn is_full(&self, role: u32) -> bool {
        self.count_of(role) == self.capacity_of(role)
    }

    /// Returns the occupied entries of `role` in slot order.
    #[must_use]
    pub fn entities_in_role(&self, role: u32) -> &[EntityHandle] {
        match self.ranges.get(role as usize) {
            Some(range) => {
                let base = range.base as usize;
                &self.slots[base..base + range.count as usize]
            }
            None => &[],
        }
    }

    /// Appends `entity` to the end of `role`. O(1).
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidHandle`] for the null handle
    /// - [`StoreError::UnknownRole`] for a role past [`role_count`](Self::role_count)
    /// - [`StoreError::CapacityExceeded`] if the role is full
    pub fn add_to_role(&mut self, entity: EntityHandle, role: u32) -> StoreResult<()> {
        let range = self.writable_range(entity, role)?;
        self.slots[(range.base + range.count) as usize] = entity;
        self.ranges[role as usize].count += 1;
        Ok(())
    }

    /// Inserts `entity` at the front of `role`, shifting the others back. O(count).
    ///
    /// # Errors
    ///
    /// Same as [`add_to_role`](Self::add_to_role).
    pub fn add_to_role_as_head(&mut self, entity: EntityHandle, role: u32) -> StoreResult<()> {
        let range = self.writable_range(entity, role)?;
        let base = range.base as usize;
        let count = range.count as usize;
        self.slots.copy_within(base..base + count, base + 1);
        self.slots[base] = entity;
        self.ranges[role as usize].count += 1;
        Ok(())
    }

    /// Removes the first occurrence of `entity` from `role`, keeping the
    /// remaining entries packed. O(count).
    ///
    /// Returns `false` if the entity is not in the role.
    pub fn remove_from_role(&mut self, entity: EntityHandle, role: u32) -> bool {
        let Some(range) = self.ranges.get(role as usize).copied() else {
            return false;
        };
        let base = range.base as usize;
        let count = range.count as usize;
        let Some(pos) = self.slots[base..base + count]
            .iter()
            .position(|&e| e == entity)
        else {
            return false;
        };

        self.slots.copy_within(base + pos + 1..base + count, base + pos);
        self.slots[base + count - 1] = EntityHandle::NULL;
        self.ranges[role as usize].count -= 1;
        true
    }

    /// Returns the entity at `slot` of `role`, null past the occupied count.
    #[must_use]
    pub fn entity_with_role_and_slot(&self, role: u32, slot: u32) -> EntityHandle {
        self.entities_in_role(role)
            .get(slot as usize)
            .copied()
            .unwrap_or(EntityHandle::NULL)
    }

    /// Writes `entity` at an explicit slot of `role`.
    ///
    /// Inside the occupied count this overwrites. Past it, the slot must be
    /// within capacity; skipped slots are back-filled with null and the count
    /// grows to `slot + 1`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownRole`] for a role past [`role_count`](Self::role_count)
    /// - [`StoreError::OutOfRangeIndex`] if `slot` is past the role capacity
    pub fn set_entity_at_role_and_slot(
        &mut self,
        entity: EntityHandle,
        role: u32,
        slot: u32,
    ) -> StoreResult<()> {
        let range = self.range(role)?;
        let base = range.base as usize;

        if slot >= range.count {
            let capacity = self.capacity_of(role);
            if slot >= capacity {
                return Err(StoreError::OutOfRangeIndex {
                    index: slot as usize,
                    bound: capacity as usize,
                }
                .logged());
            }
            self.slots[base + range.count as usize..base + slot as usize].fill(EntityHandle::NULL);
            self.ranges[role as usize].count = slot + 1;
        }

        self.slots[base + slot as usize] = entity;
        Ok(())
    }

    /// Nulls `slot` of `role` without compacting or changing the count.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownRole`] for a role past [`role_count`](Self::role_count)
    /// - [`StoreError::OutOfRangeIndex`] if `slot` is past the occupied count
    pub fn clear_entity_at_role_and_slot(&mut self, role: u32, slot: u32) -> StoreResult<()> {
        let range = self.range(role)?;
        if slot >= range.count {
            return Err(StoreError::OutOfRangeIndex {
                index: slot as usize,
                bound: range.count as usize,
            }
            .logged());
        }
        self.slots[(range.base + slot) as usize] = EntityHandle::NULL;
        Ok(())
    }

    /// Finds the first `(role, slot)` holding `entity`, scanning roles in order.
    #[must_use]
    pub fn find_entity_role_and_slot(&self, entity: EntityHandle) -> Option<(u32, u32)> {
        if entity.is_null() {
            return None;
        }
        (0..self.role_count()).find_map(|role| {
            self.entities_in_role(role)
                .iter()
                .zip(0u32..)
                .find_map(|(&e, slot)| (e == entity).then_some((role, slot)))
        })
    }

    /// Returns `true` if any role holds `entity`.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: EntityHandle) -> bool {
        self.find_entity_role_and_slot(entity).is_some()
    }

    /// Removes every occurrence of `entity` from every role.
    ///
    /// Returns how many entries were removed.
    pub fn remove_everywhere(&mut self, entity: EntityHandle) -> usize {
        let mut removed = 0;
        for role in 0..self.role_count() {
            while self.remove_from_role(entity, role) {
                removed += 1;
            }
        }
        removed
    }

    /// Empties every role. Region bounds and slot contents are left as-is.
    pub fn reset(&mut self) {
        for range in self.ranges.iter_mut() {
            range.count = 0;
        }
    }

    // -- Internal helpers ---------------------------------------------------

    fn range(&self, role: u32) -> StoreResult<RoleRange> {
        self.ranges.get(role as usize).copied().ok_or_else(|| {
            StoreError::UnknownRole {
                group: self.name.clone(),
                role,
            }
            .logged()
        })
    }

    fn writable_range(&self, entity: EntityHandle, role: u32) -> StoreResult<RoleRange> {
        if entity.is_null() {
            return Err(StoreError::InvalidHandle(entity).logged());
        }
        let range = self.range(role)?;
        let capacity = self.capacity_of(role);
        if range.count == capacity {
            return Err(StoreError::CapacityExceeded {
                table: format!("{} role {role}", self.name),
                capacity: capacity as usize,
            }
            .logged());
        }
        Ok(range)
    }
}
