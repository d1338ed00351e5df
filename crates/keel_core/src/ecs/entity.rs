//! # Entity Management
//!
//! Entities are lightweight handles consisting of:
//! - An index into the generation table
//! - A generation counter for safe reuse
//! - A context tag naming the world that minted the handle

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::error::{StoreError, StoreResult};

/// Handle to an entity.
///
/// The all-zero value is [`EntityHandle::NULL`] and is never issued, since
/// live generations start at 1. The layout is fixed (`repr(C)`, 12 bytes)
/// because handles are written verbatim into row table records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct EntityHandle {
    index: u32,
    generation: u32,
    context: u32,
}

impl EntityHandle {
    /// The reserved null handle.
    pub const NULL: Self = Self {
        index: 0,
        generation: 0,
        context: 0,
    };

    /// Creates a handle from its raw parts.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32, context: u32) -> Self {
        Self {
            index,
            generation,
            context,
        }
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation the handle was minted with.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Returns the context tag.
    #[inline]
    #[must_use]
    pub const fn context(self) -> u32 {
        self.context
    }

    /// Checks if this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == 0 && self.generation == 0 && self.context == 0
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("null");
        }
        write!(f, "{}v{}", self.index, self.generation)?;
        if self.context != 0 {
            write!(f, "@{}", self.context)?;
        }
        Ok(())
    }
}

/// Entity lifecycle manager.
///
/// Owns one generation counter and one liveness bit per slot ever handed
/// out, plus a stack of retired indices. Slots are appended on demand up to a fixed ceiling; the
/// backing vectors are reserved at construction so no allocation happens
/// while the simulation runs.
pub struct EntityStore {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: Vec<u32>,
    max_entities: u32,
}

impl EntityStore {
    /// Creates an empty store that can hold up to `max_entities` live slots.
    #[must_use]
    pub fn new(max_entities: u32) -> Self {
        Self {
            generations: Vec::with_capacity(max_entities as usize),
            alive: Vec::with_capacity(max_entities as usize),
            free: Vec::with_capacity(max_entities as usize),
            max_entities,
        }
    }

    /// Mints a new handle tagged with `context`.
    ///
    /// Recycles the most recently retired index when one exists.
    ///
    /// # Errors
    ///
    /// [`StoreError::CapacityExceeded`] once every slot below the ceiling is
    /// live.
    pub fn create(&mut self, context: u32) -> StoreResult<EntityHandle> {
        if let Some(index) = self.free.pop() {
            let generation = self.generations[index as usize];
            self.alive[index as usize] = true;
            return Ok(EntityHandle::new(index, generation, context));
        }

        let next = self.generations.len();
        if next >= self.max_entities as usize {
            return Err(StoreError::CapacityExceeded {
                table: "entities".into(),
                capacity: self.max_entities as usize,
            }
            .logged());
        }

        self.generations.push(1);
        self.alive.push(true);
        // `next < max_entities <= u32::MAX`
        #[allow(clippy::cast_possible_truncation)]
        let index = next as u32;
        Ok(EntityHandle::new(index, 1, context))
    }

    /// Retires a handle, invalidating it and every copy of it.
    ///
    /// Returns `false` for the null handle (silently) and for stale or
    /// out-of-range handles (logged).
    pub fn destroy(&mut self, handle: EntityHandle) -> bool {
        if handle.is_null() {
            return false;
        }
        if !self.is_valid(handle) {
            let _ = StoreError::InvalidHandle(handle).logged();
            return false;
        }

        let slot = &mut self.generations[handle.index() as usize];
        *slot = slot.wrapping_add(1);
        if *slot == 0 {
            // Zero is reserved so a recycled slot can never mint the null handle.
            *slot = 1;
        }
        self.alive[handle.index() as usize] = false;
        self.free.push(handle.index());
        true
    }

    /// Checks whether `handle` still refers to a live entity.
    #[inline]
    #[must_use]
    pub fn is_valid(&self, handle: EntityHandle) -> bool {
        let index = handle.index() as usize;
        !handle.is_null()
            && self.alive.get(index).copied().unwrap_or(false)
            && self.generations[index] == handle.generation()
    }

    /// Returns the current generation recorded for `index`, if the slot exists.
    #[inline]
    #[must_use]
    pub fn generation_of(&self, index: u32) -> Option<u32> {
        self.generations.get(index as usize).copied()
    }

    /// Returns the number of live entities.
    #[inline]
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.generations.len() - self.free.len()
    }

    /// Returns the number of slots ever handed out.
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.generations.len()
    }

    /// Returns the slot ceiling.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.max_entities
    }

    /// Iterates over the live slots as handles tagged with `context`.
    ///
    /// Context tags are not stored per slot, so the caller supplies the one
    /// it minted with.
    pub fn iter_alive(&self, context: u32) -> impl Iterator<Item = EntityHandle> + '_ {
        self.generations
            .iter()
            .zip(&self.alive)
            .zip(0u32..)
            .filter(|((_, alive), _)| **alive)
            .map(move |((&generation, _), index)| EntityHandle::new(index, generation, context))
    }
}
