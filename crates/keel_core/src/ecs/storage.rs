//! # Row Storage
//!
//! Pre-allocated, packed row storage for a single component kind.
//!
//! A [`RowTable`] is one contiguous byte buffer of `capacity` rows. Every row
//! starts with the owning [`EntityHandle`] followed by the component payload:
//!
//! ```text
//! | owner (12B) | pad (4B) | payload (record_size, padded to 8B) |
//! ```
//!
//! - Allocation is O(1): recycled rows come off a free stack, fresh rows are
//!   bump-allocated from the high-water mark
//! - A row whose owner is null is a tombstone; iteration skips it by reading
//!   the owner field, never the free stack
//! - Nothing grows after construction, so row indices stay stable

use bytemuck::Pod;

use super::entity::EntityHandle;
use crate::error::{StoreError, StoreResult};

/// Bytes reserved at the front of every row for the owner handle.
const HEADER_BYTES: usize = 16;

/// Bytes occupied by the owner handle itself.
const HANDLE_BYTES: usize = std::mem::size_of::<EntityHandle>();

/// Row start alignment. Payloads of types aligned up to this are borrowable.
const ROW_ALIGN: usize = std::mem::align_of::<u64>();

/// Resolves an entity to the row it owns in some table.
pub trait RowLookup {
    /// Returns the row index owned by `entity`, if any.
    fn row_of(&self, entity: EntityHandle) -> Option<usize>;
}

/// Fixed-capacity packed storage for one component kind.
///
/// # Example
///
/// ```rust,ignore
/// let mut table = RowTable::new("position", 1024, 8);
/// let row = table.allocate(entity)?;
/// table.write(row, &Position { x: 1, y: 2 });
/// ```
pub struct RowTable {
    /// Kind name, used in diagnostics.
    name: String,
    /// Backing storage, `capacity * stride` bytes viewed as words for alignment.
    data: Box<[u64]>,
    /// Bytes per row, header included.
    stride: usize,
    /// Payload bytes per row.
    record_size: usize,
    /// Maximum number of rows.
    capacity: usize,
    /// One past the furthest row ever bump-allocated.
    high_water: usize,
    /// Recycled row indices, bounded by `capacity`.
    free: Vec<u32>,
}

impl RowTable {
    /// Creates a table of `capacity` rows with `record_size` payload bytes each.
    ///
    /// All memory is allocated here and zeroed.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds `u32::MAX`, or if the table would not fit
    /// in one allocation (see [`storage_bytes`](Self::storage_bytes)).
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize, record_size: usize) -> Self {
        assert!(
            u32::try_from(capacity).is_ok(),
            "Capacity cannot exceed u32::MAX"
        );
        let (Some(stride), Some(bytes)) =
            (row_stride(record_size), Self::storage_bytes(capacity, record_size))
        else {
            panic!("Table of {capacity} rows of {record_size} bytes does not fit in memory");
        };
        let words = bytes / ROW_ALIGN;

        Self {
            name: name.into(),
            data: vec![0u64; words].into_boxed_slice(),
            stride,
            record_size,
            capacity,
            high_water: 0,
            free: Vec::with_capacity(capacity),
        }
    }

    /// Returns the backing buffer size for `capacity` rows of `record_size`
    /// payload bytes, or `None` if it overflows or exceeds `isize::MAX`.
    #[must_use]
    pub fn storage_bytes(capacity: usize, record_size: usize) -> Option<usize> {
        row_stride(record_size)?
            .checked_mul(capacity)
            .filter(|&bytes| isize::try_from(bytes).is_ok())
    }

    /// Returns the kind name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the maximum number of rows.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the high-water mark: occupied rows plus holes below it.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.high_water
    }

    /// Returns the number of occupied rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.high_water - self.free.len()
    }

    /// Returns `true` if no row is occupied.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the payload size in bytes.
    #[inline]
    #[must_use]
    pub const fn record_size(&self) -> usize {
        self.record_size
    }

    /// Claims a row for `owner` and returns its index.
    ///
    /// The payload is zero-filled. O(1), no allocation.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidHandle`] if `owner` is null
    /// - [`StoreError::CapacityExceeded`] if every row is occupied
    pub fn allocate(&mut self, owner: EntityHandle) -> StoreResult<usize> {
        if owner.is_null() {
            return Err(StoreError::InvalidHandle(owner).logged());
        }

        let index = if let Some(index) = self.free.pop() {
            index as usize
        } else if self.high_water < self.capacity {
            self.high_water += 1;
            self.high_water - 1
        } else {
            return Err(StoreError::CapacityExceeded {
                table: self.name.clone(),
                capacity: self.capacity,
            }
            .logged());
        };

        let row = self.row_mut(index);
        row.fill(0);
        row[..HANDLE_BYTES].copy_from_slice(bytemuck::bytes_of(&owner));
        Ok(index)
    }

    /// Releases a row, turning it into a tombstone.
    ///
    /// Returns `false` without touching anything for a double free or for an
    /// index that was never allocated (the latter is logged).
    pub fn free(&mut self, index: usize) -> bool {
        if index >= self.high_water {
            let _ = StoreError::OutOfRangeIndex {
                index,
                bound: self.high_water,
            }
            .logged();
            return false;
        }
        if !self.is_occupied(index) {
            tracing::trace!(table = %self.name, index, "double free ignored");
            return false;
        }

        self.row_mut(index)[..HANDLE_BYTES].fill(0);
        // `index < high_water <= capacity <= u32::MAX`
        #[allow(clippy::cast_possible_truncation)]
        let slot = index as u32;
        self.free.push(slot);
        true
    }

    /// Returns the payload of an occupied row, `None` for a tombstone.
    ///
    /// An index at or past [`size`](Self::size) is a programming error: it
    /// asserts in debug builds and returns `None` in release builds.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&[u8]> {
        if !self.check_bound(index) || !self.is_occupied(index) {
            return None;
        }
        let start = index * self.stride + HEADER_BYTES;
        Some(&self.bytes()[start..start + self.record_size])
    }

    /// Mutable variant of [`at`](Self::at).
    pub fn at_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        if !self.check_bound(index) || !self.is_occupied(index) {
            return None;
        }
        let start = index * self.stride + HEADER_BYTES;
        let end = start + self.record_size;
        Some(&mut self.bytes_mut()[start..end])
    }

    /// Reads the owner field of a row, occupied or not.
    ///
    /// Returns null for indices past the capacity.
    #[inline]
    #[must_use]
    pub fn entity_at(&self, index: usize) -> EntityHandle {
        if index >= self.capacity {
            return EntityHandle::NULL;
        }
        let start = index * self.stride;
        bytemuck::pod_read_unaligned(&self.bytes()[start..start + HANDLE_BYTES])
    }

    /// Returns the first occupied row.
    #[must_use]
    pub fn first_index(&self) -> Option<usize> {
        (0..self.high_water).find(|&i| self.is_occupied(i))
    }

    /// Returns the next occupied row after `index`.
    #[must_use]
    pub fn next_index(&self, index: usize) -> Option<usize> {
        (index.saturating_add(1)..self.high_water).find(|&i| self.is_occupied(i))
    }

    /// Returns the closest occupied row before `index`.
    #[must_use]
    pub fn prev_index(&self, index: usize) -> Option<usize> {
        (0..index.min(self.high_water))
            .rev()
            .find(|&i| self.is_occupied(i))
    }

    /// Iterates over `(row, owner)` for every occupied row in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, EntityHandle)> + '_ {
        (0..self.high_water).filter_map(|i| {
            let owner = self.entity_at(i);
            (!owner.is_null()).then_some((i, owner))
        })
    }

    /// Finds the row owned by `owner` with a linear scan.
    #[must_use]
    pub fn find(&self, owner: EntityHandle) -> Option<usize> {
        if owner.is_null() {
            return None;
        }
        self.iter().find(|&(_, o)| o == owner).map(|(i, _)| i)
    }

    /// Copies the payload of an occupied row out as `T`.
    #[must_use]
    pub fn read<T: Pod>(&self, index: usize) -> Option<T> {
        if !self.fits::<T>() {
            return None;
        }
        self.at(index).map(bytemuck::pod_read_unaligned)
    }

    /// Overwrites the payload of an occupied row with `value`.
    ///
    /// Returns `false` for a tombstone or a size mismatch.
    pub fn write<T: Pod>(&mut self, index: usize, value: &T) -> bool {
        if !self.fits::<T>() {
            return false;
        }
        match self.at_mut(index) {
            Some(payload) => {
                payload.copy_from_slice(bytemuck::bytes_of(value));
                true
            }
            None => false,
        }
    }

    /// Borrows the payload of an occupied row as `T`.
    ///
    /// Fails for types aligned past 8 bytes.
    #[must_use]
    pub fn get<T: Pod>(&self, index: usize) -> Option<&T> {
        if !self.fits::<T>() {
            return None;
        }
        bytemuck::try_from_bytes(self.at(index)?).ok()
    }

    /// Mutably borrows the payload of an occupied row as `T`.
    pub fn get_mut<T: Pod>(&mut self, index: usize) -> Option<&mut T> {
        if !self.fits::<T>() {
            return None;
        }
        bytemuck::try_from_bytes_mut(self.at_mut(index)?).ok()
    }

    /// Releases every row and zeroes the storage.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.free.clear();
        self.high_water = 0;
    }

    // -- Internal helpers ---------------------------------------------------

    #[inline]
    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.data)
    }

    #[inline]
    fn row_mut(&mut self, index: usize) -> &mut [u8] {
        let start = index * self.stride;
        let end = start + self.stride;
        &mut self.bytes_mut()[start..end]
    }

    #[inline]
    fn is_occupied(&self, index: usize) -> bool {
        !self.entity_at(index).is_null()
    }

    fn check_bound(&self, index: usize) -> bool {
        debug_assert!(
            index < self.high_water,
            "row {index} out of range in {} (size {})",
            self.name,
            self.high_water
        );
        if index < self.high_water {
            return true;
        }
        let _ = StoreError::OutOfRangeIndex {
            index,
            bound: self.high_water,
        }
        .logged();
        false
    }

    fn fits<T: Pod>(&self) -> bool {
        let actual = std::mem::size_of::<T>();
        if actual == self.record_size {
            return true;
        }
        let _ = StoreError::RecordSizeMismatch {
            kind: self.name.clone(),
            expected: self.record_size,
            actual,
        }
        .logged();
        false
    }
}

/// Bytes per row: header plus payload rounded up to [`ROW_ALIGN`].
fn row_stride(record_size: usize) -> Option<usize> {
    let payload = record_size.checked_add(ROW_ALIGN - 1)? & !(ROW_ALIGN - 1);
    HEADER_BYTES.checked_add(payload)
}

impl RowLookup for RowTable {
    fn row_of(&self, entity: EntityHandle) -> Option<usize> {
        self.find(entity)
    }
}
