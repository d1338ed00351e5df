//! # Store Error Types
//!
//! Every failure the storage kernel can report. None of them are fatal:
//! callers get the error back, and the kernel logs it once at the point
//! where it was raised.

use thiserror::Error;

use crate::ecs::EntityHandle;

/// Errors that can occur in the storage kernel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row table, group role or the entity store had no free capacity.
    #[error("{table} is full: capacity {capacity}")]
    CapacityExceeded {
        /// Name of the table that ran out of room.
        table: String,
        /// Its fixed capacity.
        capacity: usize,
    },

    /// A null or stale (generation-mismatched) handle was used.
    #[error("invalid entity handle {0}")]
    InvalidHandle(EntityHandle),

    /// The component kind is not part of the store manifest.
    #[error("unknown component kind: {0}")]
    UnknownComponentKind(String),

    /// The group id is not part of the store manifest.
    #[error("unknown group: {0}")]
    UnknownGroupId(String),

    /// A role index past the group's role count.
    #[error("group {group} has no role {role}")]
    UnknownRole {
        /// Name of the group.
        group: String,
        /// The requested role.
        role: u32,
    },

    /// A transform link points at an entity with no transform record.
    #[error("broken hierarchy at {entity}: link {link} has no transform")]
    BrokenHierarchy {
        /// The entity holding the dangling link.
        entity: EntityHandle,
        /// The dangling link.
        link: EntityHandle,
    },

    /// An index-based accessor was called past its bound.
    #[error("index {index} out of range (bound {bound})")]
    OutOfRangeIndex {
        /// The requested index.
        index: usize,
        /// The exclusive bound it violated.
        bound: usize,
    },

    /// Typed access with a type whose size does not match the record size.
    #[error("component {kind} stores {expected}-byte records, got a {actual}-byte type")]
    RecordSizeMismatch {
        /// Component kind name.
        kind: String,
        /// Record payload size the table was built with.
        expected: usize,
        /// Size of the requested type.
        actual: usize,
    },

    /// The configuration manifest could not be parsed or failed validation.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

impl StoreError {
    /// Logs the error at the level its class calls for and hands it back.
    ///
    /// Capacity pressure is expected control flow and only warns; everything
    /// else points at a logic or configuration bug.
    pub(crate) fn logged(self) -> Self {
        match &self {
            Self::CapacityExceeded { .. } => tracing::warn!(error = %self, "store capacity exceeded"),
            Self::InvalidHandle(_) | Self::OutOfRangeIndex { .. } => {
                tracing::error!(error = %self, "store access error");
            }
            Self::BrokenHierarchy { .. } => tracing::error!(error = %self, "transform hierarchy error"),
            Self::UnknownComponentKind(_)
            | Self::UnknownGroupId(_)
            | Self::UnknownRole { .. }
            | Self::RecordSizeMismatch { .. }
            | Self::InvalidManifest(_) => {
                tracing::error!(error = %self, "store configuration error");
            }
        }
        self
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
