//! # Entity Storage
//!
//! The storage kernel: entity handles, per-kind row tables, role groups and
//! the store that owns them all.
//!
//! ## Design Philosophy
//!
//! - All storage is pre-allocated when the store is built
//! - Component rows are packed bytes, recycled through free stacks
//! - Entity handles are indices with generation counters
//! - Nothing holds a reference into a table; everything links by handle

mod component;
mod entity;
mod group;
mod storage;
mod store;

pub use component::Component;
pub use entity::{EntityHandle, EntityStore};
pub use group::EntityGroup;
pub use storage::{RowLookup, RowTable};
pub use store::Store;
