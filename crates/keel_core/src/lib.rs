//! # Keel Core
//!
//! Fixed-capacity entity/component storage kernel:
//! - Generational entity handles that detect use-after-destroy
//! - Per-kind row tables of packed, byte-addressed records
//! - Role groups with per-role capacity limits
//! - Transform hierarchies with incremental world-matrix propagation
//!
//! ## Architecture Rules
//!
//! 1. **Capacity is decided up front** - A [`StoreManifest`] sizes every table
//! 2. **No references into storage** - Records link to each other by handle
//! 3. **Stale handles fail closed** - Lookups return nothing, mutations error
//!
//! ## Example
//!
//! ```rust,ignore
//! use keel_core::{Store, StoreManifest, Transform};
//! use glam::Vec3;
//!
//! let manifest = StoreManifest::new(4096).with_component::<Transform>(1024);
//! let mut store = Store::new(&manifest)?;
//!
//! let root = store.create_entity(0)?;
//! let arm = store.create_entity(0)?;
//! store.insert(root, Transform::from_translation(Vec3::X))?;
//! store.insert(arm, Transform::from_translation(Vec3::Y))?;
//! store.attach(arm, root)?;
//!
//! let world = store.update_transform(arm)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod scene;

pub use config::{ComponentManifest, GroupManifest, StoreManifest};
pub use ecs::{Component, EntityGroup, EntityHandle, EntityStore, RowLookup, RowTable, Store};
pub use error::{StoreError, StoreResult};
pub use scene::{PropagationStats, Transform, TransformPropagator};
