//! # Scene Hierarchy
//!
//! Transform records linked into parent/child/sibling trees, and the
//! incremental propagation that keeps their cached world matrices current.
//!
//! ## Design Philosophy
//!
//! - Links are entity handles, resolved through the transform row table
//! - Dirtiness is stored per node and discovered while walking, never pushed
//!   eagerly through a subtree
//! - Only the topmost dirty ancestor's subtree is recomputed

pub mod hierarchy;
mod propagate;
mod transform;

pub use propagate::{PropagationStats, TransformPropagator};
pub use transform::Transform;
