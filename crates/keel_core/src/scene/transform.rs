//! # Transform Records
//!
//! A transform is a node in an intrusive tree. Links are entity handles
//! resolved through the transform row table, never references:
//!
//! ```text
//!        parent
//!          |
//!        child --sibling--> sibling --sibling--> null
//!          |
//!        child ...
//! ```
//!
//! Only the first child is stored on a node; the rest hang off it through
//! `sibling`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

use crate::ecs::{Component, EntityHandle};

/// Transform component: local TRS inputs, cached world outputs and tree links.
///
/// Stored as plain arrays so the record is `Pod` with 4-byte alignment and
/// can be borrowed straight out of a row.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Transform {
    /// Local translation relative to the parent.
    pub translation: [f32; 3],
    /// Local scale.
    pub scale: [f32; 3],
    /// Local rotation quaternion, `[x, y, z, w]`.
    pub rotation: [f32; 4],
    /// Cached world matrix, column-major.
    pub world: [f32; 16],
    /// Cached world translation decomposed from `world`.
    pub world_translation: [f32; 3],
    /// Cached world scale decomposed from `world`.
    pub world_scale: [f32; 3],
    /// Cached world rotation decomposed from `world`, `[x, y, z, w]`.
    pub world_rotation: [f32; 4],
    /// Parent entity, null for a root.
    pub parent: EntityHandle,
    /// First child entity.
    pub child: EntityHandle,
    /// Next sibling entity.
    pub sibling: EntityHandle,
    /// Non-zero when the local inputs changed since the last propagation.
    pub dirty: u32,
}

impl Component for Transform {
    const NAME: &'static str = "transform";
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// Unlinked identity transform, already marked dirty.
    pub const IDENTITY: Self = Self {
        translation: [0.0; 3],
        scale: [1.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
        world: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
        world_translation: [0.0; 3],
        world_scale: [1.0; 3],
        world_rotation: [0.0, 0.0, 0.0, 1.0],
        parent: EntityHandle::NULL,
        child: EntityHandle::NULL,
        sibling: EntityHandle::NULL,
        dirty: 1,
    };

    /// Creates an unlinked, dirty transform from local TRS values.
    #[must_use]
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation: translation.to_array(),
            scale: scale.to_array(),
            rotation: rotation.to_array(),
            ..Self::IDENTITY
        }
    }

    /// Creates an unlinked, dirty transform with only a translation.
    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self::from_trs(translation, Quat::IDENTITY, Vec3::ONE)
    }

    /// Replaces the local TRS values and marks the node dirty.
    pub fn set_local(&mut self, translation: Vec3, rotation: Quat, scale: Vec3) {
        self.translation = translation.to_array();
        self.rotation = rotation.to_array();
        self.scale = scale.to_array();
        self.dirty = 1;
    }

    /// Returns `true` if the cached world values are stale.
    #[inline]
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty != 0
    }

    /// Composes the local matrix from translation, rotation and scale.
    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::from_array(self.scale),
            Quat::from_array(self.rotation),
            Vec3::from_array(self.translation),
        )
    }

    /// Returns the cached world matrix.
    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_cols_array(&self.world)
    }

    /// Returns the cached world translation.
    #[inline]
    #[must_use]
    pub fn world_translation(&self) -> Vec3 {
        Vec3::from_array(self.world_translation)
    }

    /// Returns the cached world rotation.
    #[inline]
    #[must_use]
    pub fn world_rotation(&self) -> Quat {
        Quat::from_array(self.world_rotation)
    }

    /// Returns the cached world scale.
    #[inline]
    #[must_use]
    pub fn world_scale(&self) -> Vec3 {
        Vec3::from_array(self.world_scale)
    }

    /// Stores a freshly computed world matrix, refreshes the decomposed
    /// caches and clears the dirty flag.
    pub(crate) fn store_world(&mut self, world: Mat4) {
        let (scale, rotation, translation) = world.to_scale_rotation_translation();
        self.world = world.to_cols_array();
        self.world_translation = translation.to_array();
        self.world_rotation = rotation.to_array();
        self.world_scale = scale.to_array();
        self.dirty = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        // 36 floats, 3 handles, 1 flag, no padding
        assert_eq!(std::mem::size_of::<Transform>(), 36 * 4 + 3 * 12 + 4);
        assert_eq!(std::mem::align_of::<Transform>(), 4);
    }

    #[test]
    fn test_identity() {
        let t = Transform::default();
        assert!(t.is_dirty());
        assert_eq!(t.local_matrix(), Mat4::IDENTITY);
        assert_eq!(t.world_matrix(), Mat4::IDENTITY);
        assert!(t.parent.is_null() && t.child.is_null() && t.sibling.is_null());
    }

    #[test]
    fn test_store_world_decomposes() {
        let mut t = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let world = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(4.0, 5.0, 6.0),
        );
        t.store_world(world);

        assert!(!t.is_dirty());
        assert!(t.world_translation().abs_diff_eq(Vec3::new(4.0, 5.0, 6.0), 1e-5));
        assert!(t.world_scale().abs_diff_eq(Vec3::splat(2.0), 1e-5));
        assert!(t
            .world_rotation()
            .abs_diff_eq(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2), 1e-5));
    }

    #[test]
    fn test_set_local_marks_dirty() {
        let mut t = Transform::default();
        t.store_world(Mat4::IDENTITY);
        t.set_local(Vec3::X, Quat::IDENTITY, Vec3::ONE);
        assert!(t.is_dirty());
        assert_eq!(t.local_matrix(), Mat4::from_translation(Vec3::X));
    }
}
