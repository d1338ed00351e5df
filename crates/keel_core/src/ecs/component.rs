//! # Component Kinds
//!
//! Components are pure data stored as raw bytes in a [`RowTable`].
//! A Rust type opts into typed access by implementing [`Component`], which
//! binds it to the kind name used in the store manifest.
//!
//! [`RowTable`]: super::RowTable

use bytemuck::Pod;

/// Marker trait for typed component payloads.
///
/// Components must be:
/// - `Pod`: plain old data, read and written as bytes
/// - at most 8-byte aligned, so borrowed access into a row is always aligned
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Health {
///     current: i32,
///     max: i32,
/// }
///
/// impl Component for Health {
///     const NAME: &'static str = "health";
/// }
/// ```
pub trait Component: Pod {
    /// Kind name of this component in the store manifest.
    const NAME: &'static str;

    /// Size of one record payload in bytes.
    #[inline]
    #[must_use]
    fn record_size() -> usize {
        std::mem::size_of::<Self>()
    }
}
