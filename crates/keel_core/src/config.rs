//! # Store Manifest
//!
//! Capacity configuration, supplied once when a [`Store`] is built. This is
//! the only schema surface of the kernel: how many entities may live, which
//! component kinds exist and how many rows each gets, and which role groups
//! exist with their per-role limits.
//!
//! Manifests are usually written in TOML:
//!
//! ```toml
//! max_entities = 4096
//!
//! [[components]]
//! name = "transform"
//! capacity = 1024
//! record_size = 184
//!
//! [[groups]]
//! name = "party"
//! role_limits = [4, 8, 2]
//! ```
//!
//! [`Store`]: crate::Store

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ecs::{Component, RowTable};
use crate::error::{StoreError, StoreResult};

/// One component kind and the size of its row table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentManifest {
    /// Kind name.
    pub name: String,
    /// Maximum number of rows.
    pub capacity: u32,
    /// Payload bytes per row.
    pub record_size: u32,
}

/// One role group and its per-role capacities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupManifest {
    /// Group name.
    pub name: String,
    /// Capacity of each role, in role order.
    pub role_limits: Vec<u32>,
}

/// Complete capacity configuration for a store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreManifest {
    /// Ceiling on simultaneously allocated entity slots.
    pub max_entities: u32,
    /// Component kinds.
    #[serde(default)]
    pub components: Vec<ComponentManifest>,
    /// Role groups.
    #[serde(default)]
    pub groups: Vec<GroupManifest>,
}

impl StoreManifest {
    /// Starts an empty manifest with an entity ceiling.
    #[must_use]
    pub fn new(max_entities: u32) -> Self {
        Self {
            max_entities,
            ..Self::default()
        }
    }

    /// Adds a typed component kind sized from `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is larger than `u32::MAX` bytes.
    #[must_use]
    pub fn with_component<T: Component>(self, capacity: u32) -> Self {
        let record_size = u32::try_from(T::record_size()).expect("component larger than u32::MAX");
        self.with_raw_component(T::NAME, capacity, record_size)
    }

    /// Adds an untyped component kind.
    #[must_use]
    pub fn with_raw_component(mut self, name: impl Into<String>, capacity: u32, record_size: u32) -> Self {
        self.components.push(ComponentManifest {
            name: name.into(),
            capacity,
            record_size,
        });
        self
    }

    /// Adds a role group.
    #[must_use]
    pub fn with_group(mut self, name: impl Into<String>, role_limits: &[u32]) -> Self {
        self.groups.push(GroupManifest {
            name: name.into(),
            role_limits: role_limits.to_vec(),
        });
        self
    }

    /// Parses and validates a TOML manifest.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidManifest`] on a syntax error or a failed
    /// [`validate`](Self::validate).
    pub fn from_toml_str(source: &str) -> StoreResult<Self> {
        let manifest: Self =
            toml::from_str(source).map_err(|e| StoreError::InvalidManifest(e.to_string()).logged())?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks the manifest for structural mistakes.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidManifest`] for a zero entity ceiling, an empty or
    /// duplicated name, a component table too large to allocate, or role
    /// limits whose sum overflows `u32`.
    pub fn validate(&self) -> StoreResult<()> {
        if self.max_entities == 0 {
            return Err(invalid("max_entities must be greater than zero"));
        }

        let mut seen = HashSet::new();
        for component in &self.components {
            if component.name.is_empty() {
                return Err(invalid("component kind with an empty name"));
            }
            if !seen.insert(component.name.as_str()) {
                return Err(invalid(&format!("duplicate component kind {}", component.name)));
            }
            if RowTable::storage_bytes(component.capacity as usize, component.record_size as usize)
                .is_none()
            {
                return Err(invalid(&format!("component kind {} is too large", component.name)));
            }
        }

        seen.clear();
        for group in &self.groups {
            if group.name.is_empty() {
                return Err(invalid("group with an empty name"));
            }
            if !seen.insert(group.name.as_str()) {
                return Err(invalid(&format!("duplicate group {}", group.name)));
            }
            if group
                .role_limits
                .iter()
                .try_fold(0u32, |sum, &limit| sum.checked_add(limit))
                .is_none()
            {
                return Err(invalid(&format!("group {}: role limits overflow u32", group.name)));
            }
        }

        Ok(())
    }
}

fn invalid(reason: &str) -> StoreError {
    StoreError::InvalidManifest(reason.to_owned()).logged()
}
