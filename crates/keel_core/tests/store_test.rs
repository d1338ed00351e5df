//! # Store Integration Tests
//!
//! End-to-end behaviour of the storage kernel through its public API:
//! handle safety, row recycling, role groups and transform hierarchies.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};
use keel_core::{
    Component, EntityGroup, EntityHandle, EntityStore, RowTable, Store, StoreError,
    StoreManifest, Transform,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Point {
    x: i32,
    y: i32,
}

impl Component for Point {
    const NAME: &'static str = "point";
}

const MANIFEST: &str = r#"
    max_entities = 32

    [[components]]
    name = "point"
    capacity = 4
    record_size = 8

    [[components]]
    name = "transform"
    capacity = 16
    record_size = 184

    [[groups]]
    name = "squad"
    role_limits = [2, 3, 1]
"#;

fn store() -> Store {
    let manifest = StoreManifest::from_toml_str(MANIFEST).unwrap();
    Store::new(&manifest).unwrap()
}

// =============================================================================
// HANDLES
// =============================================================================

#[test]
fn stale_handles_stay_invalid_after_reuse() {
    let mut entities = EntityStore::new(4);
    let mut retired = Vec::new();

    for round in 0..10 {
        let handle = entities.create(round).unwrap();
        assert!(entities.is_valid(handle));
        assert!(entities.destroy(handle));
        assert!(!entities.is_valid(handle));
        retired.push(handle);
    }

    // all ten handles shared one slot, none came back to life
    assert!(retired.iter().all(|h| h.index() == retired[0].index()));
    assert!(retired.iter().all(|&h| !entities.is_valid(h)));

    let fresh = entities.create(0).unwrap();
    assert!(entities.is_valid(fresh));
    assert!(retired.iter().all(|&h| h != fresh));
}

#[test]
fn destroyed_entity_loses_components_and_group_slots() {
    let mut store = store();
    let hero = store.create_entity(1).unwrap();
    store.insert(hero, Point { x: 3, y: 4 }).unwrap();
    let stored = store.get::<Point>(hero).unwrap();
    assert_eq!((stored.x, stored.y), (3, 4));
    store.add_to_group("squad", hero, 2).unwrap();

    store.destroy_entity(hero).unwrap();

    assert!(store.get::<Point>(hero).is_none());
    assert!(store.component(hero, "point").is_none());
    assert!(!store.group("squad").unwrap().contains(hero));
    assert_eq!(
        store.add_component(hero, "point"),
        Err(StoreError::InvalidHandle(hero))
    );

    // the same slot comes back with a new generation and no baggage
    let next = store.create_entity(1).unwrap();
    assert_eq!(next.index(), hero.index());
    assert_ne!(next.generation(), hero.generation());
    assert!(!store.has::<Point>(next));
}

// =============================================================================
// ROW TABLES
// =============================================================================

#[test]
fn capacity_four_scenario() {
    let mut table = RowTable::new("point", 4, std::mem::size_of::<Point>());
    let owners: Vec<_> = (1..=6).map(|i| EntityHandle::new(i, 1, 0)).collect();

    for (expected, &owner) in owners[..4].iter().enumerate() {
        assert_eq!(table.allocate(owner), Ok(expected));
    }
    assert!(matches!(
        table.allocate(owners[4]),
        Err(StoreError::CapacityExceeded { capacity: 4, .. })
    ));

    assert!(table.free(1));
    assert_eq!(table.allocate(owners[5]), Ok(1));
    assert_eq!(table.entity_at(1), owners[5]);

    assert_eq!(table.first_index(), Some(0));
    assert_eq!(table.next_index(0), Some(1));
    assert_eq!(table.next_index(2), Some(3));
    assert_eq!(table.next_index(3), None);
}

#[test]
fn double_free_never_hands_out_a_row_twice() {
    const N: usize = 8;
    let mut table = RowTable::new("point", N, std::mem::size_of::<Point>());
    for i in 0..N {
        table.allocate(EntityHandle::new(i as u32 + 1, 1, 0)).unwrap();
    }

    assert!(table.free(5));
    assert!(!table.free(5));

    let mut rows = vec![table.allocate(EntityHandle::new(100, 1, 0)).unwrap()];
    assert!(table.allocate(EntityHandle::new(101, 1, 0)).is_err());
    rows.extend(table.iter().map(|(row, _)| row));
    rows.sort_unstable();
    rows.dedup();
    assert_eq!(rows.len(), N);
}

#[test]
fn occupancy_never_exceeds_capacity() {
    let mut table = RowTable::new("point", 3, 8);
    let mut next = 1;
    for step in 0..40u32 {
        if step % 3 == 2 {
            if let Some(row) = table.first_index() {
                table.free(row);
            }
        } else {
            let _ = table.allocate(EntityHandle::new(next, 1, 0));
            next += 1;
        }
        assert!(table.len() <= table.capacity());
        assert!(table.iter().all(|(row, owner)| !owner.is_null() && table.at(row).is_some()));
    }
}

// =============================================================================
// ROLE GROUPS
// =============================================================================

#[test]
fn role_capacities_survive_churn() {
    let mut store = store();
    let members: Vec<_> = (0..6).map(|_| store.create_entity(0).unwrap()).collect();
    let squad = store.group_mut("squad").unwrap();

    for round in 0..3 {
        for (i, &m) in members.iter().enumerate() {
            let _ = squad.add_to_role(m, (i as u32 + round) % 3);
        }
        for &m in &members[..3] {
            squad.remove_everywhere(m);
        }
        assert_eq!(
            (squad.capacity_of(0), squad.capacity_of(1), squad.capacity_of(2)),
            (2, 3, 1)
        );
    }
}

#[test]
fn removing_a_middle_entry_keeps_role_dense() {
    let mut group = EntityGroup::new("squad", &[2, 3, 1]).unwrap();
    let members: Vec<_> = (1..=3).map(|i| EntityHandle::new(i, 1, 0)).collect();
    for &m in &members {
        group.add_to_role(m, 1).unwrap();
    }
    assert!(group.is_full(1));

    assert!(group.remove_from_role(members[1], 1));
    assert_eq!(group.count_of(1), 2);
    assert_eq!(group.entities_in_role(1), &[members[0], members[2]]);
    assert_eq!(group.entity_with_role_and_slot(1, 1), members[2]);
    assert!(group.entity_with_role_and_slot(1, 2).is_null());
}

#[test]
fn unknown_group_and_role_are_reported() {
    let mut store = store();
    let e = store.create_entity(0).unwrap();
    assert!(matches!(
        store.add_to_group("raid", e, 0),
        Err(StoreError::UnknownGroupId(_))
    ));
    assert!(matches!(
        store.add_to_group("squad", e, 7),
        Err(StoreError::UnknownRole { role: 7, .. })
    ));
    assert_eq!(store.group("squad").unwrap().find_entity_role_and_slot(e), None);
}

// =============================================================================
// TRANSFORMS
// =============================================================================

fn spawn(store: &mut Store, translation: Vec3) -> EntityHandle {
    let e = store.create_entity(0).unwrap();
    store.insert(e, Transform::from_translation(translation)).unwrap();
    e
}

#[test]
fn transform_update_is_idempotent() {
    let mut store = store();
    let root = spawn(&mut store, Vec3::new(1.0, 0.0, 0.0));
    let arm = spawn(&mut store, Vec3::new(0.0, 1.0, 0.0));
    store.attach(arm, root).unwrap();

    let first = store.update_transform(arm).unwrap();
    let stats = store.transform_stats();
    let second = store.update_transform(arm).unwrap();

    assert_eq!(first, second);
    assert_eq!(store.transform_stats(), stats);
    assert!(!store.get::<Transform>(arm).unwrap().is_dirty());
}

#[test]
fn moving_a_parent_moves_the_subtree() {
    let mut store = store();
    let root = spawn(&mut store, Vec3::ZERO);
    let mid = spawn(&mut store, Vec3::new(0.0, 1.0, 0.0));
    let tip = spawn(&mut store, Vec3::new(0.0, 0.0, 1.0));
    store.attach(mid, root).unwrap();
    store.attach(tip, mid).unwrap();
    store.update_all_transforms();

    store
        .set_local(
            root,
            Vec3::new(10.0, 0.0, 0.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::ONE,
        )
        .unwrap();
    let world = store.update_transform(tip).unwrap();

    // rotating +Z by 90 degrees about Y lands on +X
    let expected = Mat4::from_translation(Vec3::new(11.0, 1.0, 0.0));
    assert!(world.w_axis.abs_diff_eq(expected.w_axis, 1e-5));
    assert!(store
        .get::<Transform>(tip)
        .unwrap()
        .world_translation()
        .abs_diff_eq(Vec3::new(11.0, 1.0, 0.0), 1e-5));
}

#[test]
fn destroying_a_parent_leaves_children_as_roots() {
    let mut store = store();
    let root = spawn(&mut store, Vec3::new(5.0, 0.0, 0.0));
    let child = spawn(&mut store, Vec3::new(0.0, 1.0, 0.0));
    store.attach(child, root).unwrap();
    store.update_all_transforms();

    store.destroy_entity(root).unwrap();
    let orphan = *store.get::<Transform>(child).unwrap();
    assert!(orphan.parent.is_null());
    assert!(orphan.is_dirty());

    let world = store.update_transform(child).unwrap();
    assert_eq!(world, Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)));
    assert_eq!(store.transform_stats().broken_links, 0);
}

/// Root with children spawned in order; the child chain runs newest first.
fn family(store: &mut Store, children: usize) -> (EntityHandle, Vec<EntityHandle>) {
    let root = spawn(store, Vec3::ZERO);
    let kids: Vec<_> = (0..children)
        .map(|_| {
            let kid = spawn(store, Vec3::new(0.0, 1.0, 0.0));
            store.attach(kid, root).unwrap();
            kid
        })
        .collect();
    store.update_all_transforms();
    (root, kids)
}

fn assert_world(store: &Store, entity: EntityHandle, expected: Vec3) {
    let actual = store.get::<Transform>(entity).unwrap().world_translation();
    assert!(actual.abs_diff_eq(expected, 1e-5), "{entity}: {actual} != {expected}");
}

#[test]
fn destroying_the_first_child_keeps_later_siblings_reachable() {
    let mut store = store();
    let (root, kids) = family(&mut store, 2);
    // chain: root.child = kids[1] -> kids[0]
    store.destroy_entity(kids[1]).unwrap();
    assert_eq!(store.get::<Transform>(root).unwrap().child, kids[0]);

    store
        .set_local(root, Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE)
        .unwrap();
    store.update_all_transforms();

    assert_world(&store, kids[0], Vec3::new(10.0, 1.0, 0.0));
    assert_eq!(store.transform_stats().broken_links, 0);
}

#[test]
fn destroying_a_middle_sibling_keeps_the_chain_intact() {
    let mut store = store();
    let (root, kids) = family(&mut store, 3);
    // chain: kids[2] -> kids[1] -> kids[0]
    store.destroy_entity(kids[1]).unwrap();
    assert_eq!(store.get::<Transform>(kids[2]).unwrap().sibling, kids[0]);

    store
        .set_local(root, Vec3::new(0.0, 0.0, 3.0), Quat::IDENTITY, Vec3::ONE)
        .unwrap();
    store.update_all_transforms();

    for kid in [kids[0], kids[2]] {
        assert_world(&store, kid, Vec3::new(0.0, 1.0, 3.0));
    }
    assert_eq!(store.transform_stats().broken_links, 0);
}

#[test]
fn removing_a_transform_unlinks_it_from_its_siblings() {
    let mut store = store();
    let (root, kids) = family(&mut store, 2);
    assert_eq!(store.remove_component(kids[1], "transform"), Ok(true));
    assert!(store.is_alive(kids[1]));

    store
        .set_local(root, Vec3::new(-2.0, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE)
        .unwrap();
    store.update_all_transforms();
    assert_world(&store, kids[0], Vec3::new(-2.0, 1.0, 0.0));
}

#[test]
fn reparenting_rejects_cycles() {
    let mut store = store();
    let a = spawn(&mut store, Vec3::X);
    let b = spawn(&mut store, Vec3::Y);
    store.attach(b, a).unwrap();
    assert!(matches!(
        store.attach(a, b),
        Err(StoreError::BrokenHierarchy { .. })
    ));
    store.detach(b).unwrap();
    store.attach(a, b).unwrap();
    assert_eq!(store.get::<Transform>(a).unwrap().parent, b);
}

// =============================================================================
// MANIFEST
// =============================================================================

#[test]
fn manifest_sizes_every_table() {
    let store = store();
    assert_eq!(store.table("point").unwrap().capacity(), 4);
    assert_eq!(store.table("transform").unwrap().record_size(), Transform::record_size());
    assert_eq!(store.entities().capacity(), 32);
    assert!(matches!(
        store.table("velocity"),
        Err(StoreError::UnknownComponentKind(_))
    ));
}

#[test]
fn malformed_manifest_is_rejected() {
    assert!(matches!(
        StoreManifest::from_toml_str("max_entities = 0"),
        Err(StoreError::InvalidManifest(_))
    ));
    assert!(matches!(
        StoreManifest::from_toml_str("[[components]]\nname = 3"),
        Err(StoreError::InvalidManifest(_))
    ));
}
