//! strata-ecs -- archetype-based entity-component storage.
//!
//! Entities with identical component sets share one dense, row-major packed
//! table (an *archetype*). Stable generational [`EntityId`] handles indirect
//! to the current `(archetype, row)` pair through an entry table that
//! survives swap-remove compaction, and adding or removing a component
//! migrates the entity's bytes between tables. Iteration over all entities
//! bearing a set of components walks whole tables, not individual entities.
//!
//! # Quick Start
//!
//! ```
//! use strata_ecs::prelude::*;
//!
//! #[derive(Clone, Copy, Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//! impl Component for Position {}
//!
//! #[derive(Clone, Copy, Debug, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//! impl Component for Velocity {}
//!
//! let mut world = World::new();
//! let entity = world.create((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }))?;
//!
//! assert_eq!(world.get_comp::<Position>(entity), Some(&Position { x: 0.0, y: 0.0 }));
//!
//! for (_id, (pos, vel)) in world.iter::<(&Position, &Velocity)>() {
//!     assert_eq!(pos.x + vel.dx, 1.0);
//! }
//!
//! world.delete(entity);
//! assert!(!world.alive(entity));
//! # Ok::<(), strata_ecs::EcsError>(())
//! ```

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod archetype;
pub mod component;
pub mod entity;
pub mod mask;
#[allow(unsafe_code)]
pub mod query;
#[allow(unsafe_code)]
pub mod world;

use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by world operations. Nothing is retried; a failed
/// multi-step mutation leaves the world in its pre-call state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The handle's generation no longer matches its slot.
    #[error("entity {0} is dead (stale generation)")]
    EntityDead(EntityId),

    /// `add` of a component the entity already has.
    #[error("component {0} is already present on the entity")]
    ComponentAlreadyPresent(&'static str),

    /// `remove` of a component the entity does not have.
    #[error("component {0} is not present on the entity")]
    ComponentMissing(&'static str),

    /// More distinct component types observed than the universe holds.
    #[error("component universe is full ({} distinct component types)", component::MAX_COMPONENTS)]
    ComponentUniverseFull,

    /// Allocation failed while growing archetype storage.
    #[error("allocation failed while growing archetype storage")]
    OutOfMemory,
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ComponentId, Registry, MAX_COMPONENTS};
    pub use crate::entity::EntityId;
    pub use crate::mask::Mask;
    pub use crate::query::{Iter, IterMut, Query, QueryItem, Row};
    pub use crate::world::World;
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use std::collections::HashSet;

    // -- test component types -----------------------------------------------

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }
    impl Component for Velocity {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Name(&'static str);
    impl Component for Name {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Frozen;
    impl Component for Frozen {}

    fn pv(x: f32) -> (Position, Velocity) {
        (
            Position { x, y: x * 2.0 },
            Velocity { dx: -x, dy: 1.0 },
        )
    }

    // -- creation and access ------------------------------------------------

    #[test]
    fn create_then_read_back() {
        let mut world = World::new();
        let e = world
            .create((Position { x: 1.0, y: 2.0 }, Velocity { dx: 3.0, dy: 4.0 }))
            .unwrap();

        assert!(world.alive(e));
        assert_eq!(world.get_comp::<Position>(e), Some(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(world.get_comp::<Velocity>(e), Some(&Velocity { dx: 3.0, dy: 4.0 }));

        let (pos, vel) = world.get_row::<(Position, Velocity)>(e).unwrap();
        assert_eq!(pos, &Position { x: 1.0, y: 2.0 });
        assert_eq!(vel, &Velocity { dx: 3.0, dy: 4.0 });
    }

    #[test]
    fn create_single_component_row() {
        let mut world = World::new();
        let e = world.create(Health(10)).unwrap();
        assert_eq!(world.get_comp::<Health>(e), Some(&Health(10)));
        assert_eq!(world.get_row::<Health>(e).unwrap(), &Health(10));
    }

    #[test]
    fn row_field_order_does_not_matter() {
        let mut world = World::new();
        let a = world
            .create((Position { x: 1.0, y: 1.0 }, Name("a")))
            .unwrap();
        let b = world
            .create((Name("b"), Position { x: 2.0, y: 2.0 }))
            .unwrap();

        // Both rows land in the same archetype.
        assert_eq!(world.archetype_count(), 1);
        assert_eq!(world.get_comp::<Name>(a), Some(&Name("a")));
        assert_eq!(world.get_comp::<Name>(b), Some(&Name("b")));
        assert_eq!(world.get_comp::<Position>(b), Some(&Position { x: 2.0, y: 2.0 }));
    }

    #[test]
    fn get_comp_mut_modifies_in_place() {
        let mut world = World::new();
        let e = world.create(pv(1.0)).unwrap();
        world.get_comp_mut::<Position>(e).unwrap().x = 42.0;
        assert_eq!(world.get_comp::<Position>(e).unwrap().x, 42.0);
    }

    // -- deletion and handle staleness --------------------------------------

    #[test]
    fn delete_makes_handle_stale() {
        let mut world = World::new();
        let e = world.create(pv(1.0)).unwrap();
        world.delete(e);

        assert!(!world.alive(e));
        assert_eq!(world.get_comp::<Position>(e), None);
        assert_eq!(
            world.get_row::<(Position, Velocity)>(e),
            Err(EcsError::EntityDead(e))
        );
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn double_delete_is_a_noop() {
        let mut world = World::new();
        let e = world.create(pv(1.0)).unwrap();
        world.delete(e);
        world.delete(e);
        assert_eq!(world.entity_count(), 0);

        // The free list survived: new creates still work and reuse slots.
        let e2 = world.create(pv(2.0)).unwrap();
        let e3 = world.create(pv(3.0)).unwrap();
        assert!(world.alive(e2));
        assert!(world.alive(e3));
        assert_ne!(e2, e3);
    }

    #[test]
    fn create_delete_create_reuses_slot_with_bumped_generation() {
        let mut world = World::new();
        let id1 = world
            .create((Position { x: 1.0, y: 2.0 }, Velocity { dx: 3.0, dy: 4.0 }))
            .unwrap();
        world.delete(id1);
        let id2 = world
            .create((Position { x: 5.0, y: 6.0 }, Velocity { dx: 7.0, dy: 8.0 }))
            .unwrap();

        assert_eq!(id2.slot(), id1.slot());
        assert_eq!(id2.generation(), id1.generation().wrapping_add(1));
        assert!(!world.alive(id1));
        assert_eq!(world.get_comp::<Position>(id2), Some(&Position { x: 5.0, y: 6.0 }));
    }

    #[test]
    fn generation_increments_by_one_per_delete() {
        let mut world = World::new();
        let mut id = world.create(Health(0)).unwrap();
        let slot = id.slot();
        for expected_gen in 1..5u32 {
            world.delete(id);
            id = world.create(Health(expected_gen)).unwrap();
            assert_eq!(id.slot(), slot);
            assert_eq!(id.generation(), expected_gen);
        }
    }

    #[test]
    fn slot_recycling_is_bounded() {
        let mut world = World::new();
        let first: Vec<EntityId> = (0..8).map(|i| world.create(pv(i as f32)).unwrap()).collect();
        for &e in &first {
            world.delete(e);
        }
        let second: Vec<EntityId> = (0..8).map(|i| world.create(pv(i as f32)).unwrap()).collect();

        // Every slot came from the free list; no fresh entries were pushed.
        let old_slots: HashSet<u32> = first.iter().map(|e| e.slot()).collect();
        let new_slots: HashSet<u32> = second.iter().map(|e| e.slot()).collect();
        assert_eq!(old_slots, new_slots);
    }

    #[test]
    fn swap_remove_keeps_survivors_intact() {
        let mut world = World::new();
        let a = world.create(pv(1.0)).unwrap();
        let b = world.create(pv(2.0)).unwrap();
        let c = world.create(pv(3.0)).unwrap();

        // C is swapped into B's row; its back-ref must be patched.
        world.delete(b);
        assert_eq!(world.get_comp::<Position>(a), Some(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(world.get_comp::<Position>(c), Some(&Position { x: 3.0, y: 6.0 }));
        assert_eq!(world.get_comp::<Velocity>(c), Some(&Velocity { dx: -3.0, dy: 1.0 }));
        assert_eq!(world.entity_count(), 2);
    }

    // -- add / remove migration ---------------------------------------------

    #[test]
    fn add_migrates_and_preserves_data() {
        let mut world = World::new();
        let id = world
            .create((Position { x: 1.0, y: 2.0 }, Velocity { dx: 3.0, dy: 4.0 }))
            .unwrap();
        world.add(id, Name("bob")).unwrap();

        assert_eq!(world.get_comp::<Position>(id), Some(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(world.get_comp::<Velocity>(id), Some(&Velocity { dx: 3.0, dy: 4.0 }));
        assert_eq!(world.get_comp::<Name>(id), Some(&Name("bob")));
        assert_eq!(world.archetype_count(), 2);
    }

    #[test]
    fn remove_then_re_add() {
        let mut world = World::new();
        let id = world.create(pv(1.0)).unwrap();
        world.add(id, Health(7)).unwrap();
        world.remove::<Health>(id).unwrap();
        assert!(!world.has::<Health>(id));
        world.add(id, Health(9)).unwrap();
        assert_eq!(world.get_comp::<Health>(id), Some(&Health(9)));
    }

    #[test]
    fn add_existing_component_fails() {
        let mut world = World::new();
        let id = world.create(pv(1.0)).unwrap();
        let err = world.add(id, Position { x: 9.0, y: 9.0 }).unwrap_err();
        assert!(matches!(err, EcsError::ComponentAlreadyPresent(_)));
        // The original value is untouched.
        assert_eq!(world.get_comp::<Position>(id), Some(&Position { x: 1.0, y: 2.0 }));
    }

    #[test]
    fn remove_missing_component_fails() {
        let mut world = World::new();
        let id = world.create(pv(1.0)).unwrap();
        assert!(matches!(
            world.remove::<Health>(id),
            Err(EcsError::ComponentMissing(_))
        ));
        // Same error when the type was never registered at all.
        assert!(matches!(
            world.remove::<Name>(id),
            Err(EcsError::ComponentMissing(_))
        ));
    }

    #[test]
    fn add_and_remove_on_stale_handle_fail() {
        let mut world = World::new();
        let id = world.create(pv(1.0)).unwrap();
        world.delete(id);
        assert_eq!(world.add(id, Health(1)), Err(EcsError::EntityDead(id)));
        assert_eq!(world.remove::<Position>(id), Err(EcsError::EntityDead(id)));
        assert!(!world.has::<Position>(id));
    }

    #[test]
    fn migration_of_swapped_neighbor_is_tracked() {
        let mut world = World::new();
        let a = world.create(pv(1.0)).unwrap();
        let b = world.create(pv(2.0)).unwrap();

        // Migrating A swap-removes its old row, moving B into it.
        world.add(a, Health(1)).unwrap();
        assert_eq!(world.get_comp::<Position>(b), Some(&Position { x: 2.0, y: 4.0 }));
        assert_eq!(world.get_comp::<Position>(a), Some(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(world.get_comp::<Health>(a), Some(&Health(1)));
    }

    #[test]
    fn zero_sized_tag_components() {
        let mut world = World::new();
        let e = world.create((Position { x: 1.0, y: 1.0 }, Frozen)).unwrap();
        assert!(world.has::<Frozen>(e));
        assert_eq!(world.get_comp::<Frozen>(e), Some(&Frozen));

        let other = world.create(Position { x: 2.0, y: 2.0 }).unwrap();
        world.add(other, Frozen).unwrap();
        assert!(world.has::<Frozen>(other));
        world.remove::<Frozen>(other).unwrap();
        assert!(!world.has::<Frozen>(other));
        assert_eq!(world.get_comp::<Position>(other), Some(&Position { x: 2.0, y: 2.0 }));
    }

    // -- projections --------------------------------------------------------

    #[test]
    fn get_many_projects_a_subset() {
        let mut world = World::new();
        let e = world.create(pv(1.0)).unwrap();
        world.add(e, Health(3)).unwrap();

        let (pos, health) = world.get_many::<(&Position, &Health)>(e).unwrap();
        assert_eq!(pos, &Position { x: 1.0, y: 2.0 });
        assert_eq!(health, &Health(3));

        let (health, vel) = world.get_many_mut::<(&mut Health, &Velocity)>(e).unwrap();
        health.0 += vel.dy as u32;
        assert_eq!(world.get_comp::<Health>(e), Some(&Health(4)));
    }

    #[test]
    #[should_panic(expected = "does not match the entity's exact component set")]
    fn get_row_requires_exact_match() {
        let mut world = World::new();
        let e = world.create(pv(1.0)).unwrap();
        let _ = world.get_row::<Position>(e);
    }

    #[test]
    #[should_panic(expected = "names a component the entity does not have")]
    fn get_many_requires_superset() {
        let mut world = World::new();
        let e = world.create(Position { x: 0.0, y: 0.0 }).unwrap();
        let _ = world.get_many::<(&Position, &Velocity)>(e);
    }

    // -- iteration ----------------------------------------------------------

    #[test]
    fn iter_covers_every_matching_archetype() {
        let mut world = World::new();
        for i in 0..1000 {
            world.create(pv(i as f32)).unwrap();
        }
        for i in 0..1000 {
            let e = world.create(pv(i as f32)).unwrap();
            world.add(e, Health(i)).unwrap();
        }

        let seen: HashSet<EntityId> = world
            .iter::<(&Position, &Velocity)>()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(seen.len(), 2000);

        let with_health = world.iter::<(&Position, &Health)>().count();
        assert_eq!(with_health, 1000);
    }

    #[test]
    fn iter_skips_unregistered_queries() {
        let mut world = World::new();
        world.create(pv(1.0)).unwrap();
        assert_eq!(world.iter::<(&Health,)>().count(), 0);
    }

    #[test]
    fn iter_mut_modifies_rows() {
        let mut world = World::new();
        let e = world
            .create((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 2.0 }))
            .unwrap();

        for (_id, (pos, vel)) in world.iter_mut::<(&mut Position, &Velocity)>() {
            pos.x += vel.dx;
            pos.y += vel.dy;
        }
        assert_eq!(world.get_comp::<Position>(e), Some(&Position { x: 1.0, y: 2.0 }));
    }

    #[test]
    #[should_panic(expected = "iter cannot borrow mutably")]
    fn iter_rejects_mutable_items() {
        let mut world = World::new();
        world.create(pv(1.0)).unwrap();
        let _ = world.iter::<(&mut Position,)>().count();
    }

    #[test]
    #[should_panic(expected = "more than once with a mutable borrow")]
    fn iter_mut_rejects_aliasing_access() {
        let mut world = World::new();
        world.create(pv(1.0)).unwrap();
        let _ = world.iter_mut::<(&mut Position, &Position)>().count();
    }

    // -- each and the homogeneous fast path ---------------------------------

    #[test]
    fn each_visits_exact_archetype_only() {
        let mut world = World::new();
        for i in 0..10 {
            world.create(pv(i as f32)).unwrap();
        }
        for i in 0..7 {
            let e = world.create(pv(i as f32)).unwrap();
            world.add(e, Health(i)).unwrap();
        }

        let mut visited = 0;
        world.each::<(Position, Velocity)>(|(pos, _vel)| {
            pos.x = 0.0;
            visited += 1;
        });
        assert_eq!(visited, 10);

        // Entities in the {Position, Velocity, Health} archetype were not touched.
        let untouched = world
            .iter::<(&Position, &Health)>()
            .filter(|(_, (pos, _))| pos.x != 0.0)
            .count();
        assert_eq!(untouched, 6); // pv(0.0) already had x == 0.0
    }

    #[test]
    fn values_views_homogeneous_archetype() {
        let mut world = World::new();
        for i in 0..3 {
            world.create(Health(i)).unwrap();
        }
        // An entity carrying Health alongside other components lives elsewhere.
        let mixed = world.create(pv(1.0)).unwrap();
        world.add(mixed, Health(99)).unwrap();

        assert_eq!(world.values::<Health>(), Some(&[Health(0), Health(1), Health(2)][..]));
        for h in world.values_mut::<Health>().unwrap() {
            h.0 += 10;
        }
        assert_eq!(world.values::<Health>(), Some(&[Health(10), Health(11), Health(12)][..]));
        assert_eq!(world.values::<Velocity>(), None);
    }

    // -- component universe -------------------------------------------------

    #[test]
    fn component_universe_caps_at_64() {
        macro_rules! universe {
            ($($t:ident),+) => {
                $(
                    #[derive(Clone, Copy)]
                    struct $t(u8);
                    impl Component for $t {}
                )+
                fn fill(world: &mut World) -> Vec<Result<EntityId, EcsError>> {
                    vec![$(world.create($t(0)),)+]
                }
            };
        }
        universe!(
            C00, C01, C02, C03, C04, C05, C06, C07, C08, C09, C10, C11, C12, C13, C14, C15,
            C16, C17, C18, C19, C20, C21, C22, C23, C24, C25, C26, C27, C28, C29, C30, C31,
            C32, C33, C34, C35, C36, C37, C38, C39, C40, C41, C42, C43, C44, C45, C46, C47,
            C48, C49, C50, C51, C52, C53, C54, C55, C56, C57, C58, C59, C60, C61, C62, C63,
            C64
        );

        let mut world = World::new();
        let results = fill(&mut world);
        assert_eq!(results.len(), MAX_COMPONENTS + 1);
        for result in &results[..MAX_COMPONENTS] {
            assert!(result.is_ok());
        }
        assert_eq!(results[MAX_COMPONENTS], Err(EcsError::ComponentUniverseFull));
        assert_eq!(world.entity_count() as usize, MAX_COMPONENTS);
    }
}
