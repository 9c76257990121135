//! The [`World`] is the top-level container: it owns the component registry,
//! the entry table, and every archetype table, and orchestrates entity
//! creation, deletion, component add/remove migration, and iteration.
//!
//! All operations are synchronous and single-threaded. Borrows handed out by
//! the accessors alias the archetype buffers, so the borrow checker prevents
//! mutating the world while any of them is alive; the collect-first,
//! mutate-later discipline is enforced at compile time.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, trace};

use crate::archetype::Table;
use crate::component::{Component, Registry};
use crate::entity::{Entries, EntityId};
use crate::mask::Mask;
use crate::query::{Iter, IterMut, Query, Row};
use crate::EcsError;

/// The top-level ECS container.
///
/// Entities with identical component sets share one dense table; a
/// generational entry table indirects from stable [`EntityId`]s to the
/// current `(archetype, row)` pair and survives swap-remove compaction.
#[derive(Default)]
pub struct World {
    registry: Registry,
    entries: Entries,
    /// All archetype tables, in creation order.
    archetypes: Vec<Table>,
    /// Mask -> index into `archetypes`. Each mask appears exactly once.
    archetype_index: HashMap<Mask, u32>,
}

impl World {
    /// Create an empty world with an empty component universe.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            entries: Entries::new(),
            archetypes: Vec::new(),
            archetype_index: HashMap::new(),
        }
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> u32 {
        self.entries.live_count()
    }

    /// Number of archetype tables (including empty ones left behind by
    /// migrations).
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    // -- archetype management -----------------------------------------------

    /// Find or create the table for `mask`, returning its index.
    fn ensure_archetype(&mut self, mask: Mask) -> u32 {
        if let Some(&index) = self.archetype_index.get(&mask) {
            return index;
        }
        let index = self.archetypes.len() as u32;
        let table = Table::new(mask, &self.registry);
        debug!(?mask, index, stride = table.layout().stride(), "created archetype");
        self.archetypes.push(table);
        self.archetype_index.insert(mask, index);
        index
    }

    /// Mutable borrows of two distinct tables: the migration destination and
    /// source.
    fn table_pair(&mut self, dst: u32, src: u32) -> (&mut Table, &Table) {
        debug_assert_ne!(dst, src);
        if dst < src {
            let (lo, hi) = self.archetypes.split_at_mut(src as usize);
            (&mut lo[dst as usize], &hi[0])
        } else {
            let (lo, hi) = self.archetypes.split_at_mut(dst as usize);
            (&mut hi[0], &lo[src as usize])
        }
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity from a row of components, returning its handle.
    ///
    /// Every component type in the row is registered on first observation.
    /// On failure the world is unchanged (at most, a new empty archetype
    /// exists).
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentUniverseFull`], [`EcsError::OutOfMemory`].
    pub fn create<R: Row>(&mut self, row: R) -> Result<EntityId, EcsError> {
        let mask = R::register(&mut self.registry)?;
        let archetype = self.ensure_archetype(mask);
        let table = &mut self.archetypes[archetype as usize];
        // Reserve the row before touching the entry table, so an allocation
        // failure consumes no slot.
        let row_index = table.new_row(0)?;
        unsafe { row.write(&self.registry, table, row_index) };

        let slot = self.entries.alloc();
        self.entries.set_location(slot, archetype, row_index);
        self.archetypes[archetype as usize].set_back_ref(row_index, slot);
        Ok(EntityId::new(slot, self.entries.generation(slot)))
    }

    /// Delete an entity. Silently ignores stale handles, so a double delete
    /// is a no-op. Cannot fail.
    pub fn delete(&mut self, id: EntityId) {
        if !self.entries.is_live(id) {
            return;
        }
        let entry = self.entries.get(id.slot());
        let moved = self.archetypes[entry.archetype as usize].delete(entry.row);
        // Point the moved entity's entry at its new row. When nothing moved,
        // this rewrites the dying entry's own row, which `free` overwrites.
        self.entries.set_row(moved, entry.row);
        self.entries.free(id.slot());
    }

    /// Whether `id` refers to a live entity.
    pub fn alive(&self, id: EntityId) -> bool {
        self.entries.is_live(id)
    }

    // -- component add / remove ---------------------------------------------

    /// Add a component to an entity, migrating it to the archetype whose mask
    /// includes `T`. All previously present components keep their values.
    /// On failure the world is unchanged.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityDead`], [`EcsError::ComponentAlreadyPresent`],
    /// [`EcsError::ComponentUniverseFull`], [`EcsError::OutOfMemory`].
    pub fn add<T: Component>(&mut self, id: EntityId, value: T) -> Result<(), EcsError> {
        if !self.entries.is_live(id) {
            return Err(EcsError::EntityDead(id));
        }
        let component = self.registry.register::<T>()?;
        let entry = self.entries.get(id.slot());
        let old_mask = self.archetypes[entry.archetype as usize].mask();
        if old_mask.contains(component) {
            return Err(EcsError::ComponentAlreadyPresent(std::any::type_name::<T>()));
        }

        let new_mask = old_mask.with(component);
        let new_archetype = self.ensure_archetype(new_mask);
        let (dst, src) = self.table_pair(new_archetype, entry.archetype);
        let new_row = dst.copy_from(src, entry.row)?;
        unsafe { dst.write_comp(new_row, component, value) };

        let moved = self.archetypes[entry.archetype as usize].delete(entry.row);
        self.entries.set_row(moved, entry.row);
        self.entries.set_location(id.slot(), new_archetype, new_row);
        self.archetypes[new_archetype as usize].set_back_ref(new_row, id.slot());
        trace!(entity = %id, from = ?old_mask, to = ?new_mask, "migrated entity");
        Ok(())
    }

    /// Remove a component from an entity, migrating it to the archetype whose
    /// mask drops `T`. Other components keep their values. On failure the
    /// world is unchanged.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityDead`], [`EcsError::ComponentMissing`] (also when
    /// `T` was never registered), [`EcsError::OutOfMemory`].
    ///
    /// # Panics
    ///
    /// Removing an entity's last component is a programming error: archetypes
    /// with an empty component set do not exist. Delete the entity instead.
    pub fn remove<T: Component>(&mut self, id: EntityId) -> Result<(), EcsError> {
        if !self.entries.is_live(id) {
            return Err(EcsError::EntityDead(id));
        }
        let Some(component) = self.registry.id_of::<T>() else {
            return Err(EcsError::ComponentMissing(std::any::type_name::<T>()));
        };
        let entry = self.entries.get(id.slot());
        let old_mask = self.archetypes[entry.archetype as usize].mask();
        if !old_mask.contains(component) {
            return Err(EcsError::ComponentMissing(std::any::type_name::<T>()));
        }

        let new_mask = old_mask.without(component);
        assert!(
            !new_mask.is_empty(),
            "cannot remove the last component of an entity; delete it instead"
        );
        let new_archetype = self.ensure_archetype(new_mask);
        let (dst, src) = self.table_pair(new_archetype, entry.archetype);
        let new_row = dst.copy_from(src, entry.row)?;

        let moved = self.archetypes[entry.archetype as usize].delete(entry.row);
        self.entries.set_row(moved, entry.row);
        self.entries.set_location(id.slot(), new_archetype, new_row);
        self.archetypes[new_archetype as usize].set_back_ref(new_row, id.slot());
        trace!(entity = %id, from = ?old_mask, to = ?new_mask, "migrated entity");
        Ok(())
    }

    // -- component access ---------------------------------------------------

    /// Whether the entity has a component of type `T`. `false` on stale
    /// handles.
    pub fn has<T: Component>(&self, id: EntityId) -> bool {
        if !self.entries.is_live(id) {
            return false;
        }
        let Some(component) = self.registry.id_of::<T>() else {
            return false;
        };
        let entry = self.entries.get(id.slot());
        self.archetypes[entry.archetype as usize].has(component)
    }

    /// Shared borrow of the entity's `T`. `None` on stale handles or when
    /// the component is absent.
    pub fn get_comp<T: Component>(&self, id: EntityId) -> Option<&T> {
        if !self.entries.is_live(id) {
            return None;
        }
        let component = self.registry.id_of::<T>()?;
        let entry = self.entries.get(id.slot());
        let table = &self.archetypes[entry.archetype as usize];
        if !table.has(component) {
            return None;
        }
        Some(unsafe { table.comp_ref::<T>(entry.row, component) })
    }

    /// Mutable borrow of the entity's `T`. `None` on stale handles or when
    /// the component is absent.
    pub fn get_comp_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        if !self.entries.is_live(id) {
            return None;
        }
        let component = self.registry.id_of::<T>()?;
        let entry = self.entries.get(id.slot());
        let table = &mut self.archetypes[entry.archetype as usize];
        if !table.has(component) {
            return None;
        }
        Some(unsafe { table.comp_mut::<T>(entry.row, component) })
    }

    /// Borrow the entity's whole row as `R`'s reference bundle. `R` must
    /// match the entity's component set exactly.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityDead`].
    ///
    /// # Panics
    ///
    /// An `R` that does not exactly match the entity's component set is a
    /// programming error.
    pub fn get_row<R: Row>(&self, id: EntityId) -> Result<R::Refs<'_>, EcsError> {
        if !self.entries.is_live(id) {
            return Err(EcsError::EntityDead(id));
        }
        let entry = self.entries.get(id.slot());
        let table = &self.archetypes[entry.archetype as usize];
        assert!(
            R::mask(&self.registry) == Some(table.mask()),
            "row type does not match the entity's exact component set"
        );
        Ok(unsafe { R::refs(&self.registry, table, entry.row) })
    }

    /// Mutable counterpart of [`get_row`](Self::get_row).
    pub fn get_row_mut<R: Row>(&mut self, id: EntityId) -> Result<R::Muts<'_>, EcsError> {
        if !self.entries.is_live(id) {
            return Err(EcsError::EntityDead(id));
        }
        let entry = self.entries.get(id.slot());
        let World {
            registry,
            archetypes,
            ..
        } = self;
        let table = &mut archetypes[entry.archetype as usize];
        assert!(
            R::mask(registry) == Some(table.mask()),
            "row type does not match the entity's exact component set"
        );
        Ok(unsafe { R::muts(registry, table, entry.row) })
    }

    /// Borrow a projection of the entity's row. The entity's component set
    /// must be a superset of the query's; items must be read-only (`&T`).
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityDead`].
    ///
    /// # Panics
    ///
    /// A query naming a component the entity does not have, or containing
    /// `&mut T` items, is a programming error.
    pub fn get_many<Q: Query>(&self, id: EntityId) -> Result<Q::Item<'_>, EcsError> {
        assert!(
            !Q::HAS_MUTABLE,
            "get_many cannot borrow mutably; use get_many_mut"
        );
        if !self.entries.is_live(id) {
            return Err(EcsError::EntityDead(id));
        }
        let entry = self.entries.get(id.slot());
        let table = &self.archetypes[entry.archetype as usize];
        let mask = Q::mask(&self.registry);
        assert!(
            mask.is_some_and(|m| table.has_all(m)),
            "projection names a component the entity does not have"
        );
        Ok(unsafe { Q::fetch_row(&self.registry, table, entry.row) })
    }

    /// Mutable counterpart of [`get_many`](Self::get_many): the query may mix
    /// `&T` and `&mut T` items, but may not access one component type twice
    /// with a mutable borrow.
    pub fn get_many_mut<Q: Query>(&mut self, id: EntityId) -> Result<Q::Item<'_>, EcsError> {
        Q::validate_access(&self.registry);
        if !self.entries.is_live(id) {
            return Err(EcsError::EntityDead(id));
        }
        let entry = self.entries.get(id.slot());
        let table = &self.archetypes[entry.archetype as usize];
        let mask = Q::mask(&self.registry);
        assert!(
            mask.is_some_and(|m| table.has_all(m)),
            "projection names a component the entity does not have"
        );
        Ok(unsafe { Q::fetch_row(&self.registry, table, entry.row) })
    }

    // -- iteration ----------------------------------------------------------

    /// Iterate every live entity whose archetype mask is a superset of the
    /// query's, yielding `(EntityId, bundle)` pairs. Read-only items only.
    ///
    /// ```
    /// # use strata_ecs::prelude::*;
    /// # #[derive(Clone, Copy)] struct Pos(f32); impl Component for Pos {}
    /// # #[derive(Clone, Copy)] struct Vel(f32); impl Component for Vel {}
    /// # let mut world = World::new();
    /// # world.create((Pos(0.0), Vel(1.0))).unwrap();
    /// for (entity, (pos, vel)) in world.iter::<(&Pos, &Vel)>() {
    ///     let _ = (entity, pos.0 + vel.0);
    /// }
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the query contains `&mut T` items; use
    /// [`iter_mut`](Self::iter_mut).
    pub fn iter<Q: Query>(&self) -> Iter<'_, Q> {
        assert!(
            !Q::HAS_MUTABLE,
            "iter cannot borrow mutably; use iter_mut"
        );
        Iter::new(&self.registry, &self.archetypes, &self.entries)
    }

    /// Mutable iteration: items may mix `&T` and `&mut T`. Takes `&mut self`,
    /// so the world cannot be mutated (and no other borrow can exist) while
    /// the iterator is alive.
    ///
    /// # Panics
    ///
    /// Panics if the query accesses one component type twice with a mutable
    /// borrow.
    pub fn iter_mut<Q: Query>(&mut self) -> IterMut<'_, Q> {
        Q::validate_access(&self.registry);
        unsafe { IterMut::new(&self.registry, &self.archetypes, &self.entries) }
    }

    /// Fast path over exact-mask archetypes: invoke `f` once per entity whose
    /// component set equals `R`'s, with the row's mutable bundle.
    pub fn each<R: Row>(&mut self, mut f: impl FnMut(R::Muts<'_>)) {
        let World {
            registry,
            archetypes,
            ..
        } = self;
        let Some(mask) = R::mask(registry) else {
            return;
        };
        for table in archetypes.iter_mut() {
            if !table.has_exact(mask) {
                continue;
            }
            for row in 0..table.len() {
                f(unsafe { R::muts(registry, table, row) });
            }
        }
    }

    /// Contiguous view of all `T` values in the single-component archetype of
    /// `T` (the homogeneous fast path). `None` if that archetype was never
    /// created. Entities carrying `T` alongside other components live in
    /// other archetypes and are not part of this slice.
    pub fn values<T: Component>(&self) -> Option<&[T]> {
        let component = self.registry.id_of::<T>()?;
        let &index = self.archetype_index.get(&Mask::single(component))?;
        Some(unsafe { self.archetypes[index as usize].values::<T>() })
    }

    /// Mutable counterpart of [`values`](Self::values).
    pub fn values_mut<T: Component>(&mut self) -> Option<&mut [T]> {
        let component = self.registry.id_of::<T>()?;
        let &index = self.archetype_index.get(&Mask::single(component))?;
        Some(unsafe { self.archetypes[index as usize].values_mut::<T>() })
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entries.live_count())
            .field("archetypes", &self.archetypes.len())
            .field("components", &self.registry.len())
            .finish()
    }
}
