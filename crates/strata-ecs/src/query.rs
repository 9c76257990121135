//! Rows, projections, and iteration.
//!
//! A [`Row`] is a component or tuple of components that an entity is created
//! from (and can be read back as, when the entity's archetype matches it
//! exactly). A [`Query`] is a tuple of `&T` / `&mut T` projections borrowed
//! from any archetype whose mask is a superset of the query's.
//!
//! Field order within a row or query tuple is immaterial: every component's
//! offset is resolved from the archetype's own layout table, never from the
//! tuple's declaration order. Listing the same component type twice in one
//! row is a programming error and panics.
//!
//! ## Soundness
//!
//! Read-only queries (`&T`) run through [`World::iter`](crate::world::World::iter),
//! which takes `&self`. Mutable queries (`&mut T`) run through
//! [`iter_mut`](crate::world::World::iter_mut), which takes `&mut self`,
//! guaranteeing exclusive access to the archetype buffers for the iterator's
//! lifetime. Duplicate or read/write-overlapping access to one component
//! type within a single query panics before any reference is produced.

use std::any::type_name;
use std::marker::PhantomData;

use crate::archetype::Table;
use crate::component::{Component, ComponentId, Registry};
use crate::entity::{Entries, EntityId};
use crate::mask::Mask;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// A component set an entity is created from: a single [`Component`] or a
/// tuple of up to eight distinct component types.
pub trait Row: 'static {
    /// Shared reference bundle over one stored row.
    type Refs<'w>;
    /// Mutable reference bundle over one stored row.
    type Muts<'w>;

    /// Register every component type in the row, returning the row's mask.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentUniverseFull`] if a new type would exceed the
    /// component universe.
    fn register(registry: &mut Registry) -> Result<Mask, EcsError>;

    /// The row's mask from already-registered types, or `None` if any type
    /// was never observed by this registry.
    fn mask(registry: &Registry) -> Option<Mask>;

    /// Move the row's fields into `row` of `table`.
    ///
    /// # Safety
    ///
    /// Every component type of `Self` must be registered, present in the
    /// table's mask, and `row < table.len()`.
    unsafe fn write(self, registry: &Registry, table: &mut Table, row: u32);

    /// Borrow the row's fields from `table`.
    ///
    /// # Safety
    ///
    /// Same requirements as [`write`](Self::write).
    unsafe fn refs<'w>(registry: &Registry, table: &'w Table, row: u32) -> Self::Refs<'w>;

    /// Mutably borrow the row's fields from `table`.
    ///
    /// # Safety
    ///
    /// Same requirements as [`write`](Self::write). The component types of
    /// `Self` must be distinct (checked by [`mask`](Self::mask) /
    /// [`register`](Self::register)) so the returned references never alias.
    unsafe fn muts<'w>(registry: &Registry, table: &'w mut Table, row: u32) -> Self::Muts<'w>;
}

impl<C: Component> Row for C {
    type Refs<'w> = &'w C;
    type Muts<'w> = &'w mut C;

    fn register(registry: &mut Registry) -> Result<Mask, EcsError> {
        Ok(Mask::single(registry.register::<C>()?))
    }

    fn mask(registry: &Registry) -> Option<Mask> {
        registry.id_of::<C>().map(Mask::single)
    }

    unsafe fn write(self, registry: &Registry, table: &mut Table, row: u32) {
        let id = registry.id_of::<C>().unwrap();
        table.write_comp(row, id, self);
    }

    unsafe fn refs<'w>(registry: &Registry, table: &'w Table, row: u32) -> &'w C {
        table.comp_ref::<C>(row, registry.id_of::<C>().unwrap())
    }

    unsafe fn muts<'w>(registry: &Registry, table: &'w mut Table, row: u32) -> &'w mut C {
        table.comp_mut::<C>(row, registry.id_of::<C>().unwrap())
    }
}

macro_rules! impl_row_for_tuple {
    ($($c:ident),+) => {
        impl<$($c: Component),+> Row for ($($c,)+) {
            type Refs<'w> = ($(&'w $c,)+);
            type Muts<'w> = ($(&'w mut $c,)+);

            fn register(registry: &mut Registry) -> Result<Mask, EcsError> {
                let mut mask = Mask::EMPTY;
                $(
                    let id = registry.register::<$c>()?;
                    assert!(
                        !mask.contains(id),
                        "duplicate component type {} in row",
                        type_name::<$c>()
                    );
                    mask.insert(id);
                )+
                Ok(mask)
            }

            fn mask(registry: &Registry) -> Option<Mask> {
                let mut mask = Mask::EMPTY;
                $(
                    let id = registry.id_of::<$c>()?;
                    assert!(
                        !mask.contains(id),
                        "duplicate component type {} in row",
                        type_name::<$c>()
                    );
                    mask.insert(id);
                )+
                Some(mask)
            }

            unsafe fn write(self, registry: &Registry, table: &mut Table, row: u32) {
                #[allow(non_snake_case)]
                let ($($c,)+) = self;
                $( table.write_comp(row, registry.id_of::<$c>().unwrap(), $c); )+
            }

            unsafe fn refs<'w>(registry: &Registry, table: &'w Table, row: u32) -> Self::Refs<'w> {
                ($( table.comp_ref::<$c>(row, registry.id_of::<$c>().unwrap()), )+)
            }

            unsafe fn muts<'w>(registry: &Registry, table: &'w mut Table, row: u32) -> Self::Muts<'w> {
                // Distinct component types (enforced by mask/register) mean
                // distinct offsets, so these references never alias.
                ($( &mut *(table.comp_ptr(row, registry.id_of::<$c>().unwrap()) as *mut $c), )+)
            }
        }
    };
}

impl_row_for_tuple!(A);
impl_row_for_tuple!(A, B);
impl_row_for_tuple!(A, B, C);
impl_row_for_tuple!(A, B, C, D);
impl_row_for_tuple!(A, B, C, D, E);
impl_row_for_tuple!(A, B, C, D, E, F);
impl_row_for_tuple!(A, B, C, D, E, F, G);
impl_row_for_tuple!(A, B, C, D, E, F, G, H);

// ---------------------------------------------------------------------------
// QueryItem
// ---------------------------------------------------------------------------

/// One element of a query tuple: `&T` (read) or `&mut T` (write).
pub trait QueryItem {
    /// The reference yielded per row.
    type Item<'w>;
    /// Whether this item borrows mutably.
    const MUTABLE: bool;

    /// The projected component's ID, if registered.
    fn component_id(registry: &Registry) -> Option<ComponentId>;

    /// Borrow the item from one row.
    ///
    /// # Safety
    ///
    /// The component must be registered and present in the table's mask, and
    /// `row < table.len()`. For `&mut T` items the caller must additionally
    /// hold exclusive access to the table for `'w`.
    unsafe fn fetch<'w>(registry: &Registry, table: &'w Table, row: u32) -> Self::Item<'w>;
}

impl<T: Component> QueryItem for &T {
    type Item<'w> = &'w T;
    const MUTABLE: bool = false;

    fn component_id(registry: &Registry) -> Option<ComponentId> {
        registry.id_of::<T>()
    }

    unsafe fn fetch<'w>(registry: &Registry, table: &'w Table, row: u32) -> &'w T {
        table.comp_ref::<T>(row, registry.id_of::<T>().unwrap())
    }
}

impl<T: Component> QueryItem for &mut T {
    type Item<'w> = &'w mut T;
    const MUTABLE: bool = true;

    fn component_id(registry: &Registry) -> Option<ComponentId> {
        registry.id_of::<T>()
    }

    unsafe fn fetch<'w>(registry: &Registry, table: &'w Table, row: u32) -> &'w mut T {
        // The caller guarantees exclusive table access (IterMut and
        // get_many_mut are only reachable through `&mut World`).
        &mut *(table.comp_ptr(row, registry.id_of::<T>().unwrap()) as *mut T)
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// A tuple of [`QueryItem`]s: `(&A, &B)`, `(&mut A, &B)`, and so on, up to
/// four items.
pub trait Query {
    /// The per-row output bundle.
    type Item<'w>;
    /// Whether any item borrows mutably.
    const HAS_MUTABLE: bool;

    /// Union of the projected component IDs, or `None` if any is
    /// unregistered (in which case no entity can match).
    fn mask(registry: &Registry) -> Option<Mask>;

    /// Panic if the query aliases: the same component type twice with at
    /// least one mutable access.
    fn validate_access(registry: &Registry);

    /// Borrow one row's bundle.
    ///
    /// # Safety
    ///
    /// Same requirements as [`QueryItem::fetch`] for every item.
    unsafe fn fetch_row<'w>(registry: &Registry, table: &'w Table, row: u32) -> Self::Item<'w>;
}

/// Reject overlapping mutable access to one component type within a query.
fn validate_no_access_conflicts(items: &[(bool, Option<ComponentId>)]) {
    let mut seen = Mask::EMPTY;
    let mut seen_mut = Mask::EMPTY;
    for &(mutable, id) in items {
        let Some(id) = id else { continue };
        if mutable {
            assert!(
                !seen.contains(id),
                "query accesses the same component type more than once with a mutable borrow"
            );
            seen_mut.insert(id);
        } else {
            assert!(
                !seen_mut.contains(id),
                "query accesses the same component type more than once with a mutable borrow"
            );
        }
        seen.insert(id);
    }
}

macro_rules! impl_query_for_tuple {
    ($($q:ident),+) => {
        impl<$($q: QueryItem),+> Query for ($($q,)+) {
            type Item<'w> = ($($q::Item<'w>,)+);
            const HAS_MUTABLE: bool = false $(|| $q::MUTABLE)+;

            fn mask(registry: &Registry) -> Option<Mask> {
                let mut mask = Mask::EMPTY;
                $( mask.insert($q::component_id(registry)?); )+
                Some(mask)
            }

            fn validate_access(registry: &Registry) {
                let items = [$( ($q::MUTABLE, $q::component_id(registry)), )+];
                validate_no_access_conflicts(&items);
            }

            unsafe fn fetch_row<'w>(
                registry: &Registry,
                table: &'w Table,
                row: u32,
            ) -> Self::Item<'w> {
                ($( $q::fetch(registry, table, row), )+)
            }
        }
    };
}

impl_query_for_tuple!(A);
impl_query_for_tuple!(A, B);
impl_query_for_tuple!(A, B, C);
impl_query_for_tuple!(A, B, C, D);

// ---------------------------------------------------------------------------
// Iter / IterMut
// ---------------------------------------------------------------------------

/// Iterator over every entity whose archetype mask is a superset of the
/// query's, yielding `(EntityId, Q::Item)` per row. Archetypes are visited in
/// insertion order, rows in ascending index order.
pub struct Iter<'w, Q: Query> {
    registry: &'w Registry,
    tables: &'w [Table],
    entries: &'w Entries,
    mask: Mask,
    arch: usize,
    row: u32,
    _marker: PhantomData<Q>,
}

impl<'w, Q: Query> Iter<'w, Q> {
    pub(crate) fn new(registry: &'w Registry, tables: &'w [Table], entries: &'w Entries) -> Self {
        // A query over an unregistered component matches nothing; start the
        // scan past the end.
        let (mask, arch) = match Q::mask(registry) {
            Some(mask) => (mask, 0),
            None => (Mask::EMPTY, tables.len()),
        };
        Self {
            registry,
            tables,
            entries,
            mask,
            arch,
            row: 0,
            _marker: PhantomData,
        }
    }
}

impl<'w, Q: Query> Iterator for Iter<'w, Q> {
    type Item = (EntityId, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let table = self.tables.get(self.arch)?;
            if table.has_all(self.mask) && self.row < table.len() {
                let row = self.row;
                self.row += 1;
                let slot = table.back_ref(row);
                let id = EntityId::new(slot, self.entries.generation(slot));
                let item = unsafe { Q::fetch_row(self.registry, table, row) };
                return Some((id, item));
            }
            self.arch += 1;
            self.row = 0;
        }
    }
}

/// Mutable counterpart of [`Iter`], constructed from `&mut World` so the
/// exclusive borrow spans the iterator's lifetime.
pub struct IterMut<'w, Q: Query> {
    registry: &'w Registry,
    tables: &'w [Table],
    entries: &'w Entries,
    mask: Mask,
    arch: usize,
    row: u32,
    _marker: PhantomData<Q>,
}

impl<'w, Q: Query> IterMut<'w, Q> {
    /// # Safety
    ///
    /// `tables` must derive from a `&mut World` borrow that lives for `'w`,
    /// so no other reference into the buffers exists.
    pub(crate) unsafe fn new(
        registry: &'w Registry,
        tables: &'w [Table],
        entries: &'w Entries,
    ) -> Self {
        let (mask, arch) = match Q::mask(registry) {
            Some(mask) => (mask, 0),
            None => (Mask::EMPTY, tables.len()),
        };
        Self {
            registry,
            tables,
            entries,
            mask,
            arch,
            row: 0,
            _marker: PhantomData,
        }
    }
}

impl<'w, Q: Query> Iterator for IterMut<'w, Q> {
    type Item = (EntityId, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let table = self.tables.get(self.arch)?;
            if table.has_all(self.mask) && self.row < table.len() {
                let row = self.row;
                self.row += 1;
                let slot = table.back_ref(row);
                let id = EntityId::new(slot, self.entries.generation(slot));
                let item = unsafe { Q::fetch_row(self.registry, table, row) };
                return Some((id, item));
            }
            self.arch += 1;
            self.row = 0;
        }
    }
}
