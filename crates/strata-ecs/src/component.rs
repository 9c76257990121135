//! Component type registration and metadata.
//!
//! Every component type observed by the ECS is registered in a [`Registry`],
//! which mints a dense [`ComponentId`] per distinct Rust type and records the
//! type's size and alignment. Registration happens lazily, the first time a
//! type appears in a [`create`](crate::world::World::create) row or an
//! [`add`](crate::world::World::add) call; IDs are assigned in
//! first-observation order.
//!
//! The registry is a field of the [`World`](crate::world::World), so separate
//! worlds carry disjoint component universes.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use crate::EcsError;

/// Width of the component universe. A [`Mask`](crate::mask::Mask) fits in one
/// machine word because of this cap.
pub const MAX_COMPONENTS: usize = 64;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Marker trait for component types.
///
/// Components are plain data: migrating an entity between archetypes copies
/// its bytes, and deleting an entity vacates its row without running any
/// destructor. The `Copy` bound is what makes both operations sound.
///
/// ```
/// use strata_ecs::prelude::*;
///
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// struct Position { x: f32, y: f32 }
/// impl Component for Position {}
/// ```
pub trait Component: Copy + Send + Sync + 'static {}

// ---------------------------------------------------------------------------
// ComponentId
// ---------------------------------------------------------------------------

/// Opaque dense identifier for a registered component type. Always less than
/// [`MAX_COMPONENTS`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) u8);

impl ComponentId {
    /// The ID as an index into per-component tables.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata recorded for a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// ID minted at registration time.
    pub id: ComponentId,
    /// `std::any::type_name` of the component, for diagnostics.
    pub name: &'static str,
    /// `std::mem::size_of::<T>()`
    pub size: usize,
    /// `std::mem::align_of::<T>()` (always a power of two)
    pub align: usize,
    /// Rust `TypeId`, the registration key.
    pub type_id: TypeId,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps Rust component types to [`ComponentId`]s and their metadata.
///
/// Grow-only: types are never unregistered. At most [`MAX_COMPONENTS`]
/// distinct types can be observed per registry; the next registration fails
/// with [`EcsError::ComponentUniverseFull`].
#[derive(Debug, Default)]
pub struct Registry {
    /// TypeId -> ComponentId, the dedup map.
    by_type: HashMap<TypeId, ComponentId>,
    /// Indexed by `ComponentId.0`.
    infos: Vec<ComponentInfo>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            infos: Vec::new(),
        }
    }

    /// Register a component type, returning its ID.
    ///
    /// Idempotent: re-registering a known type returns the existing ID.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentUniverseFull`] if this would be the
    /// `MAX_COMPONENTS + 1`-th distinct type.
    pub fn register<T: Component>(&mut self) -> Result<ComponentId, EcsError> {
        let rust_type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&rust_type_id) {
            return Ok(existing);
        }
        if self.infos.len() == MAX_COMPONENTS {
            return Err(EcsError::ComponentUniverseFull);
        }

        let id = ComponentId(self.infos.len() as u8);
        self.infos.push(ComponentInfo {
            id,
            name: std::any::type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            type_id: rust_type_id,
        });
        self.by_type.insert(rust_type_id, id);
        tracing::trace!(id = id.index(), name = std::any::type_name::<T>(), "registered component type");
        Ok(id)
    }

    /// Look up the ID of an already-registered type.
    pub fn id_of<T: Component>(&self) -> Option<ComponentId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Metadata for a registered ID.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not minted by this registry.
    pub fn info(&self, id: ComponentId) -> &ComponentInfo {
        &self.infos[id.index()]
    }

    /// Number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
