//! Archetype tables: dense, row-major packed storage.
//!
//! A [`Table`] holds every entity whose component set is exactly the table's
//! [`Mask`]. Rows are packed into one raw byte buffer: row `i` occupies
//! `buffer[i*stride .. (i+1)*stride]`, and within a row each component sits
//! at an offset computed by [`RowLayout`]: components in ascending
//! component-ID order, each placed at the least offset past the previous one
//! that satisfies its alignment. A parallel `back_refs` vector records, per
//! row, the entry-table slot that currently points at it.
//!
//! # Safety
//!
//! This module is the unsafe core of the crate. All pointer arithmetic into
//! table buffers lives here, behind typed accessors whose contracts are
//! checked by the [`World`](crate::world::World): a component pointer is only
//! produced for an ID the table's mask contains, and the concrete Rust type
//! is the one registered under that ID. Components are `Copy`, so byte copies
//! between tables and vacating rows without destructors are sound.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::{self, NonNull};

use crate::component::{Component, ComponentId, Registry, MAX_COMPONENTS};
use crate::mask::Mask;
use crate::EcsError;

/// Rows reserved by the first insert into an empty table.
const FIRST_CAPACITY: u32 = 8;

/// Debug-build fill pattern for vacated row bytes.
#[cfg(debug_assertions)]
const POISON: u8 = 0xDD;

#[inline]
fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

// ---------------------------------------------------------------------------
// RowLayout
// ---------------------------------------------------------------------------

/// Byte layout of one row, derived from a mask and the registry.
///
/// The stride is padded up to the row alignment so that every row base is
/// properly aligned for every component in it; per-component offsets within
/// the row are unaffected by the padding.
pub struct RowLayout {
    stride: usize,
    align: usize,
    offsets: [u32; MAX_COMPONENTS],
    sizes: [u32; MAX_COMPONENTS],
}

impl RowLayout {
    /// Replay the placement rule over `mask`'s IDs in ascending order.
    fn of(mask: Mask, registry: &Registry) -> RowLayout {
        debug_assert!(!mask.is_empty(), "empty-component archetypes are disallowed");
        let mut offsets = [0u32; MAX_COMPONENTS];
        let mut sizes = [0u32; MAX_COMPONENTS];
        let mut cursor = 0usize;
        let mut align = 1usize;
        for id in mask.iter() {
            let info = registry.info(id);
            cursor = round_up(cursor, info.align);
            offsets[id.index()] = cursor as u32;
            sizes[id.index()] = info.size as u32;
            cursor += info.size;
            align = align.max(info.align);
        }
        // A row of only zero-sized components still occupies one byte so
        // capacity arithmetic stays nonzero.
        let stride = round_up(cursor, align).max(1);
        RowLayout {
            stride,
            align,
            offsets,
            sizes,
        }
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Byte offset of `id` within a row. Only meaningful for IDs in the mask
    /// this layout was computed from.
    #[inline]
    fn offset(&self, id: ComponentId) -> usize {
        self.offsets[id.index()] as usize
    }

    #[inline]
    fn size(&self, id: ComponentId) -> usize {
        self.sizes[id.index()] as usize
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Dense storage for every entity bearing exactly one component set.
pub struct Table {
    mask: Mask,
    layout: RowLayout,
    /// Buffer base, aligned to `layout.align()`. Dangling while `cap == 0`.
    buf: NonNull<u8>,
    /// Capacity in rows.
    cap: u32,
    /// Row -> entry-table slot. Its length is the table's row count.
    back_refs: Vec<u32>,
}

// The buffer only ever holds component values, and `Component` requires
// `Send + Sync`.
unsafe impl Send for Table {}
unsafe impl Sync for Table {}

impl Table {
    /// An empty table for `mask`, with zero capacity.
    pub(crate) fn new(mask: Mask, registry: &Registry) -> Table {
        let layout = RowLayout::of(mask, registry);
        let dangling = layout.align() as *mut u8;
        Table {
            mask,
            buf: NonNull::new(dangling).expect("alignment is nonzero"),
            cap: 0,
            back_refs: Vec::new(),
            layout,
        }
    }

    #[inline]
    pub fn mask(&self) -> Mask {
        self.mask
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> u32 {
        self.back_refs.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.back_refs.is_empty()
    }

    #[inline]
    pub fn has(&self, id: ComponentId) -> bool {
        self.mask.contains(id)
    }

    #[inline]
    pub fn has_all(&self, mask: Mask) -> bool {
        self.mask.contains_all(mask)
    }

    #[inline]
    pub fn has_exact(&self, mask: Mask) -> bool {
        self.mask == mask
    }

    #[inline]
    pub(crate) fn layout(&self) -> &RowLayout {
        &self.layout
    }

    #[inline]
    pub(crate) fn back_ref(&self, row: u32) -> u32 {
        self.back_refs[row as usize]
    }

    #[inline]
    pub(crate) fn set_back_ref(&mut self, row: u32, slot: u32) {
        self.back_refs[row as usize] = slot;
    }

    // -- growth -------------------------------------------------------------

    /// Double the capacity (first grow: [`FIRST_CAPACITY`] rows), attempting
    /// in-place extension via `realloc`. On failure the table is unchanged.
    fn grow(&mut self) -> Result<(), EcsError> {
        let new_cap = if self.cap == 0 {
            FIRST_CAPACITY
        } else {
            self.cap.checked_mul(2).ok_or(EcsError::OutOfMemory)?
        };
        let stride = self.layout.stride();
        let new_bytes = (new_cap as usize)
            .checked_mul(stride)
            .ok_or(EcsError::OutOfMemory)?;
        let new_layout =
            Layout::from_size_align(new_bytes, self.layout.align()).map_err(|_| EcsError::OutOfMemory)?;

        let ptr = unsafe {
            if self.cap == 0 {
                alloc::alloc(new_layout)
            } else {
                let old_layout =
                    Layout::from_size_align(self.cap as usize * stride, self.layout.align())
                        .expect("old layout was valid at the previous grow");
                alloc::realloc(self.buf.as_ptr(), old_layout, new_bytes)
            }
        };
        self.buf = NonNull::new(ptr).ok_or(EcsError::OutOfMemory)?;
        self.cap = new_cap;
        Ok(())
    }

    // -- row lifecycle ------------------------------------------------------

    /// Reserve one zeroed row and append `back_ref` to the back-ref vector.
    /// Returns the new row index. On allocation failure nothing is reserved.
    pub(crate) fn new_row(&mut self, back_ref: u32) -> Result<u32, EcsError> {
        if self.len() == self.cap {
            self.grow()?;
        }
        let row = self.len();
        unsafe {
            ptr::write_bytes(self.row_ptr(row), 0, self.layout.stride());
        }
        self.back_refs.push(back_ref);
        Ok(row)
    }

    /// Reserve a row in `self` and copy into it every component present in
    /// both `self`'s and `src`'s masks, from `src`'s row. Components only in
    /// `self` are left zeroed for the caller to initialize. The back-ref is
    /// inherited from the source row.
    pub(crate) fn copy_from(&mut self, src: &Table, src_row: u32) -> Result<u32, EcsError> {
        let dst_row = self.new_row(src.back_ref(src_row))?;
        for id in self.mask.intersection(src.mask).iter() {
            let size = self.layout.size(id);
            if size == 0 {
                continue;
            }
            unsafe {
                ptr::copy_nonoverlapping(src.comp_ptr(src_row, id), self.comp_ptr(dst_row, id), size);
            }
        }
        Ok(dst_row)
    }

    /// Swap-remove row `row`: the last row's bytes and back-ref move into its
    /// place. Returns the back-ref of the row that moved so the caller can
    /// patch the entry table; when `row` was the last row, the returned
    /// back-ref is that row's own and nothing moved.
    pub(crate) fn delete(&mut self, row: u32) -> u32 {
        debug_assert!(row < self.len());
        let last = self.len() - 1;
        let moved = self.back_refs[last as usize];
        if row != last {
            unsafe {
                ptr::copy_nonoverlapping(self.row_ptr(last), self.row_ptr(row), self.layout.stride());
            }
        }
        self.back_refs.swap_remove(row as usize);
        #[cfg(debug_assertions)]
        unsafe {
            ptr::write_bytes(self.row_ptr(last), POISON, self.layout.stride());
        }
        moved
    }

    // -- raw access ---------------------------------------------------------

    #[inline]
    fn row_ptr(&self, row: u32) -> *mut u8 {
        debug_assert!(row < self.cap);
        unsafe { self.buf.as_ptr().add(row as usize * self.layout.stride()) }
    }

    /// Pointer to `id`'s bytes in `row`. The pointer derives from the
    /// buffer's `NonNull`, so it may be written through when the caller holds
    /// exclusive access to the table.
    #[inline]
    pub(crate) fn comp_ptr(&self, row: u32, id: ComponentId) -> *mut u8 {
        debug_assert!(row < self.len());
        debug_assert!(self.mask.contains(id));
        unsafe {
            self.buf
                .as_ptr()
                .add(row as usize * self.layout.stride() + self.layout.offset(id))
        }
    }

    // -- typed access -------------------------------------------------------

    /// Shared reference to the `T` stored under `id` in `row`.
    ///
    /// # Safety
    ///
    /// `T` must be the type registered under `id`, and `id` must be in this
    /// table's mask with `row < len`.
    #[inline]
    pub(crate) unsafe fn comp_ref<T: Component>(&self, row: u32, id: ComponentId) -> &T {
        &*(self.comp_ptr(row, id) as *const T)
    }

    /// Mutable reference to the `T` stored under `id` in `row`.
    ///
    /// # Safety
    ///
    /// Same as [`comp_ref`](Self::comp_ref).
    #[inline]
    pub(crate) unsafe fn comp_mut<T: Component>(&mut self, row: u32, id: ComponentId) -> &mut T {
        &mut *(self.comp_ptr(row, id) as *mut T)
    }

    /// Move `value` into `id`'s slot in `row`.
    ///
    /// # Safety
    ///
    /// Same as [`comp_ref`](Self::comp_ref).
    #[inline]
    pub(crate) unsafe fn write_comp<T: Component>(&mut self, row: u32, id: ComponentId, value: T) {
        ptr::write(self.comp_ptr(row, id) as *mut T, value);
    }

    /// Contiguous typed view of a single-component table. With exactly one
    /// component the stride equals `size_of::<T>()`, so the buffer is a plain
    /// array of `T`.
    ///
    /// # Safety
    ///
    /// The table must store exactly one component and `T` must be its
    /// registered type.
    pub(crate) unsafe fn values<T: Component>(&self) -> &[T] {
        debug_assert_eq!(self.mask.count(), 1);
        debug_assert!(std::mem::size_of::<T>() == 0 || self.layout.stride() == std::mem::size_of::<T>());
        std::slice::from_raw_parts(self.buf.as_ptr() as *const T, self.len() as usize)
    }

    /// Mutable counterpart of [`values`](Self::values).
    ///
    /// # Safety
    ///
    /// Same as [`values`](Self::values).
    pub(crate) unsafe fn values_mut<T: Component>(&mut self) -> &mut [T] {
        debug_assert_eq!(self.mask.count(), 1);
        debug_assert!(std::mem::size_of::<T>() == 0 || self.layout.stride() == std::mem::size_of::<T>());
        std::slice::from_raw_parts_mut(self.buf.as_ptr() as *mut T, self.len() as usize)
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if self.cap > 0 {
            let bytes = self.cap as usize * self.layout.stride();
            let layout = Layout::from_size_align(bytes, self.layout.align())
                .expect("layout was valid at alloc time");
            unsafe { alloc::dealloc(self.buf.as_ptr(), layout) };
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("mask", &self.mask)
            .field("len", &self.len())
            .field("cap", &self.cap)
            .field("stride", &self.layout.stride())
            .field("align", &self.layout.align())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
