//! Single-shot allocation of an arguments object together with its backing
//! storage and, for the mapped variant, its alias map.
//!
//! ```text
//! [object: instance_size] [storage: 24 + n*8] [alias map: 24 + m*8]
//! ```
//!
//! The whole region comes from one young allocation, so nothing can observe
//! it between the request and the return. Every header word is written
//! here; storage and alias entries are zero (fixnum `0`) until the caller
//! fills them, which must happen before the next safepoint.

use heap::HeapProxy;
use log::trace;
use object::{
    FixedArray, Header, IndexedObject, Map, ObjectType, SloppyArgumentsElements,
    SloppyArgumentsObject, Tagged, Value, WORD_SIZE, fixed_array_allocation_size,
    init_fixed_array,
};

use crate::realm::ReadOnlyRoots;

/// Ceiling base for strict arguments: object plus one fixed array header.
pub const STRICT_ARGUMENTS_BASE_SIZE: usize = IndexedObject::SIZE + FixedArray::HEADER_SIZE;
/// Ceiling base for rest parameter arrays.
pub const REST_PARAMETERS_BASE_SIZE: usize = IndexedObject::SIZE + FixedArray::HEADER_SIZE;
/// Ceiling base for sloppy arguments without an alias map.
pub const SLOPPY_ARGUMENTS_BASE_SIZE: usize =
    SloppyArgumentsObject::SIZE + FixedArray::HEADER_SIZE;
/// Ceiling base for sloppy arguments with an alias map: storage and alias
/// map each carry a fixed array header.
pub const ALIASED_ARGUMENTS_BASE_SIZE: usize =
    SloppyArgumentsObject::SIZE + 2 * FixedArray::HEADER_SIZE;

/// The largest request the young generation serves inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YoungCeiling(usize);

impl YoungCeiling {
    pub const fn new(limit: usize) -> Self {
        Self(limit)
    }

    pub fn of(heap: &HeapProxy) -> Self {
        Self(heap.young_limit())
    }

    pub const fn limit(self) -> usize {
        self.0
    }

    /// `true` when `base_size` plus `element_count` tagged slots fits. A
    /// request exactly at the limit fits.
    #[inline]
    pub fn fits(self, element_count: usize, base_size: usize) -> bool {
        element_count
            .checked_mul(WORD_SIZE)
            .and_then(|bytes| bytes.checked_add(base_size))
            .is_some_and(|size| size <= self.0)
    }
}

/// Pointers into a compound allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompoundAllocation {
    pub object: Tagged<IndexedObject>,
    /// `None` for the header-only degenerate case.
    pub storage: Option<Tagged<FixedArray>>,
    pub alias_map: Option<Tagged<SloppyArgumentsElements>>,
}

/// Bytes needed for an object of `object_size` with `element_count`
/// storage slots and optionally an alias map of `alias_slots` slots.
pub const fn compound_size(
    object_size: usize,
    element_count: usize,
    alias_slots: Option<usize>,
) -> usize {
    let alias = match alias_slots {
        Some(slots) => fixed_array_allocation_size(slots),
        None => 0,
    };
    object_size + fixed_array_allocation_size(element_count) + alias
}

/// Allocate and stamp an arguments object described by `map`.
///
/// With `element_count == 0` and no alias map only the object is allocated
/// and `elements` is the shared empty fixed array. Otherwise storage (and
/// alias map) follow the object in the same region; `elements` points at
/// the alias map when there is one, else at the storage. `length` is always
/// `element_count`.
///
/// The caller pre-checks the request against the [`YoungCeiling`].
///
/// # Safety
///
/// `map` must be a live map whose instance type is an indexed object type.
pub unsafe fn allocate_arguments_object(
    heap: &mut HeapProxy,
    roots: &ReadOnlyRoots,
    map: Tagged<Map>,
    element_count: usize,
    alias_slots: Option<usize>,
) -> CompoundAllocation {
    // SAFETY: by contract
    let map_ref = unsafe { map.as_ref() };
    let object_type = map_ref.instance_type();
    let object_size = map_ref.instance_size();
    debug_assert!(object_type.is_indexed_object());
    debug_assert!(object_size >= IndexedObject::SIZE);

    let header_only = element_count == 0 && alias_slots.is_none();
    let size = if header_only {
        object_size
    } else {
        compound_size(object_size, element_count, alias_slots)
    };

    let base = heap.allocate_young(size).as_ptr();
    trace!(
        "compound allocation: {object_type:?}, {element_count} elements, alias {alias_slots:?}, {size} bytes"
    );

    let object = base as *mut IndexedObject;
    let empty = roots.empty_fixed_array.value();

    if header_only {
        // SAFETY: the region is at least object_size bytes
        unsafe { write_object(object, object_type, map.value(), empty, empty, 0) };
        return CompoundAllocation {
            object: Tagged::from_ptr(object),
            storage: None,
            alias_map: None,
        };
    }

    // SAFETY: all offsets stay within the region sized by compound_size
    unsafe {
        let storage = base.add(object_size) as *mut FixedArray;
        init_fixed_array(
            storage,
            ObjectType::FixedArray,
            roots.fixed_array_map.value(),
            element_count,
        );

        let alias_map = alias_slots.map(|slots| {
            let ptr = (storage as *mut u8).add(fixed_array_allocation_size(element_count))
                as *mut FixedArray;
            init_fixed_array(
                ptr,
                ObjectType::SloppyArgumentsElements,
                roots.sloppy_arguments_elements_map.value(),
                slots,
            );
            ptr as *mut SloppyArgumentsElements
        });

        let elements = match alias_map {
            Some(alias) => Value::from_ptr(alias),
            None => Value::from_ptr(storage),
        };
        write_object(object, object_type, map.value(), empty, elements, element_count);

        CompoundAllocation {
            object: Tagged::from_ptr(object),
            storage: Some(Tagged::from_ptr(storage)),
            alias_map: alias_map.map(|ptr| Tagged::from_ptr(ptr)),
        }
    }
}

/// # Safety
///
/// `object` must point to at least [`IndexedObject::SIZE`] writable bytes.
#[inline(always)]
unsafe fn write_object(
    object: *mut IndexedObject,
    object_type: ObjectType,
    map: Value,
    properties: Value,
    elements: Value,
    length: usize,
) {
    // SAFETY: by contract
    unsafe {
        object.write(IndexedObject {
            header: Header::new(object_type),
            map,
            properties,
            elements,
            length: Value::from_usize(length),
        })
    };
}
