//! Element access on built arguments objects.
//!
//! For a mapped sloppy object, an index whose alias entry holds a context
//! slot index reads and writes that context slot; every other index reads
//! and writes the backing storage.
//!
//! All functions take the object as a handle and are `unsafe`: the handle
//! must reference a live arguments object (strict, sloppy or rest array)
//! built by this crate.

use object::{
    Context, FixedArray, IndexedObject, JsFunction, ObjectType,
    SloppyArgumentsElements, SloppyArgumentsObject, Tagged, Value,
    referent_type,
};

use crate::realm::ReadOnlyRoots;

/// # Safety
///
/// `object` must be a live arguments object.
#[inline]
pub unsafe fn length(object: Tagged<IndexedObject>) -> usize {
    // SAFETY: by contract
    unsafe { object.as_ref() }.len()
}

/// The invoked function, for sloppy objects only.
///
/// # Safety
///
/// `object` must be a live arguments object.
pub unsafe fn callee(object: Tagged<IndexedObject>) -> Option<Tagged<JsFunction>> {
    // SAFETY: by contract
    unsafe {
        if object.as_ref().header.object_type() != ObjectType::SloppyArguments {
            return None;
        }
        Some(Tagged::from_value(object.cast::<SloppyArgumentsObject>().as_ref().callee))
    }
}

/// # Safety
///
/// `object` must be a live arguments object.
pub unsafe fn alias_map(object: Tagged<IndexedObject>) -> Option<Tagged<SloppyArgumentsElements>> {
    // SAFETY: by contract
    unsafe {
        let elements = object.as_ref().elements;
        match referent_type(elements) {
            Some(ObjectType::SloppyArgumentsElements) => Some(Tagged::from_value(elements)),
            _ => None,
        }
    }
}

/// The array holding the unmapped values, through the alias map if there
/// is one.
///
/// # Safety
///
/// `object` must be a live arguments object.
pub unsafe fn backing_storage(object: Tagged<IndexedObject>) -> Tagged<FixedArray> {
    // SAFETY: by contract
    unsafe {
        match alias_map(object) {
            Some(alias) => Tagged::from_value(alias.as_ref().arguments()),
            None => Tagged::from_value(object.as_ref().elements),
        }
    }
}

/// The context slot index `index` aliases, if it is mapped.
///
/// # Safety
///
/// `object` must be a live arguments object.
pub unsafe fn mapped_context_index(object: Tagged<IndexedObject>, index: usize) -> Option<usize> {
    // SAFETY: by contract
    unsafe {
        let alias = alias_map(object)?;
        let entry = alias.as_ref().mapped_entry(index)?;
        entry.as_fixnum().map(|slot| slot as usize)
    }
}

/// The current value at `index`, or `None` past the end.
///
/// # Safety
///
/// `object` must be a live arguments object.
pub unsafe fn get_element(object: Tagged<IndexedObject>, index: usize) -> Option<Value> {
    // SAFETY: by contract
    unsafe {
        if index >= length(object) {
            return None;
        }
        if let Some(slot) = mapped_context_index(object, index) {
            let context = aliased_context(object);
            return context.as_ref().get(slot);
        }
        backing_storage(object).as_ref().get(index)
    }
}

/// Store `value` at `index`. Returns `false` past the end.
///
/// # Safety
///
/// `object` must be a live arguments object and no other reference to its
/// storage or context may be held across the call.
pub unsafe fn set_element(object: Tagged<IndexedObject>, index: usize, value: Value) -> bool {
    // SAFETY: by contract
    unsafe {
        if index >= length(object) {
            return false;
        }
        if let Some(slot) = mapped_context_index(object, index) {
            let context = aliased_context(object);
            return context.as_mut().set(slot, value);
        }
        backing_storage(object).as_mut().set(index, value)
    }
}

/// Break the aliasing of `index`: the live context value moves into the
/// storage and the alias entry becomes the hole. Returns whether the index
/// was mapped.
///
/// # Safety
///
/// Same as [`set_element`].
pub unsafe fn unmap_element(
    roots: &ReadOnlyRoots,
    object: Tagged<IndexedObject>,
    index: usize,
) -> bool {
    // SAFETY: by contract
    unsafe {
        let Some(slot) = mapped_context_index(object, index) else {
            return false;
        };
        let context = aliased_context(object);
        let Some(value) = context.as_ref().get(slot) else {
            return false;
        };
        backing_storage(object).as_mut().set(index, value);
        let Some(alias) = alias_map(object) else {
            return false;
        };
        alias.as_mut().set_mapped_entry(index, roots.the_hole.value())
    }
}

/// # Safety
///
/// `object` must be a mapped sloppy arguments object.
unsafe fn aliased_context(object: Tagged<IndexedObject>) -> Tagged<Context> {
    // SAFETY: by contract
    unsafe {
        let Some(alias) = alias_map(object) else {
            unreachable!("mapped index without an alias map");
        };
        Tagged::from_value(alias.as_ref().context())
    }
}

/// Read formal parameter `parameter` of a function with
/// `formal_parameter_count` formals from its context.
///
/// # Safety
///
/// `context` must be a live function context of such a function.
pub unsafe fn context_parameter(
    context: Tagged<Context>,
    formal_parameter_count: usize,
    parameter: usize,
) -> Option<Value> {
    if parameter >= formal_parameter_count {
        return None;
    }
    let slot = Context::parameter_slot(formal_parameter_count, parameter);
    // SAFETY: by contract
    unsafe { context.as_ref() }.get(slot)
}

/// # Safety
///
/// `context` must be a live function context of such a function.
pub unsafe fn set_context_parameter(
    context: Tagged<Context>,
    formal_parameter_count: usize,
    parameter: usize,
    value: Value,
) -> bool {
    if parameter >= formal_parameter_count {
        return false;
    }
    let slot = Context::parameter_slot(formal_parameter_count, parameter);
    // SAFETY: by contract
    unsafe { context.as_mut() }.set(slot, value)
}
