//! Object walking: size and reference edges of any heap object, keyed off
//! the header's object type.

use crate::header::{Header, ObjectType};
use crate::objects::{
    FixedArray, IndexedObject, JsFunction, Map, Oddball, SloppyArgumentsObject,
    fixed_array_allocation_size,
};
use crate::Value;

/// Total size in bytes of the object at `obj`, or `0` when the header or
/// length field cannot be interpreted.
///
/// # Safety
///
/// `obj` must point to at least a readable [`Header`]; for fixed-array-like
/// types the length word must be readable as well.
pub unsafe fn object_size(obj: *const u8) -> usize {
    // SAFETY: by contract
    let header = unsafe { &*(obj as *const Header) };
    let Some(ty) = header.try_object_type() else {
        return 0;
    };
    match ty {
        ObjectType::Map => Map::SIZE,
        ObjectType::FixedArray
        | ObjectType::SloppyArgumentsElements
        | ObjectType::Context => {
            // SAFETY: fixed-array-like types share the FixedArray prefix
            let array = unsafe { &*(obj as *const FixedArray) };
            match array.raw_length().as_fixnum() {
                Some(n) if n >= 0 => fixed_array_allocation_size(n as usize),
                _ => 0,
            }
        }
        ObjectType::Function => JsFunction::SIZE,
        ObjectType::Oddball => Oddball::SIZE,
        ObjectType::StrictArguments | ObjectType::Array => IndexedObject::SIZE,
        ObjectType::SloppyArguments => SloppyArgumentsObject::SIZE,
    }
}

/// Visit every tagged field of the object at `obj` that may hold a
/// reference.
///
/// # Safety
///
/// `obj` must point to a live, initialized heap object.
pub unsafe fn trace_object(obj: *const u8, visitor: &mut dyn FnMut(&mut Value)) {
    // SAFETY: by contract
    let header = unsafe { &*(obj as *const Header) };
    let Some(ty) = header.try_object_type() else {
        return;
    };
    let obj = obj as *mut u8;

    // SAFETY: each arm casts to the layout named by the header
    unsafe {
        match ty {
            ObjectType::Map => {
                let map = &mut *(obj as *mut Map);
                visitor(&mut map.map);
                visitor(&mut map.prototype);
            }
            ObjectType::FixedArray
            | ObjectType::SloppyArgumentsElements
            | ObjectType::Context => {
                let array = &mut *(obj as *mut FixedArray);
                visitor(&mut array.map);
                if array.raw_length().as_fixnum().is_some_and(|n| n >= 0) {
                    for slot in array.elements_mut() {
                        visitor(slot);
                    }
                }
            }
            ObjectType::Function => {
                let function = &mut *(obj as *mut JsFunction);
                visitor(&mut function.map);
                visitor(&mut function.context);
            }
            ObjectType::Oddball => {
                let oddball = &mut *(obj as *mut Oddball);
                visitor(&mut oddball.map);
            }
            ObjectType::StrictArguments | ObjectType::Array => {
                trace_indexed(&mut *(obj as *mut IndexedObject), visitor);
            }
            ObjectType::SloppyArguments => {
                let object = &mut *(obj as *mut SloppyArgumentsObject);
                trace_indexed(&mut object.object, visitor);
                visitor(&mut object.callee);
            }
        }
    }
}

fn trace_indexed(object: &mut IndexedObject, visitor: &mut dyn FnMut(&mut Value)) {
    visitor(&mut object.map);
    visitor(&mut object.properties);
    visitor(&mut object.elements);
}
