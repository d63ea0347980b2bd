//! Structural checks for a single heap object.
//!
//! The heap verifier calls [`verify_object`] for every object it walks,
//! after it has established that every reference points at the start of an
//! allocated object. Only the headers of referenced objects are read here.

use crate::header::{Header, ObjectType};
use crate::objects::{
    Context, FixedArray, IndexedObject, JsFunction, Map, Oddball,
    SloppyArgumentsElements, SloppyArgumentsObject,
};
use crate::{Value, WORD_SIZE};

/// Object type of the referent, or `None` for non-references and
/// uninitialized referents.
///
/// # Safety
///
/// If `value` is a reference it must point at a readable [`Header`].
pub unsafe fn referent_type(value: Value) -> Option<ObjectType> {
    if !value.is_ref() {
        return None;
    }
    // SAFETY: by contract
    let header = unsafe { &*(value.as_ptr::<Header>()) };
    header.try_object_type()
}

/// Length of a fixed-array-shaped referent.
///
/// # Safety
///
/// `value` must reference a fixed-array-like object.
unsafe fn referent_length(value: Value) -> Option<i64> {
    // SAFETY: by contract
    let array = unsafe { &*(value.as_ptr::<FixedArray>()) };
    array.raw_length().as_fixnum()
}

fn non_negative(value: Value) -> Option<usize> {
    value.as_fixnum().filter(|n| *n >= 0).map(|n| n as usize)
}

/// Check the object at `obj` against the invariants of its type.
///
/// # Safety
///
/// `obj` must point to an allocated object whose size was accepted by
/// [`object_size`](crate::object_size), and every reference it holds must
/// point at the header of an allocated object.
pub unsafe fn verify_object(obj: *const u8) -> Result<(), &'static str> {
    // SAFETY: by contract
    let header = unsafe { &*(obj as *const Header) };
    let ty = header.try_object_type().ok_or("invalid object type")?;

    // every layout has the map in the word after the header
    // SAFETY: by contract
    let map = unsafe { *(obj.add(WORD_SIZE) as *const Value) };
    // SAFETY: references point at allocated objects
    if unsafe { referent_type(map) } != Some(ObjectType::Map) {
        return Err("map is not a Map");
    }
    // SAFETY: checked above
    let map = unsafe { &*(map.as_ptr::<Map>()) };
    if map.raw_instance_type() != Value::from_usize(ty as usize) {
        return Err("map instance type does not match header");
    }

    // SAFETY: each arm casts to the layout named by the header
    unsafe {
        match ty {
            ObjectType::Map => verify_map(&*(obj as *const Map)),
            ObjectType::FixedArray => {
                verify_fixed_array(&*(obj as *const FixedArray)).map(|_| ())
            }
            ObjectType::SloppyArgumentsElements => verify_alias_map(
                &*(obj as *const SloppyArgumentsElements),
            ),
            ObjectType::Context => verify_context(&*(obj as *const Context)),
            ObjectType::Function => {
                verify_function(&*(obj as *const JsFunction))
            }
            ObjectType::Oddball => match (*(obj as *const Oddball)).kind() {
                Some(_) => Ok(()),
                None => Err("oddball kind is invalid"),
            },
            ObjectType::StrictArguments | ObjectType::Array => {
                verify_indexed(&*(obj as *const IndexedObject), false)
            }
            ObjectType::SloppyArguments => {
                let object = &*(obj as *const SloppyArgumentsObject);
                verify_indexed(&object.object, true)?;
                if referent_type(object.callee) != Some(ObjectType::Function) {
                    return Err("callee is not a function");
                }
                Ok(())
            }
        }
    }
}

fn verify_map(map: &Map) -> Result<(), &'static str> {
    let ty = map
        .raw_instance_type()
        .as_fixnum()
        .and_then(|n| u8::try_from(n).ok())
        .and_then(ObjectType::from_u8);
    if ty.is_none() {
        return Err("map instance type is invalid");
    }
    match non_negative(map.raw_instance_size()) {
        Some(size) if size.is_multiple_of(WORD_SIZE) => Ok(()),
        _ => Err("map instance size is invalid"),
    }
}

fn verify_fixed_array(array: &FixedArray) -> Result<usize, &'static str> {
    non_negative(array.raw_length()).ok_or("array length is not a fixnum")
}

/// # Safety
///
/// References held by `elements` point at allocated objects.
unsafe fn verify_alias_map(
    elements: &SloppyArgumentsElements,
) -> Result<(), &'static str> {
    let len = verify_fixed_array(elements)?;
    if len < SloppyArgumentsElements::PARAMETER_MAP_START {
        return Err("alias map is missing its back references");
    }
    // SAFETY: by contract
    unsafe {
        if referent_type(elements.context()) != Some(ObjectType::Context) {
            return Err("alias map context is not a Context");
        }
        if referent_type(elements.arguments()) != Some(ObjectType::FixedArray)
        {
            return Err("alias map arguments is not a FixedArray");
        }
        for entry in &elements.elements()[SloppyArgumentsElements::PARAMETER_MAP_START..] {
            let ok = entry.is_fixnum()
                || referent_type(*entry) == Some(ObjectType::Oddball);
            if !ok {
                return Err("alias map entry is neither an index nor the hole");
            }
        }
    }
    Ok(())
}

/// # Safety
///
/// References held by `context` point at allocated objects.
unsafe fn verify_context(context: &Context) -> Result<(), &'static str> {
    let len = verify_fixed_array(context)?;
    if len < Context::MIN_SLOTS {
        return Err("context is shorter than its fixed slots");
    }
    // SAFETY: by contract
    if unsafe { referent_type(context.native_context()) } != Some(ObjectType::Context) {
        return Err("native context is not a Context");
    }
    Ok(())
}

/// # Safety
///
/// References held by `function` point at allocated objects.
unsafe fn verify_function(function: &JsFunction) -> Result<(), &'static str> {
    // SAFETY: by contract
    if unsafe { referent_type(function.context) } != Some(ObjectType::Context) {
        return Err("function context is not a Context");
    }
    non_negative(function.raw_formal_parameter_count())
        .map(|_| ())
        .ok_or("formal parameter count is not a fixnum")
}

/// # Safety
///
/// References held by `object` point at allocated objects.
unsafe fn verify_indexed(
    object: &IndexedObject,
    sloppy: bool,
) -> Result<(), &'static str> {
    let length = non_negative(object.length).ok_or("length is not a fixnum")?;

    // SAFETY: by contract
    unsafe {
        if referent_type(object.properties) != Some(ObjectType::FixedArray) {
            return Err("properties is not a FixedArray");
        }
        let storage = match referent_type(object.elements) {
            Some(ObjectType::FixedArray) => object.elements,
            Some(ObjectType::SloppyArgumentsElements) if sloppy => {
                let alias = &*(object.elements.as_ptr::<SloppyArgumentsElements>());
                alias.arguments()
            }
            _ => return Err("elements is not a backing store"),
        };
        if referent_length(storage) != Some(length as i64) {
            return Err("length does not match backing store");
        }
    }
    Ok(())
}
