use core::ops::{Deref, DerefMut};

use crate::header::{Header, ObjectType};
use crate::{Value, WORD_SIZE};

// ── Map ────────────────────────────────────────────────────────────

/// A type descriptor: the shape stamped on every object that points to it.
///
/// ```text
/// [Header 8B] [map: Value 8B] [instance_type 8B] [instance_size 8B] [prototype 8B]
/// ```
///
/// `instance_type` and `instance_size` are fixnums. The `map` field points
/// to the self-describing `map_map`.
#[repr(C)]
pub struct Map {
    pub header: Header,
    pub map: Value,
    instance_type: Value,
    instance_size: Value,
    pub prototype: Value,
}

const _: () = assert!(size_of::<Map>() == 40);

impl Map {
    pub const SIZE: usize = size_of::<Map>();

    #[inline(always)]
    pub fn instance_type(&self) -> ObjectType {
        let raw = self.instance_type.as_fixnum().unwrap_or(-1);
        match u8::try_from(raw).ok().and_then(ObjectType::from_u8) {
            Some(ty) => ty,
            None => unreachable!("map with invalid instance type {raw}"),
        }
    }

    #[inline(always)]
    pub fn raw_instance_type(&self) -> Value {
        self.instance_type
    }

    /// Size in bytes of the fixed part of an instance.
    #[inline(always)]
    pub fn instance_size(&self) -> usize {
        // SAFETY: always written as a fixnum by `init_map`
        unsafe { self.instance_size.to_usize() }
    }

    #[inline(always)]
    pub fn raw_instance_size(&self) -> Value {
        self.instance_size
    }
}

/// Initialize a map at a raw allocation.
///
/// # Safety
///
/// `ptr` must point to at least [`Map::SIZE`] writable bytes.
pub unsafe fn init_map(
    ptr: *mut Map,
    map_map: Value,
    instance_type: ObjectType,
    instance_size: usize,
    prototype: Value,
) {
    // SAFETY: by contract
    unsafe {
        ptr.write(Map {
            header: Header::new(ObjectType::Map),
            map: map_map,
            instance_type: Value::from_usize(instance_type as usize),
            instance_size: Value::from_usize(instance_size),
            prototype,
        })
    };
}

// ── FixedArray ─────────────────────────────────────────────────────

/// A variable-length array of tagged [`Value`]s with a tagged length.
///
/// ```text
/// [Header 8B] [map: Value 8B] [length: fixnum 8B] [elem_0 8B] [elem_1 8B] ...
/// ```
///
/// Used for argument backing storage, and as the layout of
/// [`SloppyArgumentsElements`] and [`Context`].
#[repr(C)]
pub struct FixedArray {
    pub header: Header,
    pub map: Value,
    length: Value,
}

const _: () = assert!(size_of::<FixedArray>() == 24);

impl FixedArray {
    /// Bytes before the first element.
    pub const HEADER_SIZE: usize = size_of::<FixedArray>();

    /// Byte offset of element `index` from the start of the array.
    #[inline(always)]
    pub const fn offset_of_element_at(index: usize) -> usize {
        Self::HEADER_SIZE + index * WORD_SIZE
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        // SAFETY: always written as a fixnum by `init_fixed_array`
        unsafe { self.length.to_usize() }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn raw_length(&self) -> Value {
        self.length
    }

    #[inline(always)]
    pub fn elements_ptr(&self) -> *const Value {
        // SAFETY: elements start right after the fixed part
        unsafe { (self as *const FixedArray).add(1) as *const Value }
    }

    #[inline(always)]
    pub fn elements_mut_ptr(&mut self) -> *mut Value {
        // SAFETY: elements start right after the fixed part
        unsafe { (self as *mut FixedArray).add(1) as *mut Value }
    }

    #[inline(always)]
    pub fn elements(&self) -> &[Value] {
        // SAFETY: arrays are allocated with `len()` trailing slots
        unsafe { core::slice::from_raw_parts(self.elements_ptr(), self.len()) }
    }

    #[inline(always)]
    pub fn elements_mut(&mut self) -> &mut [Value] {
        let len = self.len();
        // SAFETY: arrays are allocated with `len()` trailing slots
        unsafe { core::slice::from_raw_parts_mut(self.elements_mut_ptr(), len) }
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> Option<Value> {
        if index < self.len() {
            // SAFETY: checked
            Some(unsafe { self.get_unchecked(index) })
        } else {
            None
        }
    }

    #[inline(always)]
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        if index < self.len() {
            // SAFETY: checked
            unsafe { self.set_unchecked(index, value) };
            true
        } else {
            false
        }
    }

    /// # Safety
    ///
    /// `index < len()`.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, index: usize) -> Value {
        debug_assert!(index < self.len());
        // SAFETY: by contract
        unsafe { self.elements_ptr().add(index).read() }
    }

    /// # Safety
    ///
    /// `index < len()`.
    #[inline(always)]
    pub unsafe fn set_unchecked(&mut self, index: usize, value: Value) {
        debug_assert!(index < self.len());
        // SAFETY: by contract
        unsafe { self.elements_mut_ptr().add(index).write(value) };
    }

    /// Total allocation size in bytes.
    #[inline(always)]
    pub fn byte_size(&self) -> usize {
        fixed_array_allocation_size(self.len())
    }
}

/// Compute the total allocation size for a fixed-array-shaped object with
/// `length` elements.
pub const fn fixed_array_allocation_size(length: usize) -> usize {
    FixedArray::offset_of_element_at(length)
}

/// Write the fixed part (header, map, length) of a fixed-array-shaped object.
/// Elements are left for the caller.
///
/// # Safety
///
/// `ptr` must point to at least `fixed_array_allocation_size(length)`
/// writable bytes and `ty` must be fixed-array-like.
pub unsafe fn init_fixed_array(
    ptr: *mut FixedArray,
    ty: ObjectType,
    map: Value,
    length: usize,
) {
    debug_assert!(ty.is_fixed_array_like());
    // SAFETY: by contract
    unsafe {
        ptr.write(FixedArray {
            header: Header::new(ty),
            map,
            length: Value::from_usize(length),
        })
    };
}

// ── SloppyArgumentsElements ────────────────────────────────────────

/// The alias map of a mapped arguments object.
///
/// ```text
/// [FixedArray header] [context] [arguments] [entry_0] ... [entry_{n-1}]
/// ```
///
/// `entry_i` is either a fixnum context slot index (argument `i` lives in
/// the context) or the hole (read the backing storage instead).
#[repr(transparent)]
pub struct SloppyArgumentsElements(FixedArray);

impl SloppyArgumentsElements {
    pub const CONTEXT_INDEX: usize = 0;
    pub const ARGUMENTS_INDEX: usize = 1;
    /// Number of fixed back-reference slots before the entries.
    pub const PARAMETER_MAP_START: usize = 2;

    #[inline(always)]
    pub fn context(&self) -> Value {
        // SAFETY: alias maps always have the two fixed slots
        unsafe { self.0.get_unchecked(Self::CONTEXT_INDEX) }
    }

    #[inline(always)]
    pub fn arguments(&self) -> Value {
        // SAFETY: alias maps always have the two fixed slots
        unsafe { self.0.get_unchecked(Self::ARGUMENTS_INDEX) }
    }

    #[inline(always)]
    pub fn mapped_count(&self) -> usize {
        self.0.len() - Self::PARAMETER_MAP_START
    }

    #[inline(always)]
    pub fn mapped_entry(&self, index: usize) -> Option<Value> {
        if index < self.mapped_count() {
            self.0.get(Self::PARAMETER_MAP_START + index)
        } else {
            None
        }
    }

    #[inline(always)]
    pub fn set_mapped_entry(&mut self, index: usize, value: Value) -> bool {
        index < self.mapped_count()
            && self.0.set(Self::PARAMETER_MAP_START + index, value)
    }
}

impl Deref for SloppyArgumentsElements {
    type Target = FixedArray;
    fn deref(&self) -> &FixedArray {
        &self.0
    }
}

impl DerefMut for SloppyArgumentsElements {
    fn deref_mut(&mut self) -> &mut FixedArray {
        &mut self.0
    }
}

// ── Context ────────────────────────────────────────────────────────

/// A scope context: fixed-array-shaped, with two fixed slots followed by
/// context-allocated variables.
///
/// Function contexts store the formal parameters in reverse declaration
/// order: parameter `p` of an `n`-parameter function lives in slot
/// `CONTEXT_MIN_SLOTS + n - 1 - p`.
#[repr(transparent)]
pub struct Context(FixedArray);

impl Context {
    pub const PREVIOUS_INDEX: usize = 0;
    pub const NATIVE_CONTEXT_INDEX: usize = 1;
    pub const MIN_SLOTS: usize = 2;

    #[inline(always)]
    pub fn previous(&self) -> Value {
        // SAFETY: contexts always have the fixed slots
        unsafe { self.0.get_unchecked(Self::PREVIOUS_INDEX) }
    }

    #[inline(always)]
    pub fn native_context(&self) -> Value {
        // SAFETY: contexts always have the fixed slots
        unsafe { self.0.get_unchecked(Self::NATIVE_CONTEXT_INDEX) }
    }

    /// Context slot index holding parameter `parameter` of a function with
    /// `formal_parameter_count` formals.
    #[inline(always)]
    pub const fn parameter_slot(
        formal_parameter_count: usize,
        parameter: usize,
    ) -> usize {
        Self::MIN_SLOTS + formal_parameter_count - 1 - parameter
    }
}

impl Deref for Context {
    type Target = FixedArray;
    fn deref(&self) -> &FixedArray {
        &self.0
    }
}

impl DerefMut for Context {
    fn deref_mut(&mut self) -> &mut FixedArray {
        &mut self.0
    }
}

// ── JsFunction ─────────────────────────────────────────────────────

/// A closure: its defining context and declared parameter count.
///
/// ```text
/// [Header 8B] [map 8B] [context 8B] [formal_parameter_count 8B]
/// ```
#[repr(C)]
pub struct JsFunction {
    pub header: Header,
    pub map: Value,
    pub context: Value,
    formal_parameter_count: Value,
}

const _: () = assert!(size_of::<JsFunction>() == 32);

impl JsFunction {
    pub const SIZE: usize = size_of::<JsFunction>();

    #[inline(always)]
    pub fn formal_parameter_count(&self) -> usize {
        // SAFETY: always written as a fixnum by `init_function`
        unsafe { self.formal_parameter_count.to_usize() }
    }

    #[inline(always)]
    pub fn raw_formal_parameter_count(&self) -> Value {
        self.formal_parameter_count
    }
}

/// # Safety
///
/// `ptr` must point to at least [`JsFunction::SIZE`] writable bytes.
pub unsafe fn init_function(
    ptr: *mut JsFunction,
    map: Value,
    context: Value,
    formal_parameter_count: usize,
) {
    // SAFETY: by contract
    unsafe {
        ptr.write(JsFunction {
            header: Header::new(ObjectType::Function),
            map,
            context,
            formal_parameter_count: Value::from_usize(formal_parameter_count),
        })
    };
}

// ── Oddball ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OddballKind {
    Hole = 0,
    Undefined = 1,
}

/// Distinguished singleton values.
///
/// ```text
/// [Header 8B] [map 8B] [kind: fixnum 8B]
/// ```
#[repr(C)]
pub struct Oddball {
    pub header: Header,
    pub map: Value,
    kind: Value,
}

const _: () = assert!(size_of::<Oddball>() == 24);

impl Oddball {
    pub const SIZE: usize = size_of::<Oddball>();

    #[inline(always)]
    pub fn kind(&self) -> Option<OddballKind> {
        match self.kind.as_fixnum()? {
            0 => Some(OddballKind::Hole),
            1 => Some(OddballKind::Undefined),
            _ => None,
        }
    }
}

/// # Safety
///
/// `ptr` must point to at least [`Oddball::SIZE`] writable bytes.
pub unsafe fn init_oddball(ptr: *mut Oddball, map: Value, kind: OddballKind) {
    // SAFETY: by contract
    unsafe {
        ptr.write(Oddball {
            header: Header::new(ObjectType::Oddball),
            map,
            kind: Value::from_usize(kind as usize),
        })
    };
}

// ── IndexedObject ──────────────────────────────────────────────────

/// An object with indexed elements and a tagged length: the layout of
/// strict arguments objects and arrays, and the prefix of
/// [`SloppyArgumentsObject`].
///
/// ```text
/// [Header 8B] [map 8B] [properties 8B] [elements 8B] [length 8B]
/// ```
#[repr(C)]
pub struct IndexedObject {
    pub header: Header,
    pub map: Value,
    pub properties: Value,
    pub elements: Value,
    pub length: Value,
}

const _: () = assert!(size_of::<IndexedObject>() == 40);

impl IndexedObject {
    pub const SIZE: usize = size_of::<IndexedObject>();

    #[inline(always)]
    pub fn len(&self) -> usize {
        // SAFETY: builders always write a fixnum length
        unsafe { self.length.to_usize() }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A mapped (sloppy-mode) arguments object.
///
/// ```text
/// [IndexedObject 40B] [callee 8B]
/// ```
#[repr(C)]
pub struct SloppyArgumentsObject {
    pub object: IndexedObject,
    pub callee: Value,
}

const _: () = assert!(size_of::<SloppyArgumentsObject>() == 48);

impl SloppyArgumentsObject {
    pub const SIZE: usize = size_of::<SloppyArgumentsObject>();
}

impl Deref for SloppyArgumentsObject {
    type Target = IndexedObject;
    fn deref(&self) -> &IndexedObject {
        &self.object
    }
}

impl DerefMut for SloppyArgumentsObject {
    fn deref_mut(&mut self) -> &mut IndexedObject {
        &mut self.object
    }
}
