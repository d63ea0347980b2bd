//! Bootstrapping: the read-only roots, the native context holding the
//! arguments maps, and helpers for creating functions and their contexts.

use std::alloc::Layout;

use heap::{Heap, HeapProxy, HeapSettings, ObjectModel};
use object::{
    Context, FixedArray, HeaderFlags, IndexedObject, JsFunction, Map,
    ObjectType, Oddball, OddballKind, SloppyArgumentsObject, Tagged, Value,
    fixed_array_allocation_size, init_fixed_array, init_function, init_map,
    init_oddball,
};

/// The object model of this crate's heap objects.
pub fn object_model() -> ObjectModel {
    ObjectModel {
        size_fn: object::object_size,
        trace_fn: object::trace_object,
        verify_fn: object::verify_object,
    }
}

#[must_use]
pub fn new_heap(settings: HeapSettings) -> Heap {
    Heap::new(settings, object_model())
}

/// Slots of the native context after [`Context::MIN_SLOTS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum NativeContextSlot {
    StrictArgumentsMap = Context::MIN_SLOTS,
    SloppyArgumentsMap,
    FastAliasedArgumentsMap,
    JsArrayFastElementsMap,
}

impl NativeContextSlot {
    pub const COUNT: usize = 4;
    pub const LENGTH: usize = Context::MIN_SLOTS + Self::COUNT;
}

/// Immutable singletons shared by every object in the heap.
#[derive(Debug, Clone, Copy)]
pub struct ReadOnlyRoots {
    pub map_map: Tagged<Map>,
    pub fixed_array_map: Tagged<Map>,
    pub sloppy_arguments_elements_map: Tagged<Map>,
    pub context_map: Tagged<Map>,
    pub function_map: Tagged<Map>,
    pub oddball_map: Tagged<Map>,
    pub the_hole: Tagged<Oddball>,
    pub undefined: Tagged<Oddball>,
    pub empty_fixed_array: Tagged<FixedArray>,
}

// SAFETY: the roots are never mutated after bootstrap
unsafe impl Send for ReadOnlyRoots {}
// SAFETY: the roots are never mutated after bootstrap
unsafe impl Sync for ReadOnlyRoots {}

impl ReadOnlyRoots {
    #[inline(always)]
    pub fn is_the_hole(&self, value: Value) -> bool {
        value == self.the_hole.value()
    }
}

/// Roots plus the native context.
#[derive(Debug, Clone, Copy)]
pub struct Realm {
    pub roots: ReadOnlyRoots,
    pub native_context: Tagged<Context>,
}

// SAFETY: see ReadOnlyRoots; the native context is never written after
// bootstrap
unsafe impl Send for Realm {}
// SAFETY: see ReadOnlyRoots
unsafe impl Sync for Realm {}

fn alloc_raw<T>(heap: &mut HeapProxy, size: usize) -> *mut T {
    let layout = Layout::from_size_align(size, 8).unwrap();
    heap.allocate(layout).as_ptr() as *mut T
}

/// Allocate a map. `prototype` may be patched later.
fn alloc_map(
    heap: &mut HeapProxy,
    map_map: Value,
    instance_type: ObjectType,
    instance_size: usize,
    prototype: Value,
) -> Tagged<Map> {
    let ptr = alloc_raw::<Map>(heap, Map::SIZE);
    // SAFETY: fresh allocation of the right size
    unsafe {
        // map_map describes itself
        let map_map = if map_map.is_ref() { map_map } else { Value::from_ptr(ptr) };
        init_map(ptr, map_map, instance_type, instance_size, prototype);
        (*ptr).header.add_flag(HeaderFlags::READ_ONLY);
    }
    Tagged::from_ptr(ptr)
}

fn alloc_oddball(heap: &mut HeapProxy, map: Tagged<Map>, kind: OddballKind) -> Tagged<Oddball> {
    let ptr = alloc_raw::<Oddball>(heap, Oddball::SIZE);
    // SAFETY: fresh allocation of the right size
    unsafe {
        init_oddball(ptr, map.value(), kind);
        (*ptr).header.add_flag(HeaderFlags::READ_ONLY);
    }
    Tagged::from_ptr(ptr)
}

impl Realm {
    /// Allocate the roots and the native context on `heap`, then publish
    /// them so other proxies' heap walks see them.
    pub fn new(heap: &mut HeapProxy) -> Self {
        let map_map = alloc_map(heap, Value::zero(), ObjectType::Map, Map::SIZE, Value::zero());
        let mm = map_map.value();
        let oddball_map = alloc_map(heap, mm, ObjectType::Oddball, Oddball::SIZE, Value::zero());
        let undefined = alloc_oddball(heap, oddball_map, OddballKind::Undefined);
        let undef = undefined.value();
        // SAFETY: both maps were just initialized and nothing else refers to them
        unsafe {
            map_map.as_mut().prototype = undef;
            oddball_map.as_mut().prototype = undef;
        }

        let the_hole = alloc_oddball(heap, oddball_map, OddballKind::Hole);
        let fixed_array_map = alloc_map(heap, mm, ObjectType::FixedArray, FixedArray::HEADER_SIZE, undef);
        let sloppy_arguments_elements_map = alloc_map(
            heap,
            mm,
            ObjectType::SloppyArgumentsElements,
            FixedArray::HEADER_SIZE,
            undef,
        );
        let context_map = alloc_map(heap, mm, ObjectType::Context, FixedArray::HEADER_SIZE, undef);
        let function_map = alloc_map(heap, mm, ObjectType::Function, JsFunction::SIZE, undef);

        let empty_fixed_array = {
            let ptr = alloc_raw::<FixedArray>(heap, fixed_array_allocation_size(0));
            // SAFETY: fresh allocation of the right size
            unsafe {
                init_fixed_array(ptr, ObjectType::FixedArray, fixed_array_map.value(), 0);
                (*ptr).header.add_flag(HeaderFlags::READ_ONLY);
            }
            Tagged::from_ptr(ptr)
        };

        let maps = [
            alloc_map(heap, mm, ObjectType::StrictArguments, IndexedObject::SIZE, undef),
            alloc_map(heap, mm, ObjectType::SloppyArguments, SloppyArgumentsObject::SIZE, undef),
            alloc_map(heap, mm, ObjectType::SloppyArguments, SloppyArgumentsObject::SIZE, undef),
            alloc_map(heap, mm, ObjectType::Array, IndexedObject::SIZE, undef),
        ];

        let native_context = {
            let len = NativeContextSlot::LENGTH;
            let ptr = alloc_raw::<FixedArray>(heap, fixed_array_allocation_size(len));
            // SAFETY: fresh allocation of the right size, every slot written
            // before the next allocation
            unsafe {
                init_fixed_array(ptr, ObjectType::Context, context_map.value(), len);
                let array = &mut *ptr;
                array.set_unchecked(Context::PREVIOUS_INDEX, undef);
                array.set_unchecked(Context::NATIVE_CONTEXT_INDEX, Value::from_ptr(ptr));
                for (i, map) in maps.iter().enumerate() {
                    array.set_unchecked(Context::MIN_SLOTS + i, map.value());
                }
                array.header.add_flag(HeaderFlags::READ_ONLY);
            }
            Tagged::<FixedArray>::from_ptr(ptr)
        };

        heap.flush();

        Self {
            roots: ReadOnlyRoots {
                map_map,
                fixed_array_map,
                sloppy_arguments_elements_map,
                context_map,
                function_map,
                oddball_map,
                the_hole,
                undefined,
                empty_fixed_array,
            },
            // SAFETY: laid out as a Context above
            native_context: unsafe { native_context.cast() },
        }
    }

    #[inline(always)]
    pub fn map(&self, slot: NativeContextSlot) -> Tagged<Map> {
        // SAFETY: the native context is built by `new`
        unsafe { native_context_map(self.native_context, slot) }
    }

    /// A closure over the native context with `formal_parameter_count`
    /// declared parameters.
    pub fn new_function(
        &self,
        heap: &mut HeapProxy,
        formal_parameter_count: usize,
    ) -> Tagged<JsFunction> {
        let ptr = alloc_raw::<JsFunction>(heap, JsFunction::SIZE);
        // SAFETY: fresh allocation of the right size
        unsafe {
            init_function(
                ptr,
                self.roots.function_map.value(),
                self.native_context.value(),
                formal_parameter_count,
            );
        }
        Tagged::from_ptr(ptr)
    }

    /// The context an invocation of `function` runs in: its formal
    /// parameters, reversed, with missing arguments `undefined`.
    pub fn new_function_context(
        &self,
        heap: &mut HeapProxy,
        function: Tagged<JsFunction>,
        arguments: &[Value],
    ) -> Tagged<Context> {
        // SAFETY: callers pass live functions
        let function = unsafe { function.as_ref() };
        let formals = function.formal_parameter_count();
        let len = Context::MIN_SLOTS + formals;

        let ptr = alloc_raw::<FixedArray>(heap, fixed_array_allocation_size(len));
        // SAFETY: fresh allocation of the right size, every slot written
        // before the next allocation
        unsafe {
            init_fixed_array(ptr, ObjectType::Context, self.roots.context_map.value(), len);
            let array = &mut *ptr;
            array.set_unchecked(Context::PREVIOUS_INDEX, function.context);
            array.set_unchecked(Context::NATIVE_CONTEXT_INDEX, self.native_context.value());
            for p in 0..formals {
                let value = arguments.get(p).copied().unwrap_or(self.roots.undefined.value());
                array.set_unchecked(Context::parameter_slot(formals, p), value);
            }
        }
        // SAFETY: laid out as a Context above
        unsafe { Tagged::<FixedArray>::from_ptr(ptr).cast() }
    }
}

/// Load a map from the native context of `context`.
///
/// # Safety
///
/// `context` must be a live context whose native context was built by
/// [`Realm::new`].
#[inline(always)]
pub unsafe fn native_context_map(
    context: Tagged<Context>,
    slot: NativeContextSlot,
) -> Tagged<Map> {
    // SAFETY: by contract
    unsafe {
        let native: Tagged<Context> = context.as_ref().native_context().into();
        let map = native.as_ref().get_unchecked(slot as usize);
        Tagged::from_value(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> HeapSettings {
        HeapSettings { verify_on_safepoint: true, ..Default::default() }
    }

    #[test]
    fn roots_pass_verification() {
        let heap = new_heap(settings());
        let mut proxy = heap.proxy();
        let realm = Realm::new(&mut proxy);

        let stats = proxy.verify().unwrap();
        // 6 root maps, 2 oddballs, the empty array, 4 variant maps, the native context
        assert_eq!(stats.objects, 14);

        let roots = realm.roots;
        unsafe {
            assert_eq!(roots.empty_fixed_array.as_ref().len(), 0);
            assert_eq!(roots.the_hole.as_ref().kind(), Some(OddballKind::Hole));
            assert_eq!(roots.undefined.as_ref().kind(), Some(OddballKind::Undefined));
            assert!(roots.the_hole.as_ref().header.has_flag(HeaderFlags::READ_ONLY));
            assert_eq!(roots.map_map.as_ref().map, roots.map_map.value());
        }
        assert!(roots.is_the_hole(roots.the_hole.value()));
        assert!(!roots.is_the_hole(roots.undefined.value()));
    }

    #[test]
    fn native_context_holds_variant_maps() {
        let heap = new_heap(settings());
        let mut proxy = heap.proxy();
        let realm = Realm::new(&mut proxy);

        let cases = [
            (NativeContextSlot::StrictArgumentsMap, ObjectType::StrictArguments),
            (NativeContextSlot::SloppyArgumentsMap, ObjectType::SloppyArguments),
            (NativeContextSlot::FastAliasedArgumentsMap, ObjectType::SloppyArguments),
            (NativeContextSlot::JsArrayFastElementsMap, ObjectType::Array),
        ];
        for (slot, ty) in cases {
            assert_eq!(unsafe { realm.map(slot).as_ref() }.instance_type(), ty);
        }
        assert_ne!(
            realm.map(NativeContextSlot::SloppyArgumentsMap),
            realm.map(NativeContextSlot::FastAliasedArgumentsMap)
        );
    }

    #[test]
    fn function_context_stores_parameters_reversed() {
        let heap = new_heap(settings());
        let mut proxy = heap.proxy();
        let realm = Realm::new(&mut proxy);

        let function = realm.new_function(&mut proxy, 3);
        let context = realm.new_function_context(
            &mut proxy,
            function,
            &[Value::from_i64(10), Value::from_i64(20)],
        );

        let context = unsafe { context.as_ref() };
        assert_eq!(context.len(), Context::MIN_SLOTS + 3);
        assert_eq!(context.native_context(), realm.native_context.value());
        assert_eq!(context.get(4), Some(Value::from_i64(10)));
        assert_eq!(context.get(3), Some(Value::from_i64(20)));
        assert_eq!(context.get(2), Some(realm.roots.undefined.value()));

        proxy.verify().unwrap();
    }
}
