//! General (slow) construction of arguments objects.
//!
//! Every part is a separate allocation through the heap's general path,
//! ordered storage, alias map, object. Each part is fully written before
//! the next allocation, so the safepoint that every general allocation
//! passes only ever sees initialized memory. Sizes are unbounded: large
//! parts go to the large object space.

use std::alloc::Layout;

use heap::HeapProxy;
use log::debug;
use object::{
    Context, FixedArray, Header, IndexedObject, JsFunction, Map, ObjectType,
    SloppyArgumentsElements, SloppyArgumentsObject, Tagged, Value,
    fixed_array_allocation_size, init_fixed_array,
};

use crate::builder::{ArgumentsVariant, Env};
use crate::frame::FrameInfo;
use crate::realm::{NativeContextSlot, ReadOnlyRoots, native_context_map};

/// The slow construction collaborator of the builders.
pub trait RuntimeFallback {
    fn new_strict_arguments(
        &mut self,
        env: &mut Env<'_>,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject>;

    fn new_sloppy_arguments(
        &mut self,
        env: &mut Env<'_>,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject>;

    fn new_rest_parameters(
        &mut self,
        env: &mut Env<'_>,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject>;

    fn build(
        &mut self,
        env: &mut Env<'_>,
        variant: ArgumentsVariant,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject> {
        match variant {
            ArgumentsVariant::Strict => self.new_strict_arguments(env, context, function),
            ArgumentsVariant::Sloppy => self.new_sloppy_arguments(env, context, function),
            ArgumentsVariant::Rest => self.new_rest_parameters(env, context, function),
        }
    }
}

/// Forwards to `R`, counting how many requests reached it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountingRuntime<R: RuntimeFallback = Runtime> {
    inner: R,
    fallbacks: usize,
}

impl<R: RuntimeFallback> CountingRuntime<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, fallbacks: 0 }
    }

    /// Requests served so far.
    pub fn fallbacks(&self) -> usize {
        self.fallbacks
    }
}

impl<R: RuntimeFallback> RuntimeFallback for CountingRuntime<R> {
    fn new_strict_arguments(
        &mut self,
        env: &mut Env<'_>,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject> {
        self.fallbacks += 1;
        self.inner.new_strict_arguments(env, context, function)
    }

    fn new_sloppy_arguments(
        &mut self,
        env: &mut Env<'_>,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject> {
        self.fallbacks += 1;
        self.inner.new_sloppy_arguments(env, context, function)
    }

    fn new_rest_parameters(
        &mut self,
        env: &mut Env<'_>,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject> {
        self.fallbacks += 1;
        self.inner.new_rest_parameters(env, context, function)
    }
}

/// Builds the same objects as the fast paths, one allocation per part.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runtime;

fn general_allocate(heap: &mut HeapProxy, size: usize) -> *mut u8 {
    let layout = Layout::from_size_align(size, 8).unwrap();
    heap.allocate(layout).as_ptr()
}

/// A storage array holding `values`, or the empty fixed array.
fn new_storage(
    heap: &mut HeapProxy,
    roots: &ReadOnlyRoots,
    values: impl ExactSizeIterator<Item = Value>,
) -> Tagged<FixedArray> {
    let len = values.len();
    if len == 0 {
        return roots.empty_fixed_array;
    }
    let ptr = general_allocate(heap, fixed_array_allocation_size(len)) as *mut FixedArray;
    // SAFETY: fresh allocation of the right size
    unsafe {
        init_fixed_array(ptr, ObjectType::FixedArray, roots.fixed_array_map.value(), len);
        for (slot, value) in (*ptr).elements_mut().iter_mut().zip(values) {
            *slot = value;
        }
    }
    Tagged::from_ptr(ptr)
}

/// # Safety
///
/// `map` must be a live map of an indexed object type.
unsafe fn new_object(
    heap: &mut HeapProxy,
    roots: &ReadOnlyRoots,
    map: Tagged<Map>,
    elements: Value,
    length: usize,
    callee: Option<Tagged<JsFunction>>,
) -> Tagged<IndexedObject> {
    // SAFETY: by contract
    let map_ref = unsafe { map.as_ref() };
    let object_type = map_ref.instance_type();
    let ptr = general_allocate(heap, map_ref.instance_size());

    // SAFETY: fresh allocation of instance_size bytes
    unsafe {
        let object = ptr as *mut IndexedObject;
        object.write(IndexedObject {
            header: Header::new(object_type),
            map: map.value(),
            properties: roots.empty_fixed_array.value(),
            elements,
            length: Value::from_usize(length),
        });
        if let Some(callee) = callee {
            (*(ptr as *mut SloppyArgumentsObject)).callee = callee.value();
        }
    }
    Tagged::from_ptr(ptr as *const IndexedObject)
}

/// # Safety
///
/// `info` must describe a live frame.
unsafe fn frame_values(info: &FrameInfo, start: usize) -> impl ExactSizeIterator<Item = Value> {
    let count = info.argument_count.saturating_sub(start);
    // SAFETY: by contract, start + count == argument_count
    let slice = unsafe { info.frame.arguments(start.min(info.argument_count), count) };
    slice.iter().copied()
}

impl RuntimeFallback for Runtime {
    fn new_strict_arguments(
        &mut self,
        env: &mut Env<'_>,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject> {
        let info = env.frames.resolve(context, function);
        debug!("runtime: strict arguments, {} arguments", info.argument_count);

        // SAFETY: the resolver returns a live frame
        let storage = new_storage(env.heap, env.roots, unsafe { frame_values(&info, 0) });
        // SAFETY: context comes from a realm-built native context
        unsafe {
            let map = native_context_map(context, NativeContextSlot::StrictArgumentsMap);
            new_object(env.heap, env.roots, map, storage.value(), info.argument_count, None)
        }
    }

    fn new_sloppy_arguments(
        &mut self,
        env: &mut Env<'_>,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject> {
        let info = env.frames.resolve(context, function);
        let mapped_count = info.argument_count.min(info.formal_parameter_count);
        debug!(
            "runtime: sloppy arguments, {} arguments, {mapped_count} mapped",
            info.argument_count
        );

        if mapped_count == 0 {
            // SAFETY: the resolver returns a live frame
            let storage = new_storage(env.heap, env.roots, unsafe { frame_values(&info, 0) });
            // SAFETY: context comes from a realm-built native context
            return unsafe {
                let map = native_context_map(context, NativeContextSlot::SloppyArgumentsMap);
                new_object(
                    env.heap,
                    env.roots,
                    map,
                    storage.value(),
                    info.argument_count,
                    Some(function),
                )
            };
        }

        let hole = env.roots.the_hole.value();
        // SAFETY: the resolver returns a live frame
        let values = unsafe { frame_values(&info, 0) }
            .enumerate()
            .map(|(i, value)| if i < mapped_count { hole } else { value });
        let storage = new_storage(env.heap, env.roots, values);

        let alias_len = SloppyArgumentsElements::PARAMETER_MAP_START + mapped_count;
        let alias = general_allocate(env.heap, fixed_array_allocation_size(alias_len))
            as *mut FixedArray;
        // SAFETY: fresh allocation of the right size, written in full
        unsafe {
            init_fixed_array(
                alias,
                ObjectType::SloppyArgumentsElements,
                env.roots.sloppy_arguments_elements_map.value(),
                alias_len,
            );
            let alias = &mut *(alias as *mut SloppyArgumentsElements);
            alias.set_unchecked(SloppyArgumentsElements::CONTEXT_INDEX, context.value());
            alias.set_unchecked(SloppyArgumentsElements::ARGUMENTS_INDEX, storage.value());
            for i in 0..mapped_count {
                let index = Context::parameter_slot(info.formal_parameter_count, i);
                alias.set_mapped_entry(i, Value::from_usize(index));
            }
        }

        // SAFETY: context comes from a realm-built native context
        unsafe {
            let map = native_context_map(context, NativeContextSlot::FastAliasedArgumentsMap);
            new_object(
                env.heap,
                env.roots,
                map,
                Value::from_ptr(alias),
                info.argument_count,
                Some(function),
            )
        }
    }

    fn new_rest_parameters(
        &mut self,
        env: &mut Env<'_>,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject> {
        let info = env.frames.resolve(context, function);
        let start = info.formal_parameter_count;
        let count = info.argument_count.saturating_sub(start);
        debug!("runtime: rest parameters, {count} collected");

        // SAFETY: the resolver returns a live frame
        let storage = new_storage(env.heap, env.roots, unsafe { frame_values(&info, start) });
        // SAFETY: context comes from a realm-built native context
        unsafe {
            let map = native_context_map(context, NativeContextSlot::JsArrayFastElementsMap);
            new_object(env.heap, env.roots, map, storage.value(), count, None)
        }
    }
}
