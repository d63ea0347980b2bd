//! Strict arguments objects and rest parameter arrays: plain indexed
//! copies of a tail of the actual arguments.

use log::trace;
use object::{Context, IndexedObject, JsFunction, Map, Tagged};

use crate::allocate::{
    CompoundAllocation, REST_PARAMETERS_BASE_SIZE, STRICT_ARGUMENTS_BASE_SIZE,
    YoungCeiling, allocate_arguments_object,
};
use crate::builder::ArgumentsBuilder;
use crate::copy::copy_arguments;
use crate::frame::FrameInfo;
use crate::realm::{NativeContextSlot, native_context_map};
use crate::runtime::RuntimeFallback;

/// How a strict arguments object or rest array gets built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrictPlan {
    /// No elements: header only, elements is the empty fixed array.
    Empty,
    /// One compound allocation holding arguments `first .. first + count`.
    Inline { first: usize, count: usize },
    /// Too big for the young generation, the bare header included.
    Fallback,
}

fn plan_tail(first: usize, count: usize, base_size: usize, ceiling: YoungCeiling) -> StrictPlan {
    if count == 0 {
        // a ceiling below the bare header leaves nothing for the fast path
        if ceiling.fits(0, IndexedObject::SIZE) {
            StrictPlan::Empty
        } else {
            StrictPlan::Fallback
        }
    } else if ceiling.fits(count, base_size) {
        StrictPlan::Inline { first, count }
    } else {
        StrictPlan::Fallback
    }
}

pub fn plan_strict_arguments(info: &FrameInfo, ceiling: YoungCeiling) -> StrictPlan {
    plan_tail(0, info.argument_count, STRICT_ARGUMENTS_BASE_SIZE, ceiling)
}

/// Rest parameters collect the actual arguments past the formals; fewer
/// actuals than formals means an empty array.
pub fn plan_rest_parameters(info: &FrameInfo, ceiling: YoungCeiling) -> StrictPlan {
    let first = info.formal_parameter_count;
    let count = info.argument_count.saturating_sub(first);
    plan_tail(first, count, REST_PARAMETERS_BASE_SIZE, ceiling)
}

impl<R: RuntimeFallback> ArgumentsBuilder<'_, R> {
    pub fn build_strict_arguments(
        &mut self,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject> {
        let info = self.env.frames.resolve(context, function);
        let plan = plan_strict_arguments(&info, self.env.ceiling());
        trace!("strict arguments: {plan:?}");

        let slot = NativeContextSlot::StrictArgumentsMap;
        match plan {
            StrictPlan::Empty => self.emit_tail(context, slot, &info, 0, 0).object,
            StrictPlan::Inline { first, count } => {
                self.emit_tail(context, slot, &info, first, count).object
            }
            StrictPlan::Fallback => {
                self.runtime.new_strict_arguments(&mut self.env, context, function)
            }
        }
    }

    pub fn build_rest_parameters(
        &mut self,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject> {
        let info = self.env.frames.resolve(context, function);
        let plan = plan_rest_parameters(&info, self.env.ceiling());
        trace!("rest parameters: {plan:?}");

        let slot = NativeContextSlot::JsArrayFastElementsMap;
        match plan {
            StrictPlan::Empty => self.emit_tail(context, slot, &info, 0, 0).object,
            StrictPlan::Inline { first, count } => {
                self.emit_tail(context, slot, &info, first, count).object
            }
            StrictPlan::Fallback => {
                self.runtime.new_rest_parameters(&mut self.env, context, function)
            }
        }
    }

    /// One compound allocation with the map in `slot`, holding arguments
    /// `first .. first + count`. The caller has checked the ceiling.
    pub(crate) fn emit_tail(
        &mut self,
        context: Tagged<Context>,
        slot: NativeContextSlot,
        info: &FrameInfo,
        first: usize,
        count: usize,
    ) -> CompoundAllocation {
        // SAFETY: contexts handed to the builder hang off a realm-built
        // native context
        let map: Tagged<Map> = unsafe { native_context_map(context, slot) };
        // SAFETY: native context maps describe indexed objects
        let allocation = unsafe {
            allocate_arguments_object(self.env.heap, self.env.roots, map, count, None)
        };
        if let Some(storage) = allocation.storage {
            // SAFETY: fresh storage of `count` slots; the frame outlives the build
            unsafe {
                copy_arguments(info.frame, info.argument_count, storage.as_mut(), first, count)
            };
        }
        allocation
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;

    use object::{ObjectType, Value, WORD_SIZE};

    use super::*;
    use crate::builder::ArgumentsVariant;
    use crate::frame::FramePointer;
    use crate::inspect::Element;
    use crate::testing::{Fixture, fixnums};

    fn info(argument_count: usize, formal_parameter_count: usize) -> FrameInfo {
        FrameInfo {
            frame: FramePointer::new(NonNull::dangling()),
            argument_count,
            formal_parameter_count,
        }
    }

    #[test]
    fn plans() {
        let ceiling = YoungCeiling::new(8_176);
        assert_eq!(plan_strict_arguments(&info(0, 3), ceiling), StrictPlan::Empty);
        assert_eq!(
            plan_strict_arguments(&info(3, 1), ceiling),
            StrictPlan::Inline { first: 0, count: 3 }
        );
        assert_eq!(
            plan_rest_parameters(&info(5, 2), ceiling),
            StrictPlan::Inline { first: 2, count: 3 }
        );
        assert_eq!(plan_rest_parameters(&info(2, 2), ceiling), StrictPlan::Empty);
        assert_eq!(plan_rest_parameters(&info(1, 4), ceiling), StrictPlan::Empty);
    }

    #[test]
    fn plans_against_the_ceiling() {
        let ceiling = YoungCeiling::new(8_176);
        let max = (8_176 - STRICT_ARGUMENTS_BASE_SIZE) / WORD_SIZE;
        assert_eq!(
            plan_strict_arguments(&info(max, 0), ceiling),
            StrictPlan::Inline { first: 0, count: max }
        );
        assert_eq!(plan_strict_arguments(&info(max + 1, 0), ceiling), StrictPlan::Fallback);
        assert_eq!(
            plan_rest_parameters(&info(max + 3, 3), ceiling),
            StrictPlan::Inline { first: 3, count: max }
        );
        assert_eq!(plan_rest_parameters(&info(max + 4, 3), ceiling), StrictPlan::Fallback);
    }

    #[test]
    fn empty_plans_respect_a_tiny_ceiling() {
        let at_header = YoungCeiling::new(IndexedObject::SIZE);
        assert_eq!(plan_strict_arguments(&info(0, 0), at_header), StrictPlan::Empty);
        assert_eq!(plan_rest_parameters(&info(1, 2), at_header), StrictPlan::Empty);

        let below_header = YoungCeiling::new(IndexedObject::SIZE - WORD_SIZE);
        assert_eq!(plan_strict_arguments(&info(0, 0), below_header), StrictPlan::Fallback);
        assert_eq!(plan_rest_parameters(&info(1, 2), below_header), StrictPlan::Fallback);
    }

    #[test]
    fn strict_copies_every_argument() {
        let mut fx = Fixture::new();
        let call = fx.call(1, &fixnums([10, 20, 30]));
        let before = fx.proxy.stats;

        let object = fx.build(ArgumentsVariant::Strict, &call);
        let snap = fx.snapshot(object);
        assert_eq!(snap.object_type, ObjectType::StrictArguments);
        assert_eq!(
            snap.map,
            fx.realm.map(NativeContextSlot::StrictArgumentsMap).value()
        );
        assert_eq!(snap.length, 3);
        assert_eq!(snap.values, fixnums([10, 20, 30]));
        assert_eq!(snap.elements, fixnums([10, 20, 30]).into_iter().map(Element::Value).collect::<Vec<_>>());
        assert_eq!(snap.callee, None);
        assert!(snap.mapped.is_empty());

        // one object for the whole construction
        assert_eq!(fx.proxy.stats.young_objects, before.young_objects + 1);
        assert_eq!(
            fx.proxy.stats.young_bytes,
            before.young_bytes + STRICT_ARGUMENTS_BASE_SIZE + 3 * WORD_SIZE
        );
        fx.proxy.verify().unwrap();
    }

    #[test]
    fn no_arguments_share_the_empty_array() {
        let mut fx = Fixture::new();
        let call = fx.call(2, &[]);

        for variant in [ArgumentsVariant::Strict, ArgumentsVariant::Rest] {
            let before = fx.proxy.stats;
            let object = fx.build(variant, &call);
            let snap = fx.snapshot(object);
            assert_eq!(snap.length, 0);
            assert!(snap.elements.is_empty());
            assert!(snap.shares_empty_storage);
            assert_eq!(fx.proxy.stats.young_bytes, before.young_bytes + IndexedObject::SIZE);
        }
        fx.proxy.verify().unwrap();
    }

    #[test]
    fn rest_collects_the_tail() {
        let mut fx = Fixture::new();
        let call = fx.call(2, &fixnums([1, 2, 3, 4]));

        let object = fx.build(ArgumentsVariant::Rest, &call);
        let snap = fx.snapshot(object);
        assert_eq!(snap.object_type, ObjectType::Array);
        assert_eq!(
            snap.map,
            fx.realm.map(NativeContextSlot::JsArrayFastElementsMap).value()
        );
        assert_eq!(snap.length, 2);
        assert_eq!(snap.values, fixnums([3, 4]));
        assert!(!snap.shares_empty_storage);
        fx.proxy.verify().unwrap();
    }

    #[test]
    fn rest_with_fewer_arguments_than_formals_is_empty() {
        let mut fx = Fixture::new();
        let call = fx.call(4, &fixnums([1]));

        let object = fx.build(ArgumentsVariant::Rest, &call);
        let snap = fx.snapshot(object);
        assert_eq!(snap.length, 0);
        assert!(snap.shares_empty_storage);
    }

    #[test]
    fn strict_ceiling_boundary() {
        let mut fx = Fixture::new();
        let max = (fx.proxy.young_limit() - STRICT_ARGUMENTS_BASE_SIZE) / WORD_SIZE;

        let at_limit = fx.call(0, &fixnums(0..max as i64));
        let (object, fallbacks) = fx.build_counting(ArgumentsVariant::Strict, &at_limit);
        assert_eq!(fallbacks, 0);
        assert_eq!(fx.snapshot(object).length, max);
        fx.stack.pop_frame();

        let over = fx.call(0, &fixnums(0..max as i64 + 1));
        let (object, fallbacks) = fx.build_counting(ArgumentsVariant::Strict, &over);
        assert_eq!(fallbacks, 1);
        let snap = fx.snapshot(object);
        assert_eq!(snap.length, max + 1);
        assert_eq!(snap.values[max], Value::from_usize(max));
        fx.proxy.verify().unwrap();
    }

    #[test]
    fn rest_ceiling_boundary() {
        let mut fx = Fixture::new();
        let max = (fx.proxy.young_limit() - REST_PARAMETERS_BASE_SIZE) / WORD_SIZE;

        let at_limit = fx.call(2, &fixnums(0..max as i64 + 2));
        assert_eq!(fx.build_counting(ArgumentsVariant::Rest, &at_limit).1, 0);
        fx.stack.pop_frame();

        let over = fx.call(2, &fixnums(0..max as i64 + 3));
        let (object, fallbacks) = fx.build_counting(ArgumentsVariant::Rest, &over);
        assert_eq!(fallbacks, 1);
        let snap = fx.snapshot(object);
        assert_eq!(snap.length, max + 1);
        assert_eq!(snap.values[0], Value::from_i64(2));
    }
}
