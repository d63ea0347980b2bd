//! Sloppy-mode arguments objects.
//!
//! When the function declares formal parameters, the first
//! `min(argument_count, formal_parameter_count)` indices alias the
//! parameters, which live in the function's context. Those indices hold
//! the hole in the backing storage and a context slot index in the alias
//! map; the remaining indices are plain copies.

use log::trace;
use object::{
    Context, IndexedObject, JsFunction, SloppyArgumentsElements,
    SloppyArgumentsObject, Tagged, Value,
};

use crate::allocate::{
    ALIASED_ARGUMENTS_BASE_SIZE, SLOPPY_ARGUMENTS_BASE_SIZE, YoungCeiling,
    allocate_arguments_object,
};
use crate::builder::ArgumentsBuilder;
use crate::frame::FrameInfo;
use crate::realm::{NativeContextSlot, native_context_map};
use crate::runtime::RuntimeFallback;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SloppyPlan {
    /// No actual arguments.
    Empty,
    /// No formal parameters: a strict-style copy of all arguments.
    Unmapped { count: usize },
    /// Storage of `argument_count` slots plus an alias map of
    /// `alias_slots = mapped_count + 2` slots.
    Mapped { mapped_count: usize, alias_slots: usize },
    Fallback,
}

pub fn plan_sloppy_arguments(info: &FrameInfo, ceiling: YoungCeiling) -> SloppyPlan {
    let argument_count = info.argument_count;
    if argument_count == 0 {
        return if ceiling.fits(0, SloppyArgumentsObject::SIZE) {
            SloppyPlan::Empty
        } else {
            SloppyPlan::Fallback
        };
    }

    if info.formal_parameter_count == 0 {
        return if ceiling.fits(argument_count, SLOPPY_ARGUMENTS_BASE_SIZE) {
            SloppyPlan::Unmapped { count: argument_count }
        } else {
            SloppyPlan::Fallback
        };
    }

    let mapped_count = argument_count.min(info.formal_parameter_count);
    let alias_slots = mapped_count + SloppyArgumentsElements::PARAMETER_MAP_START;
    if ceiling.fits(argument_count + alias_slots, ALIASED_ARGUMENTS_BASE_SIZE) {
        SloppyPlan::Mapped { mapped_count, alias_slots }
    } else {
        SloppyPlan::Fallback
    }
}

impl<R: RuntimeFallback> ArgumentsBuilder<'_, R> {
    pub fn build_sloppy_arguments(
        &mut self,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject> {
        let info = self.env.frames.resolve(context, function);
        let plan = plan_sloppy_arguments(&info, self.env.ceiling());
        trace!("sloppy arguments: {plan:?}");

        let object = match plan {
            SloppyPlan::Empty => {
                self.emit_tail(context, NativeContextSlot::SloppyArgumentsMap, &info, 0, 0).object
            }
            SloppyPlan::Unmapped { count } => {
                self.emit_tail(context, NativeContextSlot::SloppyArgumentsMap, &info, 0, count)
                    .object
            }
            SloppyPlan::Mapped { mapped_count, alias_slots } => {
                self.emit_mapped(context, &info, mapped_count, alias_slots)
            }
            SloppyPlan::Fallback => {
                return self.runtime.new_sloppy_arguments(&mut self.env, context, function);
            }
        };

        // SAFETY: every sloppy fast path allocates a SloppyArgumentsObject
        unsafe { object.cast::<SloppyArgumentsObject>().as_mut() }.callee = function.value();
        object
    }

    fn emit_mapped(
        &mut self,
        context: Tagged<Context>,
        info: &FrameInfo,
        mapped_count: usize,
        alias_slots: usize,
    ) -> Tagged<IndexedObject> {
        let argument_count = info.argument_count;
        let hole = self.env.roots.the_hole.value();

        // SAFETY: contexts handed to the builder hang off a realm-built
        // native context, whose aliased map describes a sloppy object
        let allocation = unsafe {
            let map = native_context_map(context, NativeContextSlot::FastAliasedArgumentsMap);
            allocate_arguments_object(
                self.env.heap,
                self.env.roots,
                map,
                argument_count,
                Some(alias_slots),
            )
        };
        let (Some(storage), Some(alias)) = (allocation.storage, allocation.alias_map) else {
            unreachable!("mapped allocation without storage or alias map");
        };

        // SAFETY: storage and alias map are fresh parts of the allocation
        // above and nothing else refers to them yet; the frame is live
        unsafe {
            let storage_ref = storage.as_mut();
            let alias = alias.as_mut();
            alias.set_unchecked(SloppyArgumentsElements::CONTEXT_INDEX, context.value());
            alias.set_unchecked(SloppyArgumentsElements::ARGUMENTS_INDEX, storage.value());

            // unmapped tail, highest index first
            for i in (mapped_count..argument_count).rev() {
                storage_ref.set_unchecked(i, info.frame.argument(i));
            }

            // parameters are stored reversed in the context, so walking the
            // slots downwards walks the context indices upwards
            let mut context_index =
                Context::MIN_SLOTS + info.formal_parameter_count - mapped_count;
            for i in (0..mapped_count).rev() {
                storage_ref.set_unchecked(i, hole);
                alias.set_unchecked(
                    SloppyArgumentsElements::PARAMETER_MAP_START + i,
                    Value::from_usize(context_index),
                );
                context_index += 1;
            }
        }

        allocation.object
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;

    use object::{ObjectType, SloppyArgumentsObject, WORD_SIZE};

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
        assert_eq!(plan_sloppy_arguments(&info(0, 0), ceiling), SloppyPlan::Empty);
        assert_eq!(plan_sloppy_arguments(&info(0, 3), ceiling), SloppyPlan::Empty);
        assert_eq!(
            plan_sloppy_arguments(&info(4, 0), ceiling),
            SloppyPlan::Unmapped { count: 4 }
        );
        assert_eq!(
            plan_sloppy_arguments(&info(3, 2), ceiling),
            SloppyPlan::Mapped { mapped_count: 2, alias_slots: 4 }
        );
        assert_eq!(
            plan_sloppy_arguments(&info(1, 5), ceiling),
            SloppyPlan::Mapped { mapped_count: 1, alias_slots: 3 }
        );
    }

    #[test]
    fn plans_against_the_ceiling() {
        let ceiling = YoungCeiling::new(8_176);

        let unmapped = (8_176 - SLOPPY_ARGUMENTS_BASE_SIZE) / WORD_SIZE;
        assert_eq!(
            plan_sloppy_arguments(&info(unmapped, 0), ceiling),
            SloppyPlan::Unmapped { count: unmapped }
        );
        assert_eq!(plan_sloppy_arguments(&info(unmapped + 1, 0), ceiling), SloppyPlan::Fallback);

        // storage and alias map slots together: argc + 1 + 2
        let slots = (8_176 - ALIASED_ARGUMENTS_BASE_SIZE) / WORD_SIZE;
        let argc = slots - 3;
        assert!(matches!(
            plan_sloppy_arguments(&info(argc, 1), ceiling),
            SloppyPlan::Mapped { mapped_count: 1, .. }
        ));
        assert_eq!(plan_sloppy_arguments(&info(argc + 1, 1), ceiling), SloppyPlan::Fallback);
    }

    #[test]
    fn empty_plan_respects_a_tiny_ceiling() {
        let at_header = YoungCeiling::new(SloppyArgumentsObject::SIZE);
        assert_eq!(plan_sloppy_arguments(&info(0, 2), at_header), SloppyPlan::Empty);

        let below_header = YoungCeiling::new(SloppyArgumentsObject::SIZE - WORD_SIZE);
        assert_eq!(plan_sloppy_arguments(&info(0, 2), below_header), SloppyPlan::Fallback);
        assert_eq!(plan_sloppy_arguments(&info(0, 0), below_header), SloppyPlan::Fallback);
    }

    #[test]
    fn aliases_the_formal_parameters() {
        let mut fx = Fixture::new();
        let call = fx.call(2, &fixnums([10, 20, 30]));
        let before = fx.proxy.stats;

        let object = fx.build(ArgumentsVariant::Sloppy, &call);
        let snap = fx.snapshot(object);
        assert_eq!(snap.object_type, ObjectType::SloppyArguments);
        assert_eq!(
            snap.map,
            fx.realm.map(NativeContextSlot::FastAliasedArgumentsMap).value()
        );
        assert_eq!(snap.length, 3);
        assert_eq!(
            snap.elements,
            vec![Element::Hole, Element::Hole, Element::Value(Value::from_i64(30))]
        );
        // parameter 0 is the last context slot
        assert_eq!(snap.mapped, vec![Some(3), Some(2)]);
        assert_eq!(snap.values, fixnums([10, 20, 30]));
        assert_eq!(snap.callee, Some(call.function.value()));

        // object, storage and alias map in a single allocation
        assert_eq!(fx.proxy.stats.young_objects, before.young_objects + 1);
        assert_eq!(
            fx.proxy.stats.young_bytes,
            before.young_bytes + ALIASED_ARGUMENTS_BASE_SIZE + (3 + 4) * WORD_SIZE
        );
        fx.proxy.verify().unwrap();
    }

    #[test]
    fn alias_map_points_back() {
        let mut fx = Fixture::new();
        let call = fx.call(3, &fixnums([7, 8]));

        let object = fx.build(ArgumentsVariant::Sloppy, &call);
        unsafe {
            let alias: Tagged<SloppyArgumentsElements> =
                Tagged::from_value(object.as_ref().elements);
            let alias = alias.as_ref();
            assert_eq!(alias.context(), call.context.value());
            assert_eq!(alias.mapped_count(), 2);
            let storage: Tagged<object::FixedArray> = Tagged::from_value(alias.arguments());
            assert_eq!(storage.as_ref().len(), 2);
        }
        // fewer arguments than formals: only the passed ones are mapped
        let snap = fx.snapshot(object);
        assert_eq!(snap.mapped, vec![Some(4), Some(3)]);
        assert_eq!(snap.values, fixnums([7, 8]));
    }

    #[test]
    fn without_formals_copies_like_strict() {
        let mut fx = Fixture::new();
        let call = fx.call(0, &fixnums([1, 2, 3]));

        let object = fx.build(ArgumentsVariant::Sloppy, &call);
        let snap = fx.snapshot(object);
        assert_eq!(
            snap.map,
            fx.realm.map(NativeContextSlot::SloppyArgumentsMap).value()
        );
        assert!(snap.mapped.is_empty());
        assert_eq!(snap.values, fixnums([1, 2, 3]));
        assert_eq!(snap.callee, Some(call.function.value()));
        fx.proxy.verify().unwrap();
    }

    #[test]
    fn no_arguments_is_header_only() {
        let mut fx = Fixture::new();
        let call = fx.call(2, &[]);
        let before = fx.proxy.stats;

        let object = fx.build(ArgumentsVariant::Sloppy, &call);
        assert_eq!(
            fx.proxy.stats.young_bytes,
            before.young_bytes + SloppyArgumentsObject::SIZE
        );
        let snap = fx.snapshot(object);
        assert_eq!(snap.length, 0);
        assert!(snap.shares_empty_storage);
        assert!(snap.mapped.is_empty());
        assert_eq!(
            snap.map,
            fx.realm.map(NativeContextSlot::SloppyArgumentsMap).value()
        );
        assert_eq!(snap.callee, Some(call.function.value()));
        fx.proxy.verify().unwrap();
    }

    #[test]
    fn mapped_ceiling_boundary() {
        let mut fx = Fixture::new();
        let slots = (fx.proxy.young_limit() - ALIASED_ARGUMENTS_BASE_SIZE) / WORD_SIZE;
        // every argument mapped: 2 * argc + 2 slots
        let argc = (slots - 2) / 2;

        let at_limit = fx.call(argc + 10, &fixnums(0..argc as i64));
        let (fast, fallbacks) = fx.build_counting(ArgumentsVariant::Sloppy, &at_limit);
        assert_eq!(fallbacks, 0);
        let slow = fx.build_slow(ArgumentsVariant::Sloppy, &at_limit);
        assert_eq!(fx.snapshot(fast), fx.snapshot(slow));
        fx.stack.pop_frame();

        let over = fx.call(argc + 10, &fixnums(0..argc as i64 + 1));
        let (object, fallbacks) = fx.build_counting(ArgumentsVariant::Sloppy, &over);
        assert_eq!(fallbacks, 1);
        let snap = fx.snapshot(object);
        assert_eq!(snap.length, argc + 1);
        assert_eq!(snap.mapped.len(), argc + 1);
        assert_eq!(snap.callee, Some(over.function.value()));
        fx.proxy.verify().unwrap();
    }

    #[test]
    fn matches_the_general_path() {
        let mut fx = Fixture::new();
        for formals in 0..4 {
            for argc in 0..6 {
                let call = fx.call(formals, &fixnums(100..100 + argc));
                let fast = fx.build(ArgumentsVariant::Sloppy, &call);
                let slow = fx.build_slow(ArgumentsVariant::Sloppy, &call);
                assert_eq!(fx.snapshot(fast), fx.snapshot(slow), "{formals} formals, {argc} arguments");
                fx.stack.pop_frame();
            }
        }
        fx.proxy.verify().unwrap();
    }
}
