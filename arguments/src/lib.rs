//! Fast construction of arguments objects: strict arguments, sloppy
//! (parameter-aliasing) arguments and rest parameter arrays.
//!
//! Each builder resolves the caller frame, checks the request against the
//! young generation ceiling and then either carves the whole object out of
//! a single bump allocation or defers to the general [`Runtime`]
//! construction.

pub mod access;
pub mod allocate;
pub mod builder;
pub mod copy;
pub mod frame;
pub mod inspect;
pub mod realm;
pub mod runtime;
pub mod sloppy;
pub mod strict;

#[cfg(test)]
mod testing;

pub use allocate::{CompoundAllocation, YoungCeiling, allocate_arguments_object};
pub use builder::{ArgumentsBuilder, ArgumentsVariant, Env};
pub use copy::copy_arguments;
pub use frame::{CallStack, FrameInfo, FrameInfoResolver, FramePointer};
pub use inspect::{ArgumentsSnapshot, Element, snapshot};
pub use realm::{NativeContextSlot, ReadOnlyRoots, Realm, new_heap, object_model};
pub use runtime::{CountingRuntime, Runtime, RuntimeFallback};
pub use sloppy::{SloppyPlan, plan_sloppy_arguments};
pub use strict::{StrictPlan, plan_rest_parameters, plan_strict_arguments};
