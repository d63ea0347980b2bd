use std::fmt;

use heap::HeapProxy;
use object::{Context, IndexedObject, JsFunction, Tagged};

use crate::allocate::YoungCeiling;
use crate::frame::FrameInfoResolver;
use crate::realm::ReadOnlyRoots;
use crate::runtime::{Runtime, RuntimeFallback};

/// The three arguments shapes a function body can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentsVariant {
    Strict,
    Sloppy,
    Rest,
}

impl ArgumentsVariant {
    pub const ALL: [ArgumentsVariant; 3] = [Self::Strict, Self::Sloppy, Self::Rest];
}

impl fmt::Display for ArgumentsVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Sloppy => "sloppy",
            Self::Rest => "rest",
        })
    }
}

/// Everything a build needs from the surrounding runtime.
pub struct Env<'a> {
    pub heap: &'a mut HeapProxy,
    pub roots: &'a ReadOnlyRoots,
    pub frames: &'a dyn FrameInfoResolver,
}

impl<'a> Env<'a> {
    pub fn new(
        heap: &'a mut HeapProxy,
        roots: &'a ReadOnlyRoots,
        frames: &'a dyn FrameInfoResolver,
    ) -> Self {
        Self { heap, roots, frames }
    }

    #[inline(always)]
    pub fn ceiling(&self) -> YoungCeiling {
        YoungCeiling::of(self.heap)
    }
}

/// Fast construction of arguments objects, deferring to `R` for requests
/// the young generation cannot serve inline.
///
/// The entry points are total: they always return a fully initialized
/// object. See the `strict` and `sloppy` modules for the construction
/// paths.
pub struct ArgumentsBuilder<'a, R: RuntimeFallback = Runtime> {
    pub(crate) env: Env<'a>,
    pub(crate) runtime: R,
}

impl<'a> ArgumentsBuilder<'a, Runtime> {
    pub fn new(env: Env<'a>) -> Self {
        Self::with_runtime(env, Runtime)
    }
}

impl<'a, R: RuntimeFallback> ArgumentsBuilder<'a, R> {
    pub fn with_runtime(env: Env<'a>, runtime: R) -> Self {
        Self { env, runtime }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn into_runtime(self) -> R {
        self.runtime
    }

    /// Build `variant` for the invocation of `function` in `context`.
    pub fn build(
        &mut self,
        variant: ArgumentsVariant,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> Tagged<IndexedObject> {
        match variant {
            ArgumentsVariant::Strict => self.build_strict_arguments(context, function),
            ArgumentsVariant::Sloppy => self.build_sloppy_arguments(context, function),
            ArgumentsVariant::Rest => self.build_rest_parameters(context, function),
        }
    }
}
