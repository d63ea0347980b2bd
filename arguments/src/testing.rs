//! Shared fixtures for the unit tests.

use heap::{HeapProxy, HeapSettings};
use object::{Context, IndexedObject, JsFunction, Tagged, Value};

use crate::builder::{ArgumentsBuilder, ArgumentsVariant, Env};
use crate::frame::CallStack;
use crate::inspect::{ArgumentsSnapshot, snapshot};
use crate::realm::{Realm, new_heap};
use crate::runtime::{CountingRuntime, Runtime, RuntimeFallback};

pub(crate) struct Fixture {
    pub proxy: HeapProxy,
    pub realm: Realm,
    pub stack: CallStack,
}

pub(crate) struct Call {
    pub context: Tagged<Context>,
    pub function: Tagged<JsFunction>,
}

pub(crate) fn fixnums(values: impl IntoIterator<Item = i64>) -> Vec<Value> {
    values.into_iter().map(Value::from_i64).collect()
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(HeapSettings { verify_on_safepoint: true, ..Default::default() })
    }

    pub fn with_settings(settings: HeapSettings) -> Self {
        let heap = new_heap(settings);
        let mut proxy = heap.proxy();
        let realm = Realm::new(&mut proxy);
        Self { proxy, realm, stack: CallStack::new(4_096) }
    }

    /// Push a call of a fresh function with `formals` parameters.
    pub fn call(&mut self, formals: usize, arguments: &[Value]) -> Call {
        let function = self.realm.new_function(&mut self.proxy, formals);
        let context = self.realm.new_function_context(&mut self.proxy, function, arguments);
        self.stack.push_frame(function, arguments);
        Call { context, function }
    }

    pub fn build(&mut self, variant: ArgumentsVariant, call: &Call) -> Tagged<IndexedObject> {
        self.build_counting(variant, call).0
    }

    /// Build on the fast path; also returns how often it fell back.
    pub fn build_counting(
        &mut self,
        variant: ArgumentsVariant,
        call: &Call,
    ) -> (Tagged<IndexedObject>, usize) {
        let env = Env::new(&mut self.proxy, &self.realm.roots, &self.stack);
        let mut builder = ArgumentsBuilder::with_runtime(env, CountingRuntime::new(Runtime));
        let object = builder.build(variant, call.context, call.function);
        (object, builder.runtime().fallbacks())
    }

    pub fn build_slow(&mut self, variant: ArgumentsVariant, call: &Call) -> Tagged<IndexedObject> {
        let mut env = Env::new(&mut self.proxy, &self.realm.roots, &self.stack);
        Runtime.build(&mut env, variant, call.context, call.function)
    }

    pub fn snapshot(&self, object: Tagged<IndexedObject>) -> ArgumentsSnapshot {
        // SAFETY: tests only snapshot objects built against this realm
        unsafe { snapshot(&self.realm.roots, object) }
    }
}
