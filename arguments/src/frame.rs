//! Caller frames: where the actual arguments of an invocation live.

use std::ptr::NonNull;

use object::{Context, JsFunction, Tagged, Value};

/// Raw pointer to argument 0 of a frame. Arguments are contiguous in call
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePointer(NonNull<Value>);

impl FramePointer {
    #[inline(always)]
    pub fn new(arguments: NonNull<Value>) -> Self {
        Self(arguments)
    }

    /// # Safety
    ///
    /// `index` must be below the frame's argument count and the frame must
    /// still be live.
    #[inline(always)]
    pub unsafe fn argument(self, index: usize) -> Value {
        // SAFETY: by contract
        unsafe { self.0.as_ptr().add(index).read() }
    }

    /// # Safety
    ///
    /// `start + count` must not exceed the frame's argument count and the
    /// frame must still be live.
    #[inline(always)]
    pub unsafe fn arguments<'a>(self, start: usize, count: usize) -> &'a [Value] {
        // SAFETY: by contract
        unsafe { std::slice::from_raw_parts(self.0.as_ptr().add(start), count) }
    }
}

/// What the builders need to know about the current invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame: FramePointer,
    pub argument_count: usize,
    pub formal_parameter_count: usize,
}

/// Resolves the frame of the invocation of `function` running in
/// `context`.
pub trait FrameInfoResolver {
    fn resolve(
        &self,
        context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> FrameInfo;
}

#[derive(Debug, Clone, Copy)]
struct FrameRecord {
    function: Tagged<JsFunction>,
    base: usize,
    argument_count: usize,
}

/// A fixed-capacity value stack holding the actual arguments of each
/// active call.
///
/// The slot storage never reallocates, so a [`FramePointer`] stays valid
/// until its frame is popped.
#[derive(Debug)]
pub struct CallStack {
    slots: Box<[Value]>,
    depth: usize,
    frames: Vec<FrameRecord>,
}

impl CallStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Value::zero(); capacity].into_boxed_slice(),
            depth: 0,
            frames: Vec::new(),
        }
    }

    /// Pushes a call of `function` with `arguments`.
    pub fn push_frame(&mut self, function: Tagged<JsFunction>, arguments: &[Value]) {
        let base = self.depth;
        let top = base + arguments.len();
        assert!(top <= self.slots.len(), "stack overflow");
        self.slots[base..top].copy_from_slice(arguments);
        self.depth = top;
        self.frames.push(FrameRecord {
            function,
            base,
            argument_count: arguments.len(),
        });
    }

    pub fn pop_frame(&mut self) {
        let frame = self.frames.pop().expect("stack underflow");
        self.depth = frame.base;
    }
}

impl FrameInfoResolver for CallStack {
    fn resolve(
        &self,
        _context: Tagged<Context>,
        function: Tagged<JsFunction>,
    ) -> FrameInfo {
        let Some(record) = self.frames.iter().rev().find(|f| f.function == function)
        else {
            panic!("no active frame for {function:?}");
        };

        // SAFETY: frames only record live functions
        let formal_parameter_count =
            unsafe { function.as_ref() }.formal_parameter_count();
        // SAFETY: base is within the boxed slot storage
        let arguments = unsafe {
            NonNull::new_unchecked(self.slots.as_ptr().add(record.base) as *mut Value)
        };

        FrameInfo {
            frame: FramePointer::new(arguments),
            argument_count: record.argument_count,
            formal_parameter_count,
        }
    }
}
