use crate::Value;
use core::marker::PhantomData;

/// A typed tagged value.
///
/// The underlying bits are the same as [`Value`] but `T` indicates the
/// expected heap type for reference values. Dereferencing is unsafe: the
/// caller must guarantee the value actually points to a valid `T`.
#[repr(transparent)]
pub struct Tagged<T> {
    value: Value,
    _marker: PhantomData<*const T>,
}

// `T` is only a marker, the handle is a plain word.
impl<T> Clone for Tagged<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Tagged<T> {}

impl<T> PartialEq for Tagged<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Tagged<T> {}

impl<T> Tagged<T> {
    #[inline(always)]
    pub fn from_value(value: Value) -> Self {
        Self { value, _marker: PhantomData }
    }

    #[inline(always)]
    pub fn from_ptr(ptr: *const T) -> Self {
        Self::from_value(Value::from_ptr(ptr))
    }

    #[inline(always)]
    pub fn value(self) -> Value {
        self.value
    }

    #[inline(always)]
    pub fn as_ptr(self) -> *mut T {
        self.value.as_ptr()
    }

    #[inline(always)]
    pub fn is_ref(self) -> bool {
        self.value.is_ref()
    }

    /// Reinterpret as a handle to another type.
    ///
    /// # Safety
    ///
    /// `U` must describe the object this value points to (or a prefix of it).
    #[inline(always)]
    pub unsafe fn cast<U>(self) -> Tagged<U> {
        Tagged::from_value(self.value)
    }

    /// Dereference as a shared reference to `T`.
    ///
    /// # Safety
    ///
    /// The value must be a reference to a valid, live `T`.
    #[inline(always)]
    pub unsafe fn as_ref<'a>(self) -> &'a T {
        // SAFETY: by contract
        unsafe { &*self.as_ptr() }
    }

    /// Dereference as a mutable reference to `T`.
    ///
    /// # Safety
    ///
    /// The value must be a reference to a valid, live `T`, and no other
    /// references to it may exist.
    #[inline(always)]
    pub unsafe fn as_mut<'a>(self) -> &'a mut T {
        // SAFETY: by contract
        unsafe { &mut *self.as_ptr() }
    }
}

impl<T> core::fmt::Debug for Tagged<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Tagged({:?})", self.value)
    }
}

impl<T> From<Value> for Tagged<T> {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl<T> From<Tagged<T>> for Value {
    fn from(handle: Tagged<T>) -> Self {
        handle.value
    }
}
