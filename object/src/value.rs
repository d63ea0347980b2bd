/// Tag constants.
const FIXNUM_MASK: u64 = 0b1;
const TAG_MASK: u64 = 0b11;
const REF_TAG: u64 = 0b01;
const HEADER_TAG: u64 = 0b11;

/// Size of one tagged slot in bytes.
pub const WORD_SIZE: usize = size_of::<Value>();

/// A tagged 64-bit value.
///
/// Encoding:
/// - **Fixnum**:    `...XXXXX0`: 63-bit signed integer (low bit 0).
/// - **Reference**: `...XXXX01`: heap pointer (mask low 2 bits; requires 4-byte alignment).
/// - **Header**:    `...XXXX11`: only valid as the first word of a heap object.
///
/// The all-zero word is the fixnum `0`, so zero-initialized memory never
/// reads as a reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

const _: () = assert!(size_of::<Value>() == 8);

impl Value {
    #[inline(always)]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline(always)]
    pub const fn zero() -> Self {
        Self(0)
    }

    // ── Fixnum ─────────────────────────────────────────────────────

    #[inline(always)]
    pub const fn is_fixnum(self) -> bool {
        self.0 & FIXNUM_MASK == 0
    }

    #[inline(always)]
    pub fn from_i64(n: i64) -> Self {
        debug_assert!(
            (-(1i64 << 62)..(1i64 << 62)).contains(&n),
            "fixnum overflow: {n}"
        );
        Self((n << 1) as u64)
    }

    #[inline(always)]
    pub fn from_usize(n: usize) -> Self {
        debug_assert!(n < (1usize << 62), "fixnum overflow: {n}");
        Self((n as u64) << 1)
    }

    /// # Safety
    ///
    /// The value must be a fixnum.
    #[inline(always)]
    pub unsafe fn to_i64(self) -> i64 {
        debug_assert!(self.is_fixnum());
        (self.0 as i64) >> 1
    }

    /// # Safety
    ///
    /// The value must be a non-negative fixnum.
    #[inline(always)]
    pub unsafe fn to_usize(self) -> usize {
        debug_assert!(self.is_fixnum());
        // SAFETY: by contract
        let n = unsafe { self.to_i64() };
        debug_assert!(n >= 0, "to_usize on negative fixnum: {n}");
        n as usize
    }

    /// The fixnum payload, or `None` for references and headers.
    #[inline(always)]
    pub fn as_fixnum(self) -> Option<i64> {
        if self.is_fixnum() {
            // SAFETY: checked
            Some(unsafe { self.to_i64() })
        } else {
            None
        }
    }

    // ── Reference ──────────────────────────────────────────────────

    #[inline(always)]
    pub const fn is_ref(self) -> bool {
        self.0 & TAG_MASK == REF_TAG
    }

    #[inline(always)]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        let addr = ptr as u64;
        debug_assert!(addr & TAG_MASK == 0, "pointer not aligned");
        Self(addr | REF_TAG)
    }

    #[inline(always)]
    pub const fn ref_bits(self) -> u64 {
        self.0 & !TAG_MASK
    }

    #[inline(always)]
    pub fn as_ptr<T>(self) -> *mut T {
        debug_assert!(self.is_ref());
        self.ref_bits() as *mut T
    }

    /// # Safety
    ///
    /// The value must be a reference to a valid, live `T`.
    #[inline(always)]
    pub unsafe fn as_ref<T>(&self) -> &T {
        debug_assert!(self.is_ref());
        // SAFETY: by contract
        unsafe { &*(self.ref_bits() as *const T) }
    }

    /// # Safety
    ///
    /// The value must be a reference to a valid, live `T`, and no other
    /// references to it may exist.
    #[inline(always)]
    pub unsafe fn as_mut<T>(&mut self) -> &mut T {
        debug_assert!(self.is_ref());
        // SAFETY: by contract
        unsafe { &mut *(self.ref_bits() as *mut T) }
    }

    #[inline(always)]
    pub const fn is_header(self) -> bool {
        self.0 & TAG_MASK == HEADER_TAG
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::from_i64(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::from_usize(value)
    }
}

impl core::fmt::Debug for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_fixnum() {
            // SAFETY: checked
            write!(f, "Fixnum({})", unsafe { self.to_i64() })
        } else if self.is_ref() {
            write!(f, "Ref(0x{:x})", self.ref_bits())
        } else {
            write!(f, "Header(0x{:016x})", self.0)
        }
    }
}
