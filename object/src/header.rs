use std::sync::atomic::{AtomicU8, Ordering};

/// Object type tag stored in bits 2..7 of the header's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    Map = 0,
    FixedArray,
    SloppyArgumentsElements,
    Context,
    Function,
    Oddball,
    StrictArguments,
    SloppyArguments,
    Array,
}

impl ObjectType {
    pub const COUNT: usize = Self::Array as usize + 1;

    pub const fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Map,
            1 => Self::FixedArray,
            2 => Self::SloppyArgumentsElements,
            3 => Self::Context,
            4 => Self::Function,
            5 => Self::Oddball,
            6 => Self::StrictArguments,
            7 => Self::SloppyArguments,
            8 => Self::Array,
            _ => return None,
        })
    }

    /// Types laid out as `[header][map][length][slot_0..]`.
    #[inline(always)]
    pub const fn is_fixed_array_like(self) -> bool {
        matches!(
            self,
            Self::FixedArray | Self::SloppyArgumentsElements | Self::Context
        )
    }

    /// Types laid out as an [`IndexedObject`](crate::IndexedObject) prefix.
    #[inline(always)]
    pub const fn is_indexed_object(self) -> bool {
        matches!(
            self,
            Self::StrictArguments | Self::SloppyArguments | Self::Array
        )
    }
}

bitflags::bitflags! {
    /// Bookkeeping flags stored atomically in the header.
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct HeaderFlags: u8 {
        /// Shared immutable singletons (the hole, the empty fixed array, maps).
        const READ_ONLY = 1 << 0;
    }
}

const HEADER_TAG: u8 = 0b11;

/// The 8-byte header at the start of every heap object.
///
/// ```text
/// byte 0:    [tag:2 = 0b11] [object_type:6]
/// byte 1:    flags (atomic): ReadOnly
/// bytes 2‥7: reserved (zero)
/// ```
///
/// On little-endian systems, reading these 8 bytes as a `u64` yields a
/// value whose low 2 bits are `0b11`, which [`Value::is_header`](crate::Value::is_header)
/// detects.
#[repr(C)]
pub struct Header {
    tag_and_type: u8,
    flags: AtomicU8,
    _reserved: [u8; 6],
}

const _: () = assert!(size_of::<Header>() == 8);

impl Header {
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            tag_and_type: ((object_type as u8) << 2) | HEADER_TAG,
            flags: AtomicU8::new(0),
            _reserved: [0; 6],
        }
    }

    /// `true` once the first byte carries the header tag. Zeroed memory
    /// that was never initialized reports `false`.
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.tag_and_type & 0b11 == HEADER_TAG
    }

    #[inline(always)]
    pub fn try_object_type(&self) -> Option<ObjectType> {
        if !self.is_initialized() {
            return None;
        }
        ObjectType::from_u8(self.tag_and_type >> 2)
    }

    #[inline(always)]
    pub fn object_type(&self) -> ObjectType {
        let raw = self.tag_and_type >> 2;
        debug_assert!((raw as usize) < ObjectType::COUNT);
        match ObjectType::from_u8(raw) {
            Some(ty) => ty,
            None => unreachable!("corrupted header: {raw:#x}"),
        }
    }

    // ── flags ──────────────────────────────────────────────────────

    #[inline(always)]
    pub fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }

    #[inline(always)]
    pub fn has_flag(&self, flag: HeaderFlags) -> bool {
        self.flags().contains(flag)
    }

    #[inline(always)]
    pub fn add_flag(&self, flag: HeaderFlags) {
        self.flags.fetch_or(flag.bits(), Ordering::Relaxed);
    }
}

impl core::fmt::Debug for Header {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Header")
            .field("type", &self.try_object_type())
            .field("flags", &self.flags())
            .finish()
    }
}
