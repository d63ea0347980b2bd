//! Block-structured bump allocation heap.
//!
//! Memory is handed out from fixed-size blocks by thread-local
//! [`HeapProxy`] bump windows; requests above `large_size` get their own
//! mapping in the large object space. All memory arrives zero-initialized,
//! so a word that was never written reads as the fixnum `0`.
//!
//! Objects are never moved or freed while the heap lives. Instead of a
//! collector, the heap carries a verifier that walks every allocated object
//! at safepoints and checks the invariants a concurrent scanner relies on.
//!
//! This crate is decoupled from the object layouts. Consumers provide an
//! [`ObjectModel`]: how big an object is, which of its words may be
//! references, and how to check its structure.

use std::{
    alloc::Layout,
    fmt,
    ops::Deref,
    ptr::{self, NonNull},
    sync::Arc,
};

use ahash::AHashSet;
use log::{debug, trace};
use object::{Header, Value, WORD_SIZE};
use parking_lot::Mutex;

use crate::system::{MappedRegion, OS_PAGE_SIZE};

// ── Public API types ──────────────────────────────────────────────────

/// Function that traces all Value edges of a heap object.
///
/// Given a pointer to a heap object (whose first bytes are an [`object::Header`]),
/// the function must call `visitor` for every [`Value`] field that may be a heap
/// reference.
///
/// # Safety
///
/// `obj` must point to a valid, live heap object with a valid [`Header`].
pub type TraceFn = unsafe fn(obj: *const u8, visitor: &mut dyn FnMut(&mut Value));

/// Function that returns the size in bytes of a heap object, or `0` when
/// the object cannot be interpreted.
///
/// # Safety
///
/// `obj` must point to an allocated heap object.
pub type SizeFn = unsafe fn(obj: *const u8) -> usize;

/// Function that checks the structure of a single heap object.
///
/// # Safety
///
/// `obj` must point to an allocated heap object whose references all point
/// at allocated objects.
pub type VerifyFn = unsafe fn(obj: *const u8) -> Result<(), &'static str>;

/// The consumer-provided view of object layouts.
#[derive(Debug, Clone, Copy)]
pub struct ObjectModel {
    pub size_fn: SizeFn,
    pub trace_fn: TraceFn,
    pub verify_fn: VerifyFn,
}

// ── Heap settings ─────────────────────────────────────────────────────

/// Configuration for the heap.
#[derive(Debug, Clone)]
pub struct HeapSettings {
    /// Size of a Block. Must be a multiple of OS page size (typ. 32KB).
    pub block_size: usize,
    /// Size of an object before it gets its own mapping. This is also the
    /// ceiling for young (bump) allocation.
    /// should be at most size of block
    pub large_size: usize,
    /// Walk and check the whole heap at every safepoint.
    pub verify_on_safepoint: bool,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            block_size: 32_768, // 32 KB = 2^15
            large_size: 8_176,  // 8 KB - (Header + counter) = 2^13 - 16
            verify_on_safepoint: false,
        }
    }
}

impl HeapSettings {
    #[inline]
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.block_size == 0 || self.large_size == 0 {
            return Err("Sizes must be > 0");
        }
        if !self.block_size.is_multiple_of(OS_PAGE_SIZE) {
            return Err("block_size must match OS page alignment");
        }
        if !self.large_size.is_multiple_of(WORD_SIZE) {
            return Err("large_size must be word aligned");
        }
        if self.large_size > self.block_size {
            return Err("large size must be smaller or equal to block_size");
        }
        Ok(())
    }
}

// ── Verification ──────────────────────────────────────────────────────

/// Summary of a successful heap walk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VerifyStats {
    pub objects: usize,
    pub bytes: usize,
    pub references: usize,
}

/// The first violation found by a heap walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    /// Allocated memory whose header word was never written.
    UninitializedHeader { address: usize },
    /// The object model could not size the object, or it overruns its
    /// region.
    BadSize { address: usize, size: usize },
    /// A reference that does not point at the start of an allocated object.
    DanglingReference { object: usize, target: usize },
    /// The object model rejected the object.
    InvalidObject { address: usize, reason: &'static str },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UninitializedHeader { address } => {
                write!(f, "uninitialized header at {address:#x}")
            }
            Self::BadSize { address, size } => {
                write!(f, "object at {address:#x} has invalid size {size}")
            }
            Self::DanglingReference { object, target } => write!(
                f,
                "object at {object:#x} references {target:#x}, which is not an object start"
            ),
            Self::InvalidObject { address, reason } => {
                write!(f, "object at {address:#x} is malformed: {reason}")
            }
        }
    }
}

impl std::error::Error for VerifyError {}

// ── HeapInner ─────────────────────────────────────────────────────────

const NO_BLOCK: usize = usize::MAX;

/// A mapped block and the extent of it that its owner has published.
#[derive(Debug)]
struct BlockRecord {
    region: MappedRegion,
    /// Bytes in use, as of the owner's last flush.
    top: usize,
}

/// Core shared heap state.
#[derive(Debug)]
pub struct HeapInner {
    pub settings: HeapSettings,
    pub model: ObjectModel,
    blocks: Mutex<Vec<BlockRecord>>,
    large_objects: Mutex<Vec<MappedRegion>>,
}

impl HeapInner {
    pub fn new(settings: HeapSettings, model: ObjectModel) -> Self {
        settings.validate().expect("Invalid Heap Settings");

        Self {
            settings,
            model,
            blocks: Mutex::new(Vec::new()),
            large_objects: Mutex::new(Vec::new()),
        }
    }

    /// Maps a fresh block and returns its index and bounds.
    pub fn request_block(&self) -> (usize, *mut u8, *mut u8) {
        let region = MappedRegion::new(self.settings.block_size)
            .expect("OOM: block allocation failed");
        let (start, end) = (region.start(), region.end());

        let mut blocks = self.blocks.lock();
        blocks.push(BlockRecord { region, top: 0 });
        let index = blocks.len() - 1;
        debug!("mapped block {index} at {start:p}");
        (index, start, end)
    }

    fn publish_top(&self, block: usize, top: usize) {
        let mut blocks = self.blocks.lock();
        debug_assert!(top <= blocks[block].region.len());
        blocks[block].top = top;
    }

    /// Handles off-block allocation via system mmap (Large Object Space).
    fn allocate_large(&self, size: usize) -> NonNull<u8> {
        let region =
            MappedRegion::new(size).expect("OOM: Large Object allocation failed");
        // SAFETY: mappings are never null
        let ptr = unsafe { NonNull::new_unchecked(region.start()) };
        self.large_objects.lock().push(region);
        ptr
    }

    pub fn block_count(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn large_object_count(&self) -> usize {
        self.large_objects.lock().len()
    }

    /// Walks every published object and checks that headers are written,
    /// sizes are sane, references land on object starts, and the object
    /// model accepts each object.
    ///
    /// Objects past a proxy's last flush are not visited. Results are only
    /// meaningful while no other proxy is initializing objects.
    pub fn verify(&self) -> Result<VerifyStats, VerifyError> {
        let blocks = self.blocks.lock();
        let large = self.large_objects.lock();

        let mut starts = AHashSet::default();
        let mut objects: Vec<*const u8> = Vec::new();
        let mut stats = VerifyStats::default();

        let block_regions =
            blocks.iter().map(|b| (b.region.start() as usize, b.top, false));
        // a large region holds exactly one object, the rest is padding
        let large_regions =
            large.iter().map(|r| (r.start() as usize, r.len(), true));

        for (start, extent, single) in block_regions.chain(large_regions) {
            let limit = start + extent;
            let mut cur = start;
            while cur < limit {
                let obj = cur as *const u8;
                // SAFETY: cur lies within the region's published extent
                let header = unsafe { &*(obj as *const Header) };
                if !header.is_initialized() {
                    return Err(VerifyError::UninitializedHeader { address: cur });
                }
                // SAFETY: header is initialized
                let size = unsafe { (self.model.size_fn)(obj) };
                if size == 0
                    || !size.is_multiple_of(WORD_SIZE)
                    || cur + size > limit
                {
                    return Err(VerifyError::BadSize { address: cur, size });
                }
                starts.insert(cur);
                objects.push(obj);
                stats.bytes += size;
                cur += size;

                if single {
                    break;
                }
            }
        }

        for &obj in &objects {
            let mut dangling = None;
            let mut references = 0;
            // SAFETY: obj was sized and has an initialized header
            unsafe {
                (self.model.trace_fn)(obj, &mut |value| {
                    if !value.is_ref() {
                        return;
                    }
                    references += 1;
                    let target = value.ref_bits() as usize;
                    if dangling.is_none() && !starts.contains(&target) {
                        dangling = Some(target);
                    }
                });
            }
            if let Some(target) = dangling {
                return Err(VerifyError::DanglingReference {
                    object: obj as usize,
                    target,
                });
            }
            stats.references += references;

            // SAFETY: all references were checked above
            unsafe { (self.model.verify_fn)(obj) }.map_err(|reason| {
                VerifyError::InvalidObject { address: obj as usize, reason }
            })?;
        }

        stats.objects = objects.len();
        trace!(
            "verified {} objects, {} bytes, {} references",
            stats.objects, stats.bytes, stats.references
        );
        Ok(stats)
    }
}

// ── Heap (Arc wrapper) ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Heap(Arc<HeapInner>);

impl Heap {
    #[must_use]
    pub fn new(settings: HeapSettings, model: ObjectModel) -> Self {
        let inner = HeapInner::new(settings, model);
        Self(Arc::new(inner))
    }

    #[must_use]
    pub fn proxy(&self) -> HeapProxy {
        HeapProxy::new(self.clone())
    }
}

impl Deref for Heap {
    type Target = HeapInner;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ── HeapProxy (thread-local allocator) ────────────────────────────────

/// Per-proxy allocation counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocationStats {
    pub young_bytes: usize,
    pub young_objects: usize,
    pub large_objects: usize,
    pub safepoints: usize,
}

/// Thread-local allocator.
///
/// Manages bump allocation within the current block (cursor to limit).
#[derive(Debug)]
pub struct HeapProxy {
    pub heap: Heap,
    pub stats: AllocationStats,
    /// Index of the current active Block.
    block: usize,
    block_start: *mut u8,
    /// Current allocation cursor.
    bump: *mut u8,
    /// End of the current block.
    end: *mut u8,
}

// SAFETY: the bump window points into a block owned by the shared heap and
// is only ever used by the proxy that acquired it.
unsafe impl Send for HeapProxy {}

impl HeapProxy {
    #[must_use]
    pub fn new(heap: Heap) -> Self {
        Self {
            heap,
            stats: AllocationStats::default(),
            block: NO_BLOCK,
            block_start: ptr::null_mut(),
            bump: ptr::null_mut(),
            end: ptr::null_mut(),
        }
    }

    /// Largest request [`allocate_young`](Self::allocate_young) accepts.
    #[inline(always)]
    pub fn young_limit(&self) -> usize {
        self.heap.settings.large_size
    }

    /// Bump-allocates `size` zeroed bytes.
    ///
    /// Always succeeds for `size <= young_limit()`; if the current block is
    /// exhausted this passes a safepoint and moves to a fresh block before
    /// handing out the memory.
    #[inline(always)]
    pub fn allocate_young(&mut self, size: usize) -> NonNull<u8> {
        debug_assert!(size > 0 && size.is_multiple_of(WORD_SIZE));
        assert!(
            size <= self.young_limit(),
            "young allocation of {size} bytes exceeds the ceiling"
        );

        // Fast path: current block has space.
        if let Some(ptr) = self.allocate_on_block(size) {
            self.record_young(size);
            return ptr;
        }

        self.allocate_young_slow(size)
    }

    #[cold]
    #[inline(never)]
    fn allocate_young_slow(&mut self, size: usize) -> NonNull<u8> {
        self.safepoint();
        self.exchange_block();

        if let Some(ptr) = self.allocate_on_block(size) {
            self.record_young(size);
            return ptr;
        }

        panic!("out of memory");
    }

    #[inline(always)]
    fn record_young(&mut self, size: usize) {
        self.stats.young_bytes += size;
        self.stats.young_objects += 1;
    }

    /// Bump allocates within the current block.
    #[inline]
    pub fn allocate_on_block(&mut self, size: usize) -> Option<NonNull<u8>> {
        let cur = self.bump as usize;
        let new_cur = cur.checked_add(size)?;

        if self.bump.is_null() || new_cur > self.end as usize {
            return None;
        }

        self.bump = new_cur as *mut u8;
        // SAFETY: cur is within the block
        Some(unsafe { NonNull::new_unchecked(cur as *mut u8) })
    }

    /// General allocation path: always passes a safepoint, and serves
    /// requests above `large_size` from the large object space.
    pub fn allocate(&mut self, layout: Layout) -> NonNull<u8> {
        debug_assert!(layout.align() <= WORD_SIZE);
        let size = layout.size().max(WORD_SIZE).next_multiple_of(WORD_SIZE);

        self.safepoint();

        if size > self.young_limit() {
            return self.allocate_large(size);
        }
        self.allocate_young(size)
    }

    #[cold]
    fn allocate_large(&mut self, size: usize) -> NonNull<u8> {
        debug!("large allocation of {size} bytes");
        self.stats.large_objects += 1;
        self.heap.allocate_large(size)
    }

    /// Retires the current block and maps a fresh one.
    pub fn exchange_block(&mut self) {
        self.flush();

        let (block, start, end) = self.heap.request_block();
        self.block = block;
        self.block_start = start;
        self.bump = start;
        self.end = end;
    }

    /// Publishes the current bump position so heap walks can see every
    /// object allocated so far.
    pub fn flush(&mut self) {
        if self.block == NO_BLOCK {
            return;
        }
        let top = self.bump as usize - self.block_start as usize;
        self.heap.publish_top(self.block, top);
    }

    /// Point at which all memory handed out by this proxy must be fully
    /// initialized. Runs the heap verifier when configured to.
    #[inline(never)]
    pub fn safepoint(&mut self) {
        self.stats.safepoints += 1;
        if !self.heap.settings.verify_on_safepoint {
            return;
        }
        if let Err(error) = self.verify() {
            panic!("heap verification failed at safepoint: {error}");
        }
    }

    pub fn verify(&mut self) -> Result<VerifyStats, VerifyError> {
        self.flush();
        self.heap.verify()
    }
}

impl Drop for HeapProxy {
    fn drop(&mut self) {
        self.flush();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
