use std::ptr::NonNull;

#[cfg(unix)]
mod unix {
    use core::ffi::c_void;

    pub const PROT_READ: i32 = 0x1;
    pub const PROT_WRITE: i32 = 0x2;

    pub const MAP_PRIVATE: i32 = 0x02;

    #[cfg(target_os = "linux")]
    pub const MAP_ANON: i32 = 0x20;
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    pub const MAP_ANON: i32 = 0x1000;

    pub const MAP_FAILED: isize = -1;

    /// posix mmap and munmap
    /// # Safety
    /// see valid mmap and munmap usage online
    unsafe extern "C" {
        pub fn mmap(
            addr: *mut c_void,
            length: usize,
            prot: i32,
            flags: i32,
            fd: i32,
            offset: isize,
        ) -> *mut c_void;

        pub fn munmap(addr: *mut c_void, length: usize) -> i32;
    }

    /// Private anonymous read/write mapping. The kernel hands out
    /// zero-filled pages.
    /// # Safety
    /// null must be checked
    #[inline]
    pub unsafe fn anonymous_mmap(len: usize) -> *mut u8 {
        // SAFETY: safe if contract holds
        let p = unsafe {
            mmap(
                core::ptr::null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANON,
                -1,
                0,
            )
        };
        if (p as isize) == MAP_FAILED {
            core::ptr::null_mut()
        } else {
            p as *mut u8
        }
    }

    /// # Safety
    /// must be allocated by mmap with the same length
    #[inline]
    pub unsafe fn anonymous_munmap(ptr: *mut u8, len: usize) {
        // SAFETY: safe if contract holds
        let _ = unsafe { munmap(ptr.cast(), len) };
    }
}

pub const OS_PAGE_SIZE: usize = 4096;

/// An owned, zero-initialized, page-aligned region of memory, unmapped on
/// drop.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is plain memory owned by this handle
unsafe impl Send for MappedRegion {}
// SAFETY: the handle itself exposes no interior mutability
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Map `len` bytes (rounded up to whole pages).
    #[must_use]
    pub fn new(len: usize) -> Option<Self> {
        let len = len.next_multiple_of(OS_PAGE_SIZE);
        let ptr = map_zeroed(len)?;
        debug_assert!((ptr.as_ptr() as usize).is_multiple_of(OS_PAGE_SIZE));
        Some(Self { ptr, len })
    }

    #[inline(always)]
    pub fn start(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn end(&self) -> *mut u8 {
        // SAFETY: one past the end of the mapping
        unsafe { self.start().add(self.len) }
    }

    #[inline(always)]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.start() as usize && addr < self.end() as usize
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unmap(self.ptr, self.len);
    }
}

#[cfg(unix)]
fn map_zeroed(len: usize) -> Option<NonNull<u8>> {
    // SAFETY: null is checked by NonNull::new
    let ptr = unsafe { unix::anonymous_mmap(len) };
    NonNull::new(ptr)
}

#[cfg(unix)]
fn unmap(ptr: NonNull<u8>, len: usize) {
    // SAFETY: ptr and len come from `map_zeroed`
    unsafe { unix::anonymous_munmap(ptr.as_ptr(), len) };
}

#[cfg(not(unix))]
fn map_zeroed(len: usize) -> Option<NonNull<u8>> {
    let layout = std::alloc::Layout::from_size_align(len, OS_PAGE_SIZE).ok()?;
    // SAFETY: layout has non-zero size
    NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) })
}

#[cfg(not(unix))]
fn unmap(ptr: NonNull<u8>, len: usize) {
    let layout = std::alloc::Layout::from_size_align(len, OS_PAGE_SIZE)
        .expect("layout was valid when mapped");
    // SAFETY: ptr and layout come from `map_zeroed`
    unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_is_zeroed_and_page_rounded() {
        let region = MappedRegion::new(100).unwrap();
        assert_eq!(region.len(), OS_PAGE_SIZE);
        let bytes = unsafe { std::slice::from_raw_parts(region.start(), region.len()) };
        assert!(bytes.iter().all(|b| *b == 0));
        assert!(region.contains(region.start()));
        assert!(!region.contains(region.end()));
    }
}
