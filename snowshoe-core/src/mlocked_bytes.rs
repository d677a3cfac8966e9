//! Secure heap allocation backed by `mlock(2)`.
//!
//! Generic secure-heap infrastructure: allocate, lock the pages against
//! swap, and zero on drop. Not protocol-specific.

use std::io;
use std::ptr::{self, NonNull};
use std::slice;

use thiserror::Error;

/// Errors that can occur when working with mlocked memory.
#[derive(Debug, Error)]
pub enum MLockedError {
    #[error("allocation failed")]
    AllocationFailed,
    #[error("mlock failed: {code}")]
    LockFailed { code: i32 },
    #[error("alignment must be non-zero")]
    InvalidAlignment,
    #[error("requested size is too large")]
    AllocationTooLarge,
}

#[derive(Debug)]
struct MLockedRegion {
    ptr: NonNull<u8>,
    len: usize,
    locked: bool,
}

impl MLockedRegion {
    fn allocate(len: usize, zeroed: bool) -> Result<Self, MLockedError> {
        Self::allocate_aligned(len, zeroed, None)
    }

    fn allocate_aligned(
        len: usize,
        zeroed: bool,
        align: Option<usize>,
    ) -> Result<Self, MLockedError> {
        let requested = len;

        if requested == 0 {
            // SAFETY: malloc(1) always returns a valid pointer or NULL.
            let ptr = unsafe { libc::malloc(1) } as *mut u8;
            if ptr.is_null() {
                return Err(MLockedError::AllocationFailed);
            }
            return Ok(Self {
                // SAFETY: checked non-null above.
                ptr: unsafe { NonNull::new_unchecked(ptr) },
                len: 0,
                locked: false,
            });
        }

        let alloc_len = match align {
            Some(alignment) => {
                if alignment == 0 {
                    return Err(MLockedError::InvalidAlignment);
                }
                round_up_to(requested, alignment)?
            }
            None => requested,
        };

        // SAFETY: malloc/calloc return either a valid pointer or NULL, checked below.
        let ptr = unsafe {
            if zeroed {
                libc::calloc(1, alloc_len)
            } else {
                libc::malloc(alloc_len)
            }
        } as *mut u8;

        if ptr.is_null() {
            return Err(MLockedError::AllocationFailed);
        }

        // SAFETY: ptr is valid and alloc_len is the allocated size.
        let lock_result = unsafe { libc::mlock(ptr.cast(), alloc_len) };
        if lock_result != 0 {
            let err = io::Error::last_os_error();
            // SAFETY: ptr was allocated by malloc/calloc above.
            unsafe {
                libc::free(ptr.cast());
            }
            return Err(MLockedError::LockFailed {
                code: err.raw_os_error().unwrap_or_default(),
            });
        }

        Ok(Self {
            // SAFETY: checked non-null above.
            ptr: unsafe { NonNull::new_unchecked(ptr) },
            len: alloc_len,
            locked: true,
        })
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: self.ptr is valid for self.len bytes for the lifetime of self.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: self.ptr is valid for self.len bytes, exclusive access via &mut self.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn len(&self) -> usize {
        self.len
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MLockedRegion {
    fn drop(&mut self) {
        if self.len > 0 {
            // SAFETY: self.ptr is valid for self.len bytes; zeroed before release.
            unsafe {
                ptr::write_bytes(self.ptr.as_ptr(), 0, self.len);
            }
        }

        if self.locked {
            // SAFETY: self.ptr was locked with mlock() in allocate_aligned.
            unsafe {
                libc::munlock(self.ptr.as_ptr().cast(), self.len);
            }
        }

        // SAFETY: self.ptr was allocated by malloc/calloc in allocate_aligned.
        unsafe {
            libc::free(self.ptr.as_ptr().cast());
        }
    }
}

fn round_up_to(value: usize, align: usize) -> Result<usize, MLockedError> {
    if align == 0 {
        return Err(MLockedError::InvalidAlignment);
    }

    let remainder = value % align;
    if remainder == 0 {
        Ok(value)
    } else {
        value
            .checked_add(align - remainder)
            .ok_or(MLockedError::AllocationTooLarge)
    }
}

/// Heap allocation backed by `mlock(2)` with a runtime length.
pub struct MLockedBytes {
    region: MLockedRegion,
}

impl MLockedBytes {
    /// Allocate a new mlocked buffer with undefined contents.
    pub fn new(len: usize) -> Result<Self, MLockedError> {
        Ok(Self {
            region: MLockedRegion::allocate(len, false)?,
        })
    }

    /// Allocate a new zeroed mlocked buffer.
    pub fn new_zeroed(len: usize) -> Result<Self, MLockedError> {
        Ok(Self {
            region: MLockedRegion::allocate(len, true)?,
        })
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Returns `true` if the allocation is empty.
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Immutable view of the underlying bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.region.as_slice()
    }

    /// Mutable view of the underlying bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.region.as_mut_slice()
    }

    /// Raw pointer to the allocation.
    pub fn as_ptr(&self) -> *const u8 {
        self.region.as_ptr()
    }

    /// Mutable raw pointer to the allocation.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.region.as_mut_ptr()
    }

    /// Create a deep copy of this buffer.
    pub fn try_clone(&self) -> Result<Self, MLockedError> {
        let mut cloned = Self::new(self.len())?;
        if self.len() > 0 {
            // SAFETY: both buffers are self.len() bytes and freshly allocated, no overlap.
            unsafe {
                ptr::copy_nonoverlapping(self.as_ptr(), cloned.as_mut_ptr(), self.len());
            }
        }
        Ok(cloned)
    }

    /// Explicitly zero and unlock the memory before dropping it.
    pub fn finalize(self) {
        drop(self);
    }
}

/// Secure heap allocation backed by `mlock(2)` for a compile-time-sized
/// secret, e.g. the 32-byte static private scalar.
pub struct MLockedSizedBytes<const N: usize> {
    region: MLockedRegion,
}

impl<const N: usize> MLockedSizedBytes<N> {
    fn allocate(zeroed: bool) -> Result<Self, MLockedError> {
        Ok(Self {
            region: MLockedRegion::allocate(N, zeroed)?,
        })
    }

    /// Allocate a new mlocked buffer with undefined contents.
    pub fn new() -> Result<Self, MLockedError> {
        Self::allocate(false)
    }

    /// Allocate a new zeroed mlocked buffer.
    pub fn new_zeroed() -> Result<Self, MLockedError> {
        Self::allocate(true)
    }

    /// Create a deep copy of this buffer.
    pub fn try_clone(&self) -> Result<Self, MLockedError> {
        let mut cloned = Self::new()?;
        if N > 0 {
            cloned.as_mut_slice().copy_from_slice(self.as_slice());
        }
        Ok(cloned)
    }

    /// Length in bytes.
    pub const fn len(&self) -> usize {
        N
    }

    /// Returns true if this represents an empty allocation.
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Immutable view of the underlying bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.region.as_slice()
    }

    /// Immutable view as a fixed-size array reference.
    pub fn as_array(&self) -> &[u8; N] {
        // SAFETY: self.region.as_ptr() points to at least N bytes, enforced by allocate(N).
        unsafe { &*(self.region.as_ptr() as *const [u8; N]) }
    }

    /// Mutable view of the underlying bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.region.as_mut_slice()
    }

    /// Mutable view as a fixed-size array reference.
    pub fn as_mut_array(&mut self) -> &mut [u8; N] {
        // SAFETY: self.region.as_mut_ptr() points to at least N bytes, exclusive via &mut self.
        unsafe { &mut *(self.region.as_mut_ptr() as *mut [u8; N]) }
    }

    /// Explicitly zero and unlock the memory before dropping it.
    pub fn finalize(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_zeroed() {
        let buffer = MLockedSizedBytes::<16>::new_zeroed().unwrap();
        assert_eq!(buffer.as_slice(), &[0u8; 16]);
    }

    #[test]
    fn clone_copies_contents() {
        let mut buffer = MLockedSizedBytes::<8>::new_zeroed().unwrap();
        buffer.as_mut_slice().copy_from_slice(b"DEADBEEF");
        let cloned = buffer.try_clone().unwrap();
        assert_eq!(cloned.as_slice(), b"DEADBEEF");
    }

    #[test]
    fn dynamic_allocate_and_clone() {
        let mut buffer = MLockedBytes::new(12).unwrap();
        buffer.as_mut_slice().fill(0xAA);
        let cloned = buffer.try_clone().unwrap();
        assert_eq!(cloned.as_slice(), &[0xAA; 12]);
    }

    #[test]
    fn zeroed_on_drop() {
        // We cannot observe freed memory safely; this only exercises the
        // drop path for leak/crash sanitizers run by `cargo test`.
        let buffer = MLockedBytes::new_zeroed(32).unwrap();
        drop(buffer);
    }
}
