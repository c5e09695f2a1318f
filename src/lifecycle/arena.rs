//! Anonymous page-backed memory arena.
//!
//! Reserved once at core creation for collaborators' transient buffers.
//! Pages are only committed by the kernel when touched.

use std::ptr::NonNull;

use crate::status::{LbError, LbResult};

/// Arena size reserved by default (64 MiB).
pub const DEFAULT_ARENA_BYTES: usize = 64 * 1024 * 1024;

/// A private, read/write anonymous mapping. Unmapped on drop.
#[derive(Debug)]
pub struct Arena {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is owned exclusively by the Arena; shared access only
// hands out the base pointer, and writes require `&mut self`.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Map `len` bytes of zeroed memory.
    pub fn reserve(len: usize) -> LbResult<Self> {
        if len == 0 {
            return Err(LbError::InvalidArgument("arena length is 0"));
        }
        // SAFETY: anonymous private mapping with no fixed address; the
        // result is checked against MAP_FAILED before use.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(LbError::last_os("mmap"));
        }
        let ptr = NonNull::new(addr.cast::<u8>()).ok_or(LbError::OutOfMemory)?;
        Ok(Self { ptr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is `len` bytes, readable and writable, and
        // lives as long as `self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` describe exactly the mapping created in `reserve`.
        let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            tracing::error!(
                target: "core",
                errno = err.raw_os_error(),
                error = %err,
                bytes = self.len,
                "munmap failed"
            );
        }
    }
}
