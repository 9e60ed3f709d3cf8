//! buffer
//!
//! A refcounted, multi-segment byte buffer compatible with libuv's
//! `uv_buf_t[]` scatter/gather convention: a single contiguous allocation is
//! carved into segments at construction time, and shrinking a segment's
//! length (to record how many bytes an I/O operation actually touched)
//! never moves its base pointer.

use std::cell::{Cell, UnsafeCell};
use std::slice;
use std::sync::Arc;

enum Storage {
    Owned(UnsafeCell<Vec<u8>>),
    /// Wraps memory this crate does not own (e.g. a static string or
    /// caller-owned region). The caller is responsible for that region
    /// outliving every clone of the `Buffer`.
    External { ptr: *mut u8, len: usize },
}

struct Inner {
    storage: Storage,
    offsets: Vec<usize>,
    original_lengths: Vec<usize>,
    lengths: Vec<Cell<usize>>,
}

// Buffers are only ever mutated from the loop thread or from inside an
// engine trampoline that the loop thread is synchronously blocked on; the
// raw pointers above never escape that discipline.
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

/// A refcounted, possibly multi-segment byte buffer.
#[derive(Clone)]
pub struct Buffer(Arc<Inner>);

impl Buffer {
    /// An empty, zero-length single-segment buffer.
    pub fn new() -> Self {
        Self::with_lengths(&[0])
    }

    /// Allocate one contiguous region sized to the sum of `lengths`, and
    /// slice it into `lengths.len()` segments: `base(i)` for `i > 0` equals
    /// `base(i-1) + len(i-1)` at construction time.
    pub fn with_lengths(lengths: &[usize]) -> Self {
        assert!(!lengths.is_empty(), "a buffer must have at least one segment");
        let mut offsets = Vec::with_capacity(lengths.len());
        let mut offset = 0usize;
        for &l in lengths {
            offsets.push(offset);
            offset += l;
        }
        Self(Arc::new(Inner {
            storage: Storage::Owned(UnsafeCell::new(vec![0u8; offset])),
            offsets,
            original_lengths: lengths.to_vec(),
            lengths: lengths.iter().map(|&l| Cell::new(l)).collect(),
        }))
    }

    /// A single-segment buffer of `len` bytes.
    pub fn with_capacity(len: usize) -> Self {
        Self::with_lengths(&[len])
    }

    /// Wrap an existing region of memory as a single, non-owned segment.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for as long
    /// as any clone of the returned `Buffer` remains alive.
    pub unsafe fn wrap(ptr: *mut u8, len: usize) -> Self {
        Self(Arc::new(Inner {
            storage: Storage::External { ptr, len },
            offsets: vec![0],
            original_lengths: vec![len],
            lengths: vec![Cell::new(len)],
        }))
    }

    pub fn segments(&self) -> usize {
        self.0.offsets.len()
    }

    fn storage_base(&self) -> *mut u8 {
        match &self.0.storage {
            Storage::Owned(cell) => unsafe { (*cell.get()).as_mut_ptr() },
            Storage::External { ptr, .. } => *ptr,
        }
    }

    /// Base pointer of segment `index`.
    pub fn base(&self, index: usize) -> *mut u8 {
        unsafe { self.storage_base().add(self.0.offsets[index]) }
    }

    /// Current (possibly shrunk) length of segment `index`.
    pub fn len(&self, index: usize) -> usize {
        self.0.lengths[index].get()
    }

    pub fn is_empty(&self) -> bool {
        (0..self.segments()).all(|i| self.len(i) == 0)
    }

    pub fn total_len(&self) -> usize {
        (0..self.segments()).map(|i| self.len(i)).sum()
    }

    /// Shrink segment `index`'s reported length, e.g. to the number of
    /// bytes a read actually filled in. The base pointer never moves.
    pub fn set_len(&self, index: usize, new_len: usize) {
        let original = self.0.original_lengths[index];
        assert!(
            new_len <= original,
            "Buffer::set_len may only shrink a segment ({new_len} > {original})"
        );
        self.0.lengths[index].set(new_len);
    }

    pub fn as_slice(&self, index: usize) -> &[u8] {
        unsafe { slice::from_raw_parts(self.base(index), self.len(index)) }
    }

    pub fn as_mut_slice(&self, index: usize) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.base(index), self.len(index)) }
    }

    /// Render every segment as a `uv_buf_t`, in order, for submission to a
    /// vectorized-I/O engine call.
    pub fn as_uv_bufs(&self) -> Vec<libuv_sys2::uv_buf_t> {
        (0..self.segments())
            .map(|i| libuv_sys2::uv_buf_t {
                base: self.base(i) as _,
                len: self.len(i) as _,
            })
            .collect()
    }

    /// Number of live clones of this buffer (testable property 3: at least
    /// one at the moment an output request's completion callback is
    /// entered).
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self(Arc::new(Inner {
            storage: Storage::Owned(UnsafeCell::new(bytes)),
            offsets: vec![0],
            original_lengths: vec![len],
            lengths: vec![Cell::new(len)],
        }))
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_has_zero_length() {
        let b = Buffer::new();
        assert_eq!(b.segments(), 1);
        assert_eq!(b.len(0), 0);
        assert!(b.is_empty());
    }

    #[test]
    fn multi_segment_layout_matches_invariant() {
        let lens = [4usize, 8, 2];
        let b = Buffer::with_lengths(&lens);
        assert_eq!(b.segments(), lens.len());
        let base0 = b.base(0);
        let mut acc = 0usize;
        for (i, &l) in lens.iter().enumerate() {
            assert_eq!(b.base(i) as usize, base0 as usize + acc);
            assert_eq!(b.len(i), l);
            acc += l;
        }
        assert_eq!(b.total_len(), lens.iter().sum::<usize>());
    }

    #[test]
    fn set_len_shrinks_without_moving_base() {
        let b = Buffer::with_capacity(64);
        let base = b.base(0);
        b.set_len(0, 10);
        assert_eq!(b.base(0), base);
        assert_eq!(b.len(0), 10);
    }

    #[test]
    #[should_panic(expected = "shrink")]
    fn set_len_cannot_grow() {
        let b = Buffer::with_capacity(8);
        b.set_len(0, 9);
    }

    #[test]
    fn clone_bumps_refcount() {
        let b = Buffer::with_capacity(4);
        assert_eq!(b.strong_count(), 1);
        let b2 = b.clone();
        assert_eq!(b.strong_count(), 2);
        drop(b2);
        assert_eq!(b.strong_count(), 1);
    }

    #[test]
    fn from_vec_round_trips_bytes() {
        let b = Buffer::from(vec![1u8, 2, 3]);
        assert_eq!(b.as_slice(0), &[1, 2, 3]);
    }
}
