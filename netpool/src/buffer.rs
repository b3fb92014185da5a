//! Owned, resizable byte region with transfer-out semantics.

use bytes::BytesMut;

/// A contiguous owned byte buffer.
///
/// `len()` is the number of meaningful bytes; capacity grows as needed.
/// `take()` transfers the backing allocation out and leaves the buffer
/// empty.
#[derive(Default)]
pub struct ByteBuffer {
    data: BytesMut,
}

impl ByteBuffer {
    pub fn new() -> ByteBuffer {
        ByteBuffer {
            data: BytesMut::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> ByteBuffer {
        ByteBuffer {
            data: BytesMut::with_capacity(capacity),
        }
    }

    pub fn from_slice(data: &[u8]) -> ByteBuffer {
        let mut buf = ByteBuffer::with_capacity(data.len());
        buf.data.extend_from_slice(data);
        buf
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Replace the contents with a copy of `data`.
    pub fn set(&mut self, data: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(data);
    }

    /// Grow or shrink to `new_len` bytes. The preserved prefix keeps its
    /// contents; bytes added by growth are zeroed.
    pub fn resize(&mut self, new_len: usize) {
        self.data.resize(new_len, 0);
    }

    /// Ensure room for `additional` more bytes without reallocation.
    pub fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Transfer the backing storage out, leaving this buffer empty. The
    /// returned value owns the allocation.
    pub fn take(&mut self) -> BytesMut {
        std::mem::take(&mut self.data)
    }

    /// Shift `[from..len)` to offset 0 and truncate, dropping the consumed
    /// prefix in place.
    pub fn drop_prefix(&mut self, from: usize) {
        debug_assert!(from <= self.data.len());
        let remain = self.data.len() - from;
        self.data.copy_within(from.., 0);
        self.data.truncate(remain);
    }
}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
