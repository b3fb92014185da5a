//! Receive-side staging: raw read chunks merged into one contiguous window.
//!
//! The reactor thread pushes chunks as they arrive; whichever thread owns
//! the framing state later merges them into a single compactable buffer the
//! framer can scan. Staging and merging never share a lock with the framer,
//! so the reactor is never blocked behind a parse in progress.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::alloc::SlabBlock;
use crate::buffer::ByteBuffer;

/// Thread-safe queue of raw receive chunks awaiting a merge.
#[derive(Default)]
pub struct ChunkStage {
    pending: Mutex<VecDeque<SlabBlock>>,
}

impl ChunkStage {
    pub fn new() -> ChunkStage {
        ChunkStage::default()
    }

    /// Append a chunk. Non-blocking beyond the short queue lock; empty
    /// chunks are dropped (and thereby freed) immediately.
    pub fn push(&self, chunk: SlabBlock) {
        if chunk.is_empty() {
            return;
        }
        self.pending.lock().unwrap().push_back(chunk);
    }

    /// Take every staged chunk.
    pub fn take(&self) -> VecDeque<SlabBlock> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().unwrap().is_empty()
    }
}

/// A growable receive window with bounded capacity.
///
/// `cursor()` (== `data().len()`) is the number of merged bytes available to
/// a framer. Once `overflow()` is set it never clears; the connection the
/// buffer belongs to must be treated as poisoned.
pub struct RecvBuffer {
    initial_capacity: usize,
    max_capacity: usize,
    merged: ByteBuffer,
    overflow: bool,
    stage: ChunkStage,
}

impl RecvBuffer {
    pub fn new(initial_capacity: usize, max_capacity: usize) -> RecvBuffer {
        RecvBuffer {
            initial_capacity,
            max_capacity: max_capacity.max(initial_capacity),
            merged: ByteBuffer::new(),
            overflow: false,
            stage: ChunkStage::new(),
        }
    }

    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Stage a raw chunk from the receiving thread.
    pub fn push_raw(&self, chunk: SlabBlock) {
        self.stage.push(chunk);
    }

    /// Merge this buffer's own staged chunks. Owner-thread only.
    pub fn merge(&mut self) {
        let chunks = self.stage.take();
        self.merge_chunks(chunks);
    }

    /// Merge chunks staged on an external [`ChunkStage`]. Used when the
    /// buffer lives inside a mutex but producers must stage without it.
    pub fn merge_from(&mut self, stage: &ChunkStage) {
        let chunks = stage.take();
        self.merge_chunks(chunks);
    }

    fn merge_chunks(&mut self, chunks: VecDeque<SlabBlock>) {
        if chunks.is_empty() {
            return;
        }
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let cursor = self.merged.len();
        if cursor + total > self.max_capacity {
            self.overflow = true;
            crate::metrics::RECV_OVERFLOWS.increment();
            // Chunks are freed on drop; no further progress is possible.
            return;
        }

        // Double from the initial capacity up to the hard cap.
        let mut target = self.merged.capacity().max(self.initial_capacity).max(1);
        while target - cursor < total {
            target *= 2;
        }
        let target = target.min(self.max_capacity);
        if target > self.merged.capacity() {
            self.merged.reserve(target - cursor);
        }

        for chunk in chunks {
            self.merged.extend_from_slice(chunk.as_slice());
        }
    }

    /// The merged window.
    pub fn data(&self) -> &[u8] {
        self.merged.as_slice()
    }

    /// Bytes merged so far.
    pub fn cursor(&self) -> usize {
        self.merged.len()
    }

    pub fn overflow(&self) -> bool {
        self.overflow
    }

    /// A new buffer with the same configuration holding a copy of the first
    /// `len` merged bytes. Used by framers to snapshot a parsed message.
    pub fn snapshot_prefix(&self, len: usize) -> RecvBuffer {
        debug_assert!(len <= self.merged.len());
        RecvBuffer {
            initial_capacity: self.initial_capacity,
            max_capacity: self.max_capacity,
            merged: ByteBuffer::from_slice(&self.data()[..len]),
            overflow: self.overflow,
            stage: ChunkStage::new(),
        }
    }

    /// Drop the first `from` merged bytes, shifting the remainder to
    /// offset 0. Used by framers when re-initialising for the next message.
    pub fn compact_to(&mut self, from: usize) {
        self.merged.drop_prefix(from);
    }
}

impl std::fmt::Debug for RecvBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecvBuffer")
            .field("cursor", &self.cursor())
            .field("max_capacity", &self.max_capacity)
            .field("overflow", &self.overflow)
            .finish()
    }
}
