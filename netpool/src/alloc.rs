//! Size-classed slab allocator fronting the system allocator.
//!
//! Many reactor-side allocations are small, short-lived, and of a handful of
//! identical sizes (receive chunks, per-connection control blocks). Instead
//! of round-tripping each one through the system allocator, freed blocks are
//! parked on a per-size free list bounded by a configurable cap. Sizes of
//! 4 KiB and above always bypass the cache.

use std::alloc::{alloc as sys_alloc, dealloc as sys_dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

/// Sizes at or above this never touch the cache.
pub const MAX_CACHED_SIZE: usize = 0x1000;

/// Default size of a receive chunk handed to `read(2)`.
pub const RECV_CHUNK_SIZE: usize = 0xC00;

/// Default cap for the receive-chunk size class.
const RECV_CHUNK_CACHE: usize = 4096;

const BLOCK_ALIGN: usize = 8;

struct FreeLists(Vec<Vec<*mut u8>>);

// Blocks on the free lists are plain byte allocations with no owner.
unsafe impl Send for FreeLists {}

struct SlabPool {
    /// Per-class cap, indexed by exact size. Written under `store`'s lock,
    /// read lock-free by the probe.
    caps: Vec<AtomicUsize>,
    /// Per-class cached-block count, maintained under `store`'s lock but
    /// readable lock-free by the probe.
    cached: Vec<AtomicUsize>,
    store: Mutex<FreeLists>,
    live_count: AtomicUsize,
    live_bytes: AtomicUsize,
}

static POOL: OnceLock<SlabPool> = OnceLock::new();

fn pool() -> &'static SlabPool {
    POOL.get_or_init(|| {
        let caps: Vec<AtomicUsize> = (0..MAX_CACHED_SIZE).map(|_| AtomicUsize::new(0)).collect();
        caps[RECV_CHUNK_SIZE].store(RECV_CHUNK_CACHE, Ordering::Relaxed);
        SlabPool {
            caps,
            cached: (0..MAX_CACHED_SIZE).map(|_| AtomicUsize::new(0)).collect(),
            store: Mutex::new(FreeLists(vec![Vec::new(); MAX_CACHED_SIZE])),
            live_count: AtomicUsize::new(0),
            live_bytes: AtomicUsize::new(0),
        }
    })
}

fn layout_for(size: usize) -> Layout {
    // Size 0 still yields a distinct allocation.
    Layout::from_size_align(size.max(1), BLOCK_ALIGN).expect("slab layout")
}

/// A block leased from the slab allocator.
///
/// `capacity` is the class size the block was allocated with; `len` is how
/// much of it holds meaningful bytes (zero until the owner says otherwise).
/// Dropping the block returns it to its size-class free list, or to the
/// system allocator when the class is full or uncached.
pub struct SlabBlock {
    ptr: NonNull<u8>,
    capacity: usize,
    len: usize,
}

// A SlabBlock is an exclusively owned byte region.
unsafe impl Send for SlabBlock {}

impl SlabBlock {
    /// Allocate a block and fill it with a copy of `data`.
    pub fn from_slice(data: &[u8]) -> SlabBlock {
        let mut block = alloc_or_oom(data.len());
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), block.ptr.as_ptr(), data.len());
            block.set_len(data.len());
        }
        block
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Declare that the first `len` bytes are initialised.
    ///
    /// # Safety
    ///
    /// The caller must have written `len` bytes starting at `as_mut_ptr()`,
    /// and `len` must not exceed `capacity()`.
    pub unsafe fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.capacity);
        self.len = len;
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl std::ops::Deref for SlabBlock {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Drop for SlabBlock {
    fn drop(&mut self) {
        free_raw(self.ptr, self.capacity);
    }
}

impl std::fmt::Debug for SlabBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlabBlock")
            .field("capacity", &self.capacity)
            .field("len", &self.len)
            .finish()
    }
}

/// Allocate a block of at least `size` bytes, reusing a cached block of the
/// same class when one is parked. Returns `None` if the system allocator
/// fails.
pub fn alloc(size: usize) -> Option<SlabBlock> {
    let p = pool();
    let mut ptr: *mut u8 = std::ptr::null_mut();

    // Probe without the lock: cacheable class with either a non-zero cap or
    // leftover cached blocks from a previous cap.
    if size < MAX_CACHED_SIZE
        && (p.caps[size].load(Ordering::Relaxed) != 0
            || p.cached[size].load(Ordering::Relaxed) != 0)
    {
        let mut store = p.store.lock().unwrap();
        if let Some(cached) = store.0[size].pop() {
            p.cached[size].fetch_sub(1, Ordering::Relaxed);
            ptr = cached;
        }
    }

    if ptr.is_null() {
        ptr = unsafe { sys_alloc(layout_for(size)) };
        if ptr.is_null() {
            return None;
        }
    }

    p.live_count.fetch_add(1, Ordering::Relaxed);
    p.live_bytes.fetch_add(size, Ordering::Relaxed);
    Some(SlabBlock {
        ptr: unsafe { NonNull::new_unchecked(ptr) },
        capacity: size,
        len: 0,
    })
}

/// Like [`alloc`], but routes allocation failure through the standard
/// allocation-error handler (which aborts the process).
pub fn alloc_or_oom(size: usize) -> SlabBlock {
    match alloc(size) {
        Some(block) => block,
        None => handle_alloc_error(layout_for(size)),
    }
}

fn free_raw(ptr: NonNull<u8>, capacity: usize) {
    let p = pool();
    p.live_count.fetch_sub(1, Ordering::Relaxed);
    p.live_bytes.fetch_sub(capacity, Ordering::Relaxed);

    if capacity < MAX_CACHED_SIZE && p.caps[capacity].load(Ordering::Relaxed) != 0 {
        let mut store = p.store.lock().unwrap();
        let cap = p.caps[capacity].load(Ordering::Relaxed);
        if store.0[capacity].len() < cap {
            store.0[capacity].push(ptr.as_ptr());
            p.cached[capacity].fetch_add(1, Ordering::Relaxed);
            return;
        }
    }

    unsafe { sys_dealloc(ptr.as_ptr(), layout_for(capacity)) };
}

/// Reconfigure the cache cap for one size class at runtime. Returns false
/// for sizes outside the cacheable range. Shrinking a cap releases surplus
/// parked blocks to the system allocator.
pub fn set_cache(size: usize, cap: usize) -> bool {
    if size >= MAX_CACHED_SIZE {
        return false;
    }
    let p = pool();
    let mut store = p.store.lock().unwrap();
    p.caps[size].store(cap, Ordering::Relaxed);
    while store.0[size].len() > cap {
        let ptr = store.0[size].pop().unwrap();
        p.cached[size].fetch_sub(1, Ordering::Relaxed);
        unsafe { sys_dealloc(ptr, layout_for(size)) };
    }
    true
}

/// Serialises unit tests that observe the global usage counters.
#[cfg(test)]
pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Outstanding allocations attributed to the pool: (block count, byte total).
pub fn usage() -> (usize, usize) {
    let p = pool();
    (
        p.live_count.load(Ordering::Relaxed),
        p.live_bytes.load(Ordering::Relaxed),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_reuse() {
        let _guard = TEST_LOCK.lock().unwrap();
        set_cache(96, 4);
        let (count0, bytes0) = usage();

        let block = alloc(96).unwrap();
        assert_eq!(block.capacity(), 96);
        assert_eq!(usage().0, count0 + 1);
        drop(block);

        // The block is parked, not live.
        assert_eq!(usage(), (count0, bytes0));

        let again = alloc(96).unwrap();
        assert_eq!(again.capacity(), 96);
        drop(again);
        set_cache(96, 0);
    }

    #[test]
    fn large_sizes_bypass_cache() {
        let _guard = TEST_LOCK.lock().unwrap();
        let block = alloc(MAX_CACHED_SIZE + 1).unwrap();
        drop(block);
        assert!(!set_cache(MAX_CACHED_SIZE, 1));
    }

    #[test]
    fn counters_return_to_baseline() {
        let _guard = TEST_LOCK.lock().unwrap();
        let (count0, bytes0) = usage();
        let blocks: Vec<_> = (0..16).map(|_| alloc_or_oom(RECV_CHUNK_SIZE)).collect();
        assert_eq!(usage().0, count0 + 16);
        assert_eq!(usage().1, bytes0 + 16 * RECV_CHUNK_SIZE);
        drop(blocks);
        assert_eq!(usage(), (count0, bytes0));
    }

    #[test]
    fn cap_bounds_parked_blocks() {
        let _guard = TEST_LOCK.lock().unwrap();
        set_cache(200, 2);
        let a = alloc(200).unwrap();
        let b = alloc(200).unwrap();
        let c = alloc(200).unwrap();
        drop(a);
        drop(b);
        drop(c); // third goes back to the system allocator

        let p = pool();
        assert!(p.cached[200].load(Ordering::Relaxed) <= 2);
        set_cache(200, 0);
        assert_eq!(p.cached[200].load(Ordering::Relaxed), 0);
    }

    #[test]
    fn from_slice_copies() {
        let _guard = TEST_LOCK.lock().unwrap();
        let block = SlabBlock::from_slice(b"hello slab");
        assert_eq!(block.as_slice(), b"hello slab");
        assert_eq!(block.len(), 10);
        assert_eq!(&block[..5], b"hello");
    }

    #[test]
    fn zero_size_alloc() {
        let _guard = TEST_LOCK.lock().unwrap();
        let block = alloc(0).unwrap();
        assert!(block.is_empty());
    }
}
