//! Reference-counted cell shared between the reactor and worker threads.
//!
//! A session owns one cell and hands clones to the parse tasks it enqueues.
//! When the session shuts down, the reactor resets its cell; a worker that
//! then observes `unique()` holds the last reference and must abandon the
//! context instead of doing further work on a dead session.

use std::sync::Arc;

pub struct SharedCtx<T> {
    inner: Option<Arc<T>>,
}

impl<T> SharedCtx<T> {
    pub fn new(value: T) -> SharedCtx<T> {
        SharedCtx {
            inner: Some(Arc::new(value)),
        }
    }

    pub fn empty() -> SharedCtx<T> {
        SharedCtx { inner: None }
    }

    /// Install a new pointee, dropping the previous reference.
    pub fn replace(&mut self, value: T) {
        self.inner = Some(Arc::new(value));
    }

    /// Drop this cell's reference. The pointee is destroyed when the last
    /// clone goes away.
    pub fn reset(&mut self) {
        self.inner = None;
    }

    /// True when no other clone refers to the pointee (or the cell is
    /// empty). A worker seeing this must abandon the context.
    pub fn unique(&self) -> bool {
        match &self.inner {
            Some(inner) => Arc::strong_count(inner) == 1,
            None => true,
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.inner.as_deref()
    }

    pub fn is_some(&self) -> bool {
        self.inner.is_some()
    }
}

impl<T> Clone for SharedCtx<T> {
    fn clone(&self) -> SharedCtx<T> {
        SharedCtx {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for SharedCtx<T> {
    fn default() -> SharedCtx<T> {
        SharedCtx::empty()
    }
}
